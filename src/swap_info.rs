//! Per-family state deltas carried from a pricing call to `update_balance`.

use crate::adapters::clmm::ClmmSwapInfo;
use crate::adapters::curve::CurveSwapInfo;
use crate::adapters::kyber_pmm::PmmSwapInfo;
use crate::adapters::lo1inch::LimitOrderSwapInfo;
use crate::adapters::share_vault::ShareVaultSwapInfo;
use crate::adapters::xpress::XpressSwapInfo;
use serde::{Deserialize, Serialize};

/// What a priced swap would change. Each simulator only accepts its own variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "family", content = "info", rename_all = "camelCase")]
pub enum SwapInfo {
    /// Constant-product pools apply the raw in/out amounts
    UniswapV2,
    ShareVault(ShareVaultSwapInfo),
    Curve(CurveSwapInfo),
    Clmm(ClmmSwapInfo),
    Xpress(XpressSwapInfo),
    KyberPmm(PmmSwapInfo),
    LimitOrder(LimitOrderSwapInfo),
}

impl SwapInfo {
    pub fn family(&self) -> &'static str {
        match self {
            SwapInfo::UniswapV2 => "uniswap-v2",
            SwapInfo::ShareVault(_) => "share-vault",
            SwapInfo::Curve(_) => "curve",
            SwapInfo::Clmm(_) => "clmm",
            SwapInfo::Xpress(_) => "xpress",
            SwapInfo::KyberPmm(_) => "kyber-pmm",
            SwapInfo::LimitOrder(_) => "lo1inch",
        }
    }
}
