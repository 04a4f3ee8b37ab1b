//! Oracle-guarded two-coin stable pool.
//!
//! Prices exactly like a plain pool, then re-quotes one whole unit in each
//! direction against the hypothetical post-swap balances and rejects the swap when
//! either spot price strays from the oracle-implied price by more than the
//! configured threshold.

use ethers::types::{Address, U256};
use serde::Deserialize;

use crate::adapters::curve::{apply_swap, quote_stable_swap, StableSwap, PRECISION};
use crate::entity::PoolSnapshot;
use crate::error::SimulatorError;
use crate::fixed_point::{abs_diff, mul_div_down, pow10};
use crate::pool_simulator::{
    CalcAmountOutParams, CalcAmountOutResult, MetaInfo, PoolInfo, PoolSimulator,
    UpdateBalanceParams,
};
use crate::settings::Settings;
use crate::swap_info::SwapInfo;
use crate::types::conversions::serde_u256_vec;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OracleExtra {
    /// USD prices scaled by 1e18
    #[serde(with = "serde_u256_vec")]
    oracle_prices: Vec<U256>,
    /// Maximum relative deviation per token, scaled by 1e18
    #[serde(with = "serde_u256_vec")]
    price_diff_threshold: Vec<U256>,
}

#[derive(Debug, Clone)]
pub struct CurveOracleSimulator {
    info: PoolInfo,
    math: StableSwap,
    oracle_prices: [U256; 2],
    price_diff_threshold: [U256; 2],
    units: [U256; 2],
    gas: u64,
}

impl CurveOracleSimulator {
    pub fn new(snapshot: &PoolSnapshot, settings: &Settings) -> Result<Self, SimulatorError> {
        snapshot.expect_token_count(2, 2)?;
        let math = StableSwap::from_snapshot(snapshot, settings)?;
        let extra: OracleExtra = snapshot.parse_extra()?;

        let (oracle_prices, price_diff_threshold) = match (
            extra.oracle_prices.as_slice(),
            extra.price_diff_threshold.as_slice(),
        ) {
            ([p0, p1], [t0, t1]) if !p0.is_zero() && !p1.is_zero() => ([*p0, *p1], [*t0, *t1]),
            _ => {
                return Err(SimulatorError::InvalidSnapshot(
                    "oraclePrices and priceDiffThreshold need two non-zero entries".to_string(),
                ))
            }
        };

        Ok(Self {
            info: PoolInfo::from_snapshot(snapshot)?,
            math,
            oracle_prices,
            price_diff_threshold,
            units: [
                pow10(snapshot.tokens[0].decimals as u32)?,
                pow10(snapshot.tokens[1].decimals as u32)?,
            ],
            gas: settings.gas.curve,
        })
    }

    /// Relative deviation (1e18 = 100%) between the pool's unit quote `from -> to`
    /// and the oracle-implied amount.
    fn deviation(&self, balances: &[U256], from: usize, to: usize) -> Result<U256, SimulatorError> {
        let quoted = self.math.get_dy(from, to, self.units[from], balances)?.amount_out;
        let implied = mul_div_down(self.units[to], self.oracle_prices[from], self.oracle_prices[to])?;
        if implied.is_zero() {
            return Err(SimulatorError::InvalidLiquidity);
        }
        Ok(mul_div_down(abs_diff(quoted, implied), PRECISION, implied)?)
    }

    fn check_price_diff(&self, balances: &[U256]) -> Result<(), SimulatorError> {
        if self.deviation(balances, 0, 1)? > self.price_diff_threshold[0] {
            return Err(SimulatorError::PriceDiffToken0);
        }
        if self.deviation(balances, 1, 0)? > self.price_diff_threshold[1] {
            return Err(SimulatorError::PriceDiffToken1);
        }
        Ok(())
    }
}

impl PoolSimulator for CurveOracleSimulator {
    fn info(&self) -> &PoolInfo {
        &self.info
    }

    fn calc_amount_out(&self, params: CalcAmountOutParams<'_>) -> Result<CalcAmountOutResult, SimulatorError> {
        let (result, _, _) = quote_stable_swap(&self.info, &self.math, self.gas, &params)?;

        let mut post_swap = self.info.reserves.clone();
        if let SwapInfo::Curve(info) = &result.swap_info {
            apply_swap(&mut post_swap, info);
        }
        self.check_price_diff(&post_swap)?;

        Ok(result)
    }

    fn update_balance(&mut self, params: UpdateBalanceParams<'_>) {
        match params.swap_info {
            SwapInfo::Curve(info) => apply_swap(&mut self.info.reserves, info),
            other => tracing::warn!("oracle pool {:?} ignoring {} swap info", self.info.address, other.family()),
        }
    }

    fn clone_state(&self) -> Box<dyn PoolSimulator> {
        Box::new(self.clone())
    }

    fn get_meta_info(&self, token_in: Address, token_out: Address) -> MetaInfo {
        MetaInfo {
            block_number: self.info.block_number,
            approval_address: Some(self.info.address),
            token_in_index: self.info.token_index(&token_in),
            token_out_index: self.info.token_index(&token_out),
            timestamp: Some(self.math.timestamp),
            ..MetaInfo::default()
        }
    }
}
