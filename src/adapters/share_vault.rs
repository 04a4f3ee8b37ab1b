//! ERC-4626 style share vaults and liquid-staking wrappers.
//!
//! Token layout is `[share, asset]` or `[share, asset, wrappedAsset]`. A wrapped
//! asset (for example a non-rebasing wrapper of a rebasing staking token) is first
//! unwrapped through `totalPooledEther / totalShares` and then deposited.

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::entity::PoolSnapshot;
use crate::error::SimulatorError;
use crate::fixed_point::{checked_add, mul_div_down};
use crate::pool_simulator::{
    validate_amount_out_params, CalcAmountOutParams, CalcAmountOutResult, MetaInfo, PoolInfo,
    PoolSimulator, TokenAmount, UpdateBalanceParams,
};
use crate::settings::Settings;
use crate::swap_info::SwapInfo;
use crate::types::conversions::serde_u256;

const SHARE_INDEX: usize = 0;
const ASSET_INDEX: usize = 1;
const WRAPPED_INDEX: usize = 2;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Extra {
    #[serde(default, with = "serde_u256")]
    total_supply: U256,
    #[serde(default, with = "serde_u256")]
    total_assets: U256,
    #[serde(default, with = "serde_u256")]
    total_pooled_ether: U256,
    #[serde(default, with = "serde_u256")]
    total_shares: U256,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StaticExtra {
    #[serde(default)]
    redeemable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VaultAction {
    Deposit,
    Redeem,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareVaultSwapInfo {
    pub action: VaultAction,
    #[serde(with = "serde_u256")]
    pub assets: U256,
    #[serde(with = "serde_u256")]
    pub shares: U256,
}

#[derive(Debug, Clone)]
pub struct ShareVaultSimulator {
    info: PoolInfo,
    total_supply: U256,
    total_assets: U256,
    total_pooled_ether: U256,
    total_shares: U256,
    redeemable: bool,
    gas: u64,
}

impl ShareVaultSimulator {
    pub fn new(snapshot: &PoolSnapshot, settings: &Settings) -> Result<Self, SimulatorError> {
        snapshot.expect_token_count(2, 3)?;
        let extra: Extra = snapshot.parse_extra()?;
        let static_extra: StaticExtra = snapshot.parse_static_extra()?;

        Ok(Self {
            info: PoolInfo::from_snapshot(snapshot)?,
            total_supply: extra.total_supply,
            total_assets: extra.total_assets,
            total_pooled_ether: extra.total_pooled_ether,
            total_shares: extra.total_shares,
            redeemable: static_extra.redeemable,
            gas: settings.gas.share_vault,
        })
    }

    /// Deposit conversion, rounded down: `shares = assets * (supply+1) / (totalAssets+1)`
    pub fn convert_to_shares(&self, assets: U256) -> Result<U256, SimulatorError> {
        Ok(mul_div_down(
            assets,
            checked_add(self.total_supply, U256::one())?,
            checked_add(self.total_assets, U256::one())?,
        )?)
    }

    /// Redeem conversion, rounded down: `assets = shares * (totalAssets+1) / (supply+1)`
    pub fn convert_to_assets(&self, shares: U256) -> Result<U256, SimulatorError> {
        Ok(mul_div_down(
            shares,
            checked_add(self.total_assets, U256::one())?,
            checked_add(self.total_supply, U256::one())?,
        )?)
    }

    /// Wrapped amount to underlying with a 512-bit intermediate product.
    pub fn unwrap_amount(&self, wrapped: U256) -> Result<U256, SimulatorError> {
        if self.total_shares.is_zero() {
            return Err(SimulatorError::InvalidLiquidity);
        }
        Ok(mul_div_down(wrapped, self.total_pooled_ether, self.total_shares)?)
    }
}

impl PoolSimulator for ShareVaultSimulator {
    fn info(&self) -> &PoolInfo {
        &self.info
    }

    fn calc_amount_out(&self, params: CalcAmountOutParams<'_>) -> Result<CalcAmountOutResult, SimulatorError> {
        let (index_in, index_out) = validate_amount_out_params(&self.info, &params)?;
        let amount_in = params.token_amount_in.amount;

        let (amount_out, swap_info) = match (index_in, index_out) {
            (ASSET_INDEX, SHARE_INDEX) => {
                let shares = self.convert_to_shares(amount_in)?;
                (shares, ShareVaultSwapInfo { action: VaultAction::Deposit, assets: amount_in, shares })
            }
            (WRAPPED_INDEX, SHARE_INDEX) => {
                let assets = self.unwrap_amount(amount_in)?;
                let shares = self.convert_to_shares(assets)?;
                (shares, ShareVaultSwapInfo { action: VaultAction::Deposit, assets, shares })
            }
            (SHARE_INDEX, ASSET_INDEX) if self.redeemable => {
                let assets = self.convert_to_assets(amount_in)?;
                if assets > self.total_assets {
                    return Err(SimulatorError::InsufficientLiquidity);
                }
                (assets, ShareVaultSwapInfo { action: VaultAction::Redeem, assets, shares: amount_in })
            }
            _ => return Err(SimulatorError::InvalidToken),
        };

        if amount_out.is_zero() {
            return Err(SimulatorError::InsufficientOutputAmount);
        }

        Ok(CalcAmountOutResult {
            token_amount_out: TokenAmount::new(params.token_out, amount_out),
            fee: TokenAmount::new(params.token_amount_in.token, U256::zero()),
            gas: self.gas,
            remaining_token_amount_in: None,
            swap_info: SwapInfo::ShareVault(swap_info),
        })
    }

    // Best-effort approximation of the vault's own accounting
    fn update_balance(&mut self, params: UpdateBalanceParams<'_>) {
        let info = match params.swap_info {
            SwapInfo::ShareVault(info) => info,
            other => {
                tracing::warn!("share vault {:?} ignoring {} swap info", self.info.address, other.family());
                return;
            }
        };
        match info.action {
            VaultAction::Deposit => {
                self.total_supply = self.total_supply.saturating_add(info.shares);
                self.total_assets = self.total_assets.saturating_add(info.assets);
            }
            VaultAction::Redeem => {
                self.total_supply = self.total_supply.saturating_sub(info.shares);
                self.total_assets = self.total_assets.saturating_sub(info.assets);
            }
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
            ..MetaInfo::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::TokenRef;

    fn share() -> Address {
        Address::repeat_byte(0x10)
    }
    fn asset() -> Address {
        Address::repeat_byte(0x11)
    }
    fn wrapped() -> Address {
        Address::repeat_byte(0x12)
    }

    fn simulator(extra: &str, redeemable: bool) -> ShareVaultSimulator {
        let snapshot = PoolSnapshot {
            address: share(),
            pool_type: "share-vault".to_string(),
            tokens: vec![
                TokenRef::new(share(), 18, "sUSDe"),
                TokenRef::new(asset(), 18, "USDe"),
                TokenRef::new(wrapped(), 18, "wUSDe"),
            ],
            reserves: vec!["0".to_string(), "0".to_string(), "0".to_string()],
            extra: extra.to_string(),
            static_extra: format!("{{\"redeemable\":{}}}", redeemable),
            ..PoolSnapshot::default()
        };
        ShareVaultSimulator::new(&snapshot, &Settings::default()).unwrap()
    }

    fn quote(sim: &ShareVaultSimulator, token_in: Address, amount: U256, token_out: Address) -> Result<CalcAmountOutResult, SimulatorError> {
        sim.calc_amount_out(CalcAmountOutParams {
            token_amount_in: TokenAmount::new(token_in, amount),
            token_out,
            limit: None,
        })
    }

    #[test]
    fn test_first_depositor_is_identity() {
        let sim = simulator("{}", false);
        let amount = U256::from(123_456_789u64);
        let result = quote(&sim, asset(), amount, share()).unwrap();
        assert_eq!(result.token_amount_out.amount, amount);
    }

    #[test]
    fn test_deposit_rounds_down() {
        let sim = simulator(r#"{"totalSupply":"1000","totalAssets":"1100"}"#, false);
        let result = quote(&sim, asset(), U256::from(100), share()).unwrap();
        // 100 * 1001 / 1101
        assert_eq!(result.token_amount_out.amount, U256::from(90));
    }

    #[test]
    fn test_wrapped_deposit_unwraps_with_full_precision() {
        // amount * totalPooledEther overflows 256 bits
        let big = U256::MAX / 2;
        let extra = format!(
            r#"{{"totalSupply":"1000","totalAssets":"1000","totalPooledEther":"{}","totalShares":"{}"}}"#,
            big,
            big / 2
        );
        let sim = simulator(&extra, false);
        let result = quote(&sim, wrapped(), U256::from(500), share()).unwrap();
        // unwrap doubles the amount, then 1000 * 1001 / 1001
        assert_eq!(result.token_amount_out.amount, U256::from(1000));
    }

    #[test]
    fn test_redeem_only_when_redeemable() {
        let extra = r#"{"totalSupply":"1000","totalAssets":"2000"}"#;
        let locked = simulator(extra, false);
        assert_eq!(
            quote(&locked, share(), U256::from(10), asset()).unwrap_err(),
            SimulatorError::InvalidToken
        );
        let open = simulator(extra, true);
        let result = quote(&open, share(), U256::from(10), asset()).unwrap();
        // 10 * 2001 / 1001
        assert_eq!(result.token_amount_out.amount, U256::from(19));
    }

    #[test]
    fn test_update_balance_tracks_supply() {
        let mut sim = simulator(r#"{"totalSupply":"1000","totalAssets":"1000"}"#, false);
        let amount_in = TokenAmount::new(asset(), U256::from(100));
        let result = quote(&sim, asset(), amount_in.amount, share()).unwrap();
        let fork = sim.clone_state();
        sim.update_balance(UpdateBalanceParams::from_result(&result, amount_in, None));
        assert_eq!(sim.total_supply, U256::from(1100));
        assert_eq!(sim.total_assets, U256::from(1100));
        // the fork still prices against the original state
        assert_eq!(
            fork.calc_amount_out(CalcAmountOutParams { token_amount_in: amount_in, token_out: share(), limit: None })
                .unwrap()
                .token_amount_out
                .amount,
            U256::from(100)
        );
    }
}
