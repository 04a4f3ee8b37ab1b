use ethers::types::{Address, U256};
use serde::Deserialize;

use crate::entity::PoolSnapshot;
use crate::error::SimulatorError;
use crate::fixed_point::{checked_add, checked_mul, mul_div_down};
use crate::pool_simulator::{
    validate_amount_in_params, validate_amount_out_params, CalcAmountInParams,
    CalcAmountInResult, CalcAmountOutParams, CalcAmountOutResult, MetaInfo, PoolInfo,
    PoolSimulator, TokenAmount, UpdateBalanceParams,
};
use crate::settings::Settings;
use crate::swap_info::SwapInfo;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Extra {
    #[serde(default = "default_fee")]
    fee: u64,
    #[serde(default = "default_fee_precision")]
    fee_precision: u64,
}

fn default_fee() -> u64 {
    3
}
fn default_fee_precision() -> u64 {
    1000
}

/// Constant-product pool: `x * y = k` with the fee taken from the input.
#[derive(Debug, Clone)]
pub struct UniswapV2Simulator {
    info: PoolInfo,
    fee: U256,
    fee_precision: U256,
    gas: u64,
}

impl UniswapV2Simulator {
    pub fn new(snapshot: &PoolSnapshot, settings: &Settings) -> Result<Self, SimulatorError> {
        snapshot.expect_token_count(2, 2)?;
        let extra: Extra = snapshot.parse_extra()?;
        if extra.fee_precision == 0 || extra.fee >= extra.fee_precision {
            return Err(SimulatorError::InvalidSnapshot(format!(
                "fee {} / {} is not a valid fraction",
                extra.fee, extra.fee_precision
            )));
        }

        Ok(Self {
            info: PoolInfo::from_snapshot(snapshot)?,
            fee: U256::from(extra.fee),
            fee_precision: U256::from(extra.fee_precision),
            gas: settings.gas.uniswap_v2,
        })
    }

    /// `amountOut = amountIn*(P-f)*reserveOut / (reserveIn*P + amountIn*(P-f))`
    pub fn get_amount_out(&self, amount_in: U256, reserve_in: U256, reserve_out: U256) -> Result<U256, SimulatorError> {
        if reserve_in.is_zero() || reserve_out.is_zero() {
            return Err(SimulatorError::InsufficientLiquidity);
        }
        let amount_in_with_fee = checked_mul(amount_in, self.fee_precision - self.fee)?;
        let denominator = checked_add(
            checked_mul(reserve_in, self.fee_precision)?,
            amount_in_with_fee,
        )?;
        Ok(mul_div_down(amount_in_with_fee, reserve_out, denominator)?)
    }

    /// `amountIn = reserveIn*amountOut*P / ((reserveOut-amountOut)*(P-f)) + 1`
    pub fn get_amount_in(&self, amount_out: U256, reserve_in: U256, reserve_out: U256) -> Result<U256, SimulatorError> {
        if reserve_in.is_zero() || reserve_out.is_zero() || amount_out >= reserve_out {
            return Err(SimulatorError::InsufficientLiquidity);
        }
        let numerator = checked_mul(amount_out, self.fee_precision)?;
        let denominator = checked_mul(reserve_out - amount_out, self.fee_precision - self.fee)?;
        let amount_in = mul_div_down(reserve_in, numerator, denominator)?;
        Ok(checked_add(amount_in, U256::one())?)
    }
}

impl PoolSimulator for UniswapV2Simulator {
    fn info(&self) -> &PoolInfo {
        &self.info
    }

    fn calc_amount_out(&self, params: CalcAmountOutParams<'_>) -> Result<CalcAmountOutResult, SimulatorError> {
        let (index_in, index_out) = validate_amount_out_params(&self.info, &params)?;
        let amount_in = params.token_amount_in.amount;
        let reserve_in = self.info.reserves[index_in];
        let reserve_out = self.info.reserves[index_out];

        let amount_out = self.get_amount_out(amount_in, reserve_in, reserve_out)?;
        if amount_out.is_zero() {
            return Err(SimulatorError::InsufficientOutputAmount);
        }
        if amount_out >= reserve_out {
            return Err(SimulatorError::InsufficientLiquidity);
        }

        Ok(CalcAmountOutResult {
            token_amount_out: TokenAmount::new(params.token_out, amount_out),
            fee: TokenAmount::new(
                params.token_amount_in.token,
                mul_div_down(amount_in, self.fee, self.fee_precision)?,
            ),
            gas: self.gas,
            remaining_token_amount_in: None,
            swap_info: SwapInfo::UniswapV2,
        })
    }

    fn calc_amount_in(&self, params: CalcAmountInParams<'_>) -> Result<CalcAmountInResult, SimulatorError> {
        let (index_in, index_out) = validate_amount_in_params(&self.info, &params)?;
        let amount_out = params.token_amount_out.amount;
        let amount_in = self.get_amount_in(
            amount_out,
            self.info.reserves[index_in],
            self.info.reserves[index_out],
        )?;

        Ok(CalcAmountInResult {
            token_amount_in: TokenAmount::new(params.token_in, amount_in),
            fee: TokenAmount::new(
                params.token_in,
                mul_div_down(amount_in, self.fee, self.fee_precision)?,
            ),
            gas: self.gas,
            remaining_token_amount_out: None,
            swap_info: SwapInfo::UniswapV2,
        })
    }

    fn update_balance(&mut self, params: UpdateBalanceParams<'_>) {
        let (index_in, index_out) = match self
            .info
            .resolve_pair(&params.token_amount_in.token, &params.token_amount_out.token)
        {
            Ok(indexes) => indexes,
            Err(_) => return,
        };
        let reserves = &mut self.info.reserves;
        reserves[index_in] = reserves[index_in].saturating_add(params.token_amount_in.amount);
        reserves[index_out] = reserves[index_out].saturating_sub(params.token_amount_out.amount);
    }

    fn clone_state(&self) -> Box<dyn PoolSimulator> {
        Box::new(self.clone())
    }

    fn get_meta_info(&self, token_in: Address, token_out: Address) -> MetaInfo {
        MetaInfo {
            block_number: self.info.block_number,
            token_in_index: self.info.token_index(&token_in),
            token_out_index: self.info.token_index(&token_out),
            ..MetaInfo::default()
        }
    }
}
