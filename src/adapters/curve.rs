//! # Curve plain stable-swap pools
//!
//! Reproduces `get_dy` of the plain pool contracts: balances are normalised to
//! 18 decimals through per-coin rates, the invariant `D` and the post-swap
//! balance `y` are solved with Newton's method, and `dy = xp[j] - y - 1` keeps a
//! one-wei safety margin in favour of the pool.
//!
//! The amplification coefficient ramps linearly between `initialA` and `futureA`
//! and is evaluated at the snapshot timestamp, so pricing never reads the clock.

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::entity::PoolSnapshot;
use crate::error::SimulatorError;
use crate::fixed_point::{abs_diff, checked_add, checked_div, checked_mul, checked_sub, mul_div_down, pow10};
use crate::pool_simulator::{
    validate_amount_out_params, CalcAmountOutParams, CalcAmountOutResult, MetaInfo, PoolInfo,
    PoolSimulator, TokenAmount, UpdateBalanceParams,
};
use crate::settings::Settings;
use crate::swap_info::SwapInfo;
use crate::types::conversions::{serde_u256, serde_u256_vec};

/// 1e18, the normalised balance precision
pub const PRECISION: U256 = U256([1_000_000_000_000_000_000, 0, 0, 0]);
/// Fees are expressed over 1e10
pub const FEE_DENOMINATOR: U256 = U256([10_000_000_000, 0, 0, 0]);

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StableSwapExtra {
    #[serde(with = "serde_u256")]
    pub initial_a: U256,
    #[serde(with = "serde_u256")]
    pub future_a: U256,
    #[serde(default)]
    pub initial_a_time: i64,
    #[serde(default)]
    pub future_a_time: i64,
    #[serde(with = "serde_u256")]
    pub swap_fee: U256,
    #[serde(default, with = "serde_u256")]
    pub admin_fee: U256,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StableSwapStaticExtra {
    #[serde(default = "default_a_precision", with = "serde_u256")]
    pub a_precision: U256,
    #[serde(default, with = "serde_u256_vec")]
    pub rates: Vec<U256>,
}

fn default_a_precision() -> U256 {
    U256::from(100)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurveSwapInfo {
    pub token_in_index: usize,
    pub token_out_index: usize,
    #[serde(with = "serde_u256")]
    pub amount_in: U256,
    #[serde(with = "serde_u256")]
    pub amount_out: U256,
    /// Part of the fee withdrawn from the pool, in output-token units
    #[serde(with = "serde_u256")]
    pub admin_fee: U256,
}

/// Output of [`StableSwap::get_dy`], all amounts in output-token units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DyResult {
    pub amount_out: U256,
    pub fee: U256,
    pub admin_fee: U256,
}

/// Stable-swap invariant state shared by the plain and oracle-guarded pools.
#[derive(Debug, Clone)]
pub struct StableSwap {
    pub rates: Vec<U256>,
    pub initial_a: U256,
    pub future_a: U256,
    pub initial_a_time: i64,
    pub future_a_time: i64,
    pub a_precision: U256,
    pub swap_fee: U256,
    pub admin_fee: U256,
    pub timestamp: i64,
    pub max_iterations: u32,
}

impl StableSwap {
    pub(crate) fn from_snapshot(snapshot: &PoolSnapshot, settings: &Settings) -> Result<Self, SimulatorError> {
        let extra: StableSwapExtra = snapshot.parse_extra()?;
        let static_extra: StableSwapStaticExtra = snapshot.parse_static_extra()?;

        let rates = if static_extra.rates.is_empty() {
            snapshot
                .tokens
                .iter()
                .map(|t| {
                    let exp = 18u32.checked_sub(t.decimals as u32).ok_or_else(|| {
                        SimulatorError::InvalidSnapshot(format!(
                            "token {:?} has {} decimals",
                            t.address, t.decimals
                        ))
                    })?;
                    Ok(checked_mul(PRECISION, pow10(exp)?)?)
                })
                .collect::<Result<Vec<_>, SimulatorError>>()?
        } else {
            static_extra.rates
        };
        if rates.len() != snapshot.tokens.len() || rates.iter().any(|r| r.is_zero()) {
            return Err(SimulatorError::InvalidSnapshot("rates misaligned with tokens".to_string()));
        }
        if static_extra.a_precision.is_zero() {
            return Err(SimulatorError::InvalidSnapshot("aPrecision is zero".to_string()));
        }
        if extra.swap_fee > FEE_DENOMINATOR || extra.admin_fee > FEE_DENOMINATOR {
            return Err(SimulatorError::InvalidSnapshot(format!(
                "fees {} / {} exceed {}",
                extra.swap_fee, extra.admin_fee, FEE_DENOMINATOR
            )));
        }

        Ok(Self {
            rates,
            initial_a: extra.initial_a,
            future_a: extra.future_a,
            initial_a_time: extra.initial_a_time,
            future_a_time: extra.future_a_time,
            a_precision: static_extra.a_precision,
            swap_fee: extra.swap_fee,
            admin_fee: extra.admin_fee,
            timestamp: snapshot.timestamp,
            max_iterations: settings.stable_swap.max_newton_iterations,
        })
    }

    /// Amplification (already multiplied by `a_precision`) at the snapshot time.
    pub fn amp(&self) -> Result<U256, SimulatorError> {
        let t = self.timestamp;
        if t >= self.future_a_time || self.future_a_time <= self.initial_a_time {
            return Ok(self.future_a);
        }
        // both spans are positive here: initial < future and t < future
        let elapsed = U256::from(t.saturating_sub(self.initial_a_time).max(0) as u64);
        let duration = U256::from(self.future_a_time.abs_diff(self.initial_a_time));
        if self.future_a > self.initial_a {
            let delta = mul_div_down(self.future_a - self.initial_a, elapsed, duration)?;
            Ok(checked_add(self.initial_a, delta)?)
        } else {
            let delta = mul_div_down(self.initial_a - self.future_a, elapsed, duration)?;
            Ok(self.initial_a.saturating_sub(delta))
        }
    }

    /// Balances normalised to 18 decimals.
    pub fn xp(&self, balances: &[U256]) -> Result<Vec<U256>, SimulatorError> {
        balances
            .iter()
            .zip(&self.rates)
            .map(|(b, r)| Ok(mul_div_down(*r, *b, PRECISION)?))
            .collect()
    }

    pub fn get_d(&self, xp: &[U256], amp: U256) -> Result<U256, SimulatorError> {
        let n = U256::from(xp.len());
        let mut s = U256::zero();
        for x in xp {
            s = checked_add(s, *x)?;
        }
        if s.is_zero() {
            return Ok(U256::zero());
        }

        let mut d = s;
        let ann = checked_mul(amp, n)?;
        for _ in 0..self.max_iterations {
            let mut d_p = d;
            for x in xp {
                if x.is_zero() {
                    return Err(SimulatorError::InvalidLiquidity);
                }
                d_p = mul_div_down(d_p, d, checked_mul(*x, n)?)?;
            }
            let d_prev = d;
            let numerator = checked_add(
                mul_div_down(ann, s, self.a_precision)?,
                checked_mul(d_p, n)?,
            )?;
            let denominator = checked_add(
                mul_div_down(checked_sub(ann, self.a_precision)?, d, self.a_precision)?,
                checked_mul(n + 1, d_p)?,
            )?;
            d = mul_div_down(numerator, d, denominator)?;
            if abs_diff(d, d_prev) <= U256::one() {
                return Ok(d);
            }
        }
        Err(SimulatorError::NotConverged)
    }

    /// New normalised balance of coin `j` when coin `i` is set to `x`.
    pub fn get_y(&self, i: usize, j: usize, x: U256, xp: &[U256], amp: U256) -> Result<U256, SimulatorError> {
        let n = U256::from(xp.len());
        let d = self.get_d(xp, amp)?;
        let ann = checked_mul(amp, n)?;
        if ann.is_zero() {
            return Err(SimulatorError::InvalidLiquidity);
        }

        let mut c = d;
        let mut s = U256::zero();
        for (k, balance) in xp.iter().enumerate() {
            let x_k = if k == i {
                x
            } else if k != j {
                *balance
            } else {
                continue;
            };
            if x_k.is_zero() {
                return Err(SimulatorError::InvalidLiquidity);
            }
            s = checked_add(s, x_k)?;
            c = mul_div_down(c, d, checked_mul(x_k, n)?)?;
        }
        c = mul_div_down(checked_mul(c, d)?, self.a_precision, checked_mul(ann, n)?)?;
        let b = checked_add(s, mul_div_down(d, self.a_precision, ann)?)?;

        let mut y = d;
        for _ in 0..self.max_iterations {
            let y_prev = y;
            let numerator = checked_add(checked_mul(y, y)?, c)?;
            let denominator = checked_sub(checked_add(checked_mul(y, U256::from(2))?, b)?, d)?;
            y = checked_div(numerator, denominator)?;
            if abs_diff(y, y_prev) <= U256::one() {
                return Ok(y);
            }
        }
        Err(SimulatorError::NotConverged)
    }

    /// `get_dy` against the given raw balances.
    pub fn get_dy(&self, i: usize, j: usize, dx: U256, balances: &[U256]) -> Result<DyResult, SimulatorError> {
        let amp = self.amp()?;
        let xp = self.xp(balances)?;
        let x = checked_add(xp[i], mul_div_down(dx, self.rates[i], PRECISION)?)?;
        let y = self.get_y(i, j, x, &xp, amp)?;

        let dy = xp[j]
            .checked_sub(y)
            .and_then(|v| v.checked_sub(U256::one()))
            .ok_or(SimulatorError::InsufficientLiquidity)?;
        let fee = mul_div_down(self.swap_fee, dy, FEE_DENOMINATOR)?;
        let amount_out = mul_div_down(checked_sub(dy, fee)?, PRECISION, self.rates[j])?;
        let admin_fee = mul_div_down(
            mul_div_down(fee, self.admin_fee, FEE_DENOMINATOR)?,
            PRECISION,
            self.rates[j],
        )?;

        Ok(DyResult {
            amount_out,
            fee: mul_div_down(fee, PRECISION, self.rates[j])?,
            admin_fee,
        })
    }
}

/// Applies a priced stable swap to raw balances.
pub(crate) fn apply_swap(reserves: &mut [U256], info: &CurveSwapInfo) {
    let (i, j) = (info.token_in_index, info.token_out_index);
    if i >= reserves.len() || j >= reserves.len() {
        return;
    }
    reserves[i] = reserves[i].saturating_add(info.amount_in);
    reserves[j] = reserves[j].saturating_sub(info.amount_out.saturating_add(info.admin_fee));
}

#[derive(Debug, Clone)]
pub struct CurvePlainSimulator {
    info: PoolInfo,
    math: StableSwap,
    gas: u64,
}

impl CurvePlainSimulator {
    pub fn new(snapshot: &PoolSnapshot, settings: &Settings) -> Result<Self, SimulatorError> {
        snapshot.expect_token_count(2, 8)?;
        let math = StableSwap::from_snapshot(snapshot, settings)?;
        tracing::debug!(
            "curve pool {:?}: {} coins, A={}",
            snapshot.address,
            snapshot.tokens.len(),
            math.amp()?
        );

        Ok(Self {
            info: PoolInfo::from_snapshot(snapshot)?,
            math,
            gas: settings.gas.curve,
        })
    }

    pub fn math(&self) -> &StableSwap {
        &self.math
    }
}

/// Shared `calc_amount_out` body for both stable-swap flavours.
pub(crate) fn quote_stable_swap(
    info: &PoolInfo,
    math: &StableSwap,
    gas: u64,
    params: &CalcAmountOutParams<'_>,
) -> Result<(CalcAmountOutResult, usize, usize), SimulatorError> {
    let (i, j) = validate_amount_out_params(info, params)?;
    let dx = params.token_amount_in.amount;
    let dy = math.get_dy(i, j, dx, &info.reserves)?;

    if dy.amount_out.is_zero() {
        return Err(SimulatorError::InsufficientOutputAmount);
    }
    if dy.amount_out.saturating_add(dy.admin_fee) > info.reserves[j] {
        return Err(SimulatorError::InsufficientLiquidity);
    }

    let result = CalcAmountOutResult {
        token_amount_out: TokenAmount::new(params.token_out, dy.amount_out),
        fee: TokenAmount::new(params.token_out, dy.fee),
        gas,
        remaining_token_amount_in: None,
        swap_info: SwapInfo::Curve(CurveSwapInfo {
            token_in_index: i,
            token_out_index: j,
            amount_in: dx,
            amount_out: dy.amount_out,
            admin_fee: dy.admin_fee,
        }),
    };
    Ok((result, i, j))
}

impl PoolSimulator for CurvePlainSimulator {
    fn info(&self) -> &PoolInfo {
        &self.info
    }

    fn calc_amount_out(&self, params: CalcAmountOutParams<'_>) -> Result<CalcAmountOutResult, SimulatorError> {
        quote_stable_swap(&self.info, &self.math, self.gas, &params).map(|(result, _, _)| result)
    }

    fn update_balance(&mut self, params: UpdateBalanceParams<'_>) {
        match params.swap_info {
            SwapInfo::Curve(info) => apply_swap(&mut self.info.reserves, info),
            other => tracing::warn!("curve pool {:?} ignoring {} swap info", self.info.address, other.family()),
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
