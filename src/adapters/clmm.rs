//! # Concentrated-liquidity pools
//!
//! Tick-crossing swap loop over a sparse map of initialized ticks. The swap never
//! walks past the lowest / highest known tick: that boundary is a liquidity wall
//! and whatever input (or output) is left when it is reached is reported as a
//! remaining amount, not as an error.
//!
//! All price math goes through [`crate::v3_math`], so results are bit-exact with
//! the on-chain pool for the same tick data.

use std::collections::BTreeMap;
use std::sync::Arc;

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::entity::PoolSnapshot;
use crate::error::SimulatorError;
use crate::pool_simulator::{
    validate_amount_in_params, validate_amount_out_params, CalcAmountInParams,
    CalcAmountInResult, CalcAmountOutParams, CalcAmountOutResult, MetaInfo, PoolInfo,
    PoolSimulator, TokenAmount, UpdateBalanceParams,
};
use crate::settings::Settings;
use crate::swap_info::SwapInfo;
use crate::types::conversions::{serde_i128, serde_u256};
use crate::v3_math::{
    add_delta, compute_swap_step, get_sqrt_ratio_at_tick, get_tick_at_sqrt_ratio, V3PoolState,
    FEE_PIPS_DENOMINATOR, MAX_TICK, MIN_TICK,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickData {
    index: i32,
    #[serde(with = "serde_u256")]
    liquidity_gross: U256,
    #[serde(with = "serde_i128")]
    liquidity_net: i128,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Extra {
    #[serde(with = "serde_u256")]
    liquidity: U256,
    #[serde(with = "serde_u256")]
    sqrt_price_x96: U256,
    tick: i32,
    /// Fee in pips
    fee: u32,
    #[serde(default)]
    ticks: Vec<TickData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StaticExtra {
    #[serde(default)]
    tick_spacing: Option<i32>,
}

/// New price state after a swap, applied as-is by `update_balance`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClmmSwapInfo {
    #[serde(with = "serde_u256")]
    pub next_sqrt_price_x96: U256,
    #[serde(with = "serde_u256")]
    pub next_liquidity: U256,
    pub next_tick: i32,
    pub crossed_ticks: u32,
}

#[derive(Debug, Clone, Copy)]
struct SwapOutcome {
    /// Output for exact-in, input plus fee for exact-out
    amount_calculated: U256,
    amount_remaining: U256,
    fee: U256,
    state: V3PoolState,
    crossed_ticks: u32,
}

#[derive(Debug, Clone)]
pub struct ClmmSimulator {
    info: PoolInfo,
    state: V3PoolState,
    fee: u32,
    tick_spacing: Option<i32>,
    // liquidity_net per initialized tick, never mutated after construction
    ticks: Arc<BTreeMap<i32, i128>>,
    min_tick: i32,
    max_tick: i32,
    gas_base: u64,
    gas_cross_tick: u64,
}

impl ClmmSimulator {
    pub fn new(snapshot: &PoolSnapshot, settings: &Settings) -> Result<Self, SimulatorError> {
        snapshot.expect_token_count(2, 2)?;
        let extra: Extra = snapshot.parse_extra()?;
        let static_extra: StaticExtra = snapshot.parse_static_extra()?;

        if extra.fee >= FEE_PIPS_DENOMINATOR {
            return Err(SimulatorError::InvalidSnapshot(format!("fee {} pips", extra.fee)));
        }
        let liquidity = u256_to_u128(extra.liquidity)?;

        let mut ticks = BTreeMap::new();
        for t in extra.ticks.iter().filter(|t| !t.liquidity_gross.is_zero()) {
            if !(MIN_TICK..=MAX_TICK).contains(&t.index) {
                return Err(SimulatorError::InvalidSnapshot(format!("tick {} out of range", t.index)));
            }
            ticks.insert(t.index, t.liquidity_net);
        }
        let (min_tick, max_tick) = match (ticks.keys().next(), ticks.keys().next_back()) {
            (Some(lo), Some(hi)) => (*lo, *hi),
            _ => return Err(SimulatorError::TicksEmpty),
        };

        tracing::debug!(
            "clmm pool {:?}: tick {} liquidity {} with {} initialized ticks",
            snapshot.address,
            extra.tick,
            liquidity,
            ticks.len()
        );

        Ok(Self {
            info: PoolInfo::from_snapshot(snapshot)?,
            state: V3PoolState {
                sqrt_price_x96: extra.sqrt_price_x96,
                tick: extra.tick,
                liquidity,
            },
            fee: extra.fee,
            tick_spacing: static_extra.tick_spacing,
            ticks: Arc::new(ticks),
            min_tick,
            max_tick,
            gas_base: settings.gas.clmm_base,
            gas_cross_tick: settings.gas.clmm_cross_tick,
        })
    }

    pub fn state(&self) -> V3PoolState {
        self.state
    }

    pub fn tick_spacing(&self) -> Option<i32> {
        self.tick_spacing
    }

    /// Hard price wall one wei inside the outermost initialized tick.
    pub fn price_limit(&self, zero_for_one: bool) -> Result<U256, SimulatorError> {
        if zero_for_one {
            Ok(get_sqrt_ratio_at_tick(self.min_tick)? + U256::one())
        } else {
            Ok(get_sqrt_ratio_at_tick(self.max_tick)? - U256::one())
        }
    }

    fn next_initialized_tick(&self, tick: i32, zero_for_one: bool) -> (i32, bool) {
        let next = if zero_for_one {
            self.ticks.range(..=tick).next_back()
        } else {
            self.ticks.range(tick.saturating_add(1)..).next()
        };
        match next {
            Some((index, _)) => (*index, true),
            None if zero_for_one => (MIN_TICK, false),
            None => (MAX_TICK, false),
        }
    }

    fn swap(&self, zero_for_one: bool, amount_specified: U256, exact_in: bool) -> Result<SwapOutcome, SimulatorError> {
        let limit = self.price_limit(zero_for_one)?;
        let wall_reached = if zero_for_one {
            limit >= self.state.sqrt_price_x96
        } else {
            limit <= self.state.sqrt_price_x96
        };
        if wall_reached {
            return Err(SimulatorError::InsufficientLiquidity);
        }

        let mut state = self.state;
        let mut remaining = amount_specified;
        let mut calculated = U256::zero();
        let mut fee_total = U256::zero();
        let mut crossed_ticks = 0u32;

        while !remaining.is_zero() && state.sqrt_price_x96 != limit {
            let sqrt_price_start = state.sqrt_price_x96;
            let (tick_next, initialized) = self.next_initialized_tick(state.tick, zero_for_one);
            let sqrt_price_next = get_sqrt_ratio_at_tick(tick_next)?;
            let target = if zero_for_one {
                sqrt_price_next.max(limit)
            } else {
                sqrt_price_next.min(limit)
            };

            let step = compute_swap_step(
                state.sqrt_price_x96,
                target,
                state.liquidity,
                remaining,
                exact_in,
                self.fee,
            )?;
            state.sqrt_price_x96 = step.sqrt_ratio_next_x96;
            fee_total = fee_total.saturating_add(step.fee_amount);

            if exact_in {
                remaining = remaining
                    .checked_sub(step.amount_in + step.fee_amount)
                    .ok_or(SimulatorError::Overflow)?;
                calculated = calculated.checked_add(step.amount_out).ok_or(SimulatorError::Overflow)?;
            } else {
                remaining = remaining
                    .checked_sub(step.amount_out)
                    .ok_or(SimulatorError::Overflow)?;
                calculated = calculated
                    .checked_add(step.amount_in + step.fee_amount)
                    .ok_or(SimulatorError::Overflow)?;
            }

            if state.sqrt_price_x96 == sqrt_price_next {
                if initialized {
                    let mut liquidity_net = self.ticks.get(&tick_next).copied().unwrap_or_default();
                    if zero_for_one {
                        liquidity_net = liquidity_net.checked_neg().ok_or(SimulatorError::InvalidLiquidity)?;
                    }
                    state.liquidity = add_delta(state.liquidity, liquidity_net)?;
                    crossed_ticks += 1;
                }
                state.tick = if zero_for_one { tick_next - 1 } else { tick_next };
            } else if state.sqrt_price_x96 != sqrt_price_start {
                state.tick = get_tick_at_sqrt_ratio(state.sqrt_price_x96)?;
            }
        }

        Ok(SwapOutcome {
            amount_calculated: calculated,
            amount_remaining: remaining,
            fee: fee_total,
            state,
            crossed_ticks,
        })
    }

    fn gas(&self, crossed_ticks: u32) -> u64 {
        self.gas_base + self.gas_cross_tick * crossed_ticks as u64
    }
}

fn u256_to_u128(value: U256) -> Result<u128, SimulatorError> {
    if value.bits() > 128 {
        return Err(SimulatorError::Overflow);
    }
    Ok(value.low_u128())
}

fn swap_info(outcome: &SwapOutcome) -> SwapInfo {
    SwapInfo::Clmm(ClmmSwapInfo {
        next_sqrt_price_x96: outcome.state.sqrt_price_x96,
        next_liquidity: U256::from(outcome.state.liquidity),
        next_tick: outcome.state.tick,
        crossed_ticks: outcome.crossed_ticks,
    })
}

impl PoolSimulator for ClmmSimulator {
    fn info(&self) -> &PoolInfo {
        &self.info
    }

    fn calc_amount_out(&self, params: CalcAmountOutParams<'_>) -> Result<CalcAmountOutResult, SimulatorError> {
        let (index_in, _) = validate_amount_out_params(&self.info, &params)?;
        let token_in = params.token_amount_in.token;
        let outcome = self.swap(index_in == 0, params.token_amount_in.amount, true)?;

        if outcome.amount_calculated.is_zero() {
            return Err(SimulatorError::InsufficientOutputAmount);
        }

        Ok(CalcAmountOutResult {
            token_amount_out: TokenAmount::new(params.token_out, outcome.amount_calculated),
            fee: TokenAmount::new(token_in, outcome.fee),
            gas: self.gas(outcome.crossed_ticks),
            remaining_token_amount_in: (!outcome.amount_remaining.is_zero())
                .then(|| TokenAmount::new(token_in, outcome.amount_remaining)),
            swap_info: swap_info(&outcome),
        })
    }

    fn calc_amount_in(&self, params: CalcAmountInParams<'_>) -> Result<CalcAmountInResult, SimulatorError> {
        let (index_in, index_out) = validate_amount_in_params(&self.info, &params)?;
        let token_out = params.token_amount_out.token;
        if params.token_amount_out.amount > self.info.reserves[index_out] {
            return Err(SimulatorError::InsufficientLiquidity);
        }
        let outcome = self.swap(index_in == 0, params.token_amount_out.amount, false)?;

        if outcome.amount_calculated.is_zero() {
            return Err(SimulatorError::InsufficientInputAmount);
        }

        Ok(CalcAmountInResult {
            token_amount_in: TokenAmount::new(params.token_in, outcome.amount_calculated),
            fee: TokenAmount::new(params.token_in, outcome.fee),
            gas: self.gas(outcome.crossed_ticks),
            remaining_token_amount_out: (!outcome.amount_remaining.is_zero())
                .then(|| TokenAmount::new(token_out, outcome.amount_remaining)),
            swap_info: swap_info(&outcome),
        })
    }

    fn update_balance(&mut self, params: UpdateBalanceParams<'_>) {
        let info = match params.swap_info {
            SwapInfo::Clmm(info) => info,
            other => {
                tracing::warn!("clmm pool {:?} ignoring {} swap info", self.info.address, other.family());
                return;
            }
        };
        let liquidity = match u256_to_u128(info.next_liquidity) {
            Ok(liquidity) => liquidity,
            Err(e) => {
                tracing::warn!("clmm pool {:?} rejected swap info: {}", self.info.address, e);
                return;
            }
        };
        self.state = V3PoolState {
            sqrt_price_x96: info.next_sqrt_price_x96,
            tick: info.next_tick,
            liquidity,
        };

        if let Ok((index_in, index_out)) = self
            .info
            .resolve_pair(&params.token_amount_in.token, &params.token_amount_out.token)
        {
            let reserves = &mut self.info.reserves;
            reserves[index_in] = reserves[index_in].saturating_add(params.token_amount_in.amount);
            reserves[index_out] = reserves[index_out].saturating_sub(params.token_amount_out.amount);
        }
    }

    fn clone_state(&self) -> Box<dyn PoolSimulator> {
        Box::new(self.clone())
    }

    fn get_meta_info(&self, token_in: Address, token_out: Address) -> MetaInfo {
        let token_in_index = self.info.token_index(&token_in);
        MetaInfo {
            block_number: self.info.block_number,
            approval_address: Some(self.info.address),
            token_in_index,
            token_out_index: self.info.token_index(&token_out),
            price_limit: token_in_index.and_then(|i| self.price_limit(i == 0).ok()),
            ..MetaInfo::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::TokenRef;
    use crate::v3_math::Q96;

    fn token0() -> Address {
        Address::repeat_byte(0x01)
    }
    fn token1() -> Address {
        Address::repeat_byte(0x02)
    }

    // two nested positions: [-120, 120] with 1e21 and [-60, 60] with 2e21
    fn snapshot() -> PoolSnapshot {
        let extra = format!(
            r#"{{"liquidity":"3000000000000000000000","sqrtPriceX96":"{}","tick":0,"fee":3000,
                "ticks":[
                    {{"index":-120,"liquidityGross":"1000000000000000000000","liquidityNet":"1000000000000000000000"}},
                    {{"index":-60,"liquidityGross":"2000000000000000000000","liquidityNet":"2000000000000000000000"}},
                    {{"index":0,"liquidityGross":"0","liquidityNet":"0"}},
                    {{"index":60,"liquidityGross":"2000000000000000000000","liquidityNet":"-2000000000000000000000"}},
                    {{"index":120,"liquidityGross":"1000000000000000000000","liquidityNet":"-1000000000000000000000"}}
                ]}}"#,
            Q96
        );
        PoolSnapshot {
            address: Address::repeat_byte(0xcc),
            exchange: "uniswap-v3".to_string(),
            pool_type: "clmm".to_string(),
            tokens: vec![TokenRef::new(token0(), 18, "T0"), TokenRef::new(token1(), 18, "T1")],
            reserves: vec!["100000000000000000000000".to_string(), "100000000000000000000000".to_string()],
            extra,
            static_extra: r#"{"tickSpacing":60}"#.to_string(),
            ..PoolSnapshot::default()
        }
    }

    fn simulator() -> ClmmSimulator {
        ClmmSimulator::new(&snapshot(), &Settings::default()).unwrap()
    }

    fn quote(sim: &ClmmSimulator, token_in: Address, amount: U256, token_out: Address) -> Result<CalcAmountOutResult, SimulatorError> {
        sim.calc_amount_out(CalcAmountOutParams {
            token_amount_in: TokenAmount::new(token_in, amount),
            token_out,
            limit: None,
        })
    }

    fn dec(s: &str) -> U256 {
        U256::from_dec_str(s).unwrap()
    }

    fn clmm_info(result: &SwapInfo) -> &ClmmSwapInfo {
        match result {
            SwapInfo::Clmm(info) => info,
            other => panic!("unexpected swap info {:?}", other),
        }
    }

    #[test]
    fn test_exact_in_within_range() {
        let sim = simulator();
        let result = quote(&sim, token0(), U256::exp10(18), token1()).unwrap();
        assert_eq!(result.token_amount_out.amount, dec("996668773744192346"));
        assert_eq!(result.fee.amount, U256::from(3_000_000_000_000_000u64));
        assert_eq!(result.gas, 125_000);
        assert!(result.remaining_token_amount_in.is_none());
        let info = clmm_info(&result.swap_info);
        assert_eq!(info.next_tick, -7);
        assert_eq!(info.next_sqrt_price_x96, dec("79201841102404638452031725127"));

        let reverse = quote(&sim, token1(), U256::exp10(18), token0()).unwrap();
        assert_eq!(reverse.token_amount_out.amount, dec("996668773744192346"));
        assert_eq!(clmm_info(&reverse.swap_info).next_tick, 6);
    }

    #[test]
    fn test_exact_in_crosses_tick() {
        let sim = simulator();
        let result = quote(&sim, token0(), U256::exp10(19), token1()).unwrap();
        assert_eq!(result.token_amount_out.amount, dec("9936371867692332189"));
        assert_eq!(result.gas, 125_000 + 20_000);
        let info = clmm_info(&result.swap_info);
        assert_eq!(info.crossed_ticks, 1);
        assert_eq!(info.next_tick, -80);
        assert_eq!(info.next_liquidity, U256::exp10(21));
    }

    #[test]
    fn test_liquidity_wall_reports_remaining_amount() {
        let sim = simulator();
        let result = quote(&sim, token0(), U256::exp10(22), token1()).unwrap();
        assert_eq!(result.token_amount_out.amount, dec("11972447672331224474"));
        assert_eq!(
            result.remaining_token_amount_in,
            Some(TokenAmount::new(token0(), dec("9987937369714842511001")))
        );
        let info = clmm_info(&result.swap_info);
        assert_eq!(info.next_sqrt_price_x96, sim.price_limit(true).unwrap());
        assert_eq!(info.next_tick, -120);
    }

    #[test]
    fn test_exact_out() {
        let sim = simulator();
        let result = sim
            .calc_amount_in(CalcAmountInParams {
                token_amount_out: TokenAmount::new(token1(), U256::exp10(18)),
                token_in: token0(),
                limit: None,
            })
            .unwrap();
        assert_eq!(result.token_amount_in.amount, dec("1003343474906212470"));

        let crossing = sim
            .calc_amount_in(CalcAmountInParams {
                token_amount_out: TokenAmount::new(token0(), U256::exp10(19)),
                token_in: token1(),
                limit: None,
            })
            .unwrap();
        assert_eq!(crossing.token_amount_in.amount, dec("10064330318014880725"));
        assert_eq!(clmm_info(&crossing.swap_info).next_tick, 80);

        let too_much = sim.calc_amount_in(CalcAmountInParams {
            token_amount_out: TokenAmount::new(token0(), U256::exp10(24)),
            token_in: token1(),
            limit: None,
        });
        assert_eq!(too_much.unwrap_err(), SimulatorError::InsufficientLiquidity);
    }

    #[test]
    fn test_update_balance_applies_swap_info() {
        let mut sim = simulator();
        let amount_in = TokenAmount::new(token0(), U256::exp10(19));
        let result = quote(&sim, token0(), amount_in.amount, token1()).unwrap();
        let fork = sim.clone_state();
        sim.update_balance(UpdateBalanceParams::from_result(&result, amount_in, None));
        assert_eq!(sim.state().tick, -80);
        assert_eq!(sim.state().liquidity, 10u128.pow(21));
        // the fork keeps pricing from the original state
        let again = quote(&simulator(), token0(), U256::exp10(18), token1()).unwrap();
        let from_fork = fork
            .calc_amount_out(CalcAmountOutParams {
                token_amount_in: TokenAmount::new(token0(), U256::exp10(18)),
                token_out: token1(),
                limit: None,
            })
            .unwrap();
        assert_eq!(again.token_amount_out, from_fork.token_amount_out);
    }

    #[test]
    fn test_empty_ticks_rejected() {
        let mut snap = snapshot();
        snap.extra = format!(r#"{{"liquidity":"0","sqrtPriceX96":"{}","tick":0,"fee":3000,"ticks":[]}}"#, Q96);
        assert_eq!(
            ClmmSimulator::new(&snap, &Settings::default()).unwrap_err(),
            SimulatorError::TicksEmpty
        );
    }

    #[test]
    fn test_meta_info_reports_price_limit() {
        let sim = simulator();
        let meta = sim.get_meta_info(token1(), token0());
        assert_eq!(meta.price_limit, Some(dec("79704936542881920863903188245")));
        assert_eq!(meta.token_in_index, Some(1));
    }
}
