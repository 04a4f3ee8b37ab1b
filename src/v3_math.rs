// Concentrated-liquidity math (TickMath, SqrtPriceMath, SwapMath), bit-exact with the on-chain libraries
use crate::fixed_point::{div_up, mul_div_down, mul_div_up, MathError};
use ethers::types::U256;

/// Uniswap V3 constants
pub const MIN_TICK: i32 = -887272;
pub const MAX_TICK: i32 = 887272;
pub const MIN_SQRT_RATIO: U256 = U256([4295128739, 0, 0, 0]); // sqrt(1.0001^-887272) * 2^96
pub const MAX_SQRT_RATIO: U256 = U256([6743328256752651558, 17280870778742802505, 4294805859, 0]); // sqrt(1.0001^887272) * 2^96

/// Q96 fixed point constants
pub const Q96: U256 = U256([0, 0, 4294967296, 0]); // 2^96

/// Fee denominator, fees are expressed in pips (1e6 = 100%)
pub const FEE_PIPS_DENOMINATOR: u32 = 1_000_000;

// 2^128 / sqrt(1.0001)^(2^i) for i in 1..20, the Q128 constants used by getSqrtRatioAtTick
const TICK_MULTIPLIERS: [u128; 19] = [
    0xfff97272373d413259a46990580e213a,
    0xfff2e50f5f656932ef12357cf3c7fdcc,
    0xffe5caca7e10e4e61c3624eaa0941cd0,
    0xffcb9843d60f6159c9db58835c926644,
    0xff973b41fa98c081472e6896dfb254c0,
    0xff2ea16466c96a3843ec78b326b52861,
    0xfe5dee046a99a2a811c461f1969c3053,
    0xfcbe86c7900a88aedcffc83b479aa3a4,
    0xf987a7253ac413176f2b074cf7815e54,
    0xf3392b0822b70005940c7a398e4b70f3,
    0xe7159475a2c29b7443b29c7fa6e889d9,
    0xd097f3bdfd2022b8845ad8f792aa5825,
    0xa9f746462d870fdf8a65dc1f90e061e5,
    0x70d869a156d2a1b890bb3df62baf32f7,
    0x31be135f97d08fd981231505542fcfa6,
    0x9aa508b5b7a84e1c677de54f3e99bc9,
    0x5d6af8dedb81196699c329225ee604,
    0x2216e584f5fa1ea926041bedfe98,
    0x48a170391f7dc42444e8fa2,
];
const TICK_MULTIPLIER_ODD: u128 = 0xfffcb933bd6fad37aa2d162d1a594001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum V3MathError {
    #[error("Tick {0} out of bounds")]
    TickOutOfBounds(i32),
    #[error("Sqrt price out of bounds")]
    SqrtPriceOutOfBounds,
    #[error("Zero sqrt price or liquidity")]
    InvalidPriceOrLiquidity,
    #[error("Liquidity overflow")]
    LiquidityOverflow,
    #[error("Liquidity underflow")]
    LiquidityUnderflow,
    #[error(transparent)]
    Math(#[from] MathError),
}

/// Current price state of a concentrated-liquidity pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct V3PoolState {
    pub sqrt_price_x96: U256,
    pub tick: i32,
    pub liquidity: u128,
}

/// Calculate sqrt price from tick (TickMath.getSqrtRatioAtTick equivalent)
pub fn get_sqrt_ratio_at_tick(tick: i32) -> Result<U256, V3MathError> {
    if !(MIN_TICK..=MAX_TICK).contains(&tick) {
        return Err(V3MathError::TickOutOfBounds(tick));
    }
    let abs_tick = tick.unsigned_abs();

    let mut ratio = if abs_tick & 0x1 != 0 {
        U256::from(TICK_MULTIPLIER_ODD)
    } else {
        U256::one() << 128
    };
    for (bit, multiplier) in TICK_MULTIPLIERS.iter().enumerate() {
        if abs_tick & (1u32 << (bit + 1)) != 0 {
            // ratio < 2^129 and multiplier < 2^128, the product fits in 256 bits
            ratio = (ratio * U256::from(*multiplier)) >> 128;
        }
    }

    if tick > 0 {
        ratio = U256::MAX / ratio;
    }

    // back to Q64.96, rounding up so that getTickAtSqrtRatio stays consistent
    let shifted = ratio >> 32;
    let remainder = ratio & U256::from(u32::MAX);
    Ok(if remainder.is_zero() {
        shifted
    } else {
        shifted + U256::one()
    })
}

/// Greatest tick whose sqrt ratio is less than or equal to `sqrt_price_x96`.
/// Binary search over the monotonic tick-to-price mapping.
pub fn get_tick_at_sqrt_ratio(sqrt_price_x96: U256) -> Result<i32, V3MathError> {
    if sqrt_price_x96 < MIN_SQRT_RATIO || sqrt_price_x96 >= MAX_SQRT_RATIO {
        return Err(V3MathError::SqrtPriceOutOfBounds);
    }

    let mut low = MIN_TICK;
    let mut high = MAX_TICK;
    while low < high {
        let mid = low + (high - low + 1) / 2;
        if get_sqrt_ratio_at_tick(mid)? <= sqrt_price_x96 {
            low = mid;
        } else {
            high = mid - 1;
        }
    }
    Ok(low)
}

/// Applies a signed liquidity delta (LiquidityMath.addDelta).
pub fn add_delta(liquidity: u128, delta: i128) -> Result<u128, V3MathError> {
    if delta < 0 {
        liquidity
            .checked_sub(delta.unsigned_abs())
            .ok_or(V3MathError::LiquidityUnderflow)
    } else {
        liquidity
            .checked_add(delta as u128)
            .ok_or(V3MathError::LiquidityOverflow)
    }
}

fn get_next_sqrt_price_from_amount0_rounding_up(
    sqrt_px96: U256,
    liquidity: u128,
    amount: U256,
    add: bool,
) -> Result<U256, V3MathError> {
    if amount.is_zero() {
        return Ok(sqrt_px96);
    }
    let numerator1 = U256::from(liquidity) << 96;

    if add {
        if let Some(product) = amount.checked_mul(sqrt_px96) {
            if let Some(denominator) = numerator1.checked_add(product) {
                return Ok(mul_div_up(numerator1, sqrt_px96, denominator)?);
            }
        }
        // numerator1 / (numerator1 / sqrtP + amount), the overflow-safe form
        let denominator = (numerator1 / sqrt_px96)
            .checked_add(amount)
            .ok_or(MathError::Overflow)?;
        Ok(div_up(numerator1, denominator)?)
    } else {
        let product = amount.checked_mul(sqrt_px96).ok_or(MathError::Overflow)?;
        if numerator1 <= product {
            return Err(V3MathError::InvalidPriceOrLiquidity);
        }
        let denominator = numerator1 - product;
        Ok(mul_div_up(numerator1, sqrt_px96, denominator)?)
    }
}

fn get_next_sqrt_price_from_amount1_rounding_down(
    sqrt_px96: U256,
    liquidity: u128,
    amount: U256,
    add: bool,
) -> Result<U256, V3MathError> {
    let liquidity = U256::from(liquidity);
    if add {
        let quotient = mul_div_down(amount, Q96, liquidity)?;
        let next = sqrt_px96.checked_add(quotient).ok_or(MathError::Overflow)?;
        if next >= MAX_SQRT_RATIO {
            return Err(V3MathError::SqrtPriceOutOfBounds);
        }
        Ok(next)
    } else {
        let quotient = mul_div_up(amount, Q96, liquidity)?;
        if sqrt_px96 <= quotient {
            return Err(V3MathError::InvalidPriceOrLiquidity);
        }
        Ok(sqrt_px96 - quotient)
    }
}

pub fn get_next_sqrt_price_from_input(
    sqrt_px96: U256,
    liquidity: u128,
    amount_in: U256,
    zero_for_one: bool,
) -> Result<U256, V3MathError> {
    if sqrt_px96.is_zero() || liquidity == 0 {
        return Err(V3MathError::InvalidPriceOrLiquidity);
    }
    if zero_for_one {
        get_next_sqrt_price_from_amount0_rounding_up(sqrt_px96, liquidity, amount_in, true)
    } else {
        get_next_sqrt_price_from_amount1_rounding_down(sqrt_px96, liquidity, amount_in, true)
    }
}

pub fn get_next_sqrt_price_from_output(
    sqrt_px96: U256,
    liquidity: u128,
    amount_out: U256,
    zero_for_one: bool,
) -> Result<U256, V3MathError> {
    if sqrt_px96.is_zero() || liquidity == 0 {
        return Err(V3MathError::InvalidPriceOrLiquidity);
    }
    if zero_for_one {
        get_next_sqrt_price_from_amount1_rounding_down(sqrt_px96, liquidity, amount_out, false)
    } else {
        get_next_sqrt_price_from_amount0_rounding_up(sqrt_px96, liquidity, amount_out, false)
    }
}

pub fn get_amount0_delta(
    sqrt_ratio_ax96: U256,
    sqrt_ratio_bx96: U256,
    liquidity: u128,
    round_up: bool,
) -> Result<U256, V3MathError> {
    let (sqrt_ratio_ax96, sqrt_ratio_bx96) = if sqrt_ratio_ax96 > sqrt_ratio_bx96 {
        (sqrt_ratio_bx96, sqrt_ratio_ax96)
    } else {
        (sqrt_ratio_ax96, sqrt_ratio_bx96)
    };
    if sqrt_ratio_ax96.is_zero() {
        return Err(V3MathError::InvalidPriceOrLiquidity);
    }

    let numerator1 = U256::from(liquidity) << 96;
    let numerator2 = sqrt_ratio_bx96 - sqrt_ratio_ax96;

    if round_up {
        let inner = mul_div_up(numerator1, numerator2, sqrt_ratio_bx96)?;
        Ok(div_up(inner, sqrt_ratio_ax96)?)
    } else {
        Ok(mul_div_down(numerator1, numerator2, sqrt_ratio_bx96)? / sqrt_ratio_ax96)
    }
}

pub fn get_amount1_delta(
    sqrt_ratio_ax96: U256,
    sqrt_ratio_bx96: U256,
    liquidity: u128,
    round_up: bool,
) -> Result<U256, V3MathError> {
    let (sqrt_ratio_ax96, sqrt_ratio_bx96) = if sqrt_ratio_ax96 > sqrt_ratio_bx96 {
        (sqrt_ratio_bx96, sqrt_ratio_ax96)
    } else {
        (sqrt_ratio_ax96, sqrt_ratio_bx96)
    };
    let diff = sqrt_ratio_bx96 - sqrt_ratio_ax96;

    if round_up {
        Ok(mul_div_up(U256::from(liquidity), diff, Q96)?)
    } else {
        Ok(mul_div_down(U256::from(liquidity), diff, Q96)?)
    }
}

/// Result of one swap step inside a single initialized-tick range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapStep {
    pub sqrt_ratio_next_x96: U256,
    pub amount_in: U256,
    pub amount_out: U256,
    pub fee_amount: U256,
}

/// SwapMath.computeSwapStep. `amount_remaining` is an input amount when
/// `exact_in`, an output amount otherwise.
pub fn compute_swap_step(
    sqrt_ratio_current_x96: U256,
    sqrt_ratio_target_x96: U256,
    liquidity: u128,
    amount_remaining: U256,
    exact_in: bool,
    fee_pips: u32,
) -> Result<SwapStep, V3MathError> {
    let zero_for_one = sqrt_ratio_current_x96 >= sqrt_ratio_target_x96;
    let fee = U256::from(fee_pips);
    let fee_complement = U256::from(FEE_PIPS_DENOMINATOR - fee_pips.min(FEE_PIPS_DENOMINATOR));

    let mut amount_in = U256::zero();
    let mut amount_out = U256::zero();

    let sqrt_ratio_next_x96 = if exact_in {
        let amount_remaining_less_fee =
            mul_div_down(amount_remaining, fee_complement, U256::from(FEE_PIPS_DENOMINATOR))?;
        amount_in = if zero_for_one {
            get_amount0_delta(sqrt_ratio_target_x96, sqrt_ratio_current_x96, liquidity, true)?
        } else {
            get_amount1_delta(sqrt_ratio_current_x96, sqrt_ratio_target_x96, liquidity, true)?
        };
        if amount_remaining_less_fee >= amount_in {
            sqrt_ratio_target_x96
        } else {
            get_next_sqrt_price_from_input(
                sqrt_ratio_current_x96,
                liquidity,
                amount_remaining_less_fee,
                zero_for_one,
            )?
        }
    } else {
        amount_out = if zero_for_one {
            get_amount1_delta(sqrt_ratio_target_x96, sqrt_ratio_current_x96, liquidity, false)?
        } else {
            get_amount0_delta(sqrt_ratio_current_x96, sqrt_ratio_target_x96, liquidity, false)?
        };
        if amount_remaining >= amount_out {
            sqrt_ratio_target_x96
        } else {
            get_next_sqrt_price_from_output(
                sqrt_ratio_current_x96,
                liquidity,
                amount_remaining,
                zero_for_one,
            )?
        }
    };

    let max = sqrt_ratio_target_x96 == sqrt_ratio_next_x96;

    if zero_for_one {
        if !(max && exact_in) {
            amount_in =
                get_amount0_delta(sqrt_ratio_next_x96, sqrt_ratio_current_x96, liquidity, true)?;
        }
        if !(max && !exact_in) {
            amount_out =
                get_amount1_delta(sqrt_ratio_next_x96, sqrt_ratio_current_x96, liquidity, false)?;
        }
    } else {
        if !(max && exact_in) {
            amount_in =
                get_amount1_delta(sqrt_ratio_current_x96, sqrt_ratio_next_x96, liquidity, true)?;
        }
        if !(max && !exact_in) {
            amount_out =
                get_amount0_delta(sqrt_ratio_current_x96, sqrt_ratio_next_x96, liquidity, false)?;
        }
    }

    // cap the output amount to not exceed the remaining output amount
    if !exact_in && amount_out > amount_remaining {
        amount_out = amount_remaining;
    }

    let fee_amount = if exact_in && sqrt_ratio_next_x96 != sqrt_ratio_target_x96 {
        // the remainder of the input becomes fee
        amount_remaining.saturating_sub(amount_in)
    } else if fee_complement.is_zero() {
        return Err(V3MathError::Math(MathError::DivisionByZero));
    } else {
        mul_div_up(amount_in, fee, fee_complement)?
    };

    Ok(SwapStep {
        sqrt_ratio_next_x96,
        amount_in,
        amount_out,
        fee_amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqrt_ratio_bounds() {
        assert_eq!(get_sqrt_ratio_at_tick(MIN_TICK).unwrap(), MIN_SQRT_RATIO);
        assert_eq!(get_sqrt_ratio_at_tick(MAX_TICK).unwrap(), MAX_SQRT_RATIO);
        assert_eq!(get_sqrt_ratio_at_tick(0).unwrap(), Q96);
        assert_eq!(
            get_sqrt_ratio_at_tick(MAX_TICK + 1),
            Err(V3MathError::TickOutOfBounds(MAX_TICK + 1))
        );
    }

    #[test]
    fn test_tick_sqrt_conversion() {
        for tick in [-200_000, -60, -1, 0, 1, 60, 12_345, 200_000] {
            let sqrt_ratio = get_sqrt_ratio_at_tick(tick).unwrap();
            assert_eq!(get_tick_at_sqrt_ratio(sqrt_ratio).unwrap(), tick);
            // one wei below the boundary belongs to the previous tick
            assert_eq!(get_tick_at_sqrt_ratio(sqrt_ratio - 1).unwrap(), tick - 1);
        }
        assert_eq!(get_tick_at_sqrt_ratio(MIN_SQRT_RATIO).unwrap(), MIN_TICK);
        assert!(get_tick_at_sqrt_ratio(MAX_SQRT_RATIO).is_err());
    }

    #[test]
    fn test_add_delta() {
        assert_eq!(add_delta(10, -3).unwrap(), 7);
        assert_eq!(add_delta(10, 5).unwrap(), 15);
        assert_eq!(add_delta(1, -2), Err(V3MathError::LiquidityUnderflow));
        assert_eq!(add_delta(u128::MAX, 1), Err(V3MathError::LiquidityOverflow));
    }

    #[test]
    fn test_amount_deltas_round_in_favor_of_pool() {
        let a = get_sqrt_ratio_at_tick(-60).unwrap();
        let b = get_sqrt_ratio_at_tick(60).unwrap();
        let liquidity = 1_000_000_000_000_000_000u128;
        let up = get_amount0_delta(a, b, liquidity, true).unwrap();
        let down = get_amount0_delta(a, b, liquidity, false).unwrap();
        assert!(up == down || up == down + 1);
        let up1 = get_amount1_delta(a, b, liquidity, true).unwrap();
        let down1 = get_amount1_delta(a, b, liquidity, false).unwrap();
        assert!(up1 == down1 || up1 == down1 + 1);
    }

    #[test]
    fn test_compute_swap_step_exact_in_capped_by_target() {
        // price 1, target one tick-spacing away, plenty of input
        let current = Q96;
        let target = get_sqrt_ratio_at_tick(-60).unwrap();
        let liquidity = 1_000_000_000_000_000_000u128;
        let amount = U256::exp10(24);
        let step = compute_swap_step(current, target, liquidity, amount, true, 3000).unwrap();
        assert_eq!(step.sqrt_ratio_next_x96, target);
        assert!(step.amount_in + step.fee_amount <= amount);
        assert!(step.amount_out < step.amount_in);
    }

    #[test]
    fn test_compute_swap_step_exact_in_consumes_everything_within_range() {
        let current = Q96;
        let target = get_sqrt_ratio_at_tick(-6000).unwrap();
        let liquidity = 1_000_000_000_000_000_000u128;
        let amount = U256::exp10(15);
        let step = compute_swap_step(current, target, liquidity, amount, true, 3000).unwrap();
        assert!(step.sqrt_ratio_next_x96 > target);
        assert_eq!(step.amount_in + step.fee_amount, amount);
    }

    #[test]
    fn test_compute_swap_step_exact_out() {
        let current = Q96;
        let target = get_sqrt_ratio_at_tick(6000).unwrap();
        let liquidity = 1_000_000_000_000_000_000u128;
        let amount_out = U256::exp10(15);
        let step = compute_swap_step(current, target, liquidity, amount_out, false, 500).unwrap();
        assert_eq!(step.amount_out, amount_out);
        assert!(step.amount_in > amount_out);
        assert!(!step.fee_amount.is_zero());
    }
}
