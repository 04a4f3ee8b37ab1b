// Fixed-width integer helpers shared by every simulator.
use ethers::types::{U256, U512};

/// Rounding direction for [`mul_div`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    Down,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MathError {
    #[error("Overflow in 256-bit arithmetic")]
    Overflow,
    #[error("Underflow in 256-bit arithmetic")]
    Underflow,
    #[error("Division by zero")]
    DivisionByZero,
}

/// Computes `a * b / denominator` with a 512-bit intermediate product.
///
/// The product never truncates; only a quotient that does not fit in 256 bits
/// is reported as [`MathError::Overflow`].
pub fn mul_div(a: U256, b: U256, denominator: U256, rounding: Rounding) -> Result<U256, MathError> {
    if denominator.is_zero() {
        return Err(MathError::DivisionByZero);
    }

    let product: U512 = a.full_mul(b);
    let (quotient, remainder) = product.div_mod(U512::from(denominator));
    let quotient = if rounding == Rounding::Up && !remainder.is_zero() {
        quotient + U512::one()
    } else {
        quotient
    };

    U256::try_from(quotient).map_err(|_| MathError::Overflow)
}

pub fn mul_div_down(a: U256, b: U256, denominator: U256) -> Result<U256, MathError> {
    mul_div(a, b, denominator, Rounding::Down)
}

pub fn mul_div_up(a: U256, b: U256, denominator: U256) -> Result<U256, MathError> {
    mul_div(a, b, denominator, Rounding::Up)
}

pub fn checked_add(a: U256, b: U256) -> Result<U256, MathError> {
    a.checked_add(b).ok_or(MathError::Overflow)
}

/// Subtraction where a negative result is a genuine error, never a wraparound.
pub fn checked_sub(a: U256, b: U256) -> Result<U256, MathError> {
    a.checked_sub(b).ok_or(MathError::Underflow)
}

pub fn checked_mul(a: U256, b: U256) -> Result<U256, MathError> {
    a.checked_mul(b).ok_or(MathError::Overflow)
}

pub fn checked_div(a: U256, b: U256) -> Result<U256, MathError> {
    a.checked_div(b).ok_or(MathError::DivisionByZero)
}

/// Ceiling division.
pub fn div_up(a: U256, b: U256) -> Result<U256, MathError> {
    if b.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let (quotient, remainder) = a.div_mod(b);
    if remainder.is_zero() {
        Ok(quotient)
    } else {
        checked_add(quotient, U256::one())
    }
}

pub fn pow10(exp: u32) -> Result<U256, MathError> {
    U256::from(10u8)
        .checked_pow(U256::from(exp))
        .ok_or(MathError::Overflow)
}

pub fn abs_diff(a: U256, b: U256) -> U256 {
    if a > b {
        a - b
    } else {
        b - a
    }
}

/// True when `|a - b| <= delta`.
pub fn within_delta(a: U256, b: U256, delta: u64) -> bool {
    abs_diff(a, b) <= U256::from(delta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mul_div_rounding() {
        let a = U256::from(10);
        let b = U256::from(10);
        let d = U256::from(3);
        assert_eq!(mul_div_down(a, b, d).unwrap(), U256::from(33));
        assert_eq!(mul_div_up(a, b, d).unwrap(), U256::from(34));
        // exact division never rounds up
        assert_eq!(mul_div_up(a, b, U256::from(4)).unwrap(), U256::from(25));
    }

    #[test]
    fn test_mul_div_uses_full_width_product() {
        // MAX * MAX / MAX would overflow a naive 256-bit multiplication
        let max = U256::MAX;
        assert_eq!(mul_div_down(max, max, max).unwrap(), max);
        assert_eq!(mul_div_down(max, U256::from(2), U256::from(4)).unwrap(), max / 2);
    }

    #[test]
    fn test_mul_div_errors() {
        assert_eq!(
            mul_div_down(U256::one(), U256::one(), U256::zero()),
            Err(MathError::DivisionByZero)
        );
        assert_eq!(
            mul_div_down(U256::MAX, U256::from(2), U256::one()),
            Err(MathError::Overflow)
        );
    }

    #[test]
    fn test_checked_ops() {
        assert_eq!(checked_sub(U256::from(1), U256::from(2)), Err(MathError::Underflow));
        assert_eq!(checked_add(U256::MAX, U256::one()), Err(MathError::Overflow));
        assert_eq!(div_up(U256::from(7), U256::from(2)).unwrap(), U256::from(4));
        assert_eq!(pow10(18).unwrap(), U256::exp10(18));
        assert_eq!(pow10(78), Err(MathError::Overflow));
        assert!(within_delta(U256::from(10), U256::from(11), 1));
        assert!(!within_delta(U256::from(10), U256::from(12), 1));
    }
}
