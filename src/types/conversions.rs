use ethers::types::{Address, U256};
use rust_decimal::Decimal;
use std::str::FromStr;

// Reservas y montos llegan como strings base-10 desde el tracker
pub fn parse_u256(s: &str) -> Result<U256, ConversionError> {
    let trimmed = s.trim();
    if let Some(hex) = trimmed.strip_prefix("0x") {
        return U256::from_str_radix(hex, 16)
            .map_err(|e| ConversionError::InvalidNumber(format!("{}: {}", trimmed, e)));
    }
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ConversionError::InvalidNumber(trimmed.to_string()));
    }
    // only digits left, so the one remaining failure is a value above 2^256 - 1
    U256::from_dec_str(trimmed).map_err(|_| ConversionError::Overflow)
}

pub fn parse_i128(s: &str) -> Result<i128, ConversionError> {
    let trimmed = s.trim();
    trimmed.parse::<i128>().map_err(|e| match e.kind() {
        std::num::IntErrorKind::PosOverflow | std::num::IntErrorKind::NegOverflow => {
            ConversionError::Overflow
        }
        _ => ConversionError::InvalidNumber(format!("{}: {}", trimmed, e)),
    })
}

// Para precios y cantidades en unidades humanas (RFQ)
pub fn u256_to_decimal(value: U256, decimals: u8) -> Result<Decimal, ConversionError> {
    let mut decimal_value = Decimal::from_str(&value.to_string())
        .map_err(|e| ConversionError::InvalidDecimal(e.to_string()))?;

    // Ajustar por decimales del token
    decimal_value
        .set_scale(decimals as u32)
        .map_err(|e| ConversionError::InvalidDecimal(e.to_string()))?;
    Ok(decimal_value)
}

/// Converts a human-unit decimal back to the token's smallest unit, rounding down.
pub fn decimal_to_u256_floor(value: Decimal, decimals: u8) -> Result<U256, ConversionError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ConversionError::InvalidDecimal(format!("negative amount {}", value)));
    }
    if decimals > 28 {
        return Err(ConversionError::Overflow);
    }
    let multiplier = Decimal::try_from_i128_with_scale(10i128.pow(decimals as u32), 0)
        .map_err(|_| ConversionError::Overflow)?;
    let scaled = value
        .checked_mul(multiplier)
        .ok_or(ConversionError::Overflow)?
        .floor()
        .normalize();
    parse_u256(&scaled.to_string())
}

// Para addresses
pub fn address_to_string(addr: Address) -> String {
    format!("{:?}", addr).to_lowercase()
}

pub fn string_to_address(s: &str) -> Result<Address, ConversionError> {
    Address::from_str(s).map_err(|e| ConversionError::InvalidAddress(e.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    #[error("Invalid decimal: {0}")]
    InvalidDecimal(String),
    #[error("Invalid number: {0}")]
    InvalidNumber(String),
    #[error("Overflow in conversion")]
    Overflow,
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

/// Serde adapter for `U256` fields stored as base-10 strings (JSON numbers are
/// accepted as long as they fit in 64 bits).
pub mod serde_u256 {
    use super::parse_u256;
    use ethers::types::U256;
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        deserializer.deserialize_any(U256Visitor)
    }

    struct U256Visitor;

    impl<'de> Visitor<'de> for U256Visitor {
        type Value = U256;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a base-10 integer string or an unsigned integer")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<U256, E> {
            Ok(U256::from(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<U256, E> {
            u64::try_from(v)
                .map(U256::from)
                .map_err(|_| E::custom(format!("negative amount {}", v)))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<U256, E> {
            parse_u256(v).map_err(E::custom)
        }
    }
}

pub mod serde_u256_vec {
    use ethers::types::U256;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Wrapped(#[serde(with = "super::serde_u256")] U256);

    pub fn serialize<S: Serializer>(values: &[U256], serializer: S) -> Result<S::Ok, S::Error> {
        let wrapped: Vec<Wrapped> = values.iter().copied().map(Wrapped).collect();
        wrapped.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<U256>, D::Error> {
        let wrapped = Vec::<Wrapped>::deserialize(deserializer)?;
        Ok(wrapped.into_iter().map(|w| w.0).collect())
    }
}

/// Serde adapter for signed 128-bit values such as tick liquidity deltas.
pub mod serde_i128 {
    use super::parse_i128;
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(value: &i128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i128, D::Error> {
        struct I128Visitor;

        impl<'de> Visitor<'de> for I128Visitor {
            type Value = i128;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a signed base-10 integer string or an integer")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<i128, E> {
                Ok(v as i128)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<i128, E> {
                Ok(v as i128)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<i128, E> {
                parse_i128(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(I128Visitor)
    }
}
