//! # Pool Snapshot Model
//!
//! The immutable, point-in-time view of a pool handed over by the tracker. Every
//! simulator constructor takes a [`PoolSnapshot`] and parses its protocol-specific
//! `extra` / `static_extra` JSON blobs exactly once into typed structs.

use crate::error::SimulatorError;
use crate::types::conversions::parse_u256;
use ethers::types::{Address, U256};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Token reference inside a snapshot. Position in `PoolSnapshot::tokens` is the
/// canonical token index for the simulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRef {
    pub address: Address,
    #[serde(default)]
    pub decimals: u8,
    #[serde(default)]
    pub symbol: String,
    #[serde(default = "default_swappable")]
    pub swappable: bool,
}

fn default_swappable() -> bool {
    true
}

impl TokenRef {
    pub fn new(address: Address, decimals: u8, symbol: &str) -> Self {
        Self {
            address,
            decimals,
            symbol: symbol.to_string(),
            swappable: true,
        }
    }
}

/// On-chain snapshot of one pool.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PoolSnapshot {
    pub address: Address,
    #[serde(default)]
    pub exchange: String,
    #[serde(rename = "type")]
    pub pool_type: String,
    pub tokens: Vec<TokenRef>,
    /// Base-10 integer strings aligned with `tokens`
    pub reserves: Vec<String>,
    /// Swap fee as a fraction (0.0003 = 3 bps) for protocols that publish it that way
    #[serde(default)]
    pub swap_fee: Option<Decimal>,
    #[serde(default)]
    pub extra: String,
    #[serde(default)]
    pub static_extra: String,
    #[serde(default)]
    pub block_number: u64,
    #[serde(default)]
    pub timestamp: i64,
}

impl PoolSnapshot {
    /// Parses `reserves` into `U256`, checking alignment with `tokens`.
    pub fn parse_reserves(&self) -> Result<Vec<U256>, SimulatorError> {
        if self.tokens.len() != self.reserves.len() {
            return Err(SimulatorError::InvalidSnapshot(format!(
                "{} tokens but {} reserves",
                self.tokens.len(),
                self.reserves.len()
            )));
        }
        self.reserves
            .iter()
            .map(|r| parse_u256(r).map_err(SimulatorError::from))
            .collect()
    }

    pub fn parse_extra<T: DeserializeOwned>(&self) -> Result<T, SimulatorError> {
        parse_blob(&self.extra, "extra")
    }

    pub fn parse_static_extra<T: DeserializeOwned>(&self) -> Result<T, SimulatorError> {
        parse_blob(&self.static_extra, "staticExtra")
    }

    pub fn token_addresses(&self) -> Vec<Address> {
        self.tokens.iter().map(|t| t.address).collect()
    }

    pub fn token_index(&self, token: &Address) -> Option<usize> {
        self.tokens.iter().position(|t| &t.address == token)
    }

    /// Rejects snapshots with fewer than `min` or more than `max` tokens.
    pub fn expect_token_count(&self, min: usize, max: usize) -> Result<(), SimulatorError> {
        let n = self.tokens.len();
        if n < min || n > max {
            return Err(SimulatorError::InvalidSnapshot(format!(
                "pool {:?} has {} tokens, expected {}..={}",
                self.address, n, min, max
            )));
        }
        Ok(())
    }
}

fn parse_blob<T: DeserializeOwned>(blob: &str, field: &str) -> Result<T, SimulatorError> {
    // An absent blob behaves like an empty object so that `#[serde(default)]` applies
    let raw = if blob.trim().is_empty() { "{}" } else { blob };
    serde_json::from_str(raw)
        .map_err(|e| SimulatorError::InvalidSnapshot(format!("invalid {}: {}", field, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize, Default)]
    struct Probe {
        #[serde(default)]
        fee: u64,
    }

    fn snapshot() -> PoolSnapshot {
        serde_json::from_str(
            r#"{
                "address": "0x0000000000000000000000000000000000000001",
                "exchange": "uniswap",
                "type": "uniswap-v2",
                "tokens": [
                    {"address": "0x0000000000000000000000000000000000000002", "decimals": 18, "symbol": "A"},
                    {"address": "0x0000000000000000000000000000000000000003", "decimals": 6, "symbol": "B"}
                ],
                "reserves": ["100", "200"],
                "swapFee": 0.0003,
                "extra": "{\"fee\":3}",
                "blockNumber": 10,
                "timestamp": 1700000000
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_snapshot_parsing() {
        let snap = snapshot();
        assert_eq!(snap.parse_reserves().unwrap(), vec![U256::from(100), U256::from(200)]);
        assert_eq!(snap.parse_extra::<Probe>().unwrap().fee, 3);
        // empty static extra falls back to defaults
        assert_eq!(snap.parse_static_extra::<Probe>().unwrap().fee, 0);
        assert_eq!(snap.swap_fee, Some(Decimal::new(3, 4)));
        assert!(snap.tokens[0].swappable);
    }

    #[test]
    fn test_misaligned_reserves_rejected() {
        let mut snap = snapshot();
        snap.reserves.push("1".to_string());
        assert!(matches!(snap.parse_reserves(), Err(SimulatorError::InvalidSnapshot(_))));
    }
}
