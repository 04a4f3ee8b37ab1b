//! # Swap Limit / Inventory
//!
//! Request-scoped ledger shared by every simulator that draws from the same
//! counterparty balance (PMM market makers, limit-order makers). Keys are either a
//! token address (see [`token_key`]) or a `"maker:asset"` composite (see
//! [`maker_asset_key`]).
//!
//! The ledger serializes access internally, so callers pass a plain shared
//! reference into concurrently priced simulators.

use crate::metrics;
use crate::pool_simulator::PoolSimulator;
use crate::types::conversions::address_to_string;
use ethers::types::{Address, U256};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InventoryError {
    #[error("Token not available in inventory: {0}")]
    TokenNotAvailable(String),
    #[error("Not enough inventory for {key}: requested {requested}, available {available}")]
    NotEnoughInventory {
        key: String,
        requested: U256,
        available: U256,
    },
}

/// Counterparty balance ledger consumed by simulators.
pub trait SwapLimit: Send + Sync + std::fmt::Debug {
    /// Remaining balance for `key`, zero when the key is unknown.
    fn get_limit(&self, key: &str) -> U256;

    /// Moves `decrease_delta` out of `decrease_key` and `increase_delta` into
    /// `increase_key`. Returns the two new balances. On error nothing changes.
    fn update_limit(
        &self,
        decrease_key: &str,
        increase_key: &str,
        decrease_delta: U256,
        increase_delta: U256,
    ) -> Result<(U256, U256), InventoryError>;
}

pub fn token_key(token: Address) -> String {
    address_to_string(token)
}

pub fn maker_asset_key(maker: Address, asset: Address) -> String {
    format!("{}:{}", address_to_string(maker), address_to_string(asset))
}

/// Mutex-guarded inventory. Create one per routing request.
#[derive(Debug, Default)]
pub struct Inventory {
    balances: Mutex<HashMap<String, U256>>,
}

impl Inventory {
    pub fn new(balances: HashMap<String, U256>) -> Self {
        Self {
            balances: Mutex::new(balances),
        }
    }

    /// Seeds an inventory from the pools' own view of their counterparties.
    /// When several pools report the same key the larger balance wins.
    pub fn from_pools<'a, I>(pools: I) -> Self
    where
        I: IntoIterator<Item = &'a dyn PoolSimulator>,
    {
        let mut balances: HashMap<String, U256> = HashMap::new();
        for pool in pools {
            if let Some(limits) = pool.calculate_limit() {
                for (key, balance) in limits {
                    let entry = balances.entry(key).or_insert(balance);
                    if *entry < balance {
                        *entry = balance;
                    }
                }
            }
        }
        Self::new(balances)
    }

    pub fn snapshot(&self) -> HashMap<String, U256> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, U256>> {
        // The map is only mutated after every check passed, so a poisoned lock still
        // holds a consistent ledger.
        self.balances.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SwapLimit for Inventory {
    fn get_limit(&self, key: &str) -> U256 {
        self.lock().get(key).copied().unwrap_or_default()
    }

    fn update_limit(
        &self,
        decrease_key: &str,
        increase_key: &str,
        decrease_delta: U256,
        increase_delta: U256,
    ) -> Result<(U256, U256), InventoryError> {
        let mut balances = self.lock();

        let available = *balances
            .get(decrease_key)
            .ok_or_else(|| InventoryError::TokenNotAvailable(decrease_key.to_string()))?;
        let increase_balance = *balances
            .get(increase_key)
            .ok_or_else(|| InventoryError::TokenNotAvailable(increase_key.to_string()))?;

        if decrease_delta > available {
            metrics::increment_inventory_rejection();
            return Err(InventoryError::NotEnoughInventory {
                key: decrease_key.to_string(),
                requested: decrease_delta,
                available,
            });
        }

        let new_decrease = available - decrease_delta;
        let new_increase = increase_balance.saturating_add(increase_delta);
        balances.insert(decrease_key.to_string(), new_decrease);
        if increase_key == decrease_key {
            // same key on both sides nets out within one entry
            let netted = new_decrease.saturating_add(increase_delta);
            balances.insert(increase_key.to_string(), netted);
            return Ok((netted, netted));
        }
        balances.insert(increase_key.to_string(), new_increase);

        Ok((new_decrease, new_increase))
    }
}
