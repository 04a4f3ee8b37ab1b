//! # Pool Simulator Trait
//!
//! This module defines the contract shared by every protocol family. A simulator is
//! built once from a [`PoolSnapshot`](crate::entity::PoolSnapshot) and then:
//!
//! - prices swaps with [`PoolSimulator::calc_amount_out`] (and, where the protocol
//!   supports it, [`PoolSimulator::calc_amount_in`]) without touching its own state,
//! - applies a previously priced swap with [`PoolSimulator::update_balance`], fed by
//!   the [`SwapInfo`] that the pricing call returned,
//! - forks with [`PoolSimulator::clone_state`] when a caller wants to explore a
//!   route without mutating the shared instance.
//!
//! Pricing calls may run concurrently against one instance; `update_balance` needs
//! exclusive access, which `&mut self` enforces.
//!
//! ## Call boundary
//!
//! Routers should go through [`calc_amount_out`] rather than calling the trait
//! method directly: it converts a panic inside one malformed pool into
//! [`SimulatorError::CalcAmountOutPanic`] and records metrics.

use crate::entity::PoolSnapshot;
use crate::error::SimulatorError;
use crate::metrics;
use crate::swap_info::SwapInfo;
use crate::swap_limit::SwapLimit;
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAmount {
    pub token: Address,
    pub amount: U256,
}

impl TokenAmount {
    pub fn new(token: Address, amount: U256) -> Self {
        Self { token, amount }
    }
}

/// Identity and balances common to every simulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolInfo {
    pub address: Address,
    pub exchange: String,
    pub pool_type: String,
    pub tokens: Vec<Address>,
    pub reserves: Vec<U256>,
    pub block_number: u64,
}

impl PoolInfo {
    pub fn from_snapshot(snapshot: &PoolSnapshot) -> Result<Self, SimulatorError> {
        Ok(Self {
            address: snapshot.address,
            exchange: snapshot.exchange.clone(),
            pool_type: snapshot.pool_type.clone(),
            tokens: snapshot.token_addresses(),
            reserves: snapshot.parse_reserves()?,
            block_number: snapshot.block_number,
        })
    }

    pub fn token_index(&self, token: &Address) -> Option<usize> {
        self.tokens.iter().position(|t| t == token)
    }

    /// Resolves `(index_a, index_b)` for a pair of distinct pool tokens.
    pub fn resolve_pair(&self, a: &Address, b: &Address) -> Result<(usize, usize), SimulatorError> {
        if a == b {
            return Err(SimulatorError::InvalidToken);
        }
        match (self.token_index(a), self.token_index(b)) {
            (Some(i), Some(j)) => Ok((i, j)),
            _ => Err(SimulatorError::InvalidToken),
        }
    }
}

pub struct CalcAmountOutParams<'a> {
    pub token_amount_in: TokenAmount,
    pub token_out: Address,
    pub limit: Option<&'a dyn SwapLimit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalcAmountOutResult {
    pub token_amount_out: TokenAmount,
    pub fee: TokenAmount,
    pub gas: u64,
    /// Unfilled input when the pool hits its liquidity wall (partial fill, not an error)
    pub remaining_token_amount_in: Option<TokenAmount>,
    pub swap_info: SwapInfo,
}

pub struct CalcAmountInParams<'a> {
    pub token_amount_out: TokenAmount,
    pub token_in: Address,
    pub limit: Option<&'a dyn SwapLimit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalcAmountInResult {
    pub token_amount_in: TokenAmount,
    pub fee: TokenAmount,
    pub gas: u64,
    pub remaining_token_amount_out: Option<TokenAmount>,
    pub swap_info: SwapInfo,
}

pub struct UpdateBalanceParams<'a> {
    pub token_amount_in: TokenAmount,
    pub token_amount_out: TokenAmount,
    pub fee: TokenAmount,
    pub swap_info: &'a SwapInfo,
    pub swap_limit: Option<&'a dyn SwapLimit>,
}

impl<'a> UpdateBalanceParams<'a> {
    /// Builds update params straight from a pricing result.
    pub fn from_result(result: &'a CalcAmountOutResult, token_amount_in: TokenAmount, swap_limit: Option<&'a dyn SwapLimit>) -> Self {
        Self {
            token_amount_in,
            token_amount_out: result.token_amount_out,
            fee: result.fee,
            swap_info: &result.swap_info,
            swap_limit,
        }
    }
}

/// Execution-layer metadata. Not used for pricing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaInfo {
    pub block_number: u64,
    pub approval_address: Option<Address>,
    pub token_in_index: Option<usize>,
    pub token_out_index: Option<usize>,
    pub price_limit: Option<U256>,
    pub timestamp: Option<i64>,
}

pub trait PoolSimulator: Send + Sync + std::fmt::Debug {
    fn info(&self) -> &PoolInfo;

    /// Prices an exact-input swap. Must not mutate state.
    fn calc_amount_out(&self, params: CalcAmountOutParams<'_>) -> Result<CalcAmountOutResult, SimulatorError>;

    /// Prices an exact-output swap. Only some families support it.
    fn calc_amount_in(&self, _params: CalcAmountInParams<'_>) -> Result<CalcAmountInResult, SimulatorError> {
        Err(SimulatorError::CalcAmountInUnsupported)
    }

    /// Applies a swap previously priced on this instance. Applying the same swap
    /// twice double-counts it.
    fn update_balance(&mut self, params: UpdateBalanceParams<'_>);

    /// Deep copy whose state never aliases the original.
    fn clone_state(&self) -> Box<dyn PoolSimulator>;

    fn get_meta_info(&self, token_in: Address, token_out: Address) -> MetaInfo;

    /// Counterparty balances this pool draws from, used to seed a request's inventory.
    fn calculate_limit(&self) -> Option<HashMap<String, U256>> {
        None
    }

    fn address(&self) -> Address {
        self.info().address
    }

    fn pool_type(&self) -> &str {
        &self.info().pool_type
    }

    fn tokens(&self) -> &[Address] {
        &self.info().tokens
    }

    fn reserves(&self) -> &[U256] {
        &self.info().reserves
    }

    fn token_index(&self, token: &Address) -> Option<usize> {
        self.info().token_index(token)
    }
}

impl Clone for Box<dyn PoolSimulator> {
    fn clone(&self) -> Self {
        self.clone_state()
    }
}

/// Common exact-input validation: distinct known tokens and a positive amount.
pub fn validate_amount_out_params(
    info: &PoolInfo,
    params: &CalcAmountOutParams<'_>,
) -> Result<(usize, usize), SimulatorError> {
    let indexes = info.resolve_pair(&params.token_amount_in.token, &params.token_out)?;
    if params.token_amount_in.amount.is_zero() {
        return Err(SimulatorError::InvalidAmountIn);
    }
    Ok(indexes)
}

/// Common exact-output validation. Returns `(index_in, index_out)`.
pub fn validate_amount_in_params(
    info: &PoolInfo,
    params: &CalcAmountInParams<'_>,
) -> Result<(usize, usize), SimulatorError> {
    let indexes = info.resolve_pair(&params.token_in, &params.token_amount_out.token)?;
    if params.token_amount_out.amount.is_zero() {
        return Err(SimulatorError::InvalidAmountOut);
    }
    Ok(indexes)
}

/// Panic-containing pricing boundary used by routers.
pub fn calc_amount_out(
    pool: &dyn PoolSimulator,
    params: CalcAmountOutParams<'_>,
) -> Result<CalcAmountOutResult, SimulatorError> {
    let started = Instant::now();
    let result = match panic::catch_unwind(AssertUnwindSafe(|| pool.calc_amount_out(params))) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(
                "CalcAmountOut panicked for pool {:?} ({}): {}",
                pool.address(),
                pool.pool_type(),
                message
            );
            metrics::increment_calc_amount_out_panic(pool.pool_type());
            Err(SimulatorError::CalcAmountOutPanic(message))
        }
    };

    let outcome = match &result {
        Ok(_) => "ok",
        Err(e) => e.label(),
    };
    metrics::record_calc_amount_out(pool.pool_type(), outcome, started.elapsed());
    result
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct ExplodingPool {
        info: PoolInfo,
    }

    impl PoolSimulator for ExplodingPool {
        fn info(&self) -> &PoolInfo {
            &self.info
        }

        fn calc_amount_out(&self, params: CalcAmountOutParams<'_>) -> Result<CalcAmountOutResult, SimulatorError> {
            // malformed snapshot data surfacing as an out-of-bounds index
            let idx = params.token_amount_in.amount.as_usize();
            let _ = self.info.reserves[idx];
            Err(SimulatorError::InsufficientLiquidity)
        }

        fn update_balance(&mut self, _params: UpdateBalanceParams<'_>) {}

        fn clone_state(&self) -> Box<dyn PoolSimulator> {
            Box::new(self.clone())
        }

        fn get_meta_info(&self, _token_in: Address, _token_out: Address) -> MetaInfo {
            MetaInfo::default()
        }
    }

    fn pool() -> ExplodingPool {
        ExplodingPool {
            info: PoolInfo {
                address: Address::repeat_byte(1),
                exchange: "test".to_string(),
                pool_type: "exploding".to_string(),
                tokens: vec![Address::repeat_byte(2), Address::repeat_byte(3)],
                reserves: vec![U256::one(), U256::one()],
                block_number: 1,
            },
        }
    }

    #[test]
    fn test_panic_is_contained_at_call_boundary() {
        let pool = pool();
        let result = calc_amount_out(
            &pool,
            CalcAmountOutParams {
                token_amount_in: TokenAmount::new(Address::repeat_byte(2), U256::from(10)),
                token_out: Address::repeat_byte(3),
                limit: None,
            },
        );
        match result {
            Err(SimulatorError::CalcAmountOutPanic(msg)) => {
                assert!(msg.contains("index out of bounds"), "unexpected message: {}", msg)
            }
            other => panic!("expected CalcAmountOutPanic, got {:?}", other),
        }
    }

    #[test]
    fn test_regular_errors_pass_through() {
        let pool = pool();
        let result = calc_amount_out(
            &pool,
            CalcAmountOutParams {
                token_amount_in: TokenAmount::new(Address::repeat_byte(2), U256::one()),
                token_out: Address::repeat_byte(3),
                limit: None,
            },
        );
        assert_eq!(result.unwrap_err(), SimulatorError::InsufficientLiquidity);
    }

    #[test]
    fn test_resolve_pair() {
        let info = pool().info;
        assert_eq!(info.resolve_pair(&Address::repeat_byte(3), &Address::repeat_byte(2)).unwrap(), (1, 0));
        assert_eq!(
            info.resolve_pair(&Address::repeat_byte(2), &Address::repeat_byte(2)),
            Err(SimulatorError::InvalidToken)
        );
        assert_eq!(
            info.resolve_pair(&Address::repeat_byte(2), &Address::repeat_byte(9)),
            Err(SimulatorError::InvalidToken)
        );
    }
}
