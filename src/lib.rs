//! # MIG Pool Simulator
//!
//! Deterministic off-chain swap simulation for the liquidity sources a DEX
//! aggregator routes through. Every pool is rebuilt from an immutable
//! [`PoolSnapshot`] into a [`PoolSimulator`] that prices swaps bit-exactly against
//! the on-chain contract and can apply a priced swap to its own state.
//!
//! ## Overview
//!
//! - **Pricing**: `calc_amount_out` / `calc_amount_in` never mutate, so one instance
//!   can be priced from many threads at once
//! - **State updates**: `update_balance` applies the `SwapInfo` returned by pricing
//! - **Shared inventory**: RFQ and limit-order pools draw from a per-request
//!   [`SwapLimit`] ledger so one maker's balance is never promised twice
//! - **Failure containment**: [`pool_simulator::calc_amount_out`] turns a panic in one
//!   pool into an error instead of taking the router down
//!
//! ## Architecture
//!
//! ### Numeric Substrate
//! 256-bit integers with 512-bit intermediates (`fixed_point`) and exact
//! concentrated-liquidity math (`v3_math`).
//!
//! ### Protocol Families
//! One module per family under [`adapters`], each parsing its `extra` /
//! `staticExtra` blobs once at construction.
//!
//! ### Wiring
//! A write-once factory [`registry`] maps pool type strings to constructors; the
//! [`cache`] keeps built simulators and the [`tracker`] keeps them fresh.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mig_pool_simulator::{registry, CalcAmountOutParams, PoolSnapshot, TokenAmount};
//!
//! # fn main() -> anyhow::Result<()> {
//! let snapshot: PoolSnapshot = serde_json::from_str(&std::fs::read_to_string("pool.json")?)?;
//! let simulator = registry::global()?.build(&snapshot)?;
//! let quote = mig_pool_simulator::pool_simulator::calc_amount_out(
//!     simulator.as_ref(),
//!     CalcAmountOutParams {
//!         token_amount_in: TokenAmount::new(snapshot.tokens[0].address, 1_000_000u64.into()),
//!         token_out: snapshot.tokens[1].address,
//!         limit: None,
//!     },
//! )?;
//! println!("{}", quote.token_amount_out.amount);
//! # Ok(())
//! # }
//! ```

// Core Types
/// 256-bit fixed-point arithmetic
pub mod fixed_point;
/// Common types and data structures
pub mod types;
/// Pool snapshots as handed over by trackers
pub mod entity;
/// Error taxonomy shared by all simulators
pub mod error;

// Simulation
/// Shared counterparty inventory
pub mod swap_limit;
/// Per-family swap deltas
pub mod swap_info;
/// The simulator contract and the panic-containing call boundary
pub mod pool_simulator;
/// Uniswap V3 math utilities
pub mod v3_math;
/// Protocol-family simulators
pub mod adapters;

// Wiring
/// Pool type to constructor registry
pub mod registry;
/// Shared simulator cache
pub mod cache;
/// Snapshot source traits and polling
pub mod tracker;

// Settings & Observability
/// Configuration management
pub mod settings;
/// Metrics and observability
pub mod metrics;

// Re-exports for convenience
pub use entity::{PoolSnapshot, TokenRef};
pub use error::{ErrorKind, SimulatorError};
pub use pool_simulator::{
    CalcAmountInParams, CalcAmountInResult, CalcAmountOutParams, CalcAmountOutResult, MetaInfo,
    PoolSimulator, TokenAmount, UpdateBalanceParams,
};
pub use registry::PoolFactory;
pub use settings::Settings;
pub use swap_info::SwapInfo;
pub use swap_limit::{Inventory, SwapLimit};
