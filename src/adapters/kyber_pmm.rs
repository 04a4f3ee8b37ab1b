//! # RFQ price levels (kyber-pmm)
//!
//! A market maker quotes discrete `(price, amount)` levels per direction in human
//! units, amounts denominated in the input token. The maker's balances live in the
//! request's [`SwapLimit`](crate::swap_limit::SwapLimit) under plain token keys, and
//! several pools may draw from the same maker. Before walking the levels, the
//! output inventory other pools already committed is taken off the front of the
//! book so one maker's liquidity is never counted twice.

use ethers::types::{Address, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::entity::PoolSnapshot;
use crate::error::SimulatorError;
use crate::pool_simulator::{
    validate_amount_out_params, CalcAmountOutParams, CalcAmountOutResult, MetaInfo, PoolInfo,
    PoolSimulator, TokenAmount, UpdateBalanceParams,
};
use crate::settings::Settings;
use crate::swap_info::SwapInfo;
use crate::swap_limit::{token_key, InventoryError, SwapLimit};
use crate::types::conversions::{decimal_to_u256_floor, serde_u256, u256_to_decimal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PmmExtra {
    #[serde(default)]
    base_to_quote_price_levels: Vec<PriceLevel>,
    #[serde(default)]
    quote_to_base_price_levels: Vec<PriceLevel>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PmmStaticExtra {
    base_token_address: Address,
    quote_token_address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PmmSwapInfo {
    pub taker_asset: Address,
    #[serde(with = "serde_u256")]
    pub taking_amount: U256,
    pub maker_asset: Address,
    #[serde(with = "serde_u256")]
    pub making_amount: U256,
}

/// Output a walk over `levels` yields for `amount_in`, or `None` when the levels
/// cannot absorb the whole input.
fn levels_amount_out(levels: &[PriceLevel], amount_in: Decimal) -> Result<Option<Decimal>, SimulatorError> {
    let overflow = || SimulatorError::Overflow;
    let mut left = amount_in;
    let mut amount_out = Decimal::ZERO;
    for level in levels {
        if left.is_zero() {
            break;
        }
        let taken = level.amount.min(left);
        amount_out = amount_out
            .checked_add(taken.checked_mul(level.price).ok_or_else(overflow)?)
            .ok_or_else(overflow)?;
        left -= taken;
    }
    Ok(left.is_zero().then_some(amount_out))
}

/// Removes `amount_in` (input units) from the front of `levels`.
fn consume_by_amount_in(levels: &[PriceLevel], amount_in: Decimal) -> Vec<PriceLevel> {
    let mut left = amount_in;
    let mut remaining = Vec::with_capacity(levels.len());
    for level in levels {
        if left >= level.amount {
            left -= level.amount;
            continue;
        }
        remaining.push(PriceLevel {
            price: level.price,
            amount: level.amount - left,
        });
        left = Decimal::ZERO;
    }
    remaining
}

/// Removes levels worth `amount_out` (output units) from the front of `levels`.
fn consume_by_amount_out(levels: &[PriceLevel], amount_out: Decimal) -> Vec<PriceLevel> {
    let mut left = amount_out;
    let mut remaining = Vec::with_capacity(levels.len());
    for level in levels {
        if left.is_zero() {
            remaining.push(*level);
            continue;
        }
        let level_out = level.amount.checked_mul(level.price).unwrap_or(Decimal::MAX);
        if left >= level_out {
            left -= level_out;
            continue;
        }
        let amount = match left.checked_div(level.price) {
            Some(used) => level.amount - used.min(level.amount),
            None => level.amount,
        };
        remaining.push(PriceLevel {
            price: level.price,
            amount,
        });
        left = Decimal::ZERO;
    }
    remaining
}

#[derive(Debug, Clone)]
pub struct KyberPmmSimulator {
    info: PoolInfo,
    base_index: usize,
    decimals: [u8; 2],
    base_to_quote: Vec<PriceLevel>,
    quote_to_base: Vec<PriceLevel>,
    timestamp: i64,
    gas: u64,
}

impl KyberPmmSimulator {
    pub fn new(snapshot: &PoolSnapshot, settings: &Settings) -> Result<Self, SimulatorError> {
        snapshot.expect_token_count(2, 2)?;
        let static_extra: PmmStaticExtra = snapshot.parse_static_extra()?;
        let extra: PmmExtra = snapshot.parse_extra()?;

        let base_index = snapshot
            .token_index(&static_extra.base_token_address)
            .ok_or_else(|| SimulatorError::InvalidSnapshot("base token is not a pool token".to_string()))?;
        if snapshot.token_index(&static_extra.quote_token_address) != Some(1 - base_index) {
            return Err(SimulatorError::InvalidSnapshot("quote token is not a pool token".to_string()));
        }
        let invalid_level = extra
            .base_to_quote_price_levels
            .iter()
            .chain(extra.quote_to_base_price_levels.iter())
            .any(|level| level.price.is_sign_negative() || level.amount.is_sign_negative());
        if invalid_level {
            return Err(SimulatorError::InvalidSnapshot("negative price level".to_string()));
        }

        tracing::debug!(
            "kyber-pmm pool {:?}: {} bid levels, {} ask levels",
            snapshot.address,
            extra.base_to_quote_price_levels.len(),
            extra.quote_to_base_price_levels.len()
        );

        Ok(Self {
            info: PoolInfo::from_snapshot(snapshot)?,
            base_index,
            decimals: [snapshot.tokens[0].decimals, snapshot.tokens[1].decimals],
            base_to_quote: extra.base_to_quote_price_levels,
            quote_to_base: extra.quote_to_base_price_levels,
            timestamp: snapshot.timestamp,
            gas: settings.gas.kyber_pmm,
        })
    }

    pub fn price_levels(&self, base_to_quote: bool) -> &[PriceLevel] {
        if base_to_quote {
            &self.base_to_quote
        } else {
            &self.quote_to_base
        }
    }

    /// Levels for the direction paying out token `index_out`, minus what other
    /// pools sharing the maker already took from that token's inventory.
    fn reconciled_levels(&self, index_out: usize, limit: &dyn SwapLimit) -> Result<Vec<PriceLevel>, SimulatorError> {
        let levels = self.price_levels(index_out != self.base_index);
        let token_out = self.info.tokens[index_out];
        let consumed = self.info.reserves[index_out].saturating_sub(limit.get_limit(&token_key(token_out)));
        if consumed.is_zero() {
            return Ok(levels.to_vec());
        }
        let consumed = u256_to_decimal(consumed, self.decimals[index_out])?;
        Ok(consume_by_amount_out(levels, consumed))
    }
}

impl PoolSimulator for KyberPmmSimulator {
    fn info(&self) -> &PoolInfo {
        &self.info
    }

    fn calc_amount_out(&self, params: CalcAmountOutParams<'_>) -> Result<CalcAmountOutResult, SimulatorError> {
        let limit = params.limit.ok_or(SimulatorError::NoSwapLimit)?;
        let (index_in, index_out) = validate_amount_out_params(&self.info, &params)?;
        let amount_in = params.token_amount_in.amount;

        // the maker must be able to hold what it takes in
        let in_key = token_key(params.token_amount_in.token);
        let available_in = limit.get_limit(&in_key);
        if amount_in > available_in {
            return Err(InventoryError::NotEnoughInventory {
                key: in_key,
                requested: amount_in,
                available: available_in,
            }
            .into());
        }

        let levels = self.reconciled_levels(index_out, limit)?;
        if levels.is_empty() {
            return Err(SimulatorError::EmptyPriceLevels);
        }

        let human_in = u256_to_decimal(amount_in, self.decimals[index_in])?;
        let human_out = levels_amount_out(&levels, human_in)?.ok_or(SimulatorError::InsufficientLiquidity)?;
        let amount_out = decimal_to_u256_floor(human_out, self.decimals[index_out])?;

        let out_key = token_key(params.token_out);
        let available = limit.get_limit(&out_key);
        if amount_out > available {
            return Err(InventoryError::NotEnoughInventory {
                key: out_key,
                requested: amount_out,
                available,
            }
            .into());
        }

        Ok(CalcAmountOutResult {
            token_amount_out: TokenAmount::new(params.token_out, amount_out),
            fee: TokenAmount::new(params.token_amount_in.token, U256::zero()),
            gas: self.gas,
            remaining_token_amount_in: None,
            swap_info: SwapInfo::KyberPmm(PmmSwapInfo {
                taker_asset: params.token_amount_in.token,
                taking_amount: amount_in,
                maker_asset: params.token_out,
                making_amount: amount_out,
            }),
        })
    }

    fn update_balance(&mut self, params: UpdateBalanceParams<'_>) {
        let (index_in, index_out) = match self
            .info
            .resolve_pair(&params.token_amount_in.token, &params.token_amount_out.token)
        {
            Ok(indexes) => indexes,
            Err(e) => {
                tracing::warn!("kyber-pmm pool {:?} rejected update: {}", self.info.address, e);
                return;
            }
        };
        let amount_in = params.token_amount_in.amount;
        let amount_out = params.token_amount_out.amount;

        let (mut base_to_quote, mut quote_to_base, new_in, new_out) = match params.swap_limit {
            Some(limit) => {
                // fold other pools' consumption in before this pool's baseline moves
                let reconciled = self
                    .reconciled_levels(1 - self.base_index, limit)
                    .and_then(|b2q| Ok((b2q, self.reconciled_levels(self.base_index, limit)?)));
                let (b2q, q2b) = match reconciled {
                    Ok(levels) => levels,
                    Err(e) => {
                        tracing::warn!("kyber-pmm pool {:?} could not reconcile levels: {}", self.info.address, e);
                        return;
                    }
                };
                let committed = limit.update_limit(
                    &token_key(params.token_amount_out.token),
                    &token_key(params.token_amount_in.token),
                    amount_out,
                    amount_in,
                );
                match committed {
                    Ok((new_out, new_in)) => (b2q, q2b, new_in, new_out),
                    Err(e) => {
                        tracing::warn!("kyber-pmm pool {:?} inventory update failed: {}", self.info.address, e);
                        return;
                    }
                }
            }
            None => (
                self.base_to_quote.clone(),
                self.quote_to_base.clone(),
                self.info.reserves[index_in].saturating_add(amount_in),
                self.info.reserves[index_out].saturating_sub(amount_out),
            ),
        };

        let human_in = match u256_to_decimal(amount_in, self.decimals[index_in]) {
            Ok(amount) => amount,
            Err(e) => {
                tracing::warn!("kyber-pmm pool {:?} rejected update: {}", self.info.address, e);
                return;
            }
        };
        if index_in == self.base_index {
            base_to_quote = consume_by_amount_in(&base_to_quote, human_in);
        } else {
            quote_to_base = consume_by_amount_in(&quote_to_base, human_in);
        }

        self.base_to_quote = base_to_quote;
        self.quote_to_base = quote_to_base;
        self.info.reserves[index_in] = new_in;
        self.info.reserves[index_out] = new_out;
    }

    fn clone_state(&self) -> Box<dyn PoolSimulator> {
        Box::new(self.clone())
    }

    fn get_meta_info(&self, token_in: Address, token_out: Address) -> MetaInfo {
        MetaInfo {
            block_number: self.info.block_number,
            token_in_index: self.info.token_index(&token_in),
            token_out_index: self.info.token_index(&token_out),
            timestamp: Some(self.timestamp),
            ..MetaInfo::default()
        }
    }

    fn calculate_limit(&self) -> Option<HashMap<String, U256>> {
        Some(
            self.info
                .tokens
                .iter()
                .zip(self.info.reserves.iter())
                .map(|(token, reserve)| (token_key(*token), *reserve))
                .collect(),
        )
    }
}
