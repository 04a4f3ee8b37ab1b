//! # On-chain order book (xpress)
//!
//! Token 0 is the base asset, token 1 the quote asset. Prices are quote units per
//! share and shares are base units divided by the base scaling factor `sX`;
//! `sY` scales prices into quote smallest units.
//!
//! Selling base walks the bids, buying base walks the asks, always from the best
//! level outward. An exhausted side is a partial fill reported through
//! `remaining_token_amount_in`. The fee is charged in the quote token, rounded up.

use ethers::types::{Address, U256};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::entity::PoolSnapshot;
use crate::error::SimulatorError;
use crate::fixed_point::{checked_add, checked_mul, div_up, mul_div_down, mul_div_up};
use crate::pool_simulator::{
    validate_amount_out_params, CalcAmountOutParams, CalcAmountOutResult, MetaInfo, PoolInfo,
    PoolSimulator, TokenAmount, UpdateBalanceParams,
};
use crate::settings::Settings;
use crate::swap_info::SwapInfo;
use crate::types::conversions::{serde_u256, serde_u256_vec};

const PPM: u64 = 1_000_000;

/// One side of the book, best level first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSide {
    #[serde(rename = "p", default, with = "serde_u256_vec")]
    pub prices: Vec<U256>,
    #[serde(rename = "s", default, with = "serde_u256_vec")]
    pub shares: Vec<U256>,
}

impl BookSide {
    fn validate(&self, side: &str) -> Result<(), SimulatorError> {
        if self.prices.len() != self.shares.len() {
            return Err(SimulatorError::InvalidSnapshot(format!(
                "{} has {} prices and {} share amounts",
                side,
                self.prices.len(),
                self.shares.len()
            )));
        }
        Ok(())
    }

    /// Drops fully consumed leading levels.
    fn prune(&mut self) {
        let filled = self.shares.iter().take_while(|s| s.is_zero()).count();
        self.prices.drain(..filled);
        self.shares.drain(..filled);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBook {
    #[serde(rename = "b", default)]
    pub bids: BookSide,
    #[serde(rename = "a", default)]
    pub asks: BookSide,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StaticExtra {
    #[serde(rename = "sX", with = "serde_u256")]
    scale_x: U256,
    #[serde(rename = "sY", with = "serde_u256")]
    scale_y: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XpressSwapInfo {
    pub base_to_quote: bool,
    pub updated_order_book: OrderBook,
}

struct Fill {
    amount_out: U256,
    fee: U256,
    remaining: U256,
    levels: u64,
    book: OrderBook,
}

#[derive(Debug, Clone)]
pub struct XpressSimulator {
    info: PoolInfo,
    book: OrderBook,
    scale_x: U256,
    scale_y: U256,
    fee_ppm: U256,
    gas_base: u64,
    gas_per_level: u64,
}

impl XpressSimulator {
    pub fn new(snapshot: &PoolSnapshot, settings: &Settings) -> Result<Self, SimulatorError> {
        snapshot.expect_token_count(2, 2)?;
        let book: OrderBook = snapshot.parse_extra()?;
        book.bids.validate("bids")?;
        book.asks.validate("asks")?;
        let static_extra: StaticExtra = snapshot.parse_static_extra()?;
        if static_extra.scale_x.is_zero() || static_extra.scale_y.is_zero() {
            return Err(SimulatorError::InvalidSnapshot("zero scaling factor".to_string()));
        }

        let fee_ppm = snapshot
            .swap_fee
            .unwrap_or_default()
            .checked_mul(Decimal::from(PPM))
            .and_then(|ppm| ppm.trunc().to_u64())
            .filter(|ppm| *ppm < PPM)
            .ok_or_else(|| SimulatorError::InvalidSnapshot(format!("swap fee {:?}", snapshot.swap_fee)))?;

        Ok(Self {
            info: PoolInfo::from_snapshot(snapshot)?,
            book,
            scale_x: static_extra.scale_x,
            scale_y: static_extra.scale_y,
            fee_ppm: U256::from(fee_ppm),
            gas_base: settings.gas.xpress_base,
            gas_per_level: settings.gas.xpress_per_level,
        })
    }

    pub fn order_book(&self) -> &OrderBook {
        &self.book
    }

    /// Base in, quote out: hit the bids.
    fn sell_base(&self, amount_in: U256) -> Result<Fill, SimulatorError> {
        let mut book = self.book.clone();
        let mut shares_left = amount_in / self.scale_x;
        let dust = amount_in % self.scale_x;
        let mut gross = U256::zero();
        let mut levels = 0u64;

        for (price, level) in book.bids.prices.iter().zip(book.bids.shares.iter_mut()) {
            if shares_left.is_zero() {
                break;
            }
            let taken = shares_left.min(*level);
            gross = checked_add(gross, checked_mul(checked_mul(taken, *price)?, self.scale_y)?)?;
            *level -= taken;
            shares_left -= taken;
            levels += 1;
        }
        book.bids.prune();

        let fee = mul_div_up(gross, self.fee_ppm, U256::from(PPM))?;
        Ok(Fill {
            amount_out: gross.saturating_sub(fee),
            fee,
            remaining: checked_add(dust, checked_mul(shares_left, self.scale_x)?)?,
            levels,
            book,
        })
    }

    /// Quote in, base out: lift the asks. The fee is reserved from the budget first.
    fn buy_base(&self, amount_in: U256) -> Result<Fill, SimulatorError> {
        let mut book = self.book.clone();
        let budget = mul_div_down(amount_in, U256::from(PPM), U256::from(PPM) + self.fee_ppm)?;
        let mut left = budget;
        let mut shares_bought = U256::zero();
        let mut levels = 0u64;

        for (price, level) in book.asks.prices.iter().zip(book.asks.shares.iter_mut()) {
            let unit_cost = checked_mul(*price, self.scale_y)?;
            if unit_cost.is_zero() {
                return Err(SimulatorError::InvalidSnapshot("zero ask price".to_string()));
            }
            let taken = (*level).min(left / unit_cost);
            if taken.is_zero() {
                break;
            }
            shares_bought += taken;
            left -= taken * unit_cost;
            *level -= taken;
            levels += 1;
            if !level.is_zero() {
                break;
            }
        }
        book.asks.prune();

        let spent = budget - left;
        let fee = div_up(checked_mul(spent, self.fee_ppm)?, U256::from(PPM))?;
        Ok(Fill {
            amount_out: checked_mul(shares_bought, self.scale_x)?,
            fee,
            remaining: amount_in.saturating_sub(spent).saturating_sub(fee),
            levels,
            book,
        })
    }
}

impl PoolSimulator for XpressSimulator {
    fn info(&self) -> &PoolInfo {
        &self.info
    }

    fn calc_amount_out(&self, params: CalcAmountOutParams<'_>) -> Result<CalcAmountOutResult, SimulatorError> {
        let (index_in, _) = validate_amount_out_params(&self.info, &params)?;
        let base_to_quote = index_in == 0;
        let amount_in = params.token_amount_in.amount;

        let fill = if base_to_quote {
            self.sell_base(amount_in)?
        } else {
            self.buy_base(amount_in)?
        };

        let quote_token = self.info.tokens[1];
        Ok(CalcAmountOutResult {
            token_amount_out: TokenAmount::new(params.token_out, fill.amount_out),
            fee: TokenAmount::new(quote_token, fill.fee),
            gas: self.gas_base + self.gas_per_level * fill.levels,
            remaining_token_amount_in: (!fill.remaining.is_zero())
                .then(|| TokenAmount::new(params.token_amount_in.token, fill.remaining)),
            swap_info: SwapInfo::Xpress(XpressSwapInfo {
                base_to_quote,
                updated_order_book: fill.book,
            }),
        })
    }

    fn update_balance(&mut self, params: UpdateBalanceParams<'_>) {
        let info = match params.swap_info {
            SwapInfo::Xpress(info) => info,
            other => {
                tracing::warn!("xpress pool {:?} ignoring {} swap info", self.info.address, other.family());
                return;
            }
        };
        if info.base_to_quote {
            self.book.bids = info.updated_order_book.bids.clone();
        } else {
            self.book.asks = info.updated_order_book.asks.clone();
        }

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
        MetaInfo {
            block_number: self.info.block_number,
            approval_address: Some(self.info.address),
            token_in_index: self.info.token_index(&token_in),
            token_out_index: self.info.token_index(&token_out),
            ..MetaInfo::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POOL: &str = r#"{"address":"0xc7723fe3df538f76a063eb5e62867960d236accf","swapFee":0.0003,"exchange":"xpress","type":"xpress","reserves":["9543508400000000000000000","75133739247"],"tokens":[{"address":"0x039e2fb66102314ce7b64ce5ce3e5183bc94ad38","symbol":"S","decimals":18,"swappable":true},{"address":"0x29219dd400f2bf60e5a23d13be72b486d4038894","symbol":"USDC","decimals":6,"swappable":true}],"extra":"{\"b\":{\"p\":[\"3117\",\"3116\",\"3113\",\"3000\",\"2925\",\"2120\",\"1950\",\"1822\",\"1745\",\"890\"],\"s\":[\"933470\",\"2800410\",\"14935837\",\"121630\",\"81729\",\"4000720\",\"2468061\",\"269134\",\"1037263\",\"1048295\"]},\"a\":{\"p\":[\"3119\",\"3120\",\"3123\",\"3200\",\"3375\",\"3450\",\"4000\",\"4400\",\"4464\",\"4895\",\"5689\",\"6818\",\"7000\",\"13300\",\"19900\",\"30000\",\"100000000\"],\"s\":[\"933470\",\"8401546\",\"9334701\",\"45000\",\"10000\",\"15000\",\"172000\",\"2500\",\"212\",\"1202718\",\"1845777\",\"94259\",\"100\",\"11779\",\"200\",\"100\",\"300\"]}}","staticExtra":"{\"sX\":\"10000000000000000\",\"sY\":\"1\"}","blockNumber":46254472}"#;

    fn s_token() -> Address {
        "0x039e2fb66102314ce7b64ce5ce3e5183bc94ad38".parse().unwrap()
    }
    fn usdc() -> Address {
        "0x29219dd400f2bf60e5a23d13be72b486d4038894".parse().unwrap()
    }

    fn simulator(extra: Option<&str>) -> XpressSimulator {
        let mut snapshot: PoolSnapshot = serde_json::from_str(POOL).unwrap();
        if let Some(extra) = extra {
            snapshot.extra = extra.to_string();
        }
        XpressSimulator::new(&snapshot, &Settings::default()).unwrap()
    }

    fn quote(sim: &XpressSimulator, token_in: Address, amount: &str, token_out: Address) -> CalcAmountOutResult {
        sim.calc_amount_out(CalcAmountOutParams {
            token_amount_in: TokenAmount::new(token_in, U256::from_dec_str(amount).unwrap()),
            token_out,
            limit: None,
        })
        .unwrap()
    }

    fn book(result: &CalcAmountOutResult) -> &OrderBook {
        match &result.swap_info {
            SwapInfo::Xpress(info) => &info.updated_order_book,
            other => panic!("unexpected swap info {:?}", other),
        }
    }

    fn remaining(result: &CalcAmountOutResult) -> U256 {
        result.remaining_token_amount_in.map(|r| r.amount).unwrap_or_default()
    }

    #[test]
    fn test_sell_one_unit_hits_best_bid() {
        let sim = simulator(None);
        let result = quote(&sim, s_token(), "1000000000000000000", usdc());
        assert_eq!(result.token_amount_out, TokenAmount::new(usdc(), U256::from(311_606)));
        assert_eq!(result.fee, TokenAmount::new(usdc(), U256::from(94)));
        assert!(result.remaining_token_amount_in.is_none());
        let book = book(&result);
        assert_eq!(book.bids.prices[0], U256::from(3117));
        assert_eq!(book.bids.shares[0], U256::from(933_370));
        assert_eq!(book.asks.shares[0], U256::from(933_470));
        // pricing never touches the simulator's own book
        assert_eq!(sim.order_book().bids.shares[0], U256::from(933_470));
    }

    #[test]
    fn test_sell_dust_is_returned() {
        let sim = simulator(None);
        let result = quote(&sim, s_token(), "1000000000000000123", usdc());
        assert_eq!(result.token_amount_out.amount, U256::from(311_606));
        assert_eq!(remaining(&result), U256::from(123));
    }

    #[test]
    fn test_sell_fills_levels() {
        let sim = simulator(None);
        let result = quote(&sim, s_token(), "9334700000000000000000", usdc());
        assert_eq!(book(&result).bids.prices[0], U256::from(3116));
        assert_eq!(book(&result).bids.shares[0], U256::from(2_800_410));

        let all = quote(&sim, s_token(), "276965490000000000000000", usdc());
        assert!(all.remaining_token_amount_in.is_none());
        assert!(book(&all).bids.prices.is_empty());
        assert!(book(&all).bids.shares.is_empty());

        let more = quote(&sim, s_token(), "276965500000000000000000", usdc());
        assert_eq!(remaining(&more), U256::exp10(16));
        assert_eq!(more.token_amount_out, all.token_amount_out);
    }

    #[test]
    fn test_buy_reserves_fee_from_budget() {
        let sim = simulator(None);
        let result = quote(&sim, usdc(), "998380", s_token());
        assert_eq!(result.token_amount_out.amount, U256::from(32) * U256::exp10(17));
        assert_eq!(result.fee, TokenAmount::new(usdc(), U256::from(300)));
        assert!(result.remaining_token_amount_in.is_none());
        assert_eq!(book(&result).asks.shares[0], U256::from(933_150));
        assert_eq!(book(&result).bids.shares[0], U256::from(933_470));

        let dust = quote(&sim, usdc(), "998381", s_token());
        assert_eq!(remaining(&dust), U256::one());
    }

    #[test]
    fn test_buy_fills_levels() {
        let sim = simulator(None);
        let level = quote(&sim, usdc(), "2912366378", s_token());
        assert_eq!(level.token_amount_out.amount, U256::from_dec_str("9334700000000000000000").unwrap());
        assert_eq!(level.fee.amount, U256::from(873_448));
        assert_eq!(book(&level).asks.prices[0], U256::from(3120));
        assert_eq!(book(&level).asks.shares[0], U256::from(8_401_546));

        let all = quote(&sim, usdc(), "106432882855", s_token());
        assert_eq!(all.token_amount_out.amount, U256::from_dec_str("220696620000000000000000").unwrap());
        assert_eq!(all.fee.amount, U256::from(31_920_289));
        assert!(book(&all).asks.prices.is_empty());
        assert_eq!(all.gas, 150_000 + 17 * 20_000);

        let over = quote(&sim, usdc(), "106432882856", s_token());
        assert_eq!(remaining(&over), U256::one());
    }

    #[test]
    fn test_empty_book_returns_whole_input() {
        let sim = simulator(Some("{}"));
        let sell = quote(&sim, s_token(), "1000000000000000000", usdc());
        assert!(sell.token_amount_out.amount.is_zero());
        assert!(sell.fee.amount.is_zero());
        assert_eq!(sell.fee.token, usdc());
        assert_eq!(sell.remaining_token_amount_in, Some(TokenAmount::new(s_token(), U256::exp10(18))));

        let buy = quote(&sim, usdc(), "998380", s_token());
        assert_eq!(buy.remaining_token_amount_in, Some(TokenAmount::new(usdc(), U256::from(998_380))));
    }

    #[test]
    fn test_update_balance_replaces_side() {
        let mut sim = simulator(None);
        let amount_in = TokenAmount::new(s_token(), U256::exp10(18));
        let result = quote(&sim, s_token(), "1000000000000000000", usdc());
        sim.update_balance(UpdateBalanceParams::from_result(&result, amount_in, None));
        assert_eq!(sim.order_book().bids.shares[0], U256::from(933_370));

        // 9333.7 S now exactly clears the first bid
        let next = quote(&sim, s_token(), "9333700000000000000000", usdc());
        assert_eq!(book(&next).bids.prices[0], U256::from(3116));
    }
}
