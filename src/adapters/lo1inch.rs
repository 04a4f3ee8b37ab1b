//! # Limit-order aggregation (lo1inch)
//!
//! Signed maker orders grouped by the token they take. Orders are consumed in the
//! order they arrive; each order's fillable amount is clipped to what its maker
//! still holds in the request's [`SwapLimit`] under `"maker:makerAsset"`.
//!
//! When the last order covers the rest of the input, further orders are attached
//! as zero-fill backups until the listed maker amount reaches `backup_ratio` times
//! the output. Executors fall back on them when another taker fills first.

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::entity::PoolSnapshot;
use crate::error::SimulatorError;
use crate::fixed_point::{checked_add, mul_div_down, mul_div_up, pow10};
use crate::pool_simulator::{
    validate_amount_out_params, CalcAmountOutParams, CalcAmountOutResult, MetaInfo, PoolInfo,
    PoolSimulator, TokenAmount, UpdateBalanceParams,
};
use crate::settings::Settings;
use crate::swap_info::SwapInfo;
use crate::swap_limit::{maker_asset_key, SwapLimit};
use crate::types::conversions::serde_u256;

const EXPIRATION_OFFSET: usize = 80;
const EXPIRATION_BITS: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(default)]
    pub signature: String,
    pub order_hash: String,
    #[serde(with = "serde_u256")]
    pub remaining_maker_amount: U256,
    #[serde(with = "serde_u256")]
    pub maker_balance: U256,
    #[serde(with = "serde_u256")]
    pub maker_allowance: U256,
    pub maker_asset: Address,
    pub taker_asset: Address,
    #[serde(default)]
    pub salt: String,
    #[serde(default)]
    pub receiver: Address,
    #[serde(with = "serde_u256")]
    pub making_amount: U256,
    #[serde(with = "serde_u256")]
    pub taking_amount: U256,
    pub maker: Address,
    #[serde(default, with = "serde_u256")]
    pub maker_traits: U256,
}

impl Order {
    /// Expiration timestamp packed in the maker traits, zero when the order never expires.
    pub fn expiration(&self) -> u64 {
        let mask = (U256::one() << EXPIRATION_BITS) - U256::one();
        ((self.maker_traits >> EXPIRATION_OFFSET) & mask).low_u64()
    }

    pub fn is_expired(&self, now: i64) -> bool {
        let expiration = self.expiration();
        expiration != 0 && (expiration as i128) < now as i128
    }

    fn balance_key(&self) -> String {
        maker_asset_key(self.maker, self.maker_asset)
    }

    fn proceeds_key(&self) -> String {
        maker_asset_key(self.maker, self.taker_asset)
    }
}

/// An order as it stands after the swap, plus what the swap takes from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilledOrder {
    pub order: Order,
    #[serde(with = "serde_u256")]
    pub filled_making_amount: U256,
    #[serde(with = "serde_u256")]
    pub filled_taking_amount: U256,
    pub is_backup: bool,
}

impl FilledOrder {
    fn new(order: &Order, filled_making_amount: U256, filled_taking_amount: U256) -> Self {
        let mut after = order.clone();
        after.remaining_maker_amount = after.remaining_maker_amount.saturating_sub(filled_making_amount);
        after.maker_balance = after.maker_balance.saturating_sub(filled_making_amount);
        after.maker_allowance = after.maker_allowance.saturating_sub(filled_making_amount);
        Self {
            order: after,
            filled_making_amount,
            filled_taking_amount,
            is_backup: false,
        }
    }

    fn backup(order: &Order) -> Self {
        Self {
            is_backup: true,
            ..Self::new(order, U256::zero(), U256::zero())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitOrderSwapInfo {
    #[serde(with = "serde_u256")]
    pub amount_in: U256,
    /// True when the swap consumed `takeToken0Orders`
    pub take_token0: bool,
    pub filled_orders: Vec<FilledOrder>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LimitOrderExtra {
    #[serde(default)]
    take_token0_orders: Vec<Order>,
    #[serde(default)]
    take_token1_orders: Vec<Order>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LimitOrderStaticExtra {
    token0: Address,
    token1: Address,
    #[serde(default)]
    router_address: Option<Address>,
}

#[derive(Debug, Clone)]
pub struct Lo1inchSimulator {
    info: PoolInfo,
    token0: Address,
    take_token0_orders: Vec<Order>,
    take_token1_orders: Vec<Order>,
    token0_order_index: HashMap<String, usize>,
    token1_order_index: HashMap<String, usize>,
    router_address: Option<Address>,
    timestamp: i64,
    backup_numerator: U256,
    backup_denominator: U256,
    gas_base: u64,
    gas_per_order: u64,
}

fn index_by_hash(orders: &[Order]) -> HashMap<String, usize> {
    orders
        .iter()
        .enumerate()
        .map(|(i, order)| (order.order_hash.clone(), i))
        .collect()
}

impl Lo1inchSimulator {
    pub fn new(snapshot: &PoolSnapshot, settings: &Settings) -> Result<Self, SimulatorError> {
        snapshot.expect_token_count(2, 2)?;
        let static_extra: LimitOrderStaticExtra = snapshot.parse_static_extra()?;
        let extra: LimitOrderExtra = snapshot.parse_extra()?;

        let token1_index = snapshot
            .token_index(&static_extra.token0)
            .map(|i| 1 - i)
            .ok_or_else(|| SimulatorError::InvalidSnapshot("token0 is not a pool token".to_string()))?;
        if snapshot.token_index(&static_extra.token1) != Some(token1_index) {
            return Err(SimulatorError::InvalidSnapshot("token1 is not a pool token".to_string()));
        }

        let ratio = settings.limit_order.backup_ratio;
        if ratio.is_sign_negative() {
            return Err(SimulatorError::InvalidSnapshot(format!("backup ratio {}", ratio)));
        }

        let gas = &settings.gas;
        Ok(Self {
            info: PoolInfo::from_snapshot(snapshot)?,
            token0: static_extra.token0,
            token0_order_index: index_by_hash(&extra.take_token0_orders),
            token1_order_index: index_by_hash(&extra.take_token1_orders),
            take_token0_orders: extra.take_token0_orders,
            take_token1_orders: extra.take_token1_orders,
            router_address: static_extra.router_address,
            timestamp: snapshot.timestamp,
            backup_numerator: U256::from(ratio.mantissa().unsigned_abs()),
            backup_denominator: pow10(ratio.scale())?,
            gas_base: gas.limit_order_base,
            gas_per_order: gas.limit_order_executor_per_order + gas.limit_order_router_per_order,
        })
    }

    pub fn orders(&self, take_token0: bool) -> &[Order] {
        if take_token0 {
            &self.take_token0_orders
        } else {
            &self.take_token1_orders
        }
    }

    fn estimate_gas(&self, filled_orders: usize) -> u64 {
        self.gas_base + filled_orders as u64 * self.gas_per_order
    }

    /// The order's remaining maker amount, capped by what the maker still holds in
    /// the ledger after fills earlier in this quote.
    fn fillable_making_amount(
        order: &Order,
        limit: Option<&dyn SwapLimit>,
        filled_by_maker: &HashMap<String, U256>,
    ) -> U256 {
        let limit = match limit {
            Some(limit) => limit,
            None => return order.remaining_maker_amount,
        };
        let key = order.balance_key();
        let already_filled = filled_by_maker.get(&key).copied().unwrap_or_default();
        let balance = limit.get_limit(&key).saturating_sub(already_filled);
        order.remaining_maker_amount.min(balance)
    }
}

fn add_filled(filled_by_maker: &mut HashMap<String, U256>, order: &Order, amount: U256) {
    let entry = filled_by_maker.entry(order.balance_key()).or_default();
    *entry = entry.saturating_add(amount);
}

/// Moves every fill's making amount out of the maker's balance and credits the
/// taking amount to its proceeds. All or nothing: a rejected fill reverts the
/// ones already committed and returns `false`.
fn commit_fills(limit: &dyn SwapLimit, filled_orders: &[FilledOrder]) -> bool {
    let mut committed: Vec<&FilledOrder> = Vec::with_capacity(filled_orders.len());
    for filled in filled_orders {
        if filled.filled_making_amount.is_zero() && filled.filled_taking_amount.is_zero() {
            continue;
        }
        let order = &filled.order;
        match limit.update_limit(
            &order.balance_key(),
            &order.proceeds_key(),
            filled.filled_making_amount,
            filled.filled_taking_amount,
        ) {
            Ok(_) => committed.push(filled),
            Err(e) => {
                tracing::warn!("lo1inch order {} inventory update failed: {}", order.order_hash, e);
                for done in committed.iter().rev() {
                    if let Err(e) = limit.update_limit(
                        &done.order.proceeds_key(),
                        &done.order.balance_key(),
                        done.filled_taking_amount,
                        done.filled_making_amount,
                    ) {
                        tracing::warn!("lo1inch order {} inventory revert failed: {}", done.order.order_hash, e);
                    }
                }
                return false;
            }
        }
    }
    true
}

impl PoolSimulator for Lo1inchSimulator {
    fn info(&self) -> &PoolInfo {
        &self.info
    }

    fn calc_amount_out(&self, params: CalcAmountOutParams<'_>) -> Result<CalcAmountOutResult, SimulatorError> {
        validate_amount_out_params(&self.info, &params)?;
        let take_token0 = params.token_amount_in.token == self.token0;
        let orders = self.orders(take_token0);
        if orders.is_empty() {
            return Err(SimulatorError::NoOrderAvailable);
        }

        let amount_in = params.token_amount_in.amount;
        let mut remaining_in = amount_in;
        let mut total_out = U256::zero();
        let mut total_making = U256::zero();
        let mut filled_by_maker: HashMap<String, U256> = HashMap::new();
        let mut filled_orders = Vec::new();
        let mut fulfilled = false;

        for (i, order) in orders.iter().enumerate() {
            if order.is_expired(self.timestamp) || order.making_amount.is_zero() {
                continue;
            }
            let making = Self::fillable_making_amount(order, params.limit, &filled_by_maker);
            if making.is_zero() {
                continue;
            }
            let taking = mul_div_down(order.taking_amount, making, order.making_amount)?;

            if taking >= remaining_in {
                let amount_out = match mul_div_down(remaining_in, order.making_amount, order.taking_amount) {
                    Ok(amount) if !amount.is_zero() => amount,
                    _ => continue,
                };
                total_out = checked_add(total_out, amount_out)?;
                total_making = total_making.saturating_add(making);
                filled_orders.push(FilledOrder::new(order, amount_out, remaining_in));
                add_filled(&mut filled_by_maker, order, amount_out);
                fulfilled = true;

                let target = mul_div_up(total_out, self.backup_numerator, self.backup_denominator)?;
                for backup in &orders[i + 1..] {
                    if total_making >= target {
                        break;
                    }
                    if backup.is_expired(self.timestamp) {
                        continue;
                    }
                    let making = Self::fillable_making_amount(backup, params.limit, &filled_by_maker);
                    if making.is_zero() {
                        continue;
                    }
                    total_making = total_making.saturating_add(making);
                    filled_orders.push(FilledOrder::backup(backup));
                }
                break;
            }

            // a partially funded order cannot be taken whole
            if making < order.remaining_maker_amount {
                continue;
            }
            remaining_in -= taking;
            total_out = checked_add(total_out, making)?;
            total_making = total_making.saturating_add(making);
            filled_orders.push(FilledOrder::new(order, making, taking));
            add_filled(&mut filled_by_maker, order, making);
        }

        if !fulfilled {
            return Err(SimulatorError::CannotFulfillAmountIn);
        }

        Ok(CalcAmountOutResult {
            token_amount_out: TokenAmount::new(params.token_out, total_out),
            fee: TokenAmount::new(params.token_amount_in.token, U256::zero()),
            gas: self.estimate_gas(filled_orders.len()),
            remaining_token_amount_in: None,
            swap_info: SwapInfo::LimitOrder(LimitOrderSwapInfo {
                amount_in,
                take_token0,
                filled_orders,
            }),
        })
    }

    fn update_balance(&mut self, params: UpdateBalanceParams<'_>) {
        let info = match params.swap_info {
            SwapInfo::LimitOrder(info) => info,
            other => {
                tracing::warn!("lo1inch pool {:?} ignoring {} swap info", self.info.address, other.family());
                return;
            }
        };

        if let Some(limit) = params.swap_limit {
            if !commit_fills(limit, &info.filled_orders) {
                return;
            }
        }

        let (orders, index) = if info.take_token0 {
            (&mut self.take_token0_orders, &self.token0_order_index)
        } else {
            (&mut self.take_token1_orders, &self.token1_order_index)
        };

        for filled in &info.filled_orders {
            let order = match index.get(&filled.order.order_hash).and_then(|i| orders.get_mut(*i)) {
                Some(order) => order,
                None => continue,
            };
            order.remaining_maker_amount = filled.order.remaining_maker_amount;
            order.maker_balance = filled.order.maker_balance;
            order.maker_allowance = filled.order.maker_allowance;
        }
    }

    fn clone_state(&self) -> Box<dyn PoolSimulator> {
        Box::new(self.clone())
    }

    fn get_meta_info(&self, token_in: Address, token_out: Address) -> MetaInfo {
        MetaInfo {
            block_number: self.info.block_number,
            approval_address: self.router_address,
            token_in_index: self.info.token_index(&token_in),
            token_out_index: self.info.token_index(&token_out),
            timestamp: Some(self.timestamp),
            ..MetaInfo::default()
        }
    }

    /// `min(balance, allowance)` per maker asset. The maker's proceeds keys are
    /// seeded at zero so fills can be credited to them.
    fn calculate_limit(&self) -> Option<HashMap<String, U256>> {
        let orders: Vec<&Order> = self
            .take_token0_orders
            .iter()
            .chain(self.take_token1_orders.iter())
            .collect();
        if orders.is_empty() {
            return None;
        }
        let mut limits = HashMap::with_capacity(orders.len() * 2);
        for order in &orders {
            limits.insert(order.balance_key(), order.maker_balance.min(order.maker_allowance));
        }
        for order in &orders {
            limits.entry(order.proceeds_key()).or_insert_with(U256::zero);
        }
        Some(limits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::TokenRef;
    use crate::swap_limit::Inventory;

    const MAKER1: &str = "0xdf4039a454d58868dfd43f076ee46c92a35fdfd9";
    const MAKER2: &str = "0x29eba388141f070e6824dd7628f11cb946bc548b";

    fn usdc() -> Address {
        "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48".parse().unwrap()
    }
    fn usdt() -> Address {
        "0xdac17f958d2ee523a2206206994597c13d831ec7".parse().unwrap()
    }

    fn order(hash: &str, maker: &str, making: u64, taking: u64, balance: &str, allowance: &str) -> Order {
        Order {
            signature: "0x".to_string(),
            order_hash: hash.to_string(),
            remaining_maker_amount: U256::from(making),
            maker_balance: U256::from_dec_str(balance).unwrap(),
            maker_allowance: U256::from_dec_str(allowance).unwrap(),
            maker_asset: usdt(),
            taker_asset: usdc(),
            salt: "54304030".to_string(),
            receiver: Address::zero(),
            making_amount: U256::from(making),
            taking_amount: U256::from(taking),
            maker: maker.parse().unwrap(),
            maker_traits: U256::zero(),
        }
    }

    fn order1() -> Order {
        order("0x177a", MAKER1, 10_000, 101, "10437135", "900000")
    }

    fn order2() -> Order {
        order(
            "0x28b1",
            MAKER2,
            100_000_000_000,
            100_247_731_166,
            "722627607117",
            "115792089237316195423570985008687907853269984665640564039457584007913129639935",
        )
    }

    fn simulator(take_token0_orders: Vec<Order>) -> Lo1inchSimulator {
        let extra = serde_json::json!({ "takeToken0Orders": take_token0_orders, "takeToken1Orders": [] });
        let snapshot = PoolSnapshot {
            address: Address::repeat_byte(0x10),
            exchange: "lo1inch".to_string(),
            pool_type: "lo1inch".to_string(),
            tokens: vec![TokenRef::new(usdc(), 6, "USDC"), TokenRef::new(usdt(), 6, "USDT")],
            reserves: vec!["10000000000000000000".to_string(), "10000000000000000000".to_string()],
            extra: extra.to_string(),
            static_extra: format!(
                r#"{{"token0":"{:?}","token1":"{:?}","routerAddress":"0x111111125421ca6dc452d289314280a0f8842a65"}}"#,
                usdc(),
                usdt()
            ),
            timestamp: 1_732_175_620,
            ..PoolSnapshot::default()
        };
        Lo1inchSimulator::new(&snapshot, &Settings::default()).unwrap()
    }

    fn quote(sim: &Lo1inchSimulator, token_in: Address, amount: u64, limit: Option<&dyn SwapLimit>) -> Result<CalcAmountOutResult, SimulatorError> {
        let token_out = if token_in == usdc() { usdt() } else { usdc() };
        sim.calc_amount_out(CalcAmountOutParams {
            token_amount_in: TokenAmount::new(token_in, U256::from(amount)),
            token_out,
            limit,
        })
    }

    fn filled(result: &CalcAmountOutResult) -> &[FilledOrder] {
        match &result.swap_info {
            SwapInfo::LimitOrder(info) => &info.filled_orders,
            other => panic!("unexpected swap info {:?}", other),
        }
    }

    #[test]
    fn test_single_order_covers_input() {
        let sim = simulator(vec![order1()]);
        let result = quote(&sim, usdc(), 101, None).unwrap();
        assert_eq!(result.token_amount_out, TokenAmount::new(usdt(), U256::from(10_000)));
        assert_eq!(result.gas, 113_308);
        let filled = filled(&result);
        assert_eq!(filled.len(), 1);
        assert_eq!(filled[0].filled_taking_amount, U256::from(101));
        assert!(filled[0].order.remaining_maker_amount.is_zero());
        assert_eq!(filled[0].order.maker_balance, U256::from(10_427_135));
        assert_eq!(filled[0].order.maker_allowance, U256::from(890_000));
    }

    #[test]
    fn test_fills_orders_in_sequence() {
        let sim = simulator(vec![order1(), order2()]);
        let result = quote(&sim, usdc(), 100_000_000, None).unwrap();
        // 10000 from the first order, (1e8 - 101) * 1e11 / 100247731166 from the second
        assert_eq!(result.token_amount_out.amount, U256::from(99_762_780));
        assert_eq!(result.gas, 136_616);
        let filled = filled(&result);
        assert_eq!(filled[1].filled_making_amount, U256::from(99_752_780));
        assert_eq!(
            filled[1].order.remaining_maker_amount,
            U256::from(100_000_000_000u64 - 99_752_780)
        );
    }

    #[test]
    fn test_errors() {
        let sim = simulator(vec![order1()]);
        assert_eq!(quote(&sim, usdc(), 1_000_000, None).unwrap_err(), SimulatorError::CannotFulfillAmountIn);
        assert_eq!(quote(&sim, usdt(), 1_000, None).unwrap_err(), SimulatorError::NoOrderAvailable);
        let unknown = sim.calc_amount_out(CalcAmountOutParams {
            token_amount_in: TokenAmount::new(Address::repeat_byte(9), U256::from(1)),
            token_out: usdt(),
            limit: None,
        });
        assert_eq!(unknown.unwrap_err(), SimulatorError::InvalidToken);
    }

    #[test]
    fn test_expired_orders_are_skipped() {
        let mut expired = order1();
        expired.maker_traits = U256::from(1_732_175_619u64) << EXPIRATION_OFFSET;
        assert_eq!(expired.expiration(), 1_732_175_619);
        let sim = simulator(vec![expired, order2()]);
        let result = quote(&sim, usdc(), 101, None).unwrap();
        assert_eq!(result.token_amount_out.amount, U256::from(100));
        assert_eq!(filled(&result)[0].order.order_hash, "0x28b1");

        let mut at_deadline = order1();
        at_deadline.maker_traits = U256::from(1_732_175_620u64) << EXPIRATION_OFFSET;
        let sim = simulator(vec![at_deadline]);
        assert_eq!(quote(&sim, usdc(), 101, None).unwrap().token_amount_out.amount, U256::from(10_000));
    }

    #[test]
    fn test_backup_orders_over_provision() {
        let a = order("0xa", MAKER1, 1_000, 1_000, "1000000", "1000000");
        let b = order("0xb", MAKER2, 500, 500, "1000000", "1000000");
        let c = order("0xc", MAKER2, 500, 500, "1000000", "1000000");
        let sim = simulator(vec![a, b, c]);
        let result = quote(&sim, usdc(), 900, None).unwrap();
        assert_eq!(result.token_amount_out.amount, U256::from(900));
        let filled = filled(&result);
        // 1000 + 500 covers 1.3 * 900
        assert_eq!(filled.len(), 2);
        assert!(filled[1].is_backup);
        assert!(filled[1].filled_making_amount.is_zero());
        assert_eq!(filled[1].order.remaining_maker_amount, U256::from(500));
        assert_eq!(result.gas, 90_000 + 2 * 23_308);
    }

    #[test]
    fn test_maker_balance_clips_orders() {
        let sim = simulator(vec![order1(), order2()]);
        let inventory = Inventory::new(HashMap::from([
            (maker_asset_key(MAKER1.parse().unwrap(), usdt()), U256::from(5_000)),
            (maker_asset_key(MAKER2.parse().unwrap(), usdt()), U256::from(722_627_607_117u64)),
        ]));
        let result = quote(&sim, usdc(), 101, Some(&inventory)).unwrap();
        assert_eq!(result.token_amount_out.amount, U256::from(100));
        assert_eq!(filled(&result).len(), 1);
    }

    #[test]
    fn test_update_balance_commits_to_inventory() {
        let mut sim = simulator(vec![order1(), order2()]);
        let inventory = Inventory::from_pools([&sim as &dyn PoolSimulator]);
        let maker1 = MAKER1.parse().unwrap();
        assert_eq!(inventory.get_limit(&maker_asset_key(maker1, usdt())), U256::from(900_000));

        let result = quote(&sim, usdc(), 101, Some(&inventory)).unwrap();
        sim.update_balance(UpdateBalanceParams::from_result(
            &result,
            TokenAmount::new(usdc(), U256::from(101)),
            Some(&inventory),
        ));

        assert!(sim.orders(true)[0].remaining_maker_amount.is_zero());
        assert_eq!(inventory.get_limit(&maker_asset_key(maker1, usdt())), U256::from(890_000));
        assert_eq!(inventory.get_limit(&maker_asset_key(maker1, usdc())), U256::from(101));

        let next = quote(&sim, usdc(), 101, Some(&inventory)).unwrap();
        assert_eq!(next.token_amount_out.amount, U256::from(100));
    }

    #[test]
    fn test_rejected_commit_leaves_orders_untouched() {
        let maker1: Address = MAKER1.parse().unwrap();
        let mut sim = simulator(vec![order1()]);
        let result = quote(&sim, usdc(), 101, None).unwrap();

        let inventory = Inventory::new(HashMap::from([
            (maker_asset_key(maker1, usdt()), U256::one()),
            (maker_asset_key(maker1, usdc()), U256::zero()),
        ]));
        sim.update_balance(UpdateBalanceParams::from_result(
            &result,
            TokenAmount::new(usdc(), U256::from(101)),
            Some(&inventory),
        ));

        assert_eq!(sim.orders(true)[0].remaining_maker_amount, U256::from(10_000));
        assert_eq!(sim.orders(true)[0].maker_allowance, U256::from(900_000));
        assert_eq!(inventory.get_limit(&maker_asset_key(maker1, usdt())), U256::one());
        assert!(inventory.get_limit(&maker_asset_key(maker1, usdc())).is_zero());
    }

    #[test]
    fn test_rejected_second_fill_reverts_the_first() {
        let maker1: Address = MAKER1.parse().unwrap();
        let maker2: Address = MAKER2.parse().unwrap();
        let mut sim = simulator(vec![order1(), order2()]);
        let result = quote(&sim, usdc(), 100_000_000, None).unwrap();
        assert_eq!(filled(&result).len(), 2);

        let inventory = Inventory::new(HashMap::from([
            (maker_asset_key(maker1, usdt()), U256::from(900_000)),
            (maker_asset_key(maker1, usdc()), U256::zero()),
            (maker_asset_key(maker2, usdt()), U256::one()),
            (maker_asset_key(maker2, usdc()), U256::zero()),
        ]));
        let before = inventory.snapshot();
        sim.update_balance(UpdateBalanceParams::from_result(
            &result,
            TokenAmount::new(usdc(), U256::from(100_000_000)),
            Some(&inventory),
        ));

        assert_eq!(inventory.snapshot(), before);
        assert_eq!(sim.orders(true)[0].remaining_maker_amount, U256::from(10_000));
        assert_eq!(sim.orders(true)[1].remaining_maker_amount, U256::from(100_000_000_000u64));
    }

    #[test]
    fn test_meta_info_points_at_router() {
        let sim = simulator(vec![order1()]);
        let meta = sim.get_meta_info(usdc(), usdt());
        assert_eq!(
            meta.approval_address,
            Some("0x111111125421ca6dc452d289314280a0f8842a65".parse().unwrap())
        );
        assert_eq!(meta.token_in_index, Some(0));
    }
}
