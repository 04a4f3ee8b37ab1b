//! # Quote Pool
//!
//! Developer tool: builds the simulator for one snapshot file and prints a quote
//! as JSON.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin quote_pool -- \
//!     --snapshot pool.json \
//!     --token-in 0x039e2fb66102314ce7b64ce5ce3e5183bc94ad38 \
//!     --amount-in 1000000000000000000 \
//!     --token-out 0x29219dd400f2bf60e5a23d13be72b486d4038894
//! ```
//!
//! `--exact-out` treats the amount as the desired output and prices the input
//! instead, for the families that support it. `--inventory` seeds a swap limit
//! from the pool itself, which RFQ pools require.

use anyhow::{Context, Result};
use clap::Parser;
use ethers::types::Address;
use mig_pool_simulator::{
    pool_simulator,
    registry::{self, PoolFactory},
    types::conversions::{parse_u256, string_to_address},
    CalcAmountInParams, CalcAmountOutParams, Inventory, PoolSimulator, PoolSnapshot, Settings,
    SwapLimit, TokenAmount,
};
use serde_json::json;
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "quote_pool", about = "Price a swap against a pool snapshot")]
struct Args {
    /// Pool snapshot JSON file
    #[arg(long)]
    snapshot: PathBuf,
    #[arg(long)]
    token_in: String,
    /// Amount in the token's smallest unit (decimal or 0x hex)
    #[arg(long)]
    amount_in: String,
    #[arg(long)]
    token_out: String,
    /// Settings file, defaults to ./Config.toml when present
    #[arg(long)]
    config: Option<String>,
    #[arg(long, default_value_t = false)]
    exact_out: bool,
    #[arg(long, default_value_t = false)]
    inventory: bool,
}

fn init_logging() {
    #[cfg(feature = "observability")]
    {
        tracing_subscriber::fmt().json().with_writer(std::io::stderr).init();
        mig_pool_simulator::metrics::describe_metrics();
    }
    #[cfg(not(feature = "observability"))]
    env_logger::init();
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_logging();

    let args = Args::parse();
    let settings = match &args.config {
        Some(path) => Settings::load(path),
        None => Settings::new(),
    }
    .context("loading settings")?;

    let raw = fs::read_to_string(&args.snapshot)
        .with_context(|| format!("reading {}", args.snapshot.display()))?;
    let snapshot: PoolSnapshot = serde_json::from_str(&raw).context("parsing snapshot")?;

    registry::install(PoolFactory::with_defaults(settings)?)?;
    let simulator = registry::global()?.build(&snapshot)?;
    log::info!("built {} pool {:?}", snapshot.pool_type, snapshot.address);

    let token_in: Address = string_to_address(&args.token_in)?;
    let token_out: Address = string_to_address(&args.token_out)?;
    let amount = parse_u256(&args.amount_in)?;

    let inventory = args
        .inventory
        .then(|| Inventory::from_pools([simulator.as_ref() as &dyn PoolSimulator]));
    let limit = inventory.as_ref().map(|inv| inv as &dyn SwapLimit);

    let output = if args.exact_out {
        let result = simulator.calc_amount_in(CalcAmountInParams {
            token_amount_out: TokenAmount::new(token_out, amount),
            token_in,
            limit,
        })?;
        json!({
            "pool": snapshot.address,
            "poolType": snapshot.pool_type,
            "amountIn": result.token_amount_in.amount.to_string(),
            "fee": { "token": result.fee.token, "amount": result.fee.amount.to_string() },
            "gas": result.gas,
            "remainingAmountOut": result.remaining_token_amount_out.map(|r| r.amount.to_string()),
            "swapInfo": result.swap_info,
        })
    } else {
        let result = pool_simulator::calc_amount_out(
            simulator.as_ref(),
            CalcAmountOutParams {
                token_amount_in: TokenAmount::new(token_in, amount),
                token_out,
                limit,
            },
        )?;
        json!({
            "pool": snapshot.address,
            "poolType": snapshot.pool_type,
            "amountOut": result.token_amount_out.amount.to_string(),
            "fee": { "token": result.fee.token, "amount": result.fee.amount.to_string() },
            "gas": result.gas,
            "remainingAmountIn": result.remaining_token_amount_in.map(|r| r.amount.to_string()),
            "swapInfo": result.swap_info,
            "metaInfo": simulator.get_meta_info(token_in, token_out),
        })
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
