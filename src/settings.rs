use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;

/// Gas estimates reported by each family. Values mirror the on-chain executors.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct GasSettings {
    #[serde(default = "default_uniswap_v2_gas")]
    pub uniswap_v2: u64,
    #[serde(default = "default_share_vault_gas")]
    pub share_vault: u64,
    #[serde(default = "default_curve_gas")]
    pub curve: u64,
    #[serde(default = "default_clmm_base_gas")]
    pub clmm_base: u64,
    #[serde(default = "default_clmm_cross_tick_gas")]
    pub clmm_cross_tick: u64,
    #[serde(default = "default_xpress_base_gas")]
    pub xpress_base: u64,
    #[serde(default = "default_xpress_per_level_gas")]
    pub xpress_per_level: u64,
    #[serde(default = "default_kyber_pmm_gas")]
    pub kyber_pmm: u64,
    #[serde(default = "default_limit_order_base_gas")]
    pub limit_order_base: u64,
    #[serde(default = "default_limit_order_executor_gas")]
    pub limit_order_executor_per_order: u64,
    #[serde(default = "default_limit_order_router_gas")]
    pub limit_order_router_per_order: u64,
}

fn default_uniswap_v2_gas() -> u64 {
    65_000
}
fn default_share_vault_gas() -> u64 {
    80_000
}
fn default_curve_gas() -> u64 {
    130_000
}
fn default_clmm_base_gas() -> u64 {
    125_000
}
fn default_clmm_cross_tick_gas() -> u64 {
    20_000
}
fn default_xpress_base_gas() -> u64 {
    150_000
}
fn default_xpress_per_level_gas() -> u64 {
    20_000
}
fn default_kyber_pmm_gas() -> u64 {
    100_000
}
fn default_limit_order_base_gas() -> u64 {
    90_000
}
fn default_limit_order_executor_gas() -> u64 {
    13_308
}
fn default_limit_order_router_gas() -> u64 {
    10_000
}

impl Default for GasSettings {
    fn default() -> Self {
        Self {
            uniswap_v2: default_uniswap_v2_gas(),
            share_vault: default_share_vault_gas(),
            curve: default_curve_gas(),
            clmm_base: default_clmm_base_gas(),
            clmm_cross_tick: default_clmm_cross_tick_gas(),
            xpress_base: default_xpress_base_gas(),
            xpress_per_level: default_xpress_per_level_gas(),
            kyber_pmm: default_kyber_pmm_gas(),
            limit_order_base: default_limit_order_base_gas(),
            limit_order_executor_per_order: default_limit_order_executor_gas(),
            limit_order_router_per_order: default_limit_order_router_gas(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct LimitOrderSettings {
    /// Backup orders are appended until their making amount covers this multiple of the output
    #[serde(default = "default_backup_ratio")]
    pub backup_ratio: Decimal,
}

fn default_backup_ratio() -> Decimal {
    Decimal::new(13, 1) // 1.3
}

impl Default for LimitOrderSettings {
    fn default() -> Self {
        Self {
            backup_ratio: default_backup_ratio(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct StableSwapSettings {
    #[serde(default = "default_max_newton_iterations")]
    pub max_newton_iterations: u32,
}

fn default_max_newton_iterations() -> u32 {
    255
}

impl Default for StableSwapSettings {
    fn default() -> Self {
        Self {
            max_newton_iterations: default_max_newton_iterations(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    #[serde(default = "default_max_simulators")]
    pub max_simulators: usize,
}

fn default_max_simulators() -> usize {
    50_000
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_simulators: default_max_simulators(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TrackerSettings {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    #[serde(default)]
    pub gas: GasSettings,
    #[serde(default)]
    pub limit_order: LimitOrderSettings,
    #[serde(default)]
    pub stable_swap: StableSwapSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub tracker: TrackerSettings,
    /// Pool types the factory refuses to build
    #[serde(default)]
    pub disabled_pool_types: Vec<String>,
}

impl Settings {
    /// Loads `Config.toml` from the working directory (optional) plus `POOL_SIM__*` overrides.
    pub fn new() -> Result<Self, ConfigError> {
        Self::load("Config.toml")
    }

    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("POOL_SIM")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut settings: Self = s.try_deserialize()?;

        // Comma separated list is easier to set from a shell than a TOML array
        if let Ok(raw) = env::var("POOL_SIM_DISABLED_POOL_TYPES") {
            if let Some(list) = parse_string_list(&raw) {
                settings.disabled_pool_types = list;
            }
        }

        if settings.tracker.poll_interval_ms == 0 {
            return Err(ConfigError::Message("tracker.poll_interval_ms must be positive".to_string()));
        }

        Ok(settings)
    }

    pub fn is_pool_type_enabled(&self, pool_type: &str) -> bool {
        !self.disabled_pool_types.iter().any(|t| t == pool_type)
    }
}

fn parse_string_list(raw: &str) -> Option<Vec<String>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(
        trimmed
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    )
}
