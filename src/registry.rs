//! # Pool Factory Registry
//!
//! Maps a snapshot's pool type string to the constructor of its simulator. A
//! process normally builds one factory at start-up, installs it with [`install`]
//! and resolves it everywhere else with [`global`]. Registering the same pool type
//! twice is a configuration error.

use crate::adapters::clmm::ClmmSimulator;
use crate::adapters::curve::CurvePlainSimulator;
use crate::adapters::curve_oracle::CurveOracleSimulator;
use crate::adapters::kyber_pmm::KyberPmmSimulator;
use crate::adapters::lo1inch::Lo1inchSimulator;
use crate::adapters::pool_types;
use crate::adapters::share_vault::ShareVaultSimulator;
use crate::adapters::uniswap_v2::UniswapV2Simulator;
use crate::adapters::xpress::XpressSimulator;
use crate::entity::PoolSnapshot;
use crate::error::SimulatorError;
use crate::pool_simulator::PoolSimulator;
use crate::settings::Settings;
use once_cell::sync::OnceCell;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fmt;

pub type PoolFactoryFn = fn(&PoolSnapshot, &Settings) -> Result<Box<dyn PoolSimulator>, SimulatorError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Pool type already registered: {0}")]
    DuplicatePoolType(String),
    #[error("Global pool factory already initialized")]
    AlreadyInitialized,
}

static GLOBAL: OnceCell<PoolFactory> = OnceCell::new();

fn boxed<T: PoolSimulator + 'static>(simulator: T) -> Box<dyn PoolSimulator> {
    Box::new(simulator)
}

/// Constructor table plus the settings every constructor receives.
pub struct PoolFactory {
    constructors: HashMap<String, PoolFactoryFn>,
    settings: Settings,
}

impl fmt::Debug for PoolFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolFactory")
            .field("pool_types", &self.pool_types())
            .field("settings", &self.settings)
            .finish()
    }
}

impl PoolFactory {
    /// Empty factory, register constructors with [`PoolFactory::register`].
    pub fn new(settings: Settings) -> Self {
        Self {
            constructors: HashMap::new(),
            settings,
        }
    }

    /// Factory with every built-in family registered.
    pub fn with_defaults(settings: Settings) -> Result<Self, RegistryError> {
        let mut factory = Self::new(settings);
        factory.register(pool_types::UNISWAP_V2, |s, c| UniswapV2Simulator::new(s, c).map(boxed))?;
        factory.register(pool_types::SHARE_VAULT, |s, c| ShareVaultSimulator::new(s, c).map(boxed))?;
        factory.register(pool_types::CURVE_PLAIN, |s, c| CurvePlainSimulator::new(s, c).map(boxed))?;
        factory.register(pool_types::CURVE_PLAIN_ORACLE, |s, c| CurveOracleSimulator::new(s, c).map(boxed))?;
        factory.register(pool_types::CLMM, |s, c| ClmmSimulator::new(s, c).map(boxed))?;
        factory.register(pool_types::XPRESS, |s, c| XpressSimulator::new(s, c).map(boxed))?;
        factory.register(pool_types::KYBER_PMM, |s, c| KyberPmmSimulator::new(s, c).map(boxed))?;
        factory.register(pool_types::LO1INCH, |s, c| Lo1inchSimulator::new(s, c).map(boxed))?;
        Ok(factory)
    }

    pub fn register(&mut self, pool_type: &str, constructor: PoolFactoryFn) -> Result<(), RegistryError> {
        if self.constructors.contains_key(pool_type) {
            return Err(RegistryError::DuplicatePoolType(pool_type.to_string()));
        }
        self.constructors.insert(pool_type.to_string(), constructor);
        Ok(())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Registered pool types, sorted.
    pub fn pool_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn supports(&self, pool_type: &str) -> bool {
        self.constructors.contains_key(pool_type) && self.settings.is_pool_type_enabled(pool_type)
    }

    pub fn build(&self, snapshot: &PoolSnapshot) -> Result<Box<dyn PoolSimulator>, SimulatorError> {
        if !self.settings.is_pool_type_enabled(&snapshot.pool_type) {
            return Err(SimulatorError::UnsupportedPoolType(format!("{} (disabled)", snapshot.pool_type)));
        }
        let constructor = self
            .constructors
            .get(&snapshot.pool_type)
            .ok_or_else(|| SimulatorError::UnsupportedPoolType(snapshot.pool_type.clone()))?;

        let simulator = constructor(snapshot, &self.settings)?;
        tracing::debug!("built {} simulator for {:?}", snapshot.pool_type, snapshot.address);
        Ok(simulator)
    }

    /// Builds many snapshots in parallel, keeping input order.
    pub fn build_all(&self, snapshots: &[PoolSnapshot]) -> Vec<Result<Box<dyn PoolSimulator>, SimulatorError>> {
        snapshots.par_iter().map(|snapshot| self.build(snapshot)).collect()
    }
}

/// Installs the process-wide factory. Fails if one was already installed or
/// [`global`] already initialized the default.
pub fn install(factory: PoolFactory) -> Result<(), RegistryError> {
    GLOBAL.set(factory).map_err(|_| RegistryError::AlreadyInitialized)?;
    log::info!("pool factory installed");
    Ok(())
}

/// The installed factory, or a default one with built-in families and default settings.
pub fn global() -> Result<&'static PoolFactory, RegistryError> {
    GLOBAL.get_or_try_init(|| PoolFactory::with_defaults(Settings::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::TokenRef;
    use ethers::types::Address;

    fn v2_snapshot() -> PoolSnapshot {
        PoolSnapshot {
            address: Address::repeat_byte(0x42),
            exchange: "uniswap-v2".to_string(),
            pool_type: pool_types::UNISWAP_V2.to_string(),
            tokens: vec![
                TokenRef::new(Address::repeat_byte(1), 18, "A"),
                TokenRef::new(Address::repeat_byte(2), 18, "B"),
            ],
            reserves: vec!["1000000".to_string(), "2000000".to_string()],
            ..PoolSnapshot::default()
        }
    }

    #[test]
    fn test_defaults_cover_every_family() {
        let factory = PoolFactory::with_defaults(Settings::default()).unwrap();
        assert_eq!(
            factory.pool_types(),
            vec!["clmm", "curve-plain", "curve-plain-oracle", "kyber-pmm", "lo1inch", "share-vault", "uniswap-v2", "xpress"]
        );
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut factory = PoolFactory::with_defaults(Settings::default()).unwrap();
        let err = factory
            .register(pool_types::CLMM, |s, c| ClmmSimulator::new(s, c).map(boxed))
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicatePoolType("clmm".to_string()));
    }

    #[test]
    fn test_build_dispatches_on_pool_type() {
        let factory = PoolFactory::with_defaults(Settings::default()).unwrap();
        let simulator = factory.build(&v2_snapshot()).unwrap();
        assert_eq!(simulator.pool_type(), "uniswap-v2");
        assert_eq!(simulator.address(), Address::repeat_byte(0x42));

        let mut unknown = v2_snapshot();
        unknown.pool_type = "balancer-weighted".to_string();
        assert_eq!(
            factory.build(&unknown).unwrap_err(),
            SimulatorError::UnsupportedPoolType("balancer-weighted".to_string())
        );
    }

    #[test]
    fn test_disabled_pool_types_are_refused() {
        let settings = Settings {
            disabled_pool_types: vec!["uniswap-v2".to_string()],
            ..Settings::default()
        };
        let factory = PoolFactory::with_defaults(settings).unwrap();
        assert!(!factory.supports("uniswap-v2"));
        assert!(matches!(
            factory.build(&v2_snapshot()),
            Err(SimulatorError::UnsupportedPoolType(_))
        ));
    }

    #[test]
    fn test_build_all_keeps_order() {
        let factory = PoolFactory::with_defaults(Settings::default()).unwrap();
        let mut broken = v2_snapshot();
        broken.reserves = vec!["12".to_string()];
        let built = factory.build_all(&[v2_snapshot(), broken]);
        assert!(built[0].is_ok());
        assert!(built[1].is_err());
    }
}
