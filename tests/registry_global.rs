//! Integration test for the process-wide pool factory
//!
//! Lives in its own test binary because the factory can be initialized once per
//! process.

use mig_pool_simulator::registry::{self, PoolFactory, RegistryError};
use mig_pool_simulator::Settings;
use std::thread;

#[test]
fn test_global_factory_initializes_once() {
    let addresses: Vec<usize> = (0..8)
        .map(|_| thread::spawn(|| registry::global().expect("default factory") as *const PoolFactory as usize))
        .collect::<Vec<_>>()
        .into_iter()
        .map(|h| h.join().expect("worker thread"))
        .collect();

    assert!(addresses.windows(2).all(|w| w[0] == w[1]), "every caller sees the same factory");
    assert!(registry::global().unwrap().supports("clmm"));

    let late = PoolFactory::with_defaults(Settings::default()).unwrap();
    assert_eq!(registry::install(late).unwrap_err(), RegistryError::AlreadyInitialized);
}
