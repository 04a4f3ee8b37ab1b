use crate::entity::PoolSnapshot;
use crate::metrics;
use crate::pool_simulator::{self, CalcAmountOutParams, CalcAmountOutResult, PoolSimulator, TokenAmount};
use crate::registry::PoolFactory;
use crate::settings::CacheSettings;
use crate::swap_limit::SwapLimit;
use dashmap::DashMap;
use ethers::types::{Address, U256};
use log::{debug, warn};
use rayon::prelude::*;
use std::sync::Arc;
use std::time::Instant;

/// A built simulator together with the snapshot it was built from.
#[derive(Debug, Clone)]
pub struct CachedPool {
    pub snapshot: Arc<PoolSnapshot>,
    pub simulator: Arc<dyn PoolSimulator>,
}

/// Best single-hop quote found by [`SimulatorCache::best_quote`].
#[derive(Debug, Clone)]
pub struct Quote {
    pub pool: Address,
    pub pool_type: String,
    pub result: CalcAmountOutResult,
}

/// Shared pool simulators keyed by pool address.
///
/// Readers get an `Arc` to an immutable simulator and may price against it from
/// any thread. Anything that wants to apply swaps takes a [`SimulatorCache::fork`]
/// instead, so cached state only ever changes by replacing an entry.
///
/// ## Features
///
/// - **Lock-free reads**: `DashMap` shards
/// - **Size bound**: entries beyond `max_simulators` are evicted on insert
/// - **Parallel quoting**: `best_quote` fans out over rayon
#[derive(Debug, Clone)]
pub struct SimulatorCache {
    pools: Arc<DashMap<Address, CachedPool>>,
    max_size: usize,
}

impl SimulatorCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            pools: Arc::new(DashMap::new()),
            max_size,
        }
    }

    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self::new(settings.max_simulators)
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    pub fn insert(&self, snapshot: PoolSnapshot, simulator: Box<dyn PoolSimulator>) {
        let address = snapshot.address;
        self.pools.insert(
            address,
            CachedPool {
                snapshot: Arc::new(snapshot),
                simulator: Arc::from(simulator),
            },
        );
        self.maybe_evict(&address);
        metrics::set_cache_size(self.pools.len() as f64);
    }

    /// Builds and caches every snapshot. Returns how many were cached.
    pub fn load(&self, factory: &PoolFactory, snapshots: Vec<PoolSnapshot>) -> usize {
        let built = factory.build_all(&snapshots);
        let mut loaded = 0;
        for (snapshot, simulator) in snapshots.into_iter().zip(built) {
            match simulator {
                Ok(simulator) => {
                    self.insert(snapshot, simulator);
                    loaded += 1;
                }
                Err(e) => warn!("skipping pool {:?} ({}): {}", snapshot.address, snapshot.pool_type, e),
            }
        }
        loaded
    }

    pub fn get(&self, address: &Address) -> Option<Arc<dyn PoolSimulator>> {
        match self.pools.get(address) {
            Some(entry) => {
                metrics::increment_cache_hit();
                Some(entry.simulator.clone())
            }
            None => {
                metrics::increment_cache_miss();
                None
            }
        }
    }

    pub fn get_snapshot(&self, address: &Address) -> Option<Arc<PoolSnapshot>> {
        self.pools.get(address).map(|entry| entry.snapshot.clone())
    }

    pub fn snapshots(&self) -> Vec<Arc<PoolSnapshot>> {
        self.pools.iter().map(|entry| entry.snapshot.clone()).collect()
    }

    /// Private, mutable copy of a cached simulator.
    pub fn fork(&self, address: &Address) -> Option<Box<dyn PoolSimulator>> {
        self.get(address).map(|simulator| simulator.clone_state())
    }

    pub fn remove(&self, address: &Address) -> Option<CachedPool> {
        self.pools.remove(address).map(|(_, pool)| pool)
    }

    /// Prices `amount_in` of `token_in` against every cached pool holding both
    /// tokens and returns the largest output. Failing pools are skipped.
    pub fn best_quote(
        &self,
        token_in: Address,
        amount_in: U256,
        token_out: Address,
        limit: Option<&dyn SwapLimit>,
    ) -> Option<Quote> {
        let started = Instant::now();
        let candidates: Vec<Arc<dyn PoolSimulator>> = self
            .pools
            .iter()
            .filter(|entry| {
                let tokens = entry.simulator.tokens();
                tokens.contains(&token_in) && tokens.contains(&token_out)
            })
            .map(|entry| entry.simulator.clone())
            .collect();

        let best = candidates
            .par_iter()
            .filter_map(|pool| {
                let params = CalcAmountOutParams {
                    token_amount_in: TokenAmount::new(token_in, amount_in),
                    token_out,
                    limit,
                };
                match pool_simulator::calc_amount_out(pool.as_ref(), params) {
                    Ok(result) => Some(Quote {
                        pool: pool.address(),
                        pool_type: pool.pool_type().to_string(),
                        result,
                    }),
                    Err(e) => {
                        debug!("pool {:?} cannot quote: {}", pool.address(), e);
                        None
                    }
                }
            })
            // ties go to the lower address so the answer does not depend on scheduling
            .max_by(|a, b| {
                a.result
                    .token_amount_out
                    .amount
                    .cmp(&b.result.token_amount_out.amount)
                    .then_with(|| b.pool.cmp(&a.pool))
            });

        metrics::record_best_quote(started.elapsed(), candidates.len());
        best
    }

    fn maybe_evict(&self, keep: &Address) {
        if self.pools.len() <= self.max_size {
            return;
        }
        let to_remove = self.pools.len() - self.max_size;
        let victims: Vec<Address> = self
            .pools
            .iter()
            .map(|entry| *entry.key())
            .filter(|address| address != keep)
            .take(to_remove)
            .collect();
        for address in &victims {
            self.pools.remove(address);
        }
        if !victims.is_empty() {
            debug!("Evicted {} simulators (size: {})", victims.len(), self.pools.len());
        }
    }
}
