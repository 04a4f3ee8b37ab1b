//! # Snapshot Sources
//!
//! The pricing core never talks to a chain. Snapshots come from two collaborators:
//!
//! - a [`PoolListUpdater`] that pages through newly listed pools,
//! - a [`PoolTracker`] that re-reads the state of a known pool.
//!
//! [`SnapshotPoller`] drives both on a fixed cadence and swaps rebuilt simulators
//! into a [`SimulatorCache`]. Readers holding the previous `Arc` keep pricing
//! against the old state until they fetch again.

use crate::cache::SimulatorCache;
use crate::entity::PoolSnapshot;
use crate::metrics;
use crate::pool_simulator::PoolSimulator;
use crate::registry::PoolFactory;
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::time::{interval, Duration, MissedTickBehavior};

#[async_trait]
pub trait PoolTracker: Send + Sync {
    /// Fresh snapshot for a pool the caller already knows.
    async fn get_new_pool_state(&self, pool: &PoolSnapshot) -> Result<PoolSnapshot>;
}

#[async_trait]
pub trait PoolListUpdater: Send + Sync {
    /// Pools listed since `cursor`, plus the cursor to resume from next time.
    async fn get_new_pools(&self, cursor: Option<String>) -> Result<(Vec<PoolSnapshot>, Option<String>)>;
}

/// Re-tracks `snapshot` and builds a simulator from the result.
pub async fn refresh_simulator(
    tracker: &dyn PoolTracker,
    factory: &PoolFactory,
    snapshot: &PoolSnapshot,
) -> Result<(PoolSnapshot, Box<dyn PoolSimulator>)> {
    let fresh = match tracker.get_new_pool_state(snapshot).await {
        Ok(fresh) => fresh,
        Err(e) => {
            metrics::increment_tracker_refresh(&snapshot.pool_type, "track_error");
            return Err(e.context(format!("tracking pool {:?}", snapshot.address)));
        }
    };
    let simulator = match factory.build(&fresh) {
        Ok(simulator) => simulator,
        Err(e) => {
            metrics::increment_tracker_refresh(&snapshot.pool_type, "build_error");
            return Err(e).with_context(|| format!("building pool {:?}", snapshot.address));
        }
    };
    metrics::increment_tracker_refresh(&snapshot.pool_type, "ok");
    Ok((fresh, simulator))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollStats {
    pub listed: usize,
    pub refreshed: usize,
    pub failed: usize,
}

impl std::fmt::Display for PollStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listed={} refreshed={} failed={}", self.listed, self.refreshed, self.failed)
    }
}

/// Background loop feeding a [`SimulatorCache`].
pub struct SnapshotPoller {
    tracker: Arc<dyn PoolTracker>,
    updater: Arc<dyn PoolListUpdater>,
    factory: Arc<PoolFactory>,
    cache: SimulatorCache,
    cursor: Mutex<Option<String>>,
    poll_interval: Duration,
}

impl SnapshotPoller {
    pub fn new(
        tracker: Arc<dyn PoolTracker>,
        updater: Arc<dyn PoolListUpdater>,
        factory: Arc<PoolFactory>,
        cache: SimulatorCache,
    ) -> Self {
        // tokio intervals panic on a zero period
        let poll_interval = Duration::from_millis(factory.settings().tracker.poll_interval_ms.max(1));
        Self {
            tracker,
            updater,
            factory,
            cache,
            cursor: Mutex::new(None),
            poll_interval,
        }
    }

    pub fn cache(&self) -> &SimulatorCache {
        &self.cache
    }

    /// One round: list new pools, then refresh every cached one.
    pub async fn poll_once(&self) -> Result<PollStats> {
        let mut stats = PollStats::default();

        let mut cursor = self.cursor.lock().await;
        let (new_pools, next) = self.updater.get_new_pools(cursor.clone()).await?;
        *cursor = next;
        drop(cursor);

        stats.listed = new_pools.len();
        let loaded = self.cache.load(&self.factory, new_pools);
        stats.failed += stats.listed - loaded;

        for snapshot in self.cache.snapshots() {
            match refresh_simulator(self.tracker.as_ref(), &self.factory, &snapshot).await {
                Ok((fresh, simulator)) => {
                    self.cache.insert(fresh, simulator);
                    stats.refreshed += 1;
                }
                Err(e) => {
                    warn!("keeping previous state: {:#}", e);
                    stats.failed += 1;
                }
            }
        }
        Ok(stats)
    }

    /// Polls until `shutdown` flips to `true` or its sender goes away.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("Starting snapshot poller (interval {:?})", self.poll_interval);
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut iteration = 0u64;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Snapshot poller stopped after {} rounds", iteration);
                        return;
                    }
                    continue;
                }
            }
            iteration += 1;

            match self.poll_once().await {
                Ok(stats) => info!("[poll #{}] {} (cached: {})", iteration, stats, self.cache.len()),
                Err(e) => error!("[poll #{}] listing failed: {:#}", iteration, e),
            }
        }
    }
}
