//! Account pool facade
//!
//! Ties the store to the configured cooldown and is the entry point for the
//! request surface and the background recycler. Adds logging, metrics and a
//! health summary on top of the allocator, recycler and reconciliation passes.

use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use crate::clock;
use crate::error::{Error, Result};
use crate::reconcile::ReconcileReport;
use crate::record::Account;
use crate::recycler::SweepReport;
use crate::store::{PoolSnapshot, PoolStore};

/// The three-stage account pool: available → cooldown → released.
pub struct AccountPool {
    store: PoolStore,
    cooldown: Duration,
}

impl AccountPool {
    pub fn new(store: PoolStore, cooldown: Duration) -> Self {
        info!(cooldown_secs = cooldown.as_secs(), "account pool initialized");
        Self { store, cooldown }
    }

    pub fn store(&self) -> &PoolStore {
        &self.store
    }

    /// Allocate one account, starting its cooldown now.
    pub async fn allocate(&self) -> Result<Account> {
        self.allocate_at(SystemTime::now()).await
    }

    /// Allocate one account with an explicit allocation time.
    pub async fn allocate_at(&self, now: SystemTime) -> Result<Account> {
        let result = crate::allocator::allocate(&self.store, now).await;
        let outcome = match &result {
            Ok(_) => "allocated",
            Err(Error::OutOfStock) => {
                debug!("allocation requested but no account available");
                "out_of_stock"
            }
            Err(Error::StoreUnavailable(msg)) => {
                warn!(error = %msg, "allocation failed");
                "store_error"
            }
        };
        metrics::counter!("account_pool_allocations_total", "outcome" => outcome).increment(1);
        result
    }

    /// Sweep the cooldown pool now.
    pub async fn sweep(&self) -> Result<SweepReport> {
        self.sweep_at(SystemTime::now()).await
    }

    /// Sweep the cooldown pool as of `now`.
    pub async fn sweep_at(&self, now: SystemTime) -> Result<SweepReport> {
        let report = crate::recycler::sweep(&self.store, self.cooldown, now).await?;
        if report.moved > 0 {
            metrics::counter!("account_pool_recycled_total").increment(report.moved as u64);
            info!(
                moved = report.moved,
                retained = report.retained,
                malformed = report.malformed,
                "recycled accounts to released pool"
            );
        } else {
            debug!(
                retained = report.retained,
                malformed = report.malformed,
                "no accounts ready for recycling"
            );
        }
        Ok(report)
    }

    /// Repair duplicates left by an interrupted allocation or sweep.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let report = crate::reconcile::reconcile(&self.store).await?;
        if report.total() > 0 {
            warn!(
                available_removed = report.available_removed,
                cooldown_removed = report.cooldown_removed,
                released_removed = report.released_removed,
                "removed duplicate accounts left by an interrupted write"
            );
        } else {
            debug!("pools are consistent");
        }
        Ok(report)
    }

    /// Pool health summary for the health endpoint, as of `now`.
    ///
    /// `healthy` while at least one account is available, `unhealthy`
    /// otherwise. Also refreshes the pool size gauges.
    pub async fn health(&self, now: SystemTime) -> Result<serde_json::Value> {
        let snapshot = self.store.snapshot().await?;
        record_sizes(&snapshot);

        let next_release_secs = snapshot
            .cooldown
            .iter()
            .filter_map(|line| line.entry())
            .map(|entry| clock::remaining(entry, now, self.cooldown).as_secs())
            .min();

        let status = if snapshot.available.is_empty() {
            "unhealthy"
        } else {
            "healthy"
        };

        Ok(serde_json::json!({
            "status": status,
            "accounts_available": snapshot.available.len(),
            "accounts_cooling_down": snapshot.cooling_down(),
            "accounts_released": snapshot.released.len(),
            "malformed_cooldown_lines": snapshot.malformed(),
            "cooldown_secs": self.cooldown.as_secs(),
            "next_release_secs": next_release_secs,
        }))
    }
}

fn record_sizes(snapshot: &PoolSnapshot) {
    metrics::gauge!("account_pool_size", "pool" => "available").set(snapshot.available.len() as f64);
    metrics::gauge!("account_pool_size", "pool" => "cooldown").set(snapshot.cooling_down() as f64);
    metrics::gauge!("account_pool_size", "pool" => "released").set(snapshot.released.len() as f64);
}
