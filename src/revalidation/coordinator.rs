// src/revalidation/coordinator.rs
use crate::metrics::PoolMetrics;
use crate::probe::ProbeWorkerPool;
use crate::store::{RankedStore, StoreError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Snapshotting,
    Probing,
    Swapping,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevalidationReport {
    pub existing: usize,
    pub revalidated: usize,
    pub removed: usize,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug)]
pub enum RevalidationOutcome {
    /// Live store was empty, nothing to re-probe.
    Empty,
    /// Another cycle was still running.
    Skipped,
    Completed(RevalidationReport),
    /// Swap failed; the live store kept its pre-cycle content.
    Aborted(StoreError),
}

impl RevalidationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RevalidationOutcome::Empty => "empty",
            RevalidationOutcome::Skipped => "skipped",
            RevalidationOutcome::Completed(_) => "completed",
            RevalidationOutcome::Aborted(_) => "aborted",
        }
    }
}

/// Re-probes every live proxy into a staging namespace and swaps the survivors in.
///
/// Only one cycle runs at a time: a cycle requested while another is in progress is
/// skipped rather than queued, and the swap step itself is serialized. Addresses upserted
/// into the live store by an ingest that overlaps the probing phase are not part of the
/// snapshot and are dropped by the swap.
pub struct RevalidationCoordinator {
    live: RankedStore,
    staging: RankedStore,
    pool: Arc<ProbeWorkerPool>,
    metrics: Option<Arc<PoolMetrics>>,
    running: Mutex<()>,
    swap_lock: Mutex<()>,
    phase: RwLock<CyclePhase>,
}

impl RevalidationCoordinator {
    pub fn new(
        live: RankedStore,
        staging: RankedStore,
        pool: Arc<ProbeWorkerPool>,
        metrics: Option<Arc<PoolMetrics>>,
    ) -> Self {
        Self {
            live,
            staging,
            pool,
            metrics,
            running: Mutex::new(()),
            swap_lock: Mutex::new(()),
            phase: RwLock::new(CyclePhase::Idle),
        }
    }

    pub async fn phase(&self) -> CyclePhase {
        *self.phase.read().await
    }

    async fn enter(&self, phase: CyclePhase) {
        *self.phase.write().await = phase;
    }

    pub async fn run_cycle(&self) -> RevalidationOutcome {
        let Ok(_running) = self.running.try_lock() else {
            warn!("Revalidation already in progress, skipping this cycle");
            return RevalidationOutcome::Skipped;
        };

        let outcome = self.revalidate().await;
        self.enter(CyclePhase::Idle).await;

        if let Some(metrics) = &self.metrics {
            metrics.record_cycle("revalidate", outcome.label());
            if let RevalidationOutcome::Completed(report) = &outcome {
                metrics.record_removed(report.removed);
            }
            metrics.update_pool_size(self.live.count().await);
        }

        outcome
    }

    async fn revalidate(&self) -> RevalidationOutcome {
        self.enter(CyclePhase::Snapshotting).await;
        let existing = self.live.all().await;
        if existing.is_empty() {
            info!("No existing proxies to revalidate");
            return RevalidationOutcome::Empty;
        }
        let existing_count = existing.len();

        self.staging.clear().await;

        self.enter(CyclePhase::Probing).await;
        info!(
            "Revalidating {} existing proxies into {}",
            existing_count,
            self.staging.namespace()
        );
        self.pool.run(existing, &self.staging).await;

        self.enter(CyclePhase::Swapping).await;
        let swap = {
            let _swap = self.swap_lock.lock().await;
            self.live.atomic_replace_with(&self.staging).await
        };

        let outcome = match swap {
            Ok(revalidated) => {
                let removed = existing_count.saturating_sub(revalidated);
                info!(
                    "Revalidation complete. {} proxies updated, {} removed",
                    revalidated, removed
                );
                RevalidationOutcome::Completed(RevalidationReport {
                    existing: existing_count,
                    revalidated,
                    removed,
                    finished_at: Utc::now(),
                })
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "Revalidation swap failed, live store left unchanged until next cycle"
                );
                RevalidationOutcome::Aborted(e)
            }
        };

        self.staging.clear().await;
        outcome
    }
}
