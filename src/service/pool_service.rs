// src/service/pool_service.rs
use crate::config::{Config, StoreBackendKind};
use crate::feed::CandidateFetcher;
use crate::metrics::PoolMetrics;
use crate::probe::{HttpProber, ProbeSummary, ProbeWorkerPool, Prober};
use crate::revalidation::{RevalidationCoordinator, RevalidationOutcome};
use crate::store::{
    MemoryBackend, ProxyAddress, ProxyEntry, RankedStore, RedisBackend, StoreBackend,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Where the ingest path gets its candidates from.
#[async_trait::async_trait]
pub trait CandidateSource: Send + Sync {
    async fn fetch(&self) -> Vec<ProxyAddress>;
}

#[async_trait::async_trait]
impl CandidateSource for CandidateFetcher {
    async fn fetch(&self) -> Vec<ProxyAddress> {
        CandidateFetcher::fetch(self).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub candidates: usize,
    pub probes: ProbeSummary,
    pub pool_size: usize,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub status: &'static str,
    pub count: usize,
    pub last_ingest: Option<DateTime<Utc>>,
    pub last_revalidation: Option<DateTime<Utc>>,
}

/// Owns the live store and drives ingest and revalidation cycles against it.
pub struct PoolService {
    config: Config,
    live: RankedStore,
    source: Arc<dyn CandidateSource>,
    pool: Arc<ProbeWorkerPool>,
    revalidator: RevalidationCoordinator,
    metrics: Option<Arc<PoolMetrics>>,
    last_ingest: RwLock<Option<DateTime<Utc>>>,
    last_revalidation: RwLock<Option<DateTime<Utc>>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl PoolService {
    /// Production wiring: configured store backend, HTTP feed, HTTP prober.
    pub fn from_config(config: Config, metrics: Option<Arc<PoolMetrics>>) -> Result<Self> {
        let fetcher = CandidateFetcher::new(&config.feed)?;
        let prober = HttpProber::new(&config.probe, &config.feed.allowed_schemes)?;
        let backend: Arc<dyn StoreBackend> = match config.store.backend {
            StoreBackendKind::Memory => Arc::new(MemoryBackend::new()),
            StoreBackendKind::Redis => Arc::new(
                RedisBackend::open(&config.store.url)
                    .with_context(|| format!("invalid store.url {}", config.store.url))?,
            ),
        };
        info!(backend = backend.name(), "Using store backend");
        Ok(Self::new(
            config,
            backend,
            Arc::new(fetcher),
            Arc::new(prober),
            metrics,
        ))
    }

    pub fn new(
        config: Config,
        backend: Arc<dyn StoreBackend>,
        source: Arc<dyn CandidateSource>,
        prober: Arc<dyn Prober>,
        metrics: Option<Arc<PoolMetrics>>,
    ) -> Self {
        let live = RankedStore::new(backend, config.store.primary_key.clone());
        let staging = live.sibling(config.store.staging_key.clone());
        let pool = Arc::new(ProbeWorkerPool::new(
            prober,
            config.probe.max_concurrency,
            metrics.clone(),
        ));
        let revalidator =
            RevalidationCoordinator::new(live.clone(), staging, pool.clone(), metrics.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            config,
            live,
            source,
            pool,
            revalidator,
            metrics,
            last_ingest: RwLock::new(None),
            last_revalidation: RwLock::new(None),
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn live_store(&self) -> &RankedStore {
        &self.live
    }

    // Read accessors

    pub async fn best_proxy(&self) -> Option<ProxyEntry> {
        self.live.best().await
    }

    pub async fn all_proxies(&self) -> Vec<ProxyAddress> {
        self.live.all().await
    }

    pub async fn count(&self) -> usize {
        self.live.count().await
    }

    pub async fn status(&self) -> PoolStatus {
        PoolStatus {
            status: "running",
            count: self.live.count().await,
            last_ingest: *self.last_ingest.read().await,
            last_revalidation: *self.last_revalidation.read().await,
        }
    }

    // Cycles

    /// Fetch candidates and probe them straight into the live store.
    pub async fn ingest_cycle(&self) -> IngestReport {
        let cycle_id = Uuid::new_v4();
        async {
            info!("Starting to fetch source proxies");
            let candidates = self.source.fetch().await;
            if let Some(metrics) = &self.metrics {
                metrics.update_feed_candidates(candidates.len());
            }

            let candidate_count = candidates.len();
            let probes = if candidates.is_empty() {
                info!("No proxies fetched from source");
                ProbeSummary::default()
            } else {
                info!("Validating {} fetched proxies", candidate_count);
                self.pool.run(candidates, &self.live).await
            };

            let pool_size = self.live.count().await;
            let finished_at = Utc::now();
            *self.last_ingest.write().await = Some(finished_at);

            if let Some(metrics) = &self.metrics {
                let outcome = if candidate_count == 0 { "empty" } else { "completed" };
                metrics.record_cycle("ingest", outcome);
                metrics.update_pool_size(pool_size);
            }

            info!(
                "Fetch and validate task finished. Current proxy count: {}",
                pool_size
            );
            IngestReport {
                candidates: candidate_count,
                probes,
                pool_size,
                finished_at,
            }
        }
        .instrument(info_span!("ingest", %cycle_id))
        .await
    }

    /// Re-probe the live store and swap in the survivors.
    pub async fn revalidate_cycle(&self) -> RevalidationOutcome {
        let cycle_id = Uuid::new_v4();
        async {
            let outcome = self.revalidator.run_cycle().await;
            if let RevalidationOutcome::Completed(report) = &outcome {
                *self.last_revalidation.write().await = Some(report.finished_at);
            }
            info!(
                "Revalidation task finished ({}). Current proxy count: {}",
                outcome.label(),
                self.live.count().await
            );
            outcome
        }
        .instrument(info_span!("revalidate", %cycle_id))
        .await
    }

    // Lifecycle

    /// Spawn the ingest and revalidation loops. They stop after [`PoolService::shutdown`],
    /// letting a cycle that is already running finish first.
    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        info!(
            "Scheduler started: ingest every {:?}, revalidation every {:?}",
            self.config.schedule.ingest_interval(),
            self.config.schedule.revalidate_interval()
        );
        vec![
            tokio::spawn(self.clone().ingest_loop()),
            tokio::spawn(self.clone().revalidate_loop()),
        ]
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    async fn ingest_loop(self: Arc<Self>) {
        let period = self.config.schedule.ingest_interval();
        let mut ticker = if self.config.schedule.ingest_on_start {
            interval(period)
        } else {
            interval_at(Instant::now() + period, period)
        };
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.ingest_cycle().await;
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Ingest loop shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn revalidate_loop(self: Arc<Self>) {
        let period = self.config.schedule.revalidate_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.revalidate_cycle().await;
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Revalidation loop shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Signal shutdown and wait for the loops, bounded by `schedule.drain_timeout_secs`.
    pub async fn drain(&self, handles: Vec<JoinHandle<()>>) {
        self.shutdown();
        let drain = futures::future::join_all(handles);
        match tokio::time::timeout(self.config.schedule.drain_timeout(), drain).await {
            Ok(_) => info!("Scheduler drained"),
            Err(_) => warn!(
                "Scheduler did not drain within {:?}, abandoning in-flight cycles",
                self.config.schedule.drain_timeout()
            ),
        }
    }
}
