// src/store/backend.rs
use async_trait::async_trait;
use serde::Serialize;

/// `scheme://host:port` of a forwarding proxy. Compared by exact string match.
pub type ProxyAddress = String;

/// Round-trip time of the most recent successful probe, in milliseconds.
pub type LatencyScore = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyEntry {
    pub address: ProxyAddress,
    pub latency_ms: LatencyScore,
}

impl ProxyEntry {
    pub fn new(address: impl Into<ProxyAddress>, latency_ms: LatencyScore) -> Self {
        Self {
            address: address.into(),
            latency_ms,
        }
    }

    /// Ranking key: ascending latency, ties broken by ascending address.
    pub(crate) fn rank_key(&self) -> (LatencyScore, &str) {
        (self.latency_ms, self.address.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend unavailable: {0}")]
    Unavailable(String),

    #[error("failed to replace namespace {namespace}: {reason}")]
    Replace { namespace: String, reason: String },
}

/// Raw, fallible access to a ranked key-value structure split into named namespaces.
///
/// Implementations must make `upsert` atomic per key and `replace` a single indivisible
/// step for readers of the target namespace. Ranked reads return entries ordered by
/// [`ProxyEntry::rank_key`].
#[async_trait]
pub trait StoreBackend: Send + Sync {
    async fn upsert(
        &self,
        namespace: &str,
        address: &str,
        score: LatencyScore,
    ) -> Result<(), StoreError>;

    async fn first(&self, namespace: &str) -> Result<Option<ProxyEntry>, StoreError>;

    async fn ranked(&self, namespace: &str) -> Result<Vec<ProxyEntry>, StoreError>;

    async fn len(&self, namespace: &str) -> Result<usize, StoreError>;

    /// Removes every listed address that is present; returns how many were removed.
    async fn remove(&self, namespace: &str, addresses: &[&str]) -> Result<usize, StoreError>;

    async fn clear(&self, namespace: &str) -> Result<(), StoreError>;

    /// Discards the namespace's content and installs `entries` in its place.
    async fn replace(&self, namespace: &str, entries: Vec<ProxyEntry>) -> Result<(), StoreError>;

    fn name(&self) -> &'static str;
}
