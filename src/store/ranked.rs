// src/store/ranked.rs
use super::backend::{LatencyScore, ProxyAddress, ProxyEntry, StoreBackend, StoreError};
use super::memory::MemoryBackend;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Handle onto one namespace of a [`StoreBackend`], ranked by ascending latency.
///
/// Every accessor is total: a backend failure is logged once and the call returns its
/// empty/no-op result. Only [`RankedStore::atomic_replace_with`] reports failure, because a
/// revalidation cycle has to abort when its swap does not happen.
#[derive(Clone)]
pub struct RankedStore {
    backend: Arc<dyn StoreBackend>,
    namespace: Arc<str>,
}

impl RankedStore {
    pub fn new(backend: Arc<dyn StoreBackend>, namespace: impl Into<String>) -> Self {
        Self {
            backend,
            namespace: Arc::from(namespace.into()),
        }
    }

    /// A store backed by a fresh [`MemoryBackend`].
    pub fn in_memory(namespace: impl Into<String>) -> Self {
        Self::new(Arc::new(MemoryBackend::new()), namespace)
    }

    /// Another namespace on the same backend.
    pub fn sibling(&self, namespace: impl Into<String>) -> Self {
        Self::new(self.backend.clone(), namespace)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub async fn upsert(&self, address: &str, score: LatencyScore) {
        let result = self.backend.upsert(&self.namespace, address, score).await;
        self.degrade("upsert", result, ())
    }

    pub async fn best(&self) -> Option<ProxyEntry> {
        let result = self.backend.first(&self.namespace).await;
        self.degrade("best", result, None)
    }

    pub async fn all(&self) -> Vec<ProxyAddress> {
        self.entries()
            .await
            .into_iter()
            .map(|entry| entry.address)
            .collect()
    }

    pub async fn entries(&self) -> Vec<ProxyEntry> {
        let result = self.backend.ranked(&self.namespace).await;
        self.degrade("entries", result, Vec::new())
    }

    pub async fn count(&self) -> usize {
        let result = self.backend.len(&self.namespace).await;
        self.degrade("count", result, 0)
    }

    pub async fn remove(&self, address: &str) -> bool {
        let result = self.backend.remove(&self.namespace, &[address]).await;
        self.degrade("remove", result, 0) > 0
    }

    pub async fn remove_many(&self, addresses: &HashSet<ProxyAddress>) -> usize {
        if addresses.is_empty() {
            return 0;
        }
        let keys: Vec<&str> = addresses.iter().map(String::as_str).collect();
        let result = self.backend.remove(&self.namespace, &keys).await;
        let removed = self.degrade("remove_many", result, 0);
        debug!(namespace = %self.namespace, removed, "Removed proxies");
        removed
    }

    pub async fn clear(&self) {
        let result = self.backend.clear(&self.namespace).await;
        self.degrade("clear", result, ())
    }

    /// Replace this store's whole content with a snapshot of `other` in one step.
    ///
    /// Returns the number of entries installed. On error nothing has been applied and this
    /// store still holds its previous content.
    pub async fn atomic_replace_with(&self, other: &RankedStore) -> Result<usize, StoreError> {
        let same_backend = std::ptr::eq(
            Arc::as_ptr(&self.backend) as *const (),
            Arc::as_ptr(&other.backend) as *const (),
        );
        if same_backend && self.namespace == other.namespace {
            return self.backend.len(&self.namespace).await;
        }

        let snapshot = other.backend.ranked(&other.namespace).await.map_err(|e| {
            warn!(
                namespace = %self.namespace,
                source_namespace = %other.namespace,
                error = %e,
                "Could not snapshot source store, replace aborted"
            );
            e
        })?;

        let size = snapshot.len();
        self.backend
            .replace(&self.namespace, snapshot)
            .await
            .map_err(|e| {
                warn!(namespace = %self.namespace, error = %e, "Atomic replace failed");
                e
            })?;

        debug!(
            namespace = %self.namespace,
            source_namespace = %other.namespace,
            entries = size,
            "Replaced store content"
        );
        Ok(size)
    }

    fn degrade<T>(&self, op: &'static str, result: Result<T, StoreError>, fallback: T) -> T {
        match result {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    namespace = %self.namespace,
                    backend = self.backend.name(),
                    op,
                    error = %e,
                    "Store operation failed, returning empty result"
                );
                fallback
            }
        }
    }
}

impl fmt::Debug for RankedStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RankedStore")
            .field("backend", &self.backend.name())
            .field("namespace", &self.namespace)
            .finish()
    }
}
