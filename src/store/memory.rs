// src/store/memory.rs
use super::backend::{LatencyScore, ProxyAddress, ProxyEntry, StoreBackend, StoreError};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

type Table = DashMap<ProxyAddress, LatencyScore>;

/// In-process backend. Each namespace is an `ArcSwap` over a concurrent table: writers
/// upsert into whichever table is current, readers work on the table they loaded, and
/// `replace` publishes a freshly built table with one pointer swap.
#[derive(Default)]
pub struct MemoryBackend {
    namespaces: DashMap<String, Arc<ArcSwap<Table>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, namespace: &str) -> Arc<ArcSwap<Table>> {
        if let Some(slot) = self.namespaces.get(namespace) {
            return slot.clone();
        }
        self.namespaces
            .entry(namespace.to_string())
            .or_insert_with(|| Arc::new(ArcSwap::from_pointee(Table::new())))
            .clone()
    }

    fn snapshot(&self, namespace: &str) -> Option<Arc<Table>> {
        self.namespaces.get(namespace).map(|slot| slot.load_full())
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    async fn upsert(
        &self,
        namespace: &str,
        address: &str,
        score: LatencyScore,
    ) -> Result<(), StoreError> {
        self.slot(namespace)
            .load()
            .insert(address.to_string(), score);
        Ok(())
    }

    async fn first(&self, namespace: &str) -> Result<Option<ProxyEntry>, StoreError> {
        let Some(table) = self.snapshot(namespace) else {
            return Ok(None);
        };
        let best = table
            .iter()
            .map(|e| ProxyEntry::new(e.key().clone(), *e.value()))
            .min_by(|a, b| a.rank_key().cmp(&b.rank_key()));
        Ok(best)
    }

    async fn ranked(&self, namespace: &str) -> Result<Vec<ProxyEntry>, StoreError> {
        let Some(table) = self.snapshot(namespace) else {
            return Ok(Vec::new());
        };
        let mut entries: Vec<ProxyEntry> = table
            .iter()
            .map(|e| ProxyEntry::new(e.key().clone(), *e.value()))
            .collect();
        entries.sort_by(|a, b| a.rank_key().cmp(&b.rank_key()));
        Ok(entries)
    }

    async fn len(&self, namespace: &str) -> Result<usize, StoreError> {
        Ok(self.snapshot(namespace).map_or(0, |table| table.len()))
    }

    async fn remove(&self, namespace: &str, addresses: &[&str]) -> Result<usize, StoreError> {
        let Some(table) = self.snapshot(namespace) else {
            return Ok(0);
        };
        let removed = addresses
            .iter()
            .filter(|address| table.remove(**address).is_some())
            .count();
        Ok(removed)
    }

    async fn clear(&self, namespace: &str) -> Result<(), StoreError> {
        if let Some(slot) = self.namespaces.get(namespace) {
            slot.store(Arc::new(Table::new()));
        }
        Ok(())
    }

    async fn replace(&self, namespace: &str, entries: Vec<ProxyEntry>) -> Result<(), StoreError> {
        let table: Table = entries
            .into_iter()
            .map(|entry| (entry.address, entry.latency_ms))
            .collect();
        self.slot(namespace).store(Arc::new(table));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
