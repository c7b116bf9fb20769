use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use tutor_core::domain::TenantKey;

use super::model::KnowledgeBase;

/// Artifact identity used to decide whether a cached base is still current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FileStamp {
    pub modified: SystemTime,
    pub len: u64,
}

struct CachedBase {
    stamp: FileStamp,
    base: Arc<KnowledgeBase>,
    last_used: u64,
}

/// Loaded bases keyed by tenant, least recently used evicted first.
///
/// A capacity of zero disables caching.
pub(crate) struct BaseCache {
    capacity: usize,
    clock: u64,
    entries: HashMap<TenantKey, CachedBase>,
}

impl BaseCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            clock: 0,
            entries: HashMap::new(),
        }
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.shrink();
    }

    /// Returns the base only while its stamp still matches the artifact on disk.
    pub fn get(&mut self, key: &TenantKey, stamp: FileStamp) -> Option<Arc<KnowledgeBase>> {
        self.clock += 1;
        let now = self.clock;
        let entry = self.entries.get_mut(key)?;
        if entry.stamp != stamp {
            return None;
        }
        entry.last_used = now;
        Some(Arc::clone(&entry.base))
    }

    pub fn insert(&mut self, key: TenantKey, stamp: FileStamp, base: Arc<KnowledgeBase>) {
        if self.capacity == 0 {
            return;
        }
        self.clock += 1;
        self.entries.insert(
            key,
            CachedBase {
                stamp,
                base,
                last_used: self.clock,
            },
        );
        self.shrink();
    }

    pub fn remove(&mut self, key: &TenantKey) {
        self.entries.remove(key);
    }

    pub fn tenants(&self) -> Vec<TenantKey> {
        let mut keys: Vec<TenantKey> = self.entries.keys().copied().collect();
        keys.sort();
        keys
    }

    fn shrink(&mut self) {
        while self.entries.len() > self.capacity {
            let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| *k)
            else {
                break;
            };
            self.entries.remove(&oldest);
            tracing::debug!(tenant = %oldest, "knowledge base evicted from cache");
        }
    }
}
