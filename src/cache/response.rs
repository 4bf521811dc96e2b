use log::warn;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use super::{CacheNamespace, CacheStore};

pub fn trig_detail_key(trig_id: i64) -> String {
    format!("trig:{}:detail", trig_id)
}

/// Key for one list query. The query text is hashed so arbitrary
/// parameters cannot inject `:` or `*` into the key.
pub fn trig_list_key(query: &str) -> String {
    let digest = Sha256::digest(query.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("trigs:list:{}", hex)
}

pub fn site_stats_key() -> String {
    "stats:site:summary".to_string()
}

/// Read-through storage for serialized JSON responses. Cache failures never
/// fail a read; they are logged and treated as misses.
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    namespace: CacheNamespace,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>, namespace: CacheNamespace) -> Self {
        Self { store, namespace }
    }

    pub async fn get(&self, resource_key: &str) -> Option<Vec<u8>> {
        let key = self.namespace.key(resource_key);
        match self.store.get(&key).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Cache read for {} failed: {}", key, e);
                None
            }
        }
    }

    pub async fn put(&self, resource_key: &str, body: Vec<u8>) {
        let key = self.namespace.key(resource_key);
        if let Err(e) = self.store.set(&key, body).await {
            warn!("Cache write for {} failed: {}", key, e);
        }
    }
}
