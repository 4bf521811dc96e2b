use async_trait::async_trait;
use log::debug;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{CacheError, CacheResult, CacheStore, KeyPattern};

/// Ordered in-process cache. Prefix deletes walk a key range instead of the
/// whole map.
#[derive(Clone, Default)]
pub struct MemoryCacheStore {
    entries: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every operation fail until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .map(|entries| entries.contains_key(key))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> CacheResult<MutexGuard<'_, BTreeMap<String, Vec<u8>>>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("memory cache switched off".to_string()));
        }
        self.entries
            .lock()
            .map_err(|_| CacheError::Unavailable("cache lock poisoned".to_string()))
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let value = self.lock()?.get(key).cloned();
        if value.is_some() {
            debug!("Memory cache hit for {}", key);
        } else {
            debug!("Memory cache miss for {}", key);
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> CacheResult<()> {
        self.lock()?.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete_by_pattern(&self, pattern: &str) -> CacheResult<u64> {
        let pattern = KeyPattern::parse(pattern)?;
        let mut entries = self.lock()?;

        let removed = match pattern {
            KeyPattern::Exact(key) => u64::from(entries.remove(key).is_some()),
            KeyPattern::Prefix(prefix) => {
                let doomed: Vec<String> = entries
                    .range(prefix.to_string()..)
                    .take_while(|(key, _)| key.starts_with(prefix))
                    .map(|(key, _)| key.clone())
                    .collect();
                for key in &doomed {
                    entries.remove(key);
                }
                doomed.len() as u64
            }
        };

        Ok(removed)
    }
}
