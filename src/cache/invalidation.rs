//! Turns record mutations into the cache patterns that must be purged.

use async_trait::async_trait;
use log::debug;
use std::sync::Arc;

use super::{CacheError, CacheResult, CacheStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Log,
    Photo,
    Trig,
}

/// Records touched by a mutation. Absent ids contribute no patterns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationScope {
    pub trig_id: Option<i64>,
    pub user_id: Option<i64>,
    pub log_id: Option<i64>,
    pub photo_id: Option<i64>,
}

/// Un-namespaced patterns for one mutation.
///
/// List responses embed denormalized names and photos, so every event also
/// clears the list queries of the affected resource types. Marker searches
/// can exclude markers a user has logged, so log events clear them too.
pub fn invalidation_patterns(kind: MutationKind, scope: &MutationScope) -> Vec<String> {
    let mut patterns = vec!["stats:*".to_string()];

    match kind {
        MutationKind::Log => {
            patterns.push("logs:list:*".to_string());
            patterns.push("trigs:list:*".to_string());
        }
        MutationKind::Photo => {
            patterns.push("photos:list:*".to_string());
            patterns.push("logs:list:*".to_string());
        }
        MutationKind::Trig => patterns.push("trigs:list:*".to_string()),
    }

    if let Some(trig_id) = scope.trig_id {
        patterns.push(format!("trig:{}:*", trig_id));
    }
    if let Some(user_id) = scope.user_id {
        patterns.push(format!("user:{}:*", user_id));
    }
    if let (MutationKind::Log | MutationKind::Photo, Some(log_id)) = (kind, scope.log_id) {
        patterns.push(format!("log:{}:*", log_id));
    }
    if let (MutationKind::Photo, Some(photo_id)) = (kind, scope.photo_id) {
        patterns.push(format!("photo:{}:*", photo_id));
    }

    patterns
}

/// The `{app}:{environment}:` prefix shared by every key of one deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNamespace {
    prefix: String,
}

fn validate_segment(segment: &str) -> CacheResult<()> {
    if segment.is_empty() || segment.contains(':') || segment.contains('*') {
        return Err(CacheError::InvalidNamespace(segment.to_string()));
    }
    Ok(())
}

impl CacheNamespace {
    /// Segments may not be empty or contain `:` or `*`, so one namespace can
    /// never be a prefix of another.
    pub fn new(app: &str, environment: &str) -> CacheResult<Self> {
        validate_segment(app)?;
        validate_segment(environment)?;
        Ok(Self {
            prefix: format!("{}:{}:", app, environment),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn key(&self, resource_key: &str) -> String {
        format!("{}{}", self.prefix, resource_key)
    }
}

#[async_trait]
pub trait Invalidator: Send + Sync {
    /// Purges every pattern for the mutation. Returns the number of keys
    /// removed; zero is a normal outcome.
    async fn invalidate(&self, kind: MutationKind, scope: &MutationScope) -> CacheResult<u64>;
}

#[derive(Clone)]
pub struct CacheInvalidator {
    store: Arc<dyn CacheStore>,
    namespace: CacheNamespace,
}

impl CacheInvalidator {
    pub fn new(store: Arc<dyn CacheStore>, namespace: CacheNamespace) -> Self {
        Self { store, namespace }
    }
}

#[async_trait]
impl Invalidator for CacheInvalidator {
    /// Every pattern is attempted even after a failure; the first error is
    /// returned once all have run.
    async fn invalidate(&self, kind: MutationKind, scope: &MutationScope) -> CacheResult<u64> {
        let mut removed = 0;
        let mut first_error = None;
        for pattern in invalidation_patterns(kind, scope) {
            let namespaced = self.namespace.key(&pattern);
            match self.store.delete_by_pattern(&namespaced).await {
                Ok(count) => {
                    debug!("Invalidated {} ({} keys)", namespaced, count);
                    removed += count;
                }
                Err(e) => {
                    debug!("Invalidating {} failed: {}", namespaced, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }
}

/// Does nothing. For wiring code paths that have no cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInvalidator;

#[async_trait]
impl Invalidator for NoopInvalidator {
    async fn invalidate(&self, _kind: MutationKind, _scope: &MutationScope) -> CacheResult<u64> {
        Ok(0)
    }
}
