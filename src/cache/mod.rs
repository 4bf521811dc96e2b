use async_trait::async_trait;

pub mod invalidation;
pub mod memory;
pub mod response;

pub use invalidation::{
    invalidation_patterns, CacheInvalidator, CacheNamespace, Invalidator, MutationKind,
    MutationScope, NoopInvalidator,
};
pub use memory::MemoryCacheStore;
pub use response::ResponseCache;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Invalid cache namespace segment: {0:?}")]
    InvalidNamespace(String),
    #[error("Invalid cache pattern: {0}")]
    InvalidPattern(String),
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Byte-valued key/value cache.
///
/// Patterns passed to `delete_by_pattern` may end in a single `*`, which
/// matches any suffix. A pattern without `*` names one exact key.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>) -> CacheResult<()>;

    /// Returns the number of keys removed, which may be zero.
    async fn delete_by_pattern(&self, pattern: &str) -> CacheResult<u64>;
}

/// How a delete pattern selects keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPattern<'a> {
    Exact(&'a str),
    Prefix(&'a str),
}

impl<'a> KeyPattern<'a> {
    pub fn parse(pattern: &'a str) -> CacheResult<Self> {
        match pattern.find('*') {
            None => Ok(KeyPattern::Exact(pattern)),
            Some(pos) if pos == pattern.len() - 1 => Ok(KeyPattern::Prefix(&pattern[..pos])),
            Some(_) => Err(CacheError::InvalidPattern(pattern.to_string())),
        }
    }

    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeyPattern::Exact(exact) => key == *exact,
            KeyPattern::Prefix(prefix) => key.starts_with(prefix),
        }
    }
}
