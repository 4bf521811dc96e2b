//! Blob storage for photo originals and thumbnails.
//!
//! Keys are relative, `/`-separated paths such as `012/12345.jpg`. Each blob
//! write is atomic on its own; pairing the original with its thumbnail and
//! undoing half-written pairs is the gateway's job.

use async_trait::async_trait;
use log::{debug, warn};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::db::photos::BlobKeys;

const REVISION_MARKER: &str = "_r";
const REVISION_ID_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum ObjectStoreError {
    #[error("Invalid object key: {0}")]
    InvalidKey(String),
    #[error("IO error for {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Object store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), ObjectStoreError>;

    /// Removing a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError>;

    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError>;
}

/// Keys for the first upload of a photo, sharded by thousands of ids.
pub fn photo_keys(photo_id: i64) -> BlobKeys {
    let shard = format!("{:03}", photo_id / 1000);
    BlobKeys {
        filename: format!("{}/{}.jpg", shard, photo_id),
        icon_filename: format!("{}/{}_i.jpg", shard, photo_id),
    }
}

fn strip_revision_suffix(stem: &str) -> &str {
    match stem.rsplit_once(REVISION_MARKER) {
        Some((base, id))
            if !base.is_empty()
                && id.len() == REVISION_ID_LEN
                && id.chars().all(|c| c.is_ascii_hexdigit()) =>
        {
            base
        }
        _ => stem,
    }
}

/// Returns a fresh key for the same logical object: `dir/name.jpg` becomes
/// `dir/name_r<uuid>.jpg`. An existing revision suffix is replaced rather
/// than extended.
pub fn derive_revision_key(existing_key: &str) -> String {
    let (dir, file) = match existing_key.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, existing_key),
    };
    let (stem, extension) = match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (file, None),
    };

    let mut name = format!(
        "{}{}{}",
        strip_revision_suffix(stem),
        REVISION_MARKER,
        Uuid::new_v4().simple()
    );
    if let Some(ext) = extension {
        name.push('.');
        name.push_str(ext);
    }

    match dir {
        Some(dir) => format!("{}/{}", dir, name),
        None => name,
    }
}

pub fn derive_revision_keys(existing: &BlobKeys) -> BlobKeys {
    BlobKeys {
        filename: derive_revision_key(&existing.filename),
        icon_filename: derive_revision_key(&existing.icon_filename),
    }
}

/// Writes and removes original/thumbnail pairs with a bounded number of
/// attempts per blob.
#[derive(Clone)]
pub struct ObjectStoreGateway {
    store: Arc<dyn ObjectStore>,
    attempts: u32,
}

impl ObjectStoreGateway {
    pub fn new(store: Arc<dyn ObjectStore>, attempts: u32) -> Self {
        Self {
            store,
            attempts: attempts.max(1),
        }
    }

    async fn put_with_attempts(&self, key: &str, bytes: &[u8]) -> Result<(), ObjectStoreError> {
        let mut attempt = 1;
        loop {
            match self.store.put(key, bytes).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.attempts => {
                    debug!("put {} failed (attempt {}): {}", key, attempt, e);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn delete_with_attempts(&self, key: &str) -> Result<(), ObjectStoreError> {
        let mut attempt = 1;
        loop {
            match self.store.delete(key).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.attempts => {
                    debug!("delete {} failed (attempt {}): {}", key, attempt, e);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Stores both blobs. When the thumbnail cannot be written the original
    /// is removed again so no half pair remains.
    pub async fn put_pair(
        &self,
        keys: &BlobKeys,
        full: &[u8],
        thumbnail: &[u8],
    ) -> Result<(), ObjectStoreError> {
        self.put_with_attempts(&keys.filename, full).await?;

        if let Err(e) = self.put_with_attempts(&keys.icon_filename, thumbnail).await {
            if let Err(cleanup) = self.delete_with_attempts(&keys.filename).await {
                warn!(
                    "Failed to remove {} after thumbnail write failed: {}",
                    keys.filename, cleanup
                );
            }
            return Err(e);
        }

        Ok(())
    }

    /// Deletes both blobs, reporting the first failure after trying both.
    pub async fn delete_pair(&self, keys: &BlobKeys) -> Result<(), ObjectStoreError> {
        let primary = self.delete_with_attempts(&keys.filename).await;
        let thumbnail = self.delete_with_attempts(&keys.icon_filename).await;
        primary.and(thumbnail)
    }
}

fn validate_key(key: &str) -> Result<(), ObjectStoreError> {
    let valid = !key.is_empty()
        && !key.starts_with('/')
        && !key.contains('\\')
        && key
            .split('/')
            .all(|part| !part.is_empty() && part != "." && part != "..");
    if valid {
        Ok(())
    } else {
        Err(ObjectStoreError::InvalidKey(key.to_string()))
    }
}

/// Object store rooted in a local directory, also served under `/media`.
#[derive(Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new<P: AsRef<Path>>(root: P) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, ObjectStoreError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), ObjectStoreError> {
        let path = self.path_for(key)?;
        let io_err = |source| ObjectStoreError::Io {
            key: key.to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        // Write beside the target and rename so readers never see a partial blob.
        let temp_path = path.with_extension(format!("tmp-{}", Uuid::new_v4().simple()));
        if let Err(e) = tokio::fs::write(&temp_path, bytes).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(io_err(e));
        }
        if let Err(e) = tokio::fs::rename(&temp_path, &path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(io_err(e));
        }

        debug!("Stored {} ({} bytes)", key, bytes.len());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ObjectStoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        let path = self.path_for(key)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|source| ObjectStoreError::Io {
                key: key.to_string(),
                source,
            })
    }
}

#[derive(Default)]
struct Faults {
    put_matching: Option<String>,
    fail_deletes: bool,
    put_calls: usize,
}

/// In-process object store with switchable failures.
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
    faults: Arc<Mutex<Faults>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every put whose key contains `fragment` fail. An empty fragment
    /// fails all puts; `None` clears the fault.
    pub fn fail_puts_matching(&self, fragment: Option<&str>) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.put_matching = fragment.map(str::to_string);
        }
    }

    pub fn fail_deletes(&self, fail: bool) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.fail_deletes = fail;
        }
    }

    pub fn put_calls(&self) -> usize {
        self.faults.lock().map(|f| f.put_calls).unwrap_or(0)
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().ok()?.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn insert(&self, key: &str, bytes: Vec<u8>) {
        if let Ok(mut objects) = self.objects.lock() {
            objects.insert(key.to_string(), bytes);
        }
    }

    fn lock_objects(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>>, ObjectStoreError> {
        self.objects
            .lock()
            .map_err(|_| ObjectStoreError::Unavailable("object map lock poisoned".to_string()))
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), ObjectStoreError> {
        validate_key(key)?;
        {
            let mut faults = self
                .faults
                .lock()
                .map_err(|_| ObjectStoreError::Unavailable("fault lock poisoned".to_string()))?;
            faults.put_calls += 1;
            if let Some(fragment) = &faults.put_matching {
                if key.contains(fragment.as_str()) {
                    return Err(ObjectStoreError::Unavailable(format!("put {} rejected", key)));
                }
            }
        }
        self.lock_objects()?.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        validate_key(key)?;
        let fail = self.faults.lock().map(|f| f.fail_deletes).unwrap_or(false);
        if fail {
            return Err(ObjectStoreError::Unavailable(format!("delete {} rejected", key)));
        }
        self.lock_objects()?.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        validate_key(key)?;
        Ok(self.lock_objects()?.contains_key(key))
    }
}
