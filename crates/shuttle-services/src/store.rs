//! Durable key → bytes persistence.
//!
//! Keys come from `shuttle_core::single_key` / `multiple_key`. The store
//! does not interpret them. Concurrent writers of one key race; the last
//! write wins.

use std::future::Future;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use dashmap::DashMap;

/// Persistence collaborator used by the transfer handlers.
pub trait Store: Send + Sync + 'static {
    fn write(&self, key: &str, bytes: &[u8]) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn read(&self, key: &str) -> impl Future<Output = Result<Bytes, StoreError>> + Send;
}

// ── File store ────────────────────────────────────────────────────────────────

/// Plain byte dump: one file per key at `{root}/{key}.{extension}`.
///
/// Writes are not atomic. A write that fails part-way leaves a truncated
/// file behind; nothing cleans it up.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    extension: String,
}

impl FileStore {
    /// Create a store rooted at the given directory, creating it if needed.
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| StoreError::Io {
            key: root.display().to_string(),
            source,
        })?;
        Ok(Self {
            root,
            extension: extension.into(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path backing a key.
    pub fn path_for(&self, key: &str) -> PathBuf {
        if self.extension.is_empty() {
            self.root.join(key)
        } else {
            self.root.join(format!("{key}.{}", self.extension))
        }
    }
}

impl Store for FileStore {
    async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| StoreError::Io {
                key: key.to_string(),
                source,
            })?;
        tracing::trace!(key, path = %path.display(), bytes = bytes.len(), "stored");
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Bytes, StoreError> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}

// ── Memory store ──────────────────────────────────────────────────────────────

/// In-memory store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Bytes>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Store for MemoryStore {
    async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.entries
            .insert(key.to_string(), Bytes::copy_from_slice(bytes));
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Bytes, StoreError> {
        self.get(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("i/o on {key} failed: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no stored data for {0}")]
    NotFound(String),
}
