//! Local key/value storage for the DevSpark auth client.
//!
//! This is the desktop counterpart of the website's `localStorage`: a plain
//! JSON file holding the cached login (`auth_token`, `user`), pending OAuth
//! state tokens and the persisted backend session. Nothing here is encrypted;
//! the store is a cache and callers treat it as a hint, not a source of truth.

mod cache;
mod file;
mod keys;
mod memory;
mod traits;

pub use cache::{LocalAuthCache, PendingOAuthState, PENDING_STATE_TTL_SECS};
pub use file::FileStore;
pub use keys::StorageKeys;
pub use memory::MemoryStore;
pub use traits::KeyValueStore;

use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// A lock guarding the store was poisoned by a panicking writer
    #[error("Storage lock poisoned")]
    Poisoned,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Encoding(e.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Open the file-backed store at `path` and wrap it in a cache.
pub fn open_file_cache(path: impl AsRef<Path>) -> StorageResult<LocalAuthCache> {
    let store = FileStore::open(path)?;
    Ok(LocalAuthCache::new(Arc::new(store)))
}
