//! Backing-store abstraction and persisted key layout.
//!
//! The datastore persists everything through an opaque ordered map from
//! string keys to byte blobs. Writes are atomic at the single-key level;
//! nothing stronger is assumed. Two implementations ship with the crate:
//! [`MemoryStore`] for tests and ephemeral vaults, and [`FsStore`] for
//! one-file-per-key persistence.
//!
//! # Key layout
//!
//! | Key | Payload |
//! |---|---|
//! | `keys` | encrypted key blob (envelope text) |
//! | `salt` | hex-encoded salt bytes |
//! | `items/<uuid>` | encrypted record blob (envelope text) |

pub mod fs;
pub mod memory;

use thiserror::Error;

use crate::types::RecordId;

pub use fs::FsStore;
pub use memory::MemoryStore;

/// Backing-store key holding the encrypted key blob.
pub const KEYS_KEY: &str = "keys";

/// Backing-store key holding the hex-encoded salt.
pub const SALT_KEY: &str = "salt";

/// Prefix under which encrypted record blobs are stored.
pub const ITEM_PREFIX: &str = "items/";

/// Returns the backing-store key for a record id.
#[must_use]
pub fn item_key(id: &RecordId) -> String {
    format!("{ITEM_PREFIX}{id}")
}

/// Result type for backing-store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O operation failed.
    #[error("I/O error during {context}: {source}")]
    Io {
        /// Context describing the operation.
        context: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A backend-specific failure.
    #[error("{0}")]
    Backend(String),
}

impl StoreError {
    /// Creates an I/O error with context.
    pub fn io<S: Into<String>>(context: S, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Creates a backend error with a message.
    pub fn backend<S: Into<String>>(message: S) -> Self {
        Self::Backend(message.into())
    }
}

/// Persistent map from string keys to opaque byte blobs.
///
/// Implementations must make [`put`](BackingStore::put) atomic per key: a
/// crashed write may lose the value but must never leave a torn one
/// readable alongside other keys. The datastore owns the handle
/// exclusively; a second datastore against the same store is unsupported.
pub trait BackingStore: Send + Sync {
    /// Reads the blob at `key`, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Writes `value` atomically at `key`, replacing any previous blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()>;

    /// Deletes the blob at `key`. Deleting an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    fn delete(&self, key: &str) -> StoreResult<()>;

    /// Enumerates every key currently present.
    ///
    /// # Errors
    ///
    /// Returns an error if enumeration fails.
    fn keys(&self) -> StoreResult<Vec<String>>;

    /// Deletes every key in the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the wipe fails.
    fn clear(&self) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_key_uses_items_prefix() {
        let id = RecordId::generate();
        let key = item_key(&id);
        assert!(key.starts_with(ITEM_PREFIX));
        assert_eq!(key, format!("items/{id}"));
    }
}
