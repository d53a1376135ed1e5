#![deny(clippy::all, clippy::pedantic, clippy::nursery)]

//! # credvault
//!
//! An encrypted, embedded credential datastore. Records — logins and
//! other kinds — live under the protection of an application key in an
//! opaque key/value backing store supplied by the host; the crate is
//! headless and leaves UI, storage, and telemetry to the application.
//!
//! The security model is a two-level key hierarchy: the application key
//! (caller-supplied, passphrase-derived, or a well-known insecure
//! default) wraps a generated key bundle, and the bundle's
//! record-encryption key encrypts each record individually. Rekeying
//! (`rebase`) re-wraps the bundle under a new application key without
//! touching record ciphertexts, so record ids and history survive.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use credvault::{
//!     open, AppKey, InitializeOptions, MemoryStore, OpenOptions, RecordDraft, UnlockOptions,
//! };
//! use serde_json::json;
//!
//! # async fn example() -> credvault::Result<()> {
//! let datastore = open(Arc::new(MemoryStore::new()), OpenOptions::default()).await?;
//!
//! let app_key = AppKey::generate();
//! datastore
//!     .initialize(InitializeOptions {
//!         app_key: Some(app_key.clone()),
//!         ..InitializeOptions::default()
//!     })
//!     .await?;
//! datastore.unlock(UnlockOptions::with_app_key(app_key)).await?;
//!
//! let record = datastore
//!     .add(RecordDraft {
//!         title: "example.com".to_string(),
//!         entry: json!({"kind": "login", "username": "me", "password": "s3cret"}),
//!         ..RecordDraft::default()
//!     })
//!     .await?;
//! assert!(datastore.get(&record.id).await?.is_some());
//!
//! datastore.lock().await?;
//! # Ok(())
//! # }
//! ```

mod codec;
mod envelope;

pub mod crypto;
pub mod datastore;
pub mod error;
pub mod patch;
pub mod store;
pub mod types;

pub use crypto::AppKey;
pub use datastore::{
    open, Datastore, InitializeOptions, MetricMethod, MetricsHook, OpenOptions, PromptHandler,
    UnlockOptions,
};
pub use error::{Error, Reason, Result};
pub use store::{BackingStore, FsStore, MemoryStore, StoreError};
pub use types::{HistoryEntry, Record, RecordDraft, RecordId};
