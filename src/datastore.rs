//! The datastore state machine.
//!
//! A [`Datastore`] is born uninitialized. [`initialize`](Datastore::initialize)
//! generates the key bundle, wraps it under the application key, and
//! leaves the store locked; [`unlock`](Datastore::unlock) unwraps the
//! bundle into memory; [`lock`](Datastore::lock) drops it again. CRUD
//! operations require the unlocked state and refuse with
//! [`Error::Locked`] otherwise.
//!
//! # Serialization
//!
//! Every public operation acquires the instance mutex for its full
//! duration — state check, backing-store I/O, crypto, state transition,
//! and telemetry all happen inside one critical section — so overlapping
//! calls on the same instance behave as if queued on a per-instance
//! serial queue.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, warn};
use tokio::sync::Mutex;

use crate::codec;
use crate::crypto::{generate_salt, AppKey, KeyBundle};
use crate::envelope;
use crate::error::{Error, Result};
use crate::patch;
use crate::store::{item_key, BackingStore, ITEM_PREFIX, KEYS_KEY, SALT_KEY};
use crate::types::{changed_fields, validate_entry, HistoryEntry, Record, RecordDraft, RecordId};

// =============================================================================
// Host-supplied hooks
// =============================================================================

/// Host-supplied passphrase prompt.
///
/// Consulted during application-key resolution when the caller passed
/// neither an explicit key nor a passphrase. Returning `None` means the
/// host declined (for example, the user cancelled), which fails the
/// operation with [`Error::MissingAppKey`] rather than silently falling
/// back to the insecure default key.
pub trait PromptHandler: Send + Sync {
    /// Produces a passphrase, or `None` to decline.
    fn passphrase(&self) -> Option<String>;
}

/// Host-supplied telemetry sink.
///
/// Invoked exactly once per successful mutating operation, after the
/// backing-store write completes and before the operation's result is
/// returned to the caller.
pub trait MetricsHook: Send + Sync {
    /// Records one mutating operation.
    ///
    /// `fields` is the comma-joined dotted-path list of changed fields;
    /// it is present only for [`MetricMethod::Updated`] with a non-empty
    /// diff.
    fn record_metric(&self, method: MetricMethod, id: &RecordId, fields: Option<&str>);
}

/// The mutating operation a telemetry event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricMethod {
    /// A record was added.
    Added,
    /// A record was updated.
    Updated,
    /// A record was deleted.
    Deleted,
}

impl MetricMethod {
    /// Returns the stable string form of the method.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for MetricMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Options
// =============================================================================

/// Configuration accepted by [`open`]. Unknown concerns simply have no
/// field here; hosts pass what they use.
#[derive(Default)]
pub struct OpenOptions {
    /// Fallback salt for passphrase derivation when none is persisted.
    pub salt: Option<Vec<u8>>,
    /// An existing encrypted key blob to seed an empty backing store
    /// with, as produced by [`Datastore::encrypted_keys`].
    pub keys: Option<String>,
    /// Telemetry sink.
    pub record_metric: Option<Arc<dyn MetricsHook>>,
    /// Passphrase prompt.
    pub prompt: Option<Arc<dyn PromptHandler>>,
}

/// Options for [`Datastore::initialize`].
#[derive(Default)]
pub struct InitializeOptions {
    /// Explicit application key; takes precedence over every other
    /// source.
    pub app_key: Option<AppKey>,
    /// Passphrase to derive the application key from.
    pub passphrase: Option<String>,
    /// Salt to persist and derive with; a fresh one is generated when
    /// absent and none is persisted.
    pub salt: Option<Vec<u8>>,
    /// Re-wrap the existing key bundle under a new application key
    /// instead of generating one. Requires the unlocked state.
    pub rebase: bool,
}

/// Options for [`Datastore::unlock`].
#[derive(Default)]
pub struct UnlockOptions {
    /// Explicit application key.
    pub app_key: Option<AppKey>,
    /// Passphrase to derive the application key from.
    pub passphrase: Option<String>,
}

impl UnlockOptions {
    /// Unlock with an explicit application key.
    #[must_use]
    pub fn with_app_key(app_key: AppKey) -> Self {
        Self {
            app_key: Some(app_key),
            passphrase: None,
        }
    }

    /// Unlock with a passphrase.
    #[must_use]
    pub fn with_passphrase<S: Into<String>>(passphrase: S) -> Self {
        Self {
            app_key: None,
            passphrase: Some(passphrase.into()),
        }
    }
}

// =============================================================================
// Datastore
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Uninitialized,
    Locked,
    Unlocked,
}

struct Inner {
    store: Arc<dyn BackingStore>,
    state: State,
    keys: Option<KeyBundle>,
}

/// The encrypted credential datastore.
///
/// Construct one with [`open`], or with [`Datastore::new`] followed by
/// [`prepare`](Datastore::prepare).
pub struct Datastore {
    inner: Mutex<Inner>,
    metrics: Option<Arc<dyn MetricsHook>>,
    prompt: Option<Arc<dyn PromptHandler>>,
    fallback_salt: Option<Vec<u8>>,
    seed_keys: Option<String>,
}

/// Opens a prepared datastore against `store`.
///
/// Seeds the backing store with `options.keys` when it holds no key blob
/// yet, then detects the initial state.
///
/// # Errors
///
/// Returns an error if the backing store fails during preparation.
pub async fn open(store: Arc<dyn BackingStore>, options: OpenOptions) -> Result<Datastore> {
    let datastore = Datastore::new(store, options);
    datastore.prepare().await?;
    Ok(datastore)
}

impl Datastore {
    /// Creates an unprepared datastore. Call [`prepare`](Self::prepare)
    /// (or use [`open`]) before anything else.
    #[must_use]
    pub fn new(store: Arc<dyn BackingStore>, options: OpenOptions) -> Self {
        Self {
            inner: Mutex::new(Inner {
                store,
                state: State::Uninitialized,
                keys: None,
            }),
            metrics: options.record_metric,
            prompt: options.prompt,
            fallback_salt: options.salt,
            seed_keys: options.keys,
        }
    }

    /// Inspects the backing store and sets the initial state: locked when
    /// a key blob is present, uninitialized otherwise. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    pub async fn prepare(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.store.get(KEYS_KEY)?.is_none() {
            if let Some(seed) = &self.seed_keys {
                inner.store.put(KEYS_KEY, seed.as_bytes())?;
            }
        }
        if inner.store.get(KEYS_KEY)?.is_some() {
            if inner.state == State::Uninitialized {
                inner.state = State::Locked;
            }
        } else {
            inner.state = State::Uninitialized;
            inner.keys = None;
        }
        Ok(())
    }

    /// Returns `true` once a key blob exists for this datastore.
    pub async fn is_initialized(&self) -> bool {
        self.inner.lock().await.state != State::Uninitialized
    }

    /// Returns `true` unless the datastore is currently unlocked.
    pub async fn is_locked(&self) -> bool {
        self.inner.lock().await.state != State::Unlocked
    }

    /// Initializes the datastore, or rekeys it when `rebase` is set.
    ///
    /// First-time initialization generates the key bundle, wraps it
    /// under the resolved application key, persists blob and salt, and
    /// leaves the datastore locked. A rebase requires the unlocked state
    /// and re-wraps the *existing* bundle under a new application key;
    /// record blobs are untouched because the record-encryption key does
    /// not change. Either way the caller must `unlock` afterwards.
    ///
    /// # Errors
    ///
    /// [`Error::Initialized`] when already initialized and `rebase` is
    /// not set; [`Error::Locked`] when `rebase` is set and the datastore
    /// is not unlocked; [`Error::Crypto`] on wrap failure;
    /// [`Error::MissingAppKey`] when no application key can be resolved.
    pub async fn initialize(&self, options: InitializeOptions) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let bundle = if options.rebase {
            match (inner.state, &inner.keys) {
                (State::Unlocked, Some(keys)) => keys.clone(),
                _ => return Err(Error::Locked),
            }
        } else {
            if inner.state != State::Uninitialized {
                return Err(Error::Initialized);
            }
            KeyBundle::generate()
        };

        let salt = match options.salt {
            Some(salt) => salt,
            None => match load_salt(inner.store.as_ref())? {
                Some(salt) => salt,
                None => self
                    .fallback_salt
                    .clone()
                    .unwrap_or_else(|| generate_salt().to_vec()),
            },
        };
        let app_key = self.resolve_app_key(options.app_key, options.passphrase, Some(&salt))?;
        let blob = envelope::wrap_key_bundle(&app_key, &bundle, now_ms())?;

        inner.store.put(SALT_KEY, hex::encode(&salt).as_bytes())?;
        inner.store.put(KEYS_KEY, blob.as_bytes())?;
        inner.keys = None;
        inner.state = State::Locked;
        debug!(
            "datastore {}",
            if options.rebase { "rebased" } else { "initialized" }
        );
        Ok(())
    }

    /// Unlocks the datastore, caching the key bundle in memory.
    ///
    /// The application key is resolved from the options, the configured
    /// prompt, or the default key, in that order. A no-op when already
    /// unlocked.
    ///
    /// # Errors
    ///
    /// [`Error::Crypto`] when uninitialized or on authentication failure
    /// (the state does not change); [`Error::MissingAppKey`] when no
    /// application key can be resolved.
    pub async fn unlock(&self, options: UnlockOptions) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            State::Unlocked => return Ok(()),
            State::Uninitialized => return Err(Error::crypto("datastore is not initialized")),
            State::Locked => {}
        }
        let blob = inner
            .store
            .get(KEYS_KEY)?
            .ok_or_else(|| Error::crypto("key blob is missing"))?;
        let text =
            String::from_utf8(blob).map_err(|_| Error::crypto("key blob is not UTF-8"))?;
        let salt = match load_salt(inner.store.as_ref())? {
            Some(salt) => Some(salt),
            None => self.fallback_salt.clone(),
        };
        let app_key = self.resolve_app_key(options.app_key, options.passphrase, salt.as_deref())?;
        let bundle = envelope::unwrap_key_bundle(&app_key, &text)?;
        inner.keys = Some(bundle);
        inner.state = State::Unlocked;
        debug!("datastore unlocked");
        Ok(())
    }

    /// Locks the datastore, dropping (and zeroizing) the cached key
    /// bundle. Idempotent; a no-op on an uninitialized datastore.
    ///
    /// # Errors
    ///
    /// Currently infallible; the `Result` keeps the operation surface
    /// uniform.
    pub async fn lock(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.keys = None;
        if inner.state == State::Unlocked {
            inner.state = State::Locked;
        }
        debug!("datastore locked");
        Ok(())
    }

    /// Deletes the key blob, salt, and every record, returning the
    /// datastore to the uninitialized state. Works from any state.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    pub async fn reset(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.store.clear()?;
        inner.keys = None;
        inner.state = State::Uninitialized;
        debug!("datastore reset");
        Ok(())
    }

    /// Returns every record, keyed by id.
    ///
    /// Blobs that fail to decrypt or parse (for example, the tail of a
    /// crashed write) are discarded with a warning.
    ///
    /// # Errors
    ///
    /// [`Error::Locked`] unless unlocked; backing-store failures
    /// propagate.
    pub async fn list(&self) -> Result<HashMap<RecordId, Record>> {
        let inner = self.inner.lock().await;
        let keys = unlocked_keys(&inner)?;
        let mut records = HashMap::new();
        for key in inner.store.keys()? {
            if !key.starts_with(ITEM_PREFIX) {
                continue;
            }
            let Some(blob) = inner.store.get(&key)? else {
                continue;
            };
            match decode_blob(keys.record_key(), &blob) {
                Ok(record) => {
                    records.insert(record.id, record);
                }
                Err(err) => warn!("discarding corrupt record blob at {key}: {err}"),
            }
        }
        Ok(records)
    }

    /// Returns the record with the given id, or `None`.
    ///
    /// # Errors
    ///
    /// [`Error::Locked`] unless unlocked; [`Error::Crypto`] if the blob
    /// exists but is corrupt.
    pub async fn get(&self, id: &RecordId) -> Result<Option<Record>> {
        let inner = self.inner.lock().await;
        let keys = unlocked_keys(&inner)?;
        let Some(blob) = inner.store.get(&item_key(id))? else {
            return Ok(None);
        };
        decode_blob(keys.record_key(), &blob).map(Some)
    }

    /// Adds a record, assigning its id and timestamps, and returns the
    /// stored form.
    ///
    /// # Errors
    ///
    /// [`Error::Locked`] unless unlocked; [`Error::Invalid`] for a
    /// malformed entry.
    pub async fn add(&self, draft: RecordDraft) -> Result<Record> {
        let inner = self.inner.lock().await;
        let keys = unlocked_keys(&inner)?;
        validate_entry(&draft.entry)?;

        let now = now_ms();
        let record = Record {
            id: RecordId::generate(),
            title: draft.title,
            entry: draft.entry,
            origins: draft.origins,
            tags: draft.tags,
            created: now,
            modified: now,
            last_used: draft.last_used,
            history: Vec::new(),
        };

        let text = codec::seal_record(keys.record_key(), &record)?;
        inner.store.put(&item_key(&record.id), text.as_bytes())?;
        debug!("added record {}", record.id);
        self.emit(MetricMethod::Added, &record.id, None);
        Ok(record)
    }

    /// Updates an existing record and returns the stored form.
    ///
    /// The entry is diffed against the stored version; a non-empty diff
    /// prepends a backward history entry and advances `modified`. A
    /// change confined to non-entry fields advances `modified` without
    /// touching history. `id` and `created` are taken from the stored
    /// record and cannot be changed; the caller's `history` is ignored
    /// in favor of the stored journal.
    ///
    /// # Errors
    ///
    /// [`Error::Locked`] unless unlocked; [`Error::Missing`] if the id
    /// is unknown; [`Error::Invalid`] for a malformed entry.
    pub async fn update(&self, record: Record) -> Result<Record> {
        let inner = self.inner.lock().await;
        let keys = unlocked_keys(&inner)?;
        validate_entry(&record.entry)?;

        let stored_blob = inner
            .store
            .get(&item_key(&record.id))?
            .ok_or(Error::Missing(record.id))?;
        let stored = decode_blob(keys.record_key(), &stored_blob)?;

        let mut updated = Record {
            id: stored.id,
            title: record.title,
            entry: record.entry,
            origins: record.origins,
            tags: record.tags,
            created: stored.created,
            modified: stored.modified,
            last_used: record.last_used,
            history: stored.history.clone(),
        };
        let fields = changed_fields(&stored, &updated);
        let entry_patch = patch::diff(&updated.entry, &stored.entry);
        let now = now_ms();
        if patch::is_empty(&entry_patch) {
            if fields.is_some() {
                updated.modified = now;
            }
        } else {
            updated.history.insert(
                0,
                HistoryEntry {
                    created: now,
                    patch: entry_patch,
                },
            );
            updated.modified = now;
        }

        let text = codec::seal_record(keys.record_key(), &updated)?;
        inner.store.put(&item_key(&updated.id), text.as_bytes())?;
        debug!("updated record {}", updated.id);
        self.emit(MetricMethod::Updated, &updated.id, fields.as_deref());
        Ok(updated)
    }

    /// Marks a record used: sets `last_used` and `modified` without
    /// touching the entry or its history.
    ///
    /// # Errors
    ///
    /// [`Error::Locked`] unless unlocked; [`Error::Missing`] if the id
    /// is unknown.
    pub async fn touch(&self, id: &RecordId) -> Result<Record> {
        let inner = self.inner.lock().await;
        let keys = unlocked_keys(&inner)?;
        let blob = inner
            .store
            .get(&item_key(id))?
            .ok_or(Error::Missing(*id))?;
        let stored = decode_blob(keys.record_key(), &blob)?;

        let now = now_ms();
        let mut touched = stored.clone();
        touched.last_used = Some(now);
        touched.modified = now;
        let fields = changed_fields(&stored, &touched);

        let text = codec::seal_record(keys.record_key(), &touched)?;
        inner.store.put(&item_key(id), text.as_bytes())?;
        self.emit(MetricMethod::Updated, id, fields.as_deref());
        Ok(touched)
    }

    /// Removes a record, returning it, or `None` if the id is unknown.
    ///
    /// A blob that exists but is corrupt is deleted and reported as
    /// `None`; telemetry is emitted only when a well-formed record was
    /// removed.
    ///
    /// # Errors
    ///
    /// [`Error::Locked`] unless unlocked; backing-store failures
    /// propagate.
    pub async fn remove(&self, id: &RecordId) -> Result<Option<Record>> {
        let inner = self.inner.lock().await;
        let keys = unlocked_keys(&inner)?;
        let key = item_key(id);
        let removed = match inner.store.get(&key)? {
            None => None,
            Some(blob) => match decode_blob(keys.record_key(), &blob) {
                Ok(record) => Some(record),
                Err(err) => {
                    warn!("removing corrupt record blob at {key}: {err}");
                    None
                }
            },
        };
        inner.store.delete(&key)?;
        if let Some(record) = &removed {
            debug!("removed record {}", record.id);
            self.emit(MetricMethod::Deleted, id, None);
        }
        Ok(removed)
    }

    /// Returns the persisted encrypted key blob, if any. Usable as the
    /// `keys` option of [`OpenOptions`] against another backing store.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails or the blob is not
    /// UTF-8.
    pub async fn encrypted_keys(&self) -> Result<Option<String>> {
        let inner = self.inner.lock().await;
        let Some(blob) = inner.store.get(KEYS_KEY)? else {
            return Ok(None);
        };
        String::from_utf8(blob)
            .map(Some)
            .map_err(|_| Error::crypto("key blob is not UTF-8"))
    }

    fn resolve_app_key(
        &self,
        explicit: Option<AppKey>,
        passphrase: Option<String>,
        salt: Option<&[u8]>,
    ) -> Result<AppKey> {
        if let Some(key) = explicit {
            return Ok(key);
        }
        if let Some(passphrase) = passphrase {
            let salt = salt.ok_or(Error::MissingAppKey)?;
            return AppKey::derive(&passphrase, salt);
        }
        if let Some(prompt) = &self.prompt {
            let passphrase = prompt.passphrase().ok_or(Error::MissingAppKey)?;
            let salt = salt.ok_or(Error::MissingAppKey)?;
            return AppKey::derive(&passphrase, salt);
        }
        Ok(AppKey::default_insecure())
    }

    fn emit(&self, method: MetricMethod, id: &RecordId, fields: Option<&str>) {
        if let Some(hook) = &self.metrics {
            hook.record_metric(method, id, fields);
        }
    }
}

impl std::fmt::Debug for Datastore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Datastore").finish_non_exhaustive()
    }
}

fn unlocked_keys(inner: &Inner) -> Result<&KeyBundle> {
    match (inner.state, &inner.keys) {
        (State::Unlocked, Some(keys)) => Ok(keys),
        _ => Err(Error::Locked),
    }
}

fn decode_blob(record_key: &[u8; 32], blob: &[u8]) -> Result<Record> {
    let text =
        std::str::from_utf8(blob).map_err(|_| Error::crypto("record blob is not UTF-8"))?;
    codec::open_record(record_key, text)
}

fn load_salt(store: &dyn BackingStore) -> Result<Option<Vec<u8>>> {
    let Some(bytes) = store.get(SALT_KEY)? else {
        return Ok(None);
    };
    let text =
        String::from_utf8(bytes).map_err(|_| Error::crypto("persisted salt is not UTF-8"))?;
    hex::decode(text.trim())
        .map(Some)
        .map_err(|_| Error::crypto("persisted salt is not valid hex"))
}

fn now_ms() -> u64 {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before Unix epoch");
    u64::try_from(elapsed.as_millis()).expect("timestamp out of range")
}
