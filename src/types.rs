//! The record model.
//!
//! Records are login-like entries: a title, an `entry` object carrying
//! the kind-specific fields (the `login` kind has `username` and
//! `password`; other kinds pass through opaquely), origins, tags, and
//! timestamps. Each record carries its own history journal of backward
//! merge-patches over `entry`, newest first.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::patch;

/// Stable record identifier, assigned on add. UUIDv4 under the hood.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| Error::invalid(format!("malformed record id: {s}")))
    }
}

/// One step of a record's history journal.
///
/// `patch` applied to the record's **current** `entry` yields the `entry`
/// as of the immediately previous version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// When the version this patch undoes was written, in ms since epoch.
    pub created: u64,
    /// Backward merge-patch over `entry`.
    pub patch: Value,
}

/// A stored credential record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Stable identifier, immutable after add.
    pub id: RecordId,
    /// Free-text title.
    pub title: String,
    /// Kind-specific fields; always an object with a string `kind`.
    pub entry: Value,
    /// Ordered origin strings, possibly empty.
    #[serde(default)]
    pub origins: Vec<String>,
    /// Tag set, possibly empty.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Timestamp of the first write, in ms since epoch; immutable.
    pub created: u64,
    /// Timestamp of the most recent write, in ms since epoch.
    pub modified: u64,
    /// Timestamp of the most recent use, if any.
    #[serde(default)]
    pub last_used: Option<u64>,
    /// History journal, newest first.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// Caller-supplied fields for [`add`](crate::datastore::Datastore::add).
///
/// Everything the datastore assigns itself — id, timestamps, history —
/// is absent here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordDraft {
    /// Free-text title.
    #[serde(default)]
    pub title: String,
    /// Kind-specific fields; must be an object with a string `kind`.
    pub entry: Value,
    /// Ordered origin strings.
    #[serde(default)]
    pub origins: Vec<String>,
    /// Tag set.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Initial `last_used` timestamp, if the caller tracks one.
    #[serde(default)]
    pub last_used: Option<u64>,
}

/// Validates a caller-supplied `entry` object.
///
/// Any kind is accepted; the `login` kind additionally requires its
/// credential fields, when present, to be strings.
pub(crate) fn validate_entry(entry: &Value) -> Result<()> {
    let Some(map) = entry.as_object() else {
        return Err(Error::invalid("entry must be an object"));
    };
    let Some(kind) = map.get("kind") else {
        return Err(Error::invalid("entry.kind is required"));
    };
    let Some(kind) = kind.as_str() else {
        return Err(Error::invalid("entry.kind must be a string"));
    };
    if kind == "login" {
        for field in ["username", "password"] {
            if let Some(value) = map.get(field) {
                if !value.is_string() {
                    return Err(Error::invalid(format!("entry.{field} must be a string")));
                }
            }
        }
    }
    Ok(())
}

/// Computes the comma-joined dotted-path list of fields that differ
/// between two record versions, or `None` when nothing differs.
///
/// Top-level fields are visited in declared order — `title`, `entry`
/// (depth-first, in the new entry's key order), `origins`, `tags`,
/// `last_used` — with the array-valued fields reported by name only.
/// Assigned fields (`id`, `created`, `modified`, `history`) never
/// appear.
#[must_use]
pub(crate) fn changed_fields(old: &Record, new: &Record) -> Option<String> {
    let mut paths = Vec::new();
    if new.title != old.title {
        paths.push("title".to_string());
    }
    patch::changed_paths("entry", &new.entry, &old.entry, &mut paths);
    if new.origins != old.origins {
        paths.push("origins".to_string());
    }
    if new.tags != old.tags {
        paths.push("tags".to_string());
    }
    if new.last_used != old.last_used {
        paths.push("last_used".to_string());
    }
    if paths.is_empty() {
        None
    } else {
        Some(paths.join(","))
    }
}
