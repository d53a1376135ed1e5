//! Canonical record serialization and per-record encryption.
//!
//! A record's canonical form is its JSON with object keys sorted
//! lexicographically at every depth; arrays (`history` included) keep
//! their order. The canonical bytes are what goes into the envelope, so
//! two equal records always produce identical plaintext.

use serde_json::Value;

use crate::crypto::KEY_SIZE;
use crate::envelope;
use crate::error::{Error, Result};
use crate::types::Record;

/// Serializes a record to canonical bytes.
///
/// # Errors
///
/// Returns [`Error::Invalid`] if the record cannot be represented as
/// JSON (non-string keys, non-finite numbers).
pub(crate) fn canonical_bytes(record: &Record) -> Result<Vec<u8>> {
    let value = serde_json::to_value(record)
        .map_err(|err| Error::invalid(format!("record is not serializable: {err}")))?;
    let mut out = Vec::new();
    write_canonical(&value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) -> Result<()> {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push(b'{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_scalar(&Value::String((*key).clone()), out)?;
                out.push(b':');
                write_canonical(&map[key.as_str()], out)?;
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out)?;
            }
            out.push(b']');
        }
        scalar => write_scalar(scalar, out)?,
    }
    Ok(())
}

fn write_scalar(value: &Value, out: &mut Vec<u8>) -> Result<()> {
    serde_json::to_writer(&mut *out, value)
        .map_err(|err| Error::invalid(format!("record is not serializable: {err}")))
}

/// Encrypts a record under the record-encryption key, producing envelope
/// text for the backing store.
///
/// # Errors
///
/// Returns [`Error::Invalid`] for unserializable records and
/// [`Error::Crypto`] for encryption failures.
pub(crate) fn seal_record(record_key: &[u8; KEY_SIZE], record: &Record) -> Result<String> {
    let bytes = canonical_bytes(record)?;
    envelope::seal(record_key, &bytes)
}

/// Decrypts and parses a record blob.
///
/// # Errors
///
/// Returns [`Error::Crypto`] if authentication fails or the decrypted
/// bytes do not parse as a record.
pub(crate) fn open_record(record_key: &[u8; KEY_SIZE], text: &str) -> Result<Record> {
    let bytes = envelope::open(record_key, text)?;
    serde_json::from_slice(&bytes)
        .map_err(|err| Error::crypto(format!("record blob is corrupt: {err}")))
}
