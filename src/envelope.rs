//! Compact authenticated-encryption envelope.
//!
//! Everything at rest — the key blob and every record blob — is wrapped
//! in the same textual envelope: five base64url segments separated by
//! `.`, in order protected header, encrypted key (always empty for this
//! direct-key suite), IV, ciphertext, and tag. The protected header is
//! fixed to `{"alg":"dir","enc":"A256GCM"}` and its encoded form is the
//! AEAD associated data, so a tampered header fails authentication.
//! Changing any part of this layout breaks at-rest compatibility.

use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::crypto::{AppKey, KeyBundle, KEY_SIZE};
use crate::error::{Error, Result};

/// IV size of the suite, in bytes.
pub(crate) const IV_SIZE: usize = 12;

/// Authentication tag size of the suite, in bytes.
pub(crate) const TAG_SIZE: usize = 16;

const HEADER_JSON: &[u8] = br#"{"alg":"dir","enc":"A256GCM"}"#;

const KEY_BLOB_VERSION: u32 = 1;

#[derive(Deserialize)]
struct Header {
    alg: String,
    enc: String,
}

/// Seals `plaintext` under `key` into envelope text.
///
/// # Errors
///
/// Returns [`Error::Crypto`] if encryption fails.
pub(crate) fn seal(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> Result<String> {
    let cipher = Aes256Gcm::new_from_slice(key).expect("key length is always 32");

    let mut iv = [0u8; IV_SIZE];
    OsRng.fill_bytes(&mut iv);
    let nonce = Nonce::from_slice(&iv);

    let header = URL_SAFE_NO_PAD.encode(HEADER_JSON);
    let sealed = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad: header.as_bytes(),
            },
        )
        .map_err(|_| Error::crypto("envelope encryption failed"))?;

    // aes-gcm appends the tag to the ciphertext; the envelope carries it
    // as its own segment.
    let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_SIZE);
    Ok(format!(
        "{header}..{}.{}.{}",
        URL_SAFE_NO_PAD.encode(iv),
        URL_SAFE_NO_PAD.encode(ciphertext),
        URL_SAFE_NO_PAD.encode(tag),
    ))
}

/// Opens envelope `text` under `key`, returning the plaintext.
///
/// # Errors
///
/// Returns [`Error::Crypto`] if the envelope is malformed, names a
/// different suite, or fails authentication.
pub(crate) fn open(key: &[u8; KEY_SIZE], text: &str) -> Result<Vec<u8>> {
    let segments: Vec<&str> = text.split('.').collect();
    let &[header, encrypted_key, iv, ciphertext, tag] = &segments[..] else {
        return Err(Error::crypto("envelope must have five segments"));
    };
    if !encrypted_key.is_empty() {
        return Err(Error::crypto("envelope carries an unexpected wrapped key"));
    }

    let header_bytes = decode_segment(header, "header")?;
    let parsed: Header = serde_json::from_slice(&header_bytes)
        .map_err(|_| Error::crypto("envelope header is not valid JSON"))?;
    if parsed.alg != "dir" || parsed.enc != "A256GCM" {
        return Err(Error::crypto(format!(
            "unsupported envelope suite: {}/{}",
            parsed.alg, parsed.enc
        )));
    }

    let iv = decode_segment(iv, "IV")?;
    if iv.len() != IV_SIZE {
        return Err(Error::crypto("envelope IV has the wrong size"));
    }
    let mut sealed = decode_segment(ciphertext, "ciphertext")?;
    let tag = decode_segment(tag, "tag")?;
    if tag.len() != TAG_SIZE {
        return Err(Error::crypto("envelope tag has the wrong size"));
    }
    sealed.extend_from_slice(&tag);

    let cipher = Aes256Gcm::new_from_slice(key).expect("key length is always 32");
    cipher
        .decrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: &sealed,
                aad: header.as_bytes(),
            },
        )
        .map_err(|_| Error::crypto("envelope authentication failed"))
}

fn decode_segment(segment: &str, name: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| Error::crypto(format!("envelope {name} is not valid base64url")))
}

// =============================================================================
// Key blob
// =============================================================================

#[derive(Serialize, Deserialize)]
struct KeyBlob {
    version: u32,
    bundle: KeyBundle,
    created_at: u64,
}

/// Wraps the key bundle under the application key, producing the
/// encrypted key blob text persisted at the `keys` backing-store key.
///
/// # Errors
///
/// Returns [`Error::Crypto`] if serialization or encryption fails.
pub(crate) fn wrap_key_bundle(
    app_key: &AppKey,
    bundle: &KeyBundle,
    created_at: u64,
) -> Result<String> {
    let blob = KeyBlob {
        version: KEY_BLOB_VERSION,
        bundle: bundle.clone(),
        created_at,
    };
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(&blob, &mut bytes)
        .map_err(|err| Error::crypto(format!("key blob encoding failed: {err}")))?;
    let sealed = seal(app_key.as_bytes(), &bytes);
    bytes.zeroize();
    sealed
}

/// Unwraps the encrypted key blob text under the application key.
///
/// # Errors
///
/// Returns [`Error::Crypto`] on authentication failure (wrong key or
/// tampered blob), a malformed inner encoding, or an unsupported blob
/// version.
pub(crate) fn unwrap_key_bundle(app_key: &AppKey, text: &str) -> Result<KeyBundle> {
    let mut bytes = open(app_key.as_bytes(), text)?;
    let blob: KeyBlob = ciborium::de::from_reader(bytes.as_slice())
        .map_err(|err| Error::crypto(format!("key blob decoding failed: {err}")))?;
    bytes.zeroize();
    if blob.version != KEY_BLOB_VERSION {
        return Err(Error::crypto(format!(
            "unsupported key blob version: {}",
            blob.version
        )));
    }
    Ok(blob.bundle)
}
