//! Key material and the vault key hierarchy.
//!
//! Two kinds of symmetric keys exist. The [`AppKey`] is the outermost
//! secret: supplied by the caller, derived from a passphrase, or the
//! well-known default. It wraps the [`KeyBundle`], the inner keys the
//! datastore actually encrypts records with. The bundle is generated once
//! at initialization and survives rekeying unchanged; only its wrapping
//! under the application key is ever replaced.

use argon2::Argon2;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

/// Key size of the suite (AES-256-GCM), in bytes.
pub const KEY_SIZE: usize = 32;

/// Size of a generated per-database salt, in bytes.
pub const SALT_SIZE: usize = 16;

// =============================================================================
// AppKey
// =============================================================================

/// The application key: the outermost symmetric key protecting the key
/// bundle.
///
/// Ephemeral by contract; it is never persisted by the datastore. The key
/// is zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AppKey([u8; KEY_SIZE]);

impl AppKey {
    /// Creates an application key from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parses an application key from its base64url (unpadded) text form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Crypto`] if the text is not valid base64url or
    /// does not decode to exactly 32 bytes.
    pub fn from_base64(text: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(text)
            .map_err(|_| Error::crypto("application key is not valid base64url"))?;
        let bytes: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| Error::crypto("application key must decode to 32 bytes"))?;
        Ok(Self(bytes))
    }

    /// Derives an application key from a passphrase and a per-database
    /// salt using Argon2id with the crate's default parameters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Crypto`] if derivation fails (for example, a salt
    /// shorter than Argon2 accepts).
    pub fn derive(passphrase: &str, salt: &[u8]) -> Result<Self> {
        let mut bytes = [0u8; KEY_SIZE];
        Argon2::default()
            .hash_password_into(passphrase.as_bytes(), salt, &mut bytes)
            .map_err(|err| Error::crypto(format!("passphrase derivation failed: {err}")))?;
        Ok(Self(bytes))
    }

    /// Returns the fixed, well-known default key.
    ///
    /// This provides no at-rest protection whatsoever: anyone with the
    /// backing store can unwrap the key bundle. It exists so unconfigured
    /// instances still round-trip through the same code paths.
    #[must_use]
    pub const fn default_insecure() -> Self {
        Self([0u8; KEY_SIZE])
    }

    /// Generates a random application key.
    #[must_use]
    pub fn generate() -> Self {
        Self(random_key())
    }

    pub(crate) const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for AppKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppKey").field("key", &"[REDACTED]").finish()
    }
}

// =============================================================================
// KeyBundle
// =============================================================================

/// The inner symmetric keys of an initialized database.
///
/// `record_key` encrypts every record blob. `wrap_key` is the
/// key-encryption key of the hierarchy, reserved for wrapping per-record
/// keys; both are generated together and must survive a rekey unchanged,
/// which is what keeps record ciphertexts addressable across rebases.
///
/// Zeroized on drop; the datastore holds a bundle in memory only while
/// unlocked.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct KeyBundle {
    record_key: [u8; KEY_SIZE],
    wrap_key: [u8; KEY_SIZE],
}

impl KeyBundle {
    /// Generates a fresh bundle from the system's secure random generator.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            record_key: random_key(),
            wrap_key: random_key(),
        }
    }

    pub(crate) const fn record_key(&self) -> &[u8; KEY_SIZE] {
        &self.record_key
    }

    pub(crate) const fn wrap_key(&self) -> &[u8; KEY_SIZE] {
        &self.wrap_key
    }
}

impl std::fmt::Debug for KeyBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyBundle")
            .field("record_key", &"[REDACTED]")
            .field("wrap_key", &"[REDACTED]")
            .finish()
    }
}

/// Generates a random per-database salt.
#[must_use]
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    salt
}

fn random_key() -> [u8; KEY_SIZE] {
    let mut key = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut key);
    key
}
