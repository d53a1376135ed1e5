//! Error types for the datastore.

use std::fmt;

use thiserror::Error;

use crate::store::StoreError;
use crate::types::RecordId;

/// Result type for datastore operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Machine-readable reason codes for known failure conditions.
///
/// Every [`Error`] variant that corresponds to a condition the datastore
/// defines carries one of these codes; pass-through failures from the
/// backing store do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reason {
    /// The operation requires the unlocked state.
    Locked,
    /// `initialize` was called on an already-initialized datastore.
    Initialized,
    /// Authenticated decryption or key wrapping failed.
    Crypto,
    /// A record id was not found.
    Missing,
    /// A record failed input validation.
    Invalid,
    /// The application key could not be resolved.
    MissingAppKey,
}

impl Reason {
    /// Returns the stable string form of the reason code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Locked => "LOCKED",
            Self::Initialized => "INITIALIZED",
            Self::Crypto => "CRYPTO",
            Self::Missing => "MISSING",
            Self::Invalid => "INVALID",
            Self::MissingAppKey => "MISSING_APP_KEY",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by datastore operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The operation requires the unlocked state.
    #[error("datastore is locked")]
    Locked,

    /// `initialize` was called without `rebase` on an initialized datastore.
    #[error("already initialized")]
    Initialized,

    /// Authenticated decryption or key wrapping failed.
    #[error("crypto failure: {0}")]
    Crypto(String),

    /// No record exists with the given id.
    #[error("no record with id {0}")]
    Missing(RecordId),

    /// The input record is malformed.
    #[error("invalid record: {0}")]
    Invalid(String),

    /// No application key could be resolved from the configured sources.
    #[error("application key could not be resolved")]
    MissingAppKey,

    /// A backing-store failure, propagated unchanged.
    #[error("backing store error: {0}")]
    Store(#[from] StoreError),
}

impl Error {
    /// Returns the reason code for known conditions, `None` for
    /// pass-through backing-store failures.
    #[must_use]
    pub const fn reason(&self) -> Option<Reason> {
        match self {
            Self::Locked => Some(Reason::Locked),
            Self::Initialized => Some(Reason::Initialized),
            Self::Crypto(_) => Some(Reason::Crypto),
            Self::Missing(_) => Some(Reason::Missing),
            Self::Invalid(_) => Some(Reason::Invalid),
            Self::MissingAppKey => Some(Reason::MissingAppKey),
            Self::Store(_) => None,
        }
    }

    /// Creates a crypto error with context.
    pub fn crypto<S: Into<String>>(context: S) -> Self {
        Self::Crypto(context.into())
    }

    /// Creates an invalid-record error with context.
    pub fn invalid<S: Into<String>>(context: S) -> Self {
        Self::Invalid(context.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes_are_stable() {
        assert_eq!(Reason::Locked.as_str(), "LOCKED");
        assert_eq!(Reason::Initialized.as_str(), "INITIALIZED");
        assert_eq!(Reason::Crypto.as_str(), "CRYPTO");
        assert_eq!(Reason::Missing.as_str(), "MISSING");
        assert_eq!(Reason::Invalid.as_str(), "INVALID");
        assert_eq!(Reason::MissingAppKey.as_str(), "MISSING_APP_KEY");
    }

    #[test]
    fn store_errors_carry_no_reason() {
        let err = Error::from(StoreError::backend("disk on fire"));
        assert!(err.reason().is_none());
        assert!(format!("{err}").contains("disk on fire"));
    }

    #[test]
    fn initialized_message_is_exact() {
        assert_eq!(format!("{}", Error::Initialized), "already initialized");
    }
}
