//! Error types for credential lifecycle operations.
//!
//! Each external collaborator has its own error type; the materializer
//! surfaces a typed [`MaterializeError`] to its caller, while the
//! background components (recovery, renewal, rotation) isolate failures
//! per item and only log them.

use crate::core::MaterialKey;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors from the token signing collaborator.
#[derive(Debug, Error, Clone)]
pub enum SignerError {
    /// The configured signing key is not available.
    #[error("signing key '{key}' unavailable")]
    KeyUnavailable {
        /// Name of the missing key.
        key: String,
    },

    /// The requested signature algorithm is not supported.
    #[error("signature algorithm mismatch: {0}")]
    AlgorithmMismatch(String),

    /// The token failed signature or expiry verification.
    ///
    /// During recovery this means "no usable existing token" and triggers
    /// regeneration; it is never treated as fatal.
    #[error("invalid token: {reason}")]
    InvalidToken {
        /// Why verification failed.
        reason: String,
    },

    /// A discarded token could not be invalidated.
    ///
    /// Always caught and logged, never propagated: a leaked invalidation
    /// is not a correctness violation.
    #[error("token invalidation failed: {0}")]
    Invalidation(String),

    /// The signing key store rejected a mark or purge operation.
    #[error("signing key store error: {0}")]
    KeyStore(String),
}

impl SignerError {
    /// Whether this error means the token itself is unusable.
    pub fn is_invalid_token(&self) -> bool {
        matches!(self, Self::InvalidToken { .. })
    }
}

/// Errors from the materialization ledger backend.
#[derive(Debug, Error, Clone)]
pub enum LedgerError {
    /// The backing table rejected the operation.
    #[error("ledger backend error: {0}")]
    Backend(String),
}

/// Errors from the on-disk token store.
#[derive(Debug, Error)]
pub enum FileStoreError {
    /// Failed to read a token file.
    #[error("failed to read token file '{path}': {source}")]
    Read {
        /// File that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a token file.
    #[error("failed to write token file '{path}': {source}")]
    Write {
        /// File that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to delete a token file.
    #[error("failed to delete token file '{path}': {source}")]
    Delete {
        /// File that could not be deleted.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the expiry cache.
#[derive(Debug, Error, Clone)]
pub enum CacheError {
    /// The writer lock was not acquired within its bound.
    ///
    /// Mutations fail rather than block indefinitely so a stuck sweep
    /// cannot wedge a concurrent materialize call.
    #[error("cache writer lock not acquired within {timeout:?}")]
    LockTimeout {
        /// Configured acquisition bound.
        timeout: Duration,
    },
}

/// Typed failure surfaced by [`materialize`](crate::manager::CredentialMaterializer::materialize).
#[derive(Debug, Error)]
pub enum MaterializeError {
    /// The signer could not issue a token; the ledger row was rolled back.
    #[error("could not sign session credential for {key}: {source}")]
    SigningFailed {
        /// Ledger key of the failed materialization.
        key: MaterialKey,
        /// Underlying signer error.
        #[source]
        source: SignerError,
    },

    /// The token could not be persisted to disk; the ledger row was rolled
    /// back and the issued token invalidated best-effort.
    #[error("could not persist session credential for {key}: {source}")]
    PersistFailed {
        /// Ledger key of the failed materialization.
        key: MaterialKey,
        /// Underlying file store error.
        #[source]
        source: FileStoreError,
    },

    /// The ledger itself failed; nothing was created.
    #[error("ledger operation failed for {key}: {source}")]
    Ledger {
        /// Ledger key of the failed materialization.
        key: MaterialKey,
        /// Underlying ledger error.
        #[source]
        source: LedgerError,
    },

    /// A serialization lock (service gate or cache writer) timed out.
    #[error("lock timed out materializing {key}: {source}")]
    LockTimeout {
        /// Ledger key of the failed materialization.
        key: MaterialKey,
        /// Underlying cache error.
        #[source]
        source: CacheError,
    },
}
