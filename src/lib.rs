//! Sandbox Credential
//!
//! Lifecycle engine for short-lived, per-session service credentials.
//!
//! # Features
//!
//! - **Idempotent materialization** - One credential per (project, user,
//!   usage), guarded by a durable ledger row
//! - **Crash recovery** - Ledger replay adopts valid on-disk tokens and
//!   regenerates or prunes the rest
//! - **Background renewal** - Expiry-ordered sweep that renews tokens
//!   shortly before they lapse
//! - **Signing-key rotation** - Mark-then-purge cycle with a safety
//!   window covering every outstanding token
//! - **Secure token handling** - Redacted debug output and constant-time
//!   comparison for token material
//!
//! All side effects flow through trait seams ([`traits::TokenSigner`],
//! [`traits::MaterialLedger`], [`traits::TokenFileStore`],
//! [`traits::SessionDirectory`], [`traits::ClusterState`]), so the engine
//! runs identically against production backends and the in-memory doubles
//! in [`testing`].

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![forbid(unsafe_code)]

/// Expiry-ordered in-memory credential cache
pub mod cache;
/// Core types, identifiers, and errors
pub mod core;
/// Materialization, recovery, and renewal
pub mod manager;
/// Signing-key rotation
pub mod rotation;
/// Concrete ledger and file store backends
pub mod storage;
pub mod testing;
/// Trait seams for signer, ledger, file store, directory, and cluster
pub mod traits;

/// Commonly used types and traits
pub mod prelude {
    pub use crate::cache::ExpiryCache;
    pub use crate::core::{
        CredentialUsage, MaterialKey, MaterializeError, ProjectId, SecureString, SessionConfig,
        SessionCredential, SessionKey, UserId,
    };
    pub use crate::manager::{
        CredentialMaterializer, LifecycleConfig, RecoveryProcess, RenewalScheduler, TokenPolicy,
    };
    pub use crate::rotation::KeyRotator;
    pub use crate::traits::{
        ClusterState, MaterialLedger, SessionDirectory, TokenFileStore, TokenSigner,
    };
    pub use async_trait::async_trait;
    pub use serde::{Deserialize, Serialize};
}

// Re-export commonly used external types
pub use chrono::{DateTime, Utc};
