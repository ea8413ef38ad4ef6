//! Live credential records and the session configuration they derive from.

use crate::core::{CredentialUsage, MaterialKey, ProjectId, SecureString, SessionKey, UserId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name of the on-disk token representation.
pub const TOKEN_FILE_NAME: &str = "token.jwt";

/// Directory under the staging dir holding per-session secret directories.
pub const PRIVATE_DIR: &str = ".private";

/// One live session credential.
///
/// Records are immutable; renewal builds a replacement record that takes
/// over the same session key in the expiry cache. Readers therefore never
/// observe a half-updated record.
#[derive(Debug, Clone)]
pub struct SessionCredential {
    /// Owning project.
    pub project: ProjectId,
    /// Subject user.
    pub user: UserId,
    /// Subsystem the credential serves.
    pub usage: CredentialUsage,
    /// Sandboxed process instance the credential is bound to.
    pub session_key: SessionKey,
    /// When the signed token expires.
    pub expires_at: DateTime<Utc>,
    /// The signed token value.
    pub token: SecureString,
    /// On-disk location of the token.
    pub token_path: PathBuf,
}

impl SessionCredential {
    /// Ledger key of the row anchoring this record.
    pub fn material_key(&self) -> MaterialKey {
        MaterialKey::new(self.project, self.user, self.usage)
    }

    /// Whether the record is within `lead` of its expiry at `now`.
    ///
    /// The expiry cache iterates in ascending expiry order, so the first
    /// record for which this returns false ends a renewal sweep.
    pub fn due_for_renewal(&self, now: DateTime<Utc>, lead: Duration) -> bool {
        self.expires_at <= now + lead
    }

    /// Whether the token has already expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Persisted per-session configuration a token path derives from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Key of the sandboxed process instance.
    pub session_key: SessionKey,
    /// Per-session secret directory name.
    pub secret: String,
}

impl SessionConfig {
    /// Create a session configuration.
    pub fn new(session_key: SessionKey, secret: impl Into<String>) -> Self {
        Self {
            session_key,
            secret: secret.into(),
        }
    }

    /// Path of the token file for this session:
    /// `<staging_dir>/.private/<secret>/token.jwt`.
    pub fn token_path(&self, staging_dir: &Path) -> PathBuf {
        staging_dir
            .join(PRIVATE_DIR)
            .join(&self.secret)
            .join(TOKEN_FILE_NAME)
    }
}

/// Decoded claims the lifecycle engine needs from a verified token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject identity the token asserts.
    pub subject: String,
    /// Expiry the token carries.
    pub expires_at: DateTime<Utc>,
}
