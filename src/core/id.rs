//! Identifiers for the entities a session credential is bound to.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of the owning project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectId(pub i32);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the subject (user) the credential authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i32);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque key of the concrete sandboxed process a credential is bound to.
///
/// A session key is the container id plus the port the process listens on;
/// it is the lookup key of the expiry cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    /// Container identifier of the sandboxed process.
    pub container_id: String,
    /// Port the process listens on.
    pub port: u16,
}

impl SessionKey {
    /// Create a session key from a container id and port.
    pub fn new(container_id: impl Into<String>, port: u16) -> Self {
        Self {
            container_id: container_id.into(),
            port,
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.container_id, self.port)
    }
}

/// Subsystem a credential was materialized for.
///
/// Only notebook sessions are in scope; the variant exists so ledger rows
/// written by other subsystems are never picked up by this engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialUsage {
    /// Interactive notebook session.
    Notebook,
}

impl fmt::Display for CredentialUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Notebook => write!(f, "notebook"),
        }
    }
}

/// Key of a materialization ledger row: (project, user, usage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MaterialKey {
    /// Owning project.
    pub project: ProjectId,
    /// Subject user.
    pub user: UserId,
    /// Subsystem the credential serves.
    pub usage: CredentialUsage,
}

impl MaterialKey {
    /// Build a ledger key.
    pub fn new(project: ProjectId, user: UserId, usage: CredentialUsage) -> Self {
        Self {
            project,
            user,
            usage,
        }
    }
}

impl fmt::Display for MaterialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.project, self.user, self.usage)
    }
}
