use crate::core::{ProjectId, SessionConfig, UserId};
use async_trait::async_trait;

/// Subject identity and roles used to build token claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectProfile {
    /// Username asserted as the token subject.
    pub username: String,
    /// Roles granted to the subject.
    pub roles: Vec<String>,
}

/// Lookup seam for projects, subjects, session configurations, and
/// process liveness.
///
/// Recovery uses it to decide whether a ledger row is still worth
/// recovering; issuance uses it to rebuild claims for subjects it only
/// knows by id.
#[async_trait]
pub trait SessionDirectory: Send + Sync {
    /// Whether the owning project still exists.
    async fn project_exists(&self, project: ProjectId) -> bool;

    /// The subject's profile, or `None` if the user no longer exists.
    async fn subject(&self, user: UserId) -> Option<SubjectProfile>;

    /// The persisted session configuration for (project, user), if any.
    async fn session_config(&self, project: ProjectId, user: UserId) -> Option<SessionConfig>;

    /// Whether the sandboxed process owning the session is alive.
    async fn is_alive(&self, project: ProjectId, user: UserId) -> bool;
}
