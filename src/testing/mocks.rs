use crate::core::{
    FileStoreError, ProjectId, SecureString, SessionConfig, SignerError, TokenClaims, UserId,
};
use crate::traits::{ClusterState, IssueRequest, SessionDirectory, SubjectProfile, TokenFileStore,
    TokenSigner,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Mock signer with configurable failures and call counters.
///
/// Tokens are opaque strings; the mock tracks which of them are currently
/// valid and which were invalidated, and `renew` invalidates the old
/// token the way the real signing primitive does.
pub struct MockSigner {
    counter: AtomicU32,
    latency: Mutex<Option<std::time::Duration>>,
    issued: Mutex<Vec<String>>,
    valid: DashMap<String, TokenClaims>,
    invalidated: DashMap<String, ()>,
    fail_next_issue: AtomicBool,
    fail_next_renew: AtomicBool,
    fail_next_invalidate: AtomicBool,
    fail_next_purge: AtomicBool,
    has_old_keys: AtomicBool,
    mark_count: AtomicU32,
    purge_count: AtomicU32,
    renew_count: AtomicU32,
}

impl MockSigner {
    /// Create a mock signer.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            counter: AtomicU32::new(0),
            latency: Mutex::new(None),
            issued: Mutex::new(Vec::new()),
            valid: DashMap::new(),
            invalidated: DashMap::new(),
            fail_next_issue: AtomicBool::new(false),
            fail_next_renew: AtomicBool::new(false),
            fail_next_invalidate: AtomicBool::new(false),
            fail_next_purge: AtomicBool::new(false),
            has_old_keys: AtomicBool::new(false),
            mark_count: AtomicU32::new(0),
            purge_count: AtomicU32::new(0),
            renew_count: AtomicU32::new(0),
        })
    }

    /// Register an externally minted token as valid, for adoption tests.
    pub fn seed_token(&self, token: &str, subject: &str, expires_at: DateTime<Utc>) {
        self.valid.insert(
            token.to_string(),
            TokenClaims {
                subject: subject.to_string(),
                expires_at,
            },
        );
    }

    /// Stall every issue and renew call for `delay`, simulating a slow
    /// signing backend.
    pub fn set_latency(&self, delay: std::time::Duration) {
        *self.latency.lock() = Some(delay);
    }

    async fn stall(&self) {
        let delay = *self.latency.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    /// Make the next issue call fail.
    pub fn fail_next_issue(&self) {
        self.fail_next_issue.store(true, Ordering::SeqCst);
    }

    /// Make the next renew call fail.
    pub fn fail_next_renew(&self) {
        self.fail_next_renew.store(true, Ordering::SeqCst);
    }

    /// Make the next invalidate call fail.
    pub fn fail_next_invalidate(&self) {
        self.fail_next_invalidate.store(true, Ordering::SeqCst);
    }

    /// Make the next purge call fail.
    pub fn fail_next_purge(&self) {
        self.fail_next_purge.store(true, Ordering::SeqCst);
    }

    /// Pretend active keys exist that the next mark cycle can supersede.
    pub fn set_has_old_keys(&self) {
        self.has_old_keys.store(true, Ordering::SeqCst);
    }

    /// Whether a token was invalidated.
    pub fn is_invalidated(&self, token: &str) -> bool {
        self.invalidated.contains_key(token)
    }

    /// Whether a token is currently valid.
    pub fn is_valid(&self, token: &str) -> bool {
        self.valid.contains_key(token)
    }

    /// All tokens handed out by issue, in order.
    pub fn issued_tokens(&self) -> Vec<String> {
        self.issued.lock().clone()
    }

    /// Number of issue calls that succeeded.
    pub fn issue_count(&self) -> u32 {
        self.issued.lock().len() as u32
    }

    /// Number of renew calls that succeeded.
    pub fn renew_count(&self) -> u32 {
        self.renew_count.load(Ordering::SeqCst)
    }

    /// Number of mark cycles observed.
    pub fn mark_count(&self) -> u32 {
        self.mark_count.load(Ordering::SeqCst)
    }

    /// Number of successful purges.
    pub fn purge_count(&self) -> u32 {
        self.purge_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenSigner for MockSigner {
    async fn issue(&self, request: &IssueRequest) -> Result<String, SignerError> {
        self.stall().await;
        if self.fail_next_issue.swap(false, Ordering::SeqCst) {
            return Err(SignerError::KeyUnavailable {
                key: request.signing_key_name.clone(),
            });
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let token = format!("token-{}-{}", request.subject, n);
        self.valid.insert(
            token.clone(),
            TokenClaims {
                subject: request.subject.clone(),
                expires_at: request.expires_at,
            },
        );
        self.issued.lock().push(token.clone());
        Ok(token)
    }

    async fn verify(&self, token: &str, _issuer: &str) -> Result<TokenClaims, SignerError> {
        if self.invalidated.contains_key(token) {
            return Err(SignerError::InvalidToken {
                reason: "token was invalidated".to_string(),
            });
        }
        let claims = self
            .valid
            .get(token)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SignerError::InvalidToken {
                reason: "unknown token".to_string(),
            })?;
        if claims.expires_at <= Utc::now() {
            return Err(SignerError::InvalidToken {
                reason: "token expired".to_string(),
            });
        }
        Ok(claims)
    }

    async fn renew(
        &self,
        token: &str,
        new_expires_at: DateTime<Utc>,
        _issued_at: DateTime<Utc>,
        _renewable: bool,
        _extra_claims: Map<String, Value>,
    ) -> Result<String, SignerError> {
        self.stall().await;
        if self.fail_next_renew.swap(false, Ordering::SeqCst) {
            return Err(SignerError::KeyUnavailable {
                key: "renewal-key".to_string(),
            });
        }
        let claims = self
            .valid
            .get(token)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SignerError::InvalidToken {
                reason: "cannot renew unknown token".to_string(),
            })?;

        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let renewed = format!("renewed-{}-{}", claims.subject, n);
        self.valid.insert(
            renewed.clone(),
            TokenClaims {
                subject: claims.subject,
                expires_at: new_expires_at,
            },
        );
        // Renewal consumes the old token.
        self.valid.remove(token);
        self.invalidated.insert(token.to_string(), ());
        self.renew_count.fetch_add(1, Ordering::SeqCst);
        Ok(renewed)
    }

    async fn invalidate(&self, token: &str) -> Result<(), SignerError> {
        if self.fail_next_invalidate.swap(false, Ordering::SeqCst) {
            return Err(SignerError::Invalidation("mock failure".to_string()));
        }
        self.valid.remove(token);
        self.invalidated.insert(token.to_string(), ());
        Ok(())
    }

    async fn mark_old_signing_keys(&self) -> Result<bool, SignerError> {
        self.mark_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.has_old_keys.swap(false, Ordering::SeqCst))
    }

    async fn remove_marked_keys(&self) -> Result<(), SignerError> {
        if self.fail_next_purge.swap(false, Ordering::SeqCst) {
            return Err(SignerError::KeyStore("mock purge failure".to_string()));
        }
        self.purge_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory token file store with failure injection.
pub struct MockTokenFiles {
    files: DashMap<PathBuf, String>,
    fail_next_write: AtomicBool,
    fail_next_delete: AtomicBool,
}

impl MockTokenFiles {
    /// Create an empty store.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            files: DashMap::new(),
            fail_next_write: AtomicBool::new(false),
            fail_next_delete: AtomicBool::new(false),
        })
    }

    /// Make the next write fail.
    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }

    /// Make the next delete fail.
    pub fn fail_next_delete(&self) {
        self.fail_next_delete.store(true, Ordering::SeqCst);
    }

    /// Pre-populate a token file.
    pub fn insert(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.files.insert(path.into(), content.into());
    }

    /// Current content at `path`.
    pub fn contents(&self, path: &Path) -> Option<String> {
        self.files.get(path).map(|entry| entry.value().clone())
    }

    /// Number of stored files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[async_trait]
impl TokenFileStore for MockTokenFiles {
    async fn write(&self, path: &Path, token: &SecureString) -> Result<(), FileStoreError> {
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(FileStoreError::Write {
                path: path.to_path_buf(),
                source: std::io::Error::other("mock write failure"),
            });
        }
        self.files
            .insert(path.to_path_buf(), token.expose().to_string());
        Ok(())
    }

    async fn read(&self, path: &Path) -> Result<String, FileStoreError> {
        self.files
            .get(path)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| FileStoreError::Read {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            })
    }

    async fn delete(&self, path: &Path) -> Result<(), FileStoreError> {
        if self.fail_next_delete.swap(false, Ordering::SeqCst) {
            return Err(FileStoreError::Delete {
                path: path.to_path_buf(),
                source: std::io::Error::other("mock delete failure"),
            });
        }
        self.files.remove(path);
        Ok(())
    }
}

/// Directory mock backed by plain maps.
pub struct StaticDirectory {
    projects: DashMap<ProjectId, ()>,
    subjects: DashMap<UserId, SubjectProfile>,
    sessions: DashMap<(ProjectId, UserId), SessionConfig>,
    alive: DashMap<(ProjectId, UserId), bool>,
}

impl StaticDirectory {
    /// Create an empty directory.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            projects: DashMap::new(),
            subjects: DashMap::new(),
            sessions: DashMap::new(),
            alive: DashMap::new(),
        })
    }

    /// Register a project.
    pub fn add_project(&self, project: ProjectId) {
        self.projects.insert(project, ());
    }

    /// Register a subject.
    pub fn add_subject(&self, user: UserId, username: &str, roles: &[&str]) {
        self.subjects.insert(
            user,
            SubjectProfile {
                username: username.to_string(),
                roles: roles.iter().map(|r| (*r).to_string()).collect(),
            },
        );
    }

    /// Persist a session configuration.
    pub fn add_session(&self, project: ProjectId, user: UserId, config: SessionConfig) {
        self.sessions.insert((project, user), config);
    }

    /// Set process liveness for (project, user).
    pub fn set_alive(&self, project: ProjectId, user: UserId, alive: bool) {
        self.alive.insert((project, user), alive);
    }
}

#[async_trait]
impl SessionDirectory for StaticDirectory {
    async fn project_exists(&self, project: ProjectId) -> bool {
        self.projects.contains_key(&project)
    }

    async fn subject(&self, user: UserId) -> Option<SubjectProfile> {
        self.subjects.get(&user).map(|entry| entry.value().clone())
    }

    async fn session_config(&self, project: ProjectId, user: UserId) -> Option<SessionConfig> {
        self.sessions
            .get(&(project, user))
            .map(|entry| entry.value().clone())
    }

    async fn is_alive(&self, project: ProjectId, user: UserId) -> bool {
        self.alive
            .get(&(project, user))
            .map(|entry| *entry.value())
            .unwrap_or(false)
    }
}

/// Leadership oracle with a switchable flag.
pub struct StaticCluster {
    primary: AtomicBool,
}

impl StaticCluster {
    /// Create an oracle reporting the given leadership state.
    pub fn new(primary: bool) -> Arc<Self> {
        Arc::new(Self {
            primary: AtomicBool::new(primary),
        })
    }

    /// Flip leadership.
    pub fn set_primary(&self, primary: bool) {
        self.primary.store(primary, Ordering::SeqCst);
    }
}

impl ClusterState for StaticCluster {
    fn is_primary(&self) -> bool {
        self.primary.load(Ordering::SeqCst)
    }
}
