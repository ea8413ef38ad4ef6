//! Idempotent materialization and retirement of session credentials.

use crate::cache::ExpiryCache;
use crate::core::{
    CacheError, MaterialKey, MaterializeError, SecureString, SessionConfig, SessionCredential,
    SessionKey,
};
use crate::manager::{LifecycleConfig, TokenPolicy};
use crate::traits::{MaterialLedger, SubjectProfile, TokenFileStore, TokenSigner};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Entry point the API layer uses to create and retire credentials.
///
/// Materialization is durability-first: the ledger row is persisted
/// before the signer is asked for a token, so a crash between the two is
/// healed by recovery instead of silently losing the attempt. All write
/// paths are serialized through one gate with a bounded acquisition
/// timeout; lookups go straight to the cache.
pub struct CredentialMaterializer {
    signer: Arc<dyn TokenSigner>,
    ledger: Arc<dyn MaterialLedger>,
    files: Arc<dyn TokenFileStore>,
    cache: Arc<ExpiryCache>,
    policy: TokenPolicy,
    config: LifecycleConfig,
    write_gate: Mutex<()>,
}

impl CredentialMaterializer {
    /// Create a materializer over its collaborator seams.
    pub fn new(
        signer: Arc<dyn TokenSigner>,
        ledger: Arc<dyn MaterialLedger>,
        files: Arc<dyn TokenFileStore>,
        cache: Arc<ExpiryCache>,
        policy: TokenPolicy,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            signer,
            ledger,
            files,
            cache,
            policy,
            config,
            write_gate: Mutex::new(()),
        }
    }

    /// The expiry cache this materializer feeds.
    pub fn cache(&self) -> &Arc<ExpiryCache> {
        &self.cache
    }

    /// Materialize a credential for `key`, bound to the session described
    /// by `session`.
    ///
    /// Idempotent: if a ledger row already exists for the key, no new
    /// credential is created and the live record (if cached) is returned.
    /// `Ok(None)` means a prior materialization owns the key but no record
    /// is currently cached — a crash window recovery will heal.
    ///
    /// # Errors
    ///
    /// [`MaterializeError::SigningFailed`] if issuance fails (row rolled
    /// back), [`MaterializeError::PersistFailed`] if the token file write
    /// fails (row rolled back, token invalidated best-effort),
    /// [`MaterializeError::Ledger`] if the ledger itself fails, and
    /// [`MaterializeError::LockTimeout`] if serialization timed out.
    pub async fn materialize(
        &self,
        key: MaterialKey,
        session: &SessionConfig,
        profile: &SubjectProfile,
    ) -> Result<Option<Arc<SessionCredential>>, MaterializeError> {
        let _gate = tokio::time::timeout(self.config.lock_timeout, self.write_gate.lock())
            .await
            .map_err(|_| MaterializeError::LockTimeout {
                key,
                source: CacheError::LockTimeout {
                    timeout: self.config.lock_timeout,
                },
            })?;

        if self
            .ledger
            .exists(&key)
            .await
            .map_err(|source| MaterializeError::Ledger { key, source })?
        {
            debug!(key = %key, "credential already materialized");
            return Ok(self.cache.get(&session.session_key));
        }

        // Durability first: the row must exist before any token does, so
        // recovery can never miss an attempted issuance.
        self.ledger
            .persist(&key)
            .await
            .map_err(|source| MaterializeError::Ledger { key, source })?;

        let issued_at = Utc::now();
        let expires_at = issued_at + self.policy.lifetime_chrono();
        let request = self.policy.issue_request(profile, expires_at, issued_at);

        let token = match self.signer.issue(&request).await {
            Ok(token) => SecureString::new(token),
            Err(source) => {
                warn!(key = %key, error = %source, "token issuance failed, rolling back ledger row");
                self.delete_row_best_effort(&key).await;
                return Err(MaterializeError::SigningFailed { key, source });
            }
        };

        let token_path = session.token_path(&self.config.staging_dir);
        if let Err(source) = self.files.write(&token_path, &token).await {
            warn!(key = %key, error = %source, "token file write failed, rolling back");
            self.delete_row_best_effort(&key).await;
            self.invalidate_best_effort(&token).await;
            return Err(MaterializeError::PersistFailed { key, source });
        }

        let record = Arc::new(SessionCredential {
            project: key.project,
            user: key.user,
            usage: key.usage,
            session_key: session.session_key.clone(),
            expires_at,
            token,
            token_path: token_path.clone(),
        });

        if let Err(source) = self.cache.add(Arc::clone(&record)) {
            warn!(key = %key, error = %source, "cache insert timed out, rolling back");
            if let Err(e) = self.files.delete(&token_path).await {
                debug!(error = %e, "could not delete token file during rollback");
            }
            self.delete_row_best_effort(&key).await;
            self.invalidate_best_effort(&record.token).await;
            return Err(MaterializeError::LockTimeout { key, source });
        }

        info!(key = %key, session = %record.session_key, expires_at = %expires_at,
            "materialized session credential");
        Ok(Some(record))
    }

    /// Retire the credential bound to `session_key`.
    ///
    /// Never fails observably: an absent record is a logged no-op, and
    /// each teardown step (token file, ledger row, cache entry, token
    /// invalidation) proceeds even if an earlier one failed — the caller
    /// is session teardown and cannot retry indefinitely.
    pub async fn retire(&self, session_key: &SessionKey) {
        let Some(record) = self.cache.get(session_key) else {
            warn!(session = %session_key, "no credential found to retire");
            return;
        };

        let _gate = match tokio::time::timeout(self.config.lock_timeout, self.write_gate.lock())
            .await
        {
            Ok(gate) => gate,
            Err(_) => {
                warn!(session = %session_key, "write gate busy, abandoning retirement");
                return;
            }
        };

        let key = record.material_key();

        if let Err(e) = self.files.delete(&record.token_path).await {
            warn!(key = %key, error = %e, "could not delete token file during retirement");
        }

        match self.ledger.exists(&key).await {
            Ok(true) => {
                if let Err(e) = self.ledger.delete(&key).await {
                    warn!(key = %key, error = %e, "could not delete ledger row during retirement");
                }
            }
            Ok(false) => {}
            Err(e) => {
                warn!(key = %key, error = %e, "could not check ledger row during retirement");
            }
        }

        if let Err(e) = self.cache.remove(session_key) {
            warn!(key = %key, error = %e, "could not remove cached record during retirement");
        }

        self.invalidate_best_effort(&record.token).await;
        info!(key = %key, session = %session_key, "retired session credential");
    }

    async fn delete_row_best_effort(&self, key: &MaterialKey) {
        if let Err(e) = self.ledger.delete(key).await {
            warn!(key = %key, error = %e, "could not roll back ledger row");
        }
    }

    async fn invalidate_best_effort(&self, token: &SecureString) {
        if let Err(e) = self.signer.invalidate(token.expose()).await {
            debug!(error = %e, "could not invalidate discarded token");
        }
    }
}
