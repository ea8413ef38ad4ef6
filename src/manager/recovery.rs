//! Startup reconciliation of ledger rows with live processes and disk.

use crate::cache::ExpiryCache;
use crate::core::{CredentialUsage, MaterialKey, SecureString, SessionCredential};
use crate::manager::{LifecycleConfig, TokenPolicy};
use crate::traits::{
    ClusterState, MaterialLedger, SessionDirectory, TokenFileStore, TokenSigner,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome counters of one recovery pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Rows whose on-disk token was still valid and was adopted as-is.
    pub adopted: usize,
    /// Rows whose token was regenerated through the issuance path.
    pub regenerated: usize,
    /// Rows that could not be recovered and were deleted.
    pub pruned: usize,
}

enum RowOutcome {
    Adopted(Arc<SessionCredential>),
    Regenerated(Arc<SessionCredential>),
    Unrecoverable,
}

/// Rebuilds the expiry cache from the ledger after a restart.
///
/// Runs once at startup on the primary node only. Every row is handled in
/// isolation with relaxed durability: a row either yields a cache record
/// whose token verifies, or the row is deleted — never a row with no
/// recoverable token behind it.
pub struct RecoveryProcess {
    signer: Arc<dyn TokenSigner>,
    ledger: Arc<dyn MaterialLedger>,
    files: Arc<dyn TokenFileStore>,
    directory: Arc<dyn SessionDirectory>,
    cluster: Arc<dyn ClusterState>,
    cache: Arc<ExpiryCache>,
    policy: TokenPolicy,
    config: LifecycleConfig,
}

impl RecoveryProcess {
    /// Create a recovery process over its collaborator seams.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        signer: Arc<dyn TokenSigner>,
        ledger: Arc<dyn MaterialLedger>,
        files: Arc<dyn TokenFileStore>,
        directory: Arc<dyn SessionDirectory>,
        cluster: Arc<dyn ClusterState>,
        cache: Arc<ExpiryCache>,
        policy: TokenPolicy,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            signer,
            ledger,
            files,
            directory,
            cluster,
            cache,
            policy,
            config,
        }
    }

    /// Run the recovery pass. A non-primary node returns immediately with
    /// an empty report.
    pub async fn run(&self) -> RecoveryReport {
        // Only one node recovers; a freshly restarted node is not primary.
        if !self.cluster.is_primary() {
            debug!("not the primary node, skipping credential recovery");
            return RecoveryReport::default();
        }

        info!("starting session credential recovery");
        let rows = match self
            .ledger
            .find_all_by_usage(CredentialUsage::Notebook)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "could not list ledger rows, skipping recovery");
                return RecoveryReport::default();
            }
        };

        let mut report = RecoveryReport::default();
        let mut unrecoverable = Vec::new();

        for key in rows {
            match self.recover_row(&key).await {
                RowOutcome::Adopted(record) => match self.cache.add(record) {
                    Ok(_) => report.adopted += 1,
                    Err(e) => {
                        warn!(key = %key, error = %e, "could not cache adopted record");
                        unrecoverable.push(key);
                    }
                },
                RowOutcome::Regenerated(record) => {
                    match self.cache.add(Arc::clone(&record)) {
                        Ok(_) => report.regenerated += 1,
                        Err(e) => {
                            warn!(key = %key, error = %e,
                                "could not cache regenerated record, discarding its token");
                            self.discard_regenerated(&record).await;
                            unrecoverable.push(key);
                        }
                    }
                }
                RowOutcome::Unrecoverable => unrecoverable.push(key),
            }
        }

        for key in &unrecoverable {
            match self.ledger.delete(key).await {
                Ok(()) => report.pruned += 1,
                Err(e) => warn!(key = %key, error = %e, "could not prune unrecoverable ledger row"),
            }
        }

        info!(
            adopted = report.adopted,
            regenerated = report.regenerated,
            pruned = report.pruned,
            "finished session credential recovery"
        );
        report
    }

    /// A regenerated record that never made it into the cache leaves a
    /// live token behind; delete its file and invalidate it best-effort
    /// before the row is pruned.
    async fn discard_regenerated(&self, record: &SessionCredential) {
        if let Err(e) = self.files.delete(&record.token_path).await {
            debug!(error = %e, "could not delete discarded regenerated token file");
        }
        if let Err(e) = self.signer.invalidate(record.token.expose()).await {
            debug!(error = %e, "could not invalidate discarded regenerated token");
        }
    }

    async fn recover_row(&self, key: &MaterialKey) -> RowOutcome {
        debug!(key = %key, "recovering session credential");

        let Some(profile) = self.directory.subject(key.user).await else {
            warn!(key = %key, "subject no longer exists, cannot recover");
            return RowOutcome::Unrecoverable;
        };
        if !self.directory.project_exists(key.project).await {
            warn!(key = %key, "project no longer exists, cannot recover");
            return RowOutcome::Unrecoverable;
        }

        let Some(session) = self.directory.session_config(key.project, key.user).await else {
            debug!(key = %key, "no session configuration persisted, cannot recover");
            return RowOutcome::Unrecoverable;
        };

        if !self.directory.is_alive(key.project, key.user).await {
            debug!(key = %key, "owning process is not alive, skipping recovery");
            return RowOutcome::Unrecoverable;
        }

        let token_path = session.token_path(&self.config.staging_dir);

        // Prefer adopting the token already on disk.
        match self.files.read(&token_path).await {
            Ok(token) => match self.signer.verify(&token, &self.policy.issuer).await {
                Ok(claims) => {
                    debug!(key = %key, "adopted existing token from disk");
                    return RowOutcome::Adopted(Arc::new(SessionCredential {
                        project: key.project,
                        user: key.user,
                        usage: key.usage,
                        session_key: session.session_key.clone(),
                        expires_at: claims.expires_at,
                        token: SecureString::new(token),
                        token_path,
                    }));
                }
                Err(e) => {
                    debug!(key = %key, error = %e, "existing token is unusable, regenerating");
                }
            },
            Err(e) => {
                debug!(key = %key, error = %e, "could not read existing token, regenerating");
            }
        }

        // No usable token on disk: mint a fresh one through the same
        // issuance path materialize uses.
        let issued_at = Utc::now();
        let expires_at = issued_at + self.policy.lifetime_chrono();
        let request = self.policy.issue_request(&profile, expires_at, issued_at);

        let token = match self.signer.issue(&request).await {
            Ok(token) => SecureString::new(token),
            Err(e) => {
                warn!(key = %key, error = %e, "could not regenerate token, giving up on row");
                return RowOutcome::Unrecoverable;
            }
        };

        if let Err(e) = self.files.write(&token_path, &token).await {
            warn!(key = %key, error = %e,
                "regenerated token but failed to persist it, invalidating");
            if let Err(inv) = self.signer.invalidate(token.expose()).await {
                debug!(error = %inv, "could not invalidate unpersisted token");
            }
            return RowOutcome::Unrecoverable;
        }

        RowOutcome::Regenerated(Arc::new(SessionCredential {
            project: key.project,
            user: key.user,
            usage: key.usage,
            session_key: session.session_key.clone(),
            expires_at,
            token,
            token_path,
        }))
    }
}
