//! Periodic renewal sweep over the expiry cache.

use crate::cache::ExpiryCache;
use crate::core::{SecureString, SessionCredential};
use crate::manager::{LifecycleConfig, TokenPolicy};
use crate::traits::{ClusterState, TokenFileStore, TokenSigner};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Map;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Renews credentials approaching expiry.
///
/// Each tick walks the cache in ascending expiry order and stops at the
/// first record outside the renewal lead time — every later record
/// expires even later, so none of them is due either. Signer calls and
/// file writes happen outside the cache lock; the staged replacements are
/// swapped in under a single writer-lock acquisition at the end of the
/// sweep.
///
/// Records renewed mid-sweep get later expiries but are not re-evaluated
/// until the next tick. That is intentional: it keeps each tick from
/// reprocessing the whole cache.
///
/// Renewal consumes the old token, so a staged replacement whose final
/// swap times out must not be discarded: the cached record would keep a
/// dead token and every later sweep would fail to renew it. Such batches
/// are retained and swapped in at the start of the next tick.
pub struct RenewalScheduler {
    signer: Arc<dyn TokenSigner>,
    files: Arc<dyn TokenFileStore>,
    cluster: Arc<dyn ClusterState>,
    cache: Arc<ExpiryCache>,
    policy: TokenPolicy,
    config: LifecycleConfig,
    retained: Mutex<Vec<Arc<SessionCredential>>>,
}

impl RenewalScheduler {
    /// Create a renewal scheduler over its collaborator seams.
    pub fn new(
        signer: Arc<dyn TokenSigner>,
        files: Arc<dyn TokenFileStore>,
        cluster: Arc<dyn ClusterState>,
        cache: Arc<ExpiryCache>,
        policy: TokenPolicy,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            signer,
            files,
            cluster,
            cache,
            policy,
            config,
            retained: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the periodic sweep loop. The loop exits when `shutdown` is
    /// cancelled; an in-flight tick finishes first.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(self.config.renewal_initial_delay) => {}
                _ = shutdown.cancelled() => return,
            }
            let mut interval = tokio::time::interval(self.config.renewal_interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => self.tick().await,
                    _ = shutdown.cancelled() => {
                        info!("renewal scheduler shutting down");
                        return;
                    }
                }
            }
        })
    }

    /// Run one renewal sweep. A non-primary node does nothing.
    pub async fn tick(&self) {
        if !self.cluster.is_primary() {
            return;
        }
        if !self.flush_retained() {
            // The cached records behind the retained batch hold consumed
            // tokens; scanning them again would only fail their renewals.
            return;
        }

        let now = Utc::now();
        let lead = self.config.renew_lead_chrono();
        let mut renewed = Vec::new();

        for record in self.cache.ascending() {
            // Sorted by expiry: the first record not yet due ends the scan.
            if !record.due_for_renewal(now, lead) {
                break;
            }
            if let Some(replacement) = self.renew_one(&record, now).await {
                renewed.push(replacement);
            }
        }

        if renewed.is_empty() {
            return;
        }

        let count = renewed.len();
        match self.cache.swap(renewed.iter().cloned()) {
            Ok(()) => debug!(count, "renewed session credentials"),
            Err(e) => {
                warn!(error = %e, count, "cache swap timed out, retaining renewed credentials");
                self.retained.lock().extend(renewed);
            }
        }
    }

    /// Swap in replacements left over from a sweep whose final swap timed
    /// out. Returns false if the cache is still unavailable.
    fn flush_retained(&self) -> bool {
        let retained = std::mem::take(&mut *self.retained.lock());
        if retained.is_empty() {
            return true;
        }
        let count = retained.len();
        match self.cache.swap(retained.iter().cloned()) {
            Ok(()) => {
                debug!(count, "swapped in retained renewed credentials");
                true
            }
            Err(e) => {
                warn!(error = %e, count, "cache still unavailable, keeping retained credentials");
                *self.retained.lock() = retained;
                false
            }
        }
    }

    async fn renew_one(
        &self,
        record: &Arc<SessionCredential>,
        now: DateTime<Utc>,
    ) -> Option<Arc<SessionCredential>> {
        let new_expires_at = now + self.policy.lifetime_chrono();

        let token = match self
            .signer
            .renew(record.token.expose(), new_expires_at, now, false, Map::new())
            .await
        {
            Ok(token) => SecureString::new(token),
            Err(e) => {
                warn!(session = %record.session_key, error = %e,
                    "could not renew session credential");
                return None;
            }
        };

        if let Err(e) = self.files.write(&record.token_path, &token).await {
            warn!(session = %record.session_key, error = %e,
                "could not persist renewed token");
            if let Err(inv) = self.signer.invalidate(token.expose()).await {
                debug!(error = %inv, "could not invalidate unpersisted renewed token");
            }
            return None;
        }

        Some(Arc::new(SessionCredential {
            expires_at: new_expires_at,
            token,
            ..(**record).clone()
        }))
    }
}
