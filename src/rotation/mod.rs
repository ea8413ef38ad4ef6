//! Signing-key rotation: mark superseded keys, purge them after a safety
//! window.

use crate::manager::{LifecycleConfig, TokenPolicy};
use crate::traits::{ClusterState, TokenSigner};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Rotates signing keys on the primary node.
///
/// A periodic cycle asks the signer to mark currently active keys as
/// superseded; new tokens use a newer key from then on. When any key was
/// marked, a one-shot purge is scheduled after the safety window
/// `2 * (token lifetime + expiry leeway)`, so every token signed with a
/// marked key has expired (plus clock skew) before the key disappears.
///
/// A failed purge is logged; the marked keys stay marked and are purged
/// after the next cycle schedules a fresh one-shot.
pub struct KeyRotator {
    signer: Arc<dyn TokenSigner>,
    cluster: Arc<dyn ClusterState>,
    interval: Duration,
    purge_delay: Duration,
}

impl KeyRotator {
    /// Create a key rotator; the purge delay derives from the token
    /// policy's lifetime and leeway.
    pub fn new(
        signer: Arc<dyn TokenSigner>,
        cluster: Arc<dyn ClusterState>,
        policy: &TokenPolicy,
        config: &LifecycleConfig,
    ) -> Self {
        Self {
            signer,
            cluster,
            interval: config.rotation_interval,
            purge_delay: policy.purge_safety_window(),
        }
    }

    /// Delay between marking keys and purging them.
    pub fn purge_delay(&self) -> Duration {
        self.purge_delay
    }

    /// Spawn the periodic mark cycle. Exits when `shutdown` is cancelled;
    /// pending one-shot purges are abandoned with it.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => self.mark_cycle(&shutdown).await,
                    _ = shutdown.cancelled() => {
                        info!("key rotator shutting down");
                        return;
                    }
                }
            }
        })
    }

    /// Run one mark cycle, scheduling the delayed purge if any key was
    /// marked. A non-primary node does nothing.
    pub async fn mark_cycle(&self, shutdown: &CancellationToken) {
        if !self.cluster.is_primary() {
            return;
        }

        match self.signer.mark_old_signing_keys().await {
            Ok(true) => {
                info!(delay = ?self.purge_delay, "marked old signing keys, scheduling purge");
                let signer = Arc::clone(&self.signer);
                let delay = self.purge_delay;
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => match signer.remove_marked_keys().await {
                            Ok(()) => info!("purged marked signing keys"),
                            Err(e) => error!(error = %e, "could not purge marked signing keys"),
                        },
                        _ = shutdown.cancelled() => {}
                    }
                });
            }
            Ok(false) => debug!("no signing keys to mark"),
            Err(e) => error!(error = %e, "could not mark old signing keys"),
        }
    }
}
