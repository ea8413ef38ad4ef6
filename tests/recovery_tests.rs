//! Startup recovery scenarios: adopt, regenerate, prune.

use chrono::{Duration as ChronoDuration, Utc};
use pretty_assertions::assert_eq;
use sandbox_credential::cache::ExpiryCache;
use sandbox_credential::core::{
    CredentialUsage, MaterialKey, ProjectId, SessionConfig, SessionCredential, SessionKey, UserId,
};
use sandbox_credential::manager::{LifecycleConfig, RecoveryProcess, RecoveryReport, TokenPolicy};
use sandbox_credential::storage::MemoryLedger;
use sandbox_credential::testing::{MockSigner, MockTokenFiles, StaticCluster, StaticDirectory};
use sandbox_credential::traits::MaterialLedger;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    signer: Arc<MockSigner>,
    ledger: Arc<MemoryLedger>,
    files: Arc<MockTokenFiles>,
    directory: Arc<StaticDirectory>,
    cluster: Arc<StaticCluster>,
    cache: Arc<ExpiryCache>,
    recovery: RecoveryProcess,
}

fn harness() -> Harness {
    let signer = MockSigner::new();
    let ledger = MemoryLedger::new();
    let files = MockTokenFiles::new();
    let directory = StaticDirectory::new();
    let cluster = StaticCluster::new(true);
    let config = LifecycleConfig {
        staging_dir: PathBuf::from("/stage"),
        ..Default::default()
    };
    let cache = Arc::new(ExpiryCache::new(config.lock_timeout));
    let recovery = RecoveryProcess::new(
        signer.clone(),
        ledger.clone(),
        files.clone(),
        directory.clone(),
        cluster.clone(),
        Arc::clone(&cache),
        TokenPolicy::default(),
        config,
    );
    Harness {
        signer,
        ledger,
        files,
        directory,
        cluster,
        cache,
        recovery,
    }
}

fn key() -> MaterialKey {
    MaterialKey::new(ProjectId(1), UserId(7), CredentialUsage::Notebook)
}

fn session_key() -> SessionKey {
    SessionKey::new("c0ffee", 8888)
}

fn token_path() -> PathBuf {
    PathBuf::from("/stage/.private/s3cret/token.jwt")
}

/// Seed a fully recoverable row: subject, project, session config, alive
/// process, ledger row. No token file.
async fn seed_live_row(h: &Harness) {
    h.directory.add_project(ProjectId(1));
    h.directory.add_subject(UserId(7), "jdoe", &["user"]);
    h.directory.add_session(
        ProjectId(1),
        UserId(7),
        SessionConfig::new(session_key(), "s3cret"),
    );
    h.directory.set_alive(ProjectId(1), UserId(7), true);
    h.ledger.persist(&key()).await.unwrap();
}

#[tokio::test]
async fn adopts_valid_token_from_disk() {
    let h = harness();
    seed_live_row(&h).await;

    let expires_at = Utc::now() + ChronoDuration::seconds(1800);
    h.signer.seed_token("disk-token", "jdoe", expires_at);
    h.files.insert(token_path(), "disk-token");

    let report = h.recovery.run().await;
    assert_eq!(
        report,
        RecoveryReport {
            adopted: 1,
            regenerated: 0,
            pruned: 0
        }
    );

    let record = h.cache.get(&session_key()).unwrap();
    assert_eq!(record.token.expose(), "disk-token");
    assert_eq!(record.expires_at, expires_at);
    // No new token was minted.
    assert_eq!(h.signer.issue_count(), 0);
}

#[tokio::test]
async fn regenerates_when_token_file_is_missing() {
    let h = harness();
    seed_live_row(&h).await;

    let report = h.recovery.run().await;
    assert_eq!(report.regenerated, 1);
    assert_eq!(report.pruned, 0);

    assert_eq!(h.signer.issue_count(), 1);
    let record = h.cache.get(&session_key()).unwrap();
    assert_eq!(
        h.files.contents(&token_path()).unwrap(),
        record.token.expose()
    );
    assert!(h.ledger.exists(&key()).await.unwrap());
}

#[tokio::test]
async fn regenerates_when_disk_token_fails_verification() {
    let h = harness();
    seed_live_row(&h).await;
    // On disk but never registered with the signer.
    h.files.insert(token_path(), "forged-token");

    let report = h.recovery.run().await;
    assert_eq!(report.regenerated, 1);

    let record = h.cache.get(&session_key()).unwrap();
    assert_ne!(record.token.expose(), "forged-token");
    assert_eq!(
        h.files.contents(&token_path()).unwrap(),
        record.token.expose()
    );
}

#[tokio::test]
async fn regenerates_when_disk_token_is_expired() {
    let h = harness();
    seed_live_row(&h).await;
    h.signer
        .seed_token("stale-token", "jdoe", Utc::now() - ChronoDuration::seconds(10));
    h.files.insert(token_path(), "stale-token");

    let report = h.recovery.run().await;
    assert_eq!(report.regenerated, 1);
    assert_eq!(h.signer.issue_count(), 1);
}

#[tokio::test]
async fn prunes_row_when_subject_is_gone() {
    let h = harness();
    h.directory.add_project(ProjectId(1));
    h.ledger.persist(&key()).await.unwrap();

    let report = h.recovery.run().await;
    assert_eq!(report.pruned, 1);
    assert!(!h.ledger.exists(&key()).await.unwrap());
    assert!(h.cache.is_empty());
}

#[tokio::test]
async fn prunes_row_when_project_is_gone() {
    let h = harness();
    h.directory.add_subject(UserId(7), "jdoe", &["user"]);
    h.ledger.persist(&key()).await.unwrap();

    let report = h.recovery.run().await;
    assert_eq!(report.pruned, 1);
    assert!(!h.ledger.exists(&key()).await.unwrap());
}

#[tokio::test]
async fn prunes_row_without_session_configuration() {
    let h = harness();
    h.directory.add_project(ProjectId(1));
    h.directory.add_subject(UserId(7), "jdoe", &["user"]);
    h.ledger.persist(&key()).await.unwrap();

    let report = h.recovery.run().await;
    assert_eq!(report.pruned, 1);
    assert!(h.cache.is_empty());
}

#[tokio::test]
async fn prunes_row_when_owning_process_is_dead() {
    let h = harness();
    seed_live_row(&h).await;
    h.directory.set_alive(ProjectId(1), UserId(7), false);

    let report = h.recovery.run().await;
    assert_eq!(report.pruned, 1);
    assert!(!h.ledger.exists(&key()).await.unwrap());
}

#[tokio::test]
async fn prunes_and_invalidates_when_regenerated_token_cannot_persist() {
    let h = harness();
    seed_live_row(&h).await;
    h.files.fail_next_write();

    let report = h.recovery.run().await;
    assert_eq!(report.pruned, 1);
    assert_eq!(report.regenerated, 0);
    assert!(h.cache.is_empty());

    let issued = h.signer.issued_tokens();
    assert_eq!(issued.len(), 1);
    assert!(h.signer.is_invalidated(&issued[0]));
}

#[tokio::test]
async fn rows_are_recovered_in_isolation() {
    let h = harness();
    seed_live_row(&h).await;
    // Second row with no subject behind it.
    h.ledger
        .persist(&MaterialKey::new(
            ProjectId(2),
            UserId(8),
            CredentialUsage::Notebook,
        ))
        .await
        .unwrap();

    let report = h.recovery.run().await;
    assert_eq!(report.regenerated, 1);
    assert_eq!(report.pruned, 1);
    assert_eq!(h.ledger.len(), 1);
    assert_eq!(h.cache.len(), 1);
}

struct WriterHold {
    hold: Duration,
    started: std::sync::mpsc::Sender<()>,
}

impl Iterator for WriterHold {
    type Item = Arc<SessionCredential>;

    fn next(&mut self) -> Option<Self::Item> {
        // Runs under the cache writer lock, pinning it for `hold`.
        let _ = self.started.send(());
        std::thread::sleep(self.hold);
        None
    }
}

#[tokio::test]
async fn prunes_and_discards_token_when_regenerated_record_cannot_be_cached() {
    let signer = MockSigner::new();
    let ledger = MemoryLedger::new();
    let files = MockTokenFiles::new();
    let directory = StaticDirectory::new();
    let cluster = StaticCluster::new(true);
    let config = LifecycleConfig {
        staging_dir: PathBuf::from("/stage"),
        ..Default::default()
    };
    let cache = Arc::new(ExpiryCache::new(Duration::from_millis(50)));
    let recovery = RecoveryProcess::new(
        signer.clone(),
        ledger.clone(),
        files.clone(),
        directory.clone(),
        cluster.clone(),
        Arc::clone(&cache),
        TokenPolicy::default(),
        config,
    );

    directory.add_project(ProjectId(1));
    directory.add_subject(UserId(7), "jdoe", &["user"]);
    directory.add_session(
        ProjectId(1),
        UserId(7),
        SessionConfig::new(session_key(), "s3cret"),
    );
    directory.set_alive(ProjectId(1), UserId(7), true);
    ledger.persist(&key()).await.unwrap();

    // Pin the cache writer lock for the whole pass so the insert of the
    // regenerated record times out.
    let (started, wait) = std::sync::mpsc::channel();
    let holder_cache = Arc::clone(&cache);
    let holder = std::thread::spawn(move || {
        let _ = holder_cache.swap(WriterHold {
            hold: Duration::from_millis(600),
            started,
        });
    });
    wait.recv().unwrap();

    let report = recovery.run().await;
    assert_eq!(report.pruned, 1);
    assert_eq!(report.regenerated, 0);
    assert!(!ledger.exists(&key()).await.unwrap());

    // The minted token did not leak: file deleted, token invalidated.
    assert!(files.contents(&token_path()).is_none());
    let issued = signer.issued_tokens();
    assert_eq!(issued.len(), 1);
    assert!(signer.is_invalidated(&issued[0]));

    holder.join().unwrap();
    assert!(cache.is_empty());
}

#[tokio::test]
async fn non_primary_node_skips_recovery() {
    let h = harness();
    seed_live_row(&h).await;
    h.cluster.set_primary(false);

    let report = h.recovery.run().await;
    assert_eq!(report, RecoveryReport::default());
    assert!(h.cache.is_empty());
    assert!(h.ledger.exists(&key()).await.unwrap());
    assert_eq!(h.signer.issue_count(), 0);
}
