//! Renewal sweep scenarios over the expiry-ordered cache.

use chrono::{Duration as ChronoDuration, Utc};
use pretty_assertions::assert_eq;
use sandbox_credential::cache::ExpiryCache;
use sandbox_credential::core::{
    CredentialUsage, ProjectId, SecureString, SessionCredential, SessionKey, UserId,
};
use sandbox_credential::manager::{LifecycleConfig, RenewalScheduler, TokenPolicy};
use sandbox_credential::testing::{MockSigner, MockTokenFiles, StaticCluster};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    signer: Arc<MockSigner>,
    files: Arc<MockTokenFiles>,
    cluster: Arc<StaticCluster>,
    cache: Arc<ExpiryCache>,
    scheduler: RenewalScheduler,
}

fn harness() -> Harness {
    let signer = MockSigner::new();
    let files = MockTokenFiles::new();
    let cluster = StaticCluster::new(true);
    let config = LifecycleConfig::default();
    let cache = Arc::new(ExpiryCache::new(config.lock_timeout));
    let scheduler = RenewalScheduler::new(
        signer.clone(),
        files.clone(),
        cluster.clone(),
        Arc::clone(&cache),
        TokenPolicy::default(),
        config,
    );
    Harness {
        signer,
        files,
        cluster,
        cache,
        scheduler,
    }
}

/// Seed a cached record whose token the signer considers valid.
fn seed_record(h: &Harness, cid: &str, token: &str, expires_in_secs: i64) -> Arc<SessionCredential> {
    let expires_at = Utc::now() + ChronoDuration::seconds(expires_in_secs);
    h.signer.seed_token(token, "jdoe", expires_at);
    let record = Arc::new(SessionCredential {
        project: ProjectId(1),
        user: UserId(7),
        usage: CredentialUsage::Notebook,
        session_key: SessionKey::new(cid, 8888),
        expires_at,
        token: SecureString::new(token),
        token_path: PathBuf::from(format!("/stage/.private/{cid}/token.jwt")),
    });
    h.files.insert(&record.token_path, token);
    h.cache.add(Arc::clone(&record)).unwrap();
    record
}

#[tokio::test]
async fn renews_record_within_lead_time() {
    let h = harness();
    // 30s left, lead time is 60s.
    let old = seed_record(&h, "a", "old-token", 30);

    h.scheduler.tick().await;

    assert_eq!(h.signer.renew_count(), 1);
    let renewed = h.cache.get(&old.session_key).unwrap();
    assert_ne!(renewed.token.expose(), "old-token");
    assert!(renewed.expires_at > Utc::now() + ChronoDuration::seconds(3500));

    // The file carries the new token, the old one is dead.
    assert_eq!(
        h.files.contents(&old.token_path).unwrap(),
        renewed.token.expose()
    );
    assert!(h.signer.is_invalidated("old-token"));
    assert_eq!(h.cache.len(), 1);
}

#[tokio::test]
async fn record_outside_lead_time_ends_the_sweep() {
    let h = harness();
    seed_record(&h, "a", "due-token", 30);
    let later = seed_record(&h, "b", "later-token", 600);

    h.scheduler.tick().await;

    assert_eq!(h.signer.renew_count(), 1);
    assert!(h.signer.is_invalidated("due-token"));

    let untouched = h.cache.get(&later.session_key).unwrap();
    assert_eq!(untouched.token.expose(), "later-token");
    assert_eq!(untouched.expires_at, later.expires_at);
}

#[tokio::test]
async fn renewed_records_wait_until_the_next_tick() {
    let h = harness();
    seed_record(&h, "a", "tok-a", 20);
    seed_record(&h, "b", "tok-b", 30);

    h.scheduler.tick().await;
    assert_eq!(h.signer.renew_count(), 2);

    // Both now expire far out; an immediate second sweep renews nothing.
    h.scheduler.tick().await;
    assert_eq!(h.signer.renew_count(), 2);
}

#[tokio::test]
async fn renewal_failure_leaves_other_records_unaffected() {
    let h = harness();
    // "a" expires first, so the injected failure hits it.
    let a = seed_record(&h, "a", "tok-a", 10);
    let b = seed_record(&h, "b", "tok-b", 30);
    h.signer.fail_next_renew();

    h.scheduler.tick().await;

    assert_eq!(h.signer.renew_count(), 1);
    // "a" keeps its old record until the next sweep retries it.
    let kept = h.cache.get(&a.session_key).unwrap();
    assert_eq!(kept.token.expose(), "tok-a");
    assert_eq!(kept.expires_at, a.expires_at);

    let renewed = h.cache.get(&b.session_key).unwrap();
    assert_ne!(renewed.token.expose(), "tok-b");
}

#[tokio::test]
async fn persist_failure_keeps_old_record_and_invalidates_new_token() {
    let h = harness();
    let old = seed_record(&h, "a", "old-token", 30);
    h.files.fail_next_write();

    h.scheduler.tick().await;

    // The renewed token never reached disk, so the cache keeps the old
    // record and the replacement token is invalidated.
    let kept = h.cache.get(&old.session_key).unwrap();
    assert_eq!(kept.token.expose(), "old-token");
    assert_eq!(h.files.contents(&old.token_path).unwrap(), "old-token");
    assert_eq!(h.signer.renew_count(), 1);
    assert!(h.signer.is_invalidated("renewed-jdoe-0"));
}

#[tokio::test]
async fn non_primary_node_renews_nothing() {
    let h = harness();
    let old = seed_record(&h, "a", "old-token", 30);
    h.cluster.set_primary(false);

    h.scheduler.tick().await;

    assert_eq!(h.signer.renew_count(), 0);
    let kept = h.cache.get(&old.session_key).unwrap();
    assert_eq!(kept.token.expose(), "old-token");
}

#[tokio::test]
async fn empty_cache_tick_is_a_noop() {
    let h = harness();
    h.scheduler.tick().await;
    assert_eq!(h.signer.renew_count(), 0);
    assert!(h.cache.is_empty());
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

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn swap_timeout_retains_renewed_records_for_the_next_sweep() {
    let signer = MockSigner::new();
    let files = MockTokenFiles::new();
    let cluster = StaticCluster::new(true);
    let cache = Arc::new(ExpiryCache::new(Duration::from_millis(50)));
    let scheduler = Arc::new(RenewalScheduler::new(
        signer.clone(),
        files.clone(),
        cluster.clone(),
        Arc::clone(&cache),
        TokenPolicy::default(),
        LifecycleConfig::default(),
    ));

    let record = Arc::new(SessionCredential {
        project: ProjectId(1),
        user: UserId(7),
        usage: CredentialUsage::Notebook,
        session_key: SessionKey::new("a", 8888),
        expires_at: Utc::now() + ChronoDuration::seconds(30),
        token: SecureString::new("old-token"),
        token_path: PathBuf::from("/stage/.private/a/token.jwt"),
    });
    signer.seed_token("old-token", "jdoe", record.expires_at);
    files.insert(&record.token_path, "old-token");
    cache.add(Arc::clone(&record)).unwrap();

    // Stall the renewal so the writer lock can be taken between the scan
    // and the final swap.
    signer.set_latency(Duration::from_millis(400));
    let sweeping = Arc::clone(&scheduler);
    let sweep = tokio::spawn(async move { sweeping.tick().await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (started, wait) = std::sync::mpsc::channel();
    let holder_cache = Arc::clone(&cache);
    let holder = std::thread::spawn(move || {
        let _ = holder_cache.swap(WriterHold {
            hold: Duration::from_millis(600),
            started,
        });
    });
    wait.recv().unwrap();
    sweep.await.unwrap();

    // The renewal consumed the old token but the swap timed out, so the
    // cache still shows the old record for now.
    assert_eq!(signer.renew_count(), 1);
    assert_eq!(
        cache.get(&record.session_key).unwrap().token.expose(),
        "old-token"
    );

    holder.join().unwrap();
    scheduler.tick().await;

    // The retained replacement is swapped in without renewing again.
    assert_eq!(signer.renew_count(), 1);
    let current = cache.get(&record.session_key).unwrap();
    assert_ne!(current.token.expose(), "old-token");
    assert_eq!(
        files.contents(&record.token_path).unwrap(),
        current.token.expose()
    );
}

#[tokio::test(start_paused = true)]
async fn spawned_loop_sweeps_after_the_initial_delay() {
    let h = harness();
    seed_record(&h, "a", "old-token", 30);

    let shutdown = tokio_util::sync::CancellationToken::new();
    let scheduler = Arc::new(RenewalScheduler::new(
        h.signer.clone(),
        h.files.clone(),
        h.cluster.clone(),
        Arc::clone(&h.cache),
        TokenPolicy::default(),
        LifecycleConfig::default(),
    ));
    let handle = Arc::clone(&scheduler).spawn(shutdown.clone());

    // Nothing happens before the initial delay elapses.
    tokio::task::yield_now().await;
    assert_eq!(h.signer.renew_count(), 0);

    tokio::time::advance(LifecycleConfig::default().renewal_initial_delay).await;
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;
    assert_eq!(h.signer.renew_count(), 1);

    shutdown.cancel();
    handle.await.unwrap();
}
