//! Writers outside the engine's lock, stores that keep losing the race, and
//! stores that fail outright.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

#[path = "../common/mod.rs"]
mod common;
use common::*;

const KEY: &str = "LIC-CAS";
const NOW: i64 = 1_700_000_000;

type Interference = Box<dyn FnOnce(&mut Licence) + Send>;

/// Memory store that applies an administrative change right before the
/// engine's first commit, as if an admin wrote between lookup and commit.
struct InterferingStore {
    inner: MemoryLicenceStore,
    pending: Mutex<Option<Interference>>,
    commits: AtomicU32,
}

impl InterferingStore {
    fn new(change: impl FnOnce(&mut Licence) + Send + 'static) -> Self {
        let inner = MemoryLicenceStore::new();
        inner
            .insert(test_licence("lic-1", KEY, "acme", 3, 1, NOW + ONE_DAY))
            .unwrap();
        Self {
            inner,
            pending: Mutex::new(Some(Box::new(change))),
            commits: AtomicU32::new(0),
        }
    }
}

impl LicenceStore for InterferingStore {
    fn lookup(&self, key: &LookupKey) -> Result<Option<Versioned<Licence>>, StoreError> {
        self.inner.lookup(key)
    }

    fn compare_and_swap(&self, prior_version: i64, licence: &Licence) -> Result<CasOutcome, StoreError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        if let Some(change) = self.pending.lock().unwrap().take() {
            self.inner.admin_update(&licence.id, change).unwrap();
        }
        self.inner.compare_and_swap(prior_version, licence)
    }
}

/// Always finds the licence, never manages to commit.
struct AlwaysConflictStore {
    licence: Licence,
    commits: AtomicU32,
}

impl LicenceStore for AlwaysConflictStore {
    fn lookup(&self, _key: &LookupKey) -> Result<Option<Versioned<Licence>>, StoreError> {
        Ok(Some(Versioned::new(self.licence.clone(), 7)))
    }

    fn compare_and_swap(&self, _prior_version: i64, _licence: &Licence) -> Result<CasOutcome, StoreError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(CasOutcome::Conflict)
    }
}

#[derive(Clone, Copy)]
enum FailAt {
    Lookup,
    Commit,
}

struct FailingStore {
    fail_at: FailAt,
    licence: Licence,
    lookups: AtomicU32,
    commits: AtomicU32,
}

impl FailingStore {
    fn new(fail_at: FailAt) -> Self {
        Self {
            fail_at,
            licence: test_licence("lic-1", KEY, "acme", 3, 1, NOW + ONE_DAY),
            lookups: AtomicU32::new(0),
            commits: AtomicU32::new(0),
        }
    }
}

impl LicenceStore for FailingStore {
    fn lookup(&self, _key: &LookupKey) -> Result<Option<Versioned<Licence>>, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        match self.fail_at {
            FailAt::Lookup => Err(StoreError::Unavailable("disk on fire".into())),
            FailAt::Commit => Ok(Some(Versioned::new(self.licence.clone(), 0))),
        }
    }

    fn compare_and_swap(&self, _prior_version: i64, _licence: &Licence) -> Result<CasOutcome, StoreError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("disk on fire".into()))
    }
}

fn request() -> EvaluateRequest<'static> {
    EvaluateRequest::new(KEY, "acme", "1.1.1.1")
}

#[test]
fn test_admin_exhausting_quota_mid_evaluation_is_seen_on_retry() {
    let engine = LicenceEngine::new(
        InterferingStore::new(|l| l.request_count = l.request_limit),
        test_key_hasher(),
    );

    let decision = engine.evaluate(&request(), NOW).unwrap();

    assert_eq!(decision, Decision::Denied(ErrorKind::QuotaExceeded));
    let stored = engine.store().inner.get("lic-1").unwrap().unwrap();
    assert_eq!(stored.value.request_count, 3, "the admin's write must not be overwritten");
    assert!(stored.value.ips.is_empty());
    assert_eq!(stored.version, 1);
    assert_eq!(engine.store().commits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_admin_reset_mid_evaluation_counts_against_new_state() {
    let engine = LicenceEngine::new(
        InterferingStore::new(|l| {
            l.request_count = 2;
            l.ips = vec!["1.1.1.1".into()];
        }),
        test_key_hasher(),
    );

    let decision = engine.evaluate(&request(), NOW).unwrap();

    let view = decision.licence().expect("retry should admit");
    assert_eq!(view.request_count, 3);
    assert_eq!(view.ips, vec!["1.1.1.1"]);
    assert_eq!(view.version, 2);
    assert_eq!(engine.store().commits.load(Ordering::SeqCst), 2);
}

#[test]
fn test_endless_conflicts_end_in_contention() {
    let engine = LicenceEngine::new(
        AlwaysConflictStore {
            licence: test_licence("lic-1", KEY, "acme", 3, 1, NOW + ONE_DAY),
            commits: AtomicU32::new(0),
        },
        test_key_hasher(),
    )
    .with_max_attempts(4);

    let decision = engine.evaluate(&request(), NOW).unwrap();

    assert_eq!(decision, Decision::Denied(ErrorKind::Contention));
    assert_eq!(engine.store().commits.load(Ordering::SeqCst), 4);
}

#[test]
fn test_default_attempt_budget() {
    let engine = LicenceEngine::new(
        AlwaysConflictStore {
            licence: test_licence("lic-1", KEY, "acme", 3, 1, NOW + ONE_DAY),
            commits: AtomicU32::new(0),
        },
        test_key_hasher(),
    );
    assert_eq!(
        engine.evaluate(&request(), NOW).unwrap(),
        Decision::Denied(ErrorKind::Contention)
    );
    assert_eq!(
        engine.store().commits.load(Ordering::SeqCst),
        tollgate::engine::DEFAULT_MAX_ATTEMPTS
    );
}

#[test]
fn test_lookup_failure_is_storage_unavailable_without_retry() {
    let engine = LicenceEngine::new(FailingStore::new(FailAt::Lookup), test_key_hasher());

    let err = engine.evaluate(&request(), NOW).unwrap_err();

    assert!(matches!(err, EngineError::StorageUnavailable(_)));
    assert_eq!(err.kind(), Some(ErrorKind::StorageUnavailable));
    assert_eq!(engine.store().lookups.load(Ordering::SeqCst), 1);
    assert_eq!(engine.store().commits.load(Ordering::SeqCst), 0);
}

#[test]
fn test_commit_failure_is_storage_unavailable_without_retry() {
    let engine = LicenceEngine::new(FailingStore::new(FailAt::Commit), test_key_hasher());

    let err = engine.evaluate(&request(), NOW).unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::StorageUnavailable));
    assert_eq!(engine.store().lookups.load(Ordering::SeqCst), 1);
    assert_eq!(engine.store().commits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_denials_never_reach_the_store_write() {
    let store = FailingStore::new(FailAt::Commit);
    let engine = LicenceEngine::new(store, test_key_hasher());

    // Expired: decided from the lookup alone, the failing commit is never tried
    let decision = engine.evaluate(&request(), NOW + ONE_DAY).unwrap();

    assert_eq!(decision, Decision::Denied(ErrorKind::Expired));
    assert_eq!(engine.store().commits.load(Ordering::SeqCst), 0);
}
