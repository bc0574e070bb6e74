//! End-to-end walks through one licence's life against both stores.

#[path = "../common/mod.rs"]
mod common;
use common::*;

const KEY: &str = "LIC-SCENARIO";
const NOW: i64 = 1_700_000_000;

fn eval<S: LicenceStore>(engine: &LicenceEngine<S>, ip: &str, now: i64) -> Decision {
    engine
        .evaluate(&EvaluateRequest::new(KEY, "acme", ip), now)
        .expect("evaluation should not fail")
}

/// Limit 3, one IP slot: the second IP is refused without consuming quota.
fn run_quota_and_ip_scenario<S: LicenceStore>(engine: &LicenceEngine<S>) {
    let first = eval(engine, "1.1.1.1", NOW);
    let view = first.licence().expect("call 1 should be admitted");
    assert_eq!(view.ips, vec!["1.1.1.1"]);
    assert_eq!(view.request_count, 1);

    let second = eval(engine, "1.1.1.1", NOW);
    assert_eq!(second.licence().unwrap().request_count, 2);

    let third = eval(engine, "2.2.2.2", NOW);
    assert_eq!(third, Decision::Denied(ErrorKind::IpNotRegistered));

    let retried = eval(engine, "1.1.1.1", NOW);
    let view = retried.licence().expect("retry from the registered IP should be admitted");
    assert_eq!(view.request_count, 3, "the refused call must not have consumed quota");
    assert_eq!(view.ips, vec!["1.1.1.1"]);
    assert_eq!(view.remaining, 0);

    let fourth = eval(engine, "1.1.1.1", NOW);
    assert_eq!(fourth, Decision::Denied(ErrorKind::QuotaExceeded));
}

#[test]
fn test_quota_and_ip_scenario_memory_store() {
    let engine = memory_engine(KEY, "acme", 3, 1, NOW + ONE_DAY);
    run_quota_and_ip_scenario(&engine);

    let stored = engine.store().get("lic-1").unwrap().unwrap();
    assert_eq!(stored.value.request_count, 3);
    assert_eq!(stored.version, 3, "only admitted calls write");
}

#[test]
fn test_quota_and_ip_scenario_sqlite_store() {
    let (_dir, pool) = file_pool();
    let licence = {
        let conn = pool.get().unwrap();
        let mut input = create_licence_input(KEY, "acme", 3, 1);
        input.valid_until = NOW + ONE_DAY;
        queries::create_licence(&conn, &test_key_hasher(), &input, DEFAULT_MAX_IPS).unwrap()
    };
    let engine = LicenceEngine::new(SqliteLicenceStore::new(pool.clone()), test_key_hasher());
    run_quota_and_ip_scenario(&engine);

    let conn = pool.get().unwrap();
    let stored = queries::get_licence_by_id(&conn, &licence.value.id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.value.request_count, 3);
    assert_eq!(stored.value.ips, vec!["1.1.1.1"]);
    assert_eq!(stored.value.last_used_ip.as_deref(), Some("1.1.1.1"));
    assert_eq!(stored.version, 3);
}

#[test]
fn test_expiry_boundary_is_exclusive() {
    let engine = memory_engine(KEY, "acme", 10, 5, NOW);

    assert!(eval(&engine, "1.1.1.1", NOW - 1).is_admitted());
    assert_eq!(eval(&engine, "1.1.1.1", NOW), Decision::Denied(ErrorKind::Expired));
    assert_eq!(eval(&engine, "1.1.1.1", NOW + 1), Decision::Denied(ErrorKind::Expired));

    let stored = engine.store().get("lic-1").unwrap().unwrap();
    assert_eq!(stored.value.request_count, 1);
}

#[test]
fn test_expired_wins_over_quota_and_ip() {
    // Exhausted, full and expired: expiry is reported first
    let engine = memory_engine(KEY, "acme", 1, 0, NOW);
    assert_eq!(eval(&engine, "9.9.9.9", NOW), Decision::Denied(ErrorKind::Expired));

    // Exhausted and full but live: quota before IP
    let engine = memory_engine(KEY, "acme", 1, 1, NOW + ONE_DAY);
    assert!(eval(&engine, "1.1.1.1", NOW).is_admitted());
    assert_eq!(
        eval(&engine, "2.2.2.2", NOW),
        Decision::Denied(ErrorKind::QuotaExceeded)
    );
}

#[test]
fn test_zero_ip_slots_denies_every_caller() {
    let engine = memory_engine(KEY, "acme", 10, 0, NOW + ONE_DAY);
    for ip in ["1.1.1.1", "2.2.2.2", "::1"] {
        assert_eq!(eval(&engine, ip, NOW), Decision::Denied(ErrorKind::IpNotRegistered));
    }
    let stored = engine.store().get("lic-1").unwrap().unwrap();
    assert!(stored.value.ips.is_empty());
    assert_eq!(stored.version, 0);
}

#[test]
fn test_lowering_max_ips_keeps_registered_callers() {
    let engine = memory_engine(KEY, "acme", 10, 2, NOW + ONE_DAY);
    assert!(eval(&engine, "1.1.1.1", NOW).is_admitted());
    assert!(eval(&engine, "2.2.2.2", NOW).is_admitted());

    engine
        .store()
        .admin_update("lic-1", |l| l.max_ips = 1)
        .unwrap()
        .unwrap();

    assert!(eval(&engine, "1.1.1.1", NOW).is_admitted());
    assert!(eval(&engine, "2.2.2.2", NOW).is_admitted());
    assert_eq!(eval(&engine, "3.3.3.3", NOW), Decision::Denied(ErrorKind::IpNotRegistered));
    assert_eq!(engine.store().get("lic-1").unwrap().unwrap().value.ips.len(), 2);
}

#[test]
fn test_ip_match_is_exact_string() {
    let engine = memory_engine(KEY, "acme", 10, 1, NOW + ONE_DAY);
    assert!(eval(&engine, "::1", NOW).is_admitted());
    // Same address, different spelling: a new registry entry, and the set is full
    assert_eq!(
        eval(&engine, "0:0:0:0:0:0:0:1", NOW),
        Decision::Denied(ErrorKind::IpNotRegistered)
    );
}

#[test]
fn test_wrong_identifier_or_key_is_not_found() {
    let engine = memory_engine(KEY, "acme", 10, 1, NOW + ONE_DAY);
    let miss = engine
        .evaluate(&EvaluateRequest::new(KEY, "globex", "1.1.1.1"), NOW)
        .unwrap();
    assert_eq!(miss, Decision::Denied(ErrorKind::NotFound));
    let miss = engine
        .evaluate(&EvaluateRequest::new("LIC-OTHER", "acme", "1.1.1.1"), NOW)
        .unwrap();
    assert_eq!(miss, Decision::Denied(ErrorKind::NotFound));
}

#[test]
fn test_hwid_is_recorded_once_and_never_enforced() {
    let engine = memory_engine(KEY, "acme", 10, 1, NOW + ONE_DAY);
    for hwid in ["machine-a", "machine-b", "machine-a"] {
        let decision = engine
            .evaluate(
                &EvaluateRequest::new(KEY, "acme", "1.1.1.1").with_hwid(Some(hwid)),
                NOW,
            )
            .unwrap();
        assert!(decision.is_admitted());
    }
    let stored = engine.store().get("lic-1").unwrap().unwrap();
    assert_eq!(stored.value.hwid, vec!["machine-a", "machine-b"]);
    assert_eq!(stored.value.last_used_hwid.as_deref(), Some("machine-a"));
}
