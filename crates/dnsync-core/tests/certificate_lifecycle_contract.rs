//! Architectural Contract Test: Certificate Lifecycle
//!
//! Constraints verified:
//! - A stored identifier short-circuits the run with zero network calls
//! - An existing issued certificate is adopted instead of requesting one
//! - A new certificate walks Requested → ChallengeDiscovery →
//!   ChallengePublished → Validating → Persisted
//! - The identifier is written only after validation succeeded
//! - Budget exhaustion and provider errors end in Failed with nothing stored
//!
//! If this test fails, restarts can re-request certificates or persist
//! identifiers of certificates that were never validated.

mod common;

use common::*;
use dnsync_core::certificate::CertificateStage::*;
use dnsync_core::config::DomainMatch;
use dnsync_core::traits::StateStore;
use dnsync_core::{CertificateOrchestrator, CertificateState, DomainRecord, MemoryStateStore};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const KEY: &str = "cert_arn_a_example_com.txt";

fn domain() -> DomainRecord {
    DomainRecord::new("Z1", "a.example.com").with_tls(true)
}

async fn run(
    authority: Arc<ScriptedAuthority>,
    publisher: Arc<RecordingPublisher>,
    store: Arc<dyn StateStore>,
    policy: dnsync_core::config::CertificatePolicy,
) -> CertificateState {
    CertificateOrchestrator::new(domain(), publisher, authority, store, KEY, policy)
        .run(CancellationToken::new())
        .await
}

#[tokio::test]
async fn stored_identifier_makes_no_network_calls() {
    let authority = Arc::new(ScriptedAuthority::new());
    let publisher = Arc::new(RecordingPublisher::new());
    let store = Arc::new(MemoryStateStore::new());
    store.set(KEY, "arn:cert/stored").await.unwrap();

    let state = run(authority.clone(), publisher.clone(), store, fast_policy()).await;

    assert_eq!(state.stage(), Persisted);
    assert_eq!(state.identifier(), Some("arn:cert/stored"));
    assert_eq!(state.path(), vec![Idle, Persisted]);
    assert_eq!(authority.total_calls(), 0, "Restart must not contact the authority");
    assert_eq!(publisher.upsert_count(), 0);
}

#[tokio::test]
async fn empty_stored_identifier_is_ignored() {
    let authority = Arc::new(ScriptedAuthority::new());
    let publisher = Arc::new(RecordingPublisher::new());
    let store = Arc::new(MemoryStateStore::new());
    store.set(KEY, "").await.unwrap();

    let state = run(authority.clone(), publisher, store, fast_policy()).await;

    assert_eq!(state.stage(), Persisted);
    assert_eq!(authority.request_count(), 1);
}

#[tokio::test]
async fn existing_issued_certificate_is_adopted() {
    let authority = Arc::new(ScriptedAuthority::new().with_issued_pages(vec![
        vec![("other.example.com", "arn:cert/other")],
        vec![("a.example.com", "arn:cert/existing")],
    ]));
    let publisher = Arc::new(RecordingPublisher::new());
    let store = Arc::new(MemoryStateStore::new());

    let state = run(authority.clone(), publisher.clone(), store.clone(), fast_policy()).await;

    assert_eq!(state.path(), vec![Idle, Discovered, Persisted]);
    assert_eq!(state.identifier(), Some("arn:cert/existing"));
    assert_eq!(authority.list_count(), 2, "Lookup must follow pagination");
    assert_eq!(authority.request_count(), 0);
    assert_eq!(publisher.upsert_count(), 0);
    assert_eq!(
        store.get(KEY).await.unwrap(),
        Some("arn:cert/existing".to_string())
    );
}

#[tokio::test]
async fn lookup_stops_at_first_match() {
    let authority = Arc::new(ScriptedAuthority::new().with_issued_pages(vec![
        vec![("a.example.com", "arn:cert/first")],
        vec![("a.example.com", "arn:cert/second")],
    ]));
    let store = Arc::new(MemoryStateStore::new());

    let state = run(
        authority.clone(),
        Arc::new(RecordingPublisher::new()),
        store,
        fast_policy(),
    )
    .await;

    assert_eq!(state.identifier(), Some("arn:cert/first"));
    assert_eq!(authority.list_count(), 1);
}

#[tokio::test]
async fn domain_comparison_is_exact_by_default() {
    let authority = Arc::new(
        ScriptedAuthority::new().with_issued_pages(vec![vec![("A.Example.com", "arn:cert/upper")]]),
    );
    let store = Arc::new(MemoryStateStore::new());

    let state = run(
        authority.clone(),
        Arc::new(RecordingPublisher::new()),
        store,
        fast_policy(),
    )
    .await;

    assert_eq!(state.identifier(), Some("arn:cert/new"));
    assert_eq!(authority.request_count(), 1);
}

#[tokio::test]
async fn case_insensitive_comparison_adopts_mixed_case() {
    let authority = Arc::new(
        ScriptedAuthority::new().with_issued_pages(vec![vec![("A.Example.com", "arn:cert/upper")]]),
    );
    let store = Arc::new(MemoryStateStore::new());
    let mut policy = fast_policy();
    policy.domain_match = DomainMatch::CaseInsensitive;

    let state = run(
        authority.clone(),
        Arc::new(RecordingPublisher::new()),
        store,
        policy,
    )
    .await;

    assert_eq!(state.identifier(), Some("arn:cert/upper"));
    assert_eq!(authority.request_count(), 0);
}

#[tokio::test]
async fn new_certificate_walks_full_lifecycle() {
    let authority = Arc::new(ScriptedAuthority::new().with_challenge_after(Some(2)));
    let publisher = Arc::new(RecordingPublisher::new());
    let store = Arc::new(MemoryStateStore::new());

    let state = run(authority.clone(), publisher.clone(), store.clone(), fast_policy()).await;

    assert_eq!(
        state.path(),
        vec![
            Idle,
            Requested,
            ChallengeDiscovery,
            ChallengePublished,
            Validating,
            Persisted
        ]
    );
    assert_eq!(authority.requested_domains(), vec!["a.example.com"]);
    assert_eq!(authority.describe_count(), 3, "Polled until the challenge appeared");
    assert_eq!(authority.wait_count(), 1);

    let upserts = publisher.upserts();
    assert_eq!(upserts.len(), 1);
    assert_eq!(upserts[0].zone_id, "Z1");
    assert_eq!(upserts[0].name, authority.challenge().name);
    assert_eq!(upserts[0].record_type, "CNAME");
    assert_eq!(upserts[0].value, authority.challenge().value);
    assert_eq!(upserts[0].ttl, 300);

    assert_eq!(store.get(KEY).await.unwrap(), Some("arn:cert/new".to_string()));
}

#[tokio::test]
async fn missing_challenge_times_out_without_storing() {
    let authority = Arc::new(ScriptedAuthority::new().with_challenge_after(None));
    let publisher = Arc::new(RecordingPublisher::new());
    let store = Arc::new(MemoryStateStore::new());
    let mut policy = fast_policy();
    policy.discovery_budget = Duration::from_millis(30);

    let state = run(authority.clone(), publisher.clone(), store.clone(), policy).await;

    assert_eq!(state.stage(), Failed);
    assert_eq!(state.path(), vec![Idle, Requested, Failed]);
    assert!(state.failure().unwrap().contains("Timed out"));
    assert!(authority.describe_count() >= 2);
    assert_eq!(publisher.upsert_count(), 0);
    assert_eq!(store.get(KEY).await.unwrap(), None);
}

#[tokio::test]
async fn challenge_publish_error_fails_without_validation() {
    let authority = Arc::new(ScriptedAuthority::new());
    let publisher = Arc::new(RecordingPublisher::new());
    publisher.fail_on(&authority.challenge().name);
    let store = Arc::new(MemoryStateStore::new());

    let state = run(authority.clone(), publisher, store.clone(), fast_policy()).await;

    assert_eq!(state.path(), vec![Idle, Requested, ChallengeDiscovery, Failed]);
    assert_eq!(authority.wait_count(), 0);
    assert_eq!(store.get(KEY).await.unwrap(), None);
}

#[tokio::test]
async fn validation_error_fails_without_storing() {
    let authority = Arc::new(ScriptedAuthority::new().with_validation(Validation::Fails));
    let store = Arc::new(MemoryStateStore::new());

    let state = run(
        authority,
        Arc::new(RecordingPublisher::new()),
        store.clone(),
        fast_policy(),
    )
    .await;

    assert_eq!(state.stage(), Failed);
    assert_eq!(
        state.history().last().map(|t| t.from),
        Some(Validating)
    );
    assert_eq!(store.get(KEY).await.unwrap(), None);
}

#[tokio::test]
async fn validation_budget_is_enforced() {
    let authority = Arc::new(ScriptedAuthority::new().with_validation(Validation::Hangs));
    let store = Arc::new(MemoryStateStore::new());
    let mut policy = fast_policy();
    policy.validation_budget = Duration::from_millis(30);

    let state = tokio::time::timeout(
        Duration::from_secs(5),
        run(
            authority,
            Arc::new(RecordingPublisher::new()),
            store.clone(),
            policy,
        ),
    )
    .await
    .expect("orchestrator must give up after its validation budget");

    assert_eq!(state.stage(), Failed);
    assert!(state.failure().unwrap().contains("not validated"));
    assert_eq!(store.get(KEY).await.unwrap(), None);
}

#[tokio::test]
async fn persist_failure_ends_in_failed() {
    let authority = Arc::new(ScriptedAuthority::new());
    let store = Arc::new(FlakyStateStore::new());
    store.fail_sets(true);

    let state = run(
        authority,
        Arc::new(RecordingPublisher::new()),
        store.clone(),
        fast_policy(),
    )
    .await;

    assert_eq!(state.stage(), Failed);
    assert_eq!(store.set_count(), 1);
}

#[tokio::test]
async fn second_run_after_success_is_silent() {
    let authority = Arc::new(ScriptedAuthority::new());
    let publisher = Arc::new(RecordingPublisher::new());
    let store = Arc::new(MemoryStateStore::new());

    let first = run(authority.clone(), publisher.clone(), store.clone(), fast_policy()).await;
    assert_eq!(first.stage(), Persisted);
    let calls_after_first = authority.total_calls();

    let second = run(authority.clone(), publisher.clone(), store, fast_policy()).await;
    assert_eq!(second.path(), vec![Idle, Persisted]);
    assert_eq!(second.identifier(), first.identifier());
    assert_eq!(authority.total_calls(), calls_after_first);
    assert_eq!(publisher.upsert_count(), 1);
}
