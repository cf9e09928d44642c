//! Test doubles and common utilities for architecture contract tests
//!
//! These fakes record every call so tests can assert on what the core did
//! (and did not do) against its collaborators.

#![allow(dead_code)]

use async_trait::async_trait;
use dnsync_core::config::{CertificatePolicy, DomainMatch};
use dnsync_core::error::{Error, Result};
use dnsync_core::traits::{
    CertificateAuthority, CertificateDescription, ChallengeRecord, DnsPublisher, IpObserver,
    IssuedCertificate, IssuedPage, RecordUpsert, StateStore,
};
use dnsync_core::MemoryStateStore;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Certificate timing shrunk to milliseconds
pub fn fast_policy() -> CertificatePolicy {
    CertificatePolicy {
        poll_interval: Duration::from_millis(5),
        discovery_budget: Duration::from_millis(200),
        validation_budget: Duration::from_millis(200),
        domain_match: DomainMatch::Exact,
    }
}

/// An IpObserver that replays a script of results
///
/// `None` entries fail with a network error. The last entry repeats once
/// the script is exhausted.
pub struct ScriptedIpObserver {
    script: Mutex<VecDeque<Option<String>>>,
    last: Mutex<Option<String>>,
    fetch_count: Arc<AtomicUsize>,
}

impl ScriptedIpObserver {
    pub fn new(script: Vec<Option<&str>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().map(|s| s.map(str::to_string)).collect()),
            last: Mutex::new(None),
            fetch_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Always return `ip`
    pub fn fixed(ip: &str) -> Self {
        Self::new(vec![Some(ip)])
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IpObserver for ScriptedIpObserver {
    async fn fetch(&self) -> Result<String> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        let next = self.script.lock().unwrap().pop_front();
        let value = match next {
            Some(value) => {
                *self.last.lock().unwrap() = value.clone();
                value
            }
            None => self.last.lock().unwrap().clone(),
        };

        value.ok_or_else(|| Error::network("address-echo endpoint unreachable"))
    }

    fn observer_name(&self) -> &'static str {
        "scripted"
    }
}

/// A DnsPublisher that records calls and keeps a simulated zone
///
/// Upserts replace the value of `(zone, name, type)`, so the zone can be
/// inspected for idempotency. Names added with `fail_on` are rejected.
pub struct RecordingPublisher {
    upsert_count: Arc<AtomicUsize>,
    upserts: Arc<Mutex<Vec<RecordUpsert>>>,
    zone: Arc<Mutex<HashMap<(String, String, String), Vec<String>>>>,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self {
            upsert_count: Arc::new(AtomicUsize::new(0)),
            upserts: Arc::new(Mutex::new(Vec::new())),
            zone: Arc::new(Mutex::new(HashMap::new())),
            failing: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Reject upserts for `name` until `recover` is called
    pub fn fail_on(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    pub fn recover(&self, name: &str) {
        self.failing.lock().unwrap().remove(name);
    }

    pub fn upsert_count(&self) -> usize {
        self.upsert_count.load(Ordering::SeqCst)
    }

    pub fn upserts(&self) -> Vec<RecordUpsert> {
        self.upserts.lock().unwrap().clone()
    }

    /// Values currently held by a record in the simulated zone
    pub fn values(&self, zone: &str, name: &str, record_type: &str) -> Vec<String> {
        self.zone
            .lock()
            .unwrap()
            .get(&(zone.to_string(), name.to_string(), record_type.to_string()))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl DnsPublisher for RecordingPublisher {
    async fn upsert(&self, record: &RecordUpsert) -> Result<()> {
        self.upsert_count.fetch_add(1, Ordering::SeqCst);
        self.upserts.lock().unwrap().push(record.clone());

        if self.failing.lock().unwrap().contains(&record.name) {
            return Err(Error::provider(
                "recording",
                format!("rejected change for {}", record.name),
            ));
        }

        self.zone.lock().unwrap().insert(
            (
                record.zone_id.clone(),
                record.name.clone(),
                record.record_type.clone(),
            ),
            vec![record.value.clone()],
        );
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "recording"
    }
}

/// How the scripted authority answers `wait_until_validated`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    /// Validated immediately
    Succeeds,
    /// Returns an error immediately
    Fails,
    /// Never returns on its own
    Hangs,
}

/// A CertificateAuthority driven by a script
pub struct ScriptedAuthority {
    pages: Vec<IssuedPage>,
    requested_identifier: String,
    /// Describe calls before the challenge appears (`None`: never)
    challenge_after: Option<usize>,
    challenge: ChallengeRecord,
    validation: Validation,
    /// Fired when the issued listing is read
    cancel_on_list: Option<CancellationToken>,

    list_count: Arc<AtomicUsize>,
    request_count: Arc<AtomicUsize>,
    describe_count: Arc<AtomicUsize>,
    wait_count: Arc<AtomicUsize>,
    requested_domains: Arc<Mutex<Vec<String>>>,
}

impl ScriptedAuthority {
    /// No issued certificates; challenge on the first describe; validation succeeds
    pub fn new() -> Self {
        Self {
            pages: Vec::new(),
            requested_identifier: "arn:cert/new".to_string(),
            challenge_after: Some(0),
            challenge: ChallengeRecord {
                name: "_x1.a.example.com.".to_string(),
                record_type: "CNAME".to_string(),
                value: "_y1.acm-validations.aws.".to_string(),
            },
            validation: Validation::Succeeds,
            cancel_on_list: None,
            list_count: Arc::new(AtomicUsize::new(0)),
            request_count: Arc::new(AtomicUsize::new(0)),
            describe_count: Arc::new(AtomicUsize::new(0)),
            wait_count: Arc::new(AtomicUsize::new(0)),
            requested_domains: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Serve these issued certificates as one page each
    pub fn with_issued_pages(mut self, pages: Vec<Vec<(&str, &str)>>) -> Self {
        let count = pages.len();
        self.pages = pages
            .into_iter()
            .enumerate()
            .map(|(i, certs)| IssuedPage {
                certificates: certs
                    .into_iter()
                    .map(|(domain_name, identifier)| IssuedCertificate {
                        domain_name: domain_name.to_string(),
                        identifier: identifier.to_string(),
                    })
                    .collect(),
                next_token: (i + 1 < count).then(|| (i + 1).to_string()),
            })
            .collect();
        self
    }

    pub fn with_challenge_after(mut self, describes: Option<usize>) -> Self {
        self.challenge_after = describes;
        self
    }

    pub fn with_validation(mut self, validation: Validation) -> Self {
        self.validation = validation;
        self
    }

    /// Cancel `token` as soon as the issued listing is read
    pub fn cancelling_on_list(mut self, token: CancellationToken) -> Self {
        self.cancel_on_list = Some(token);
        self
    }

    pub fn challenge(&self) -> &ChallengeRecord {
        &self.challenge
    }

    pub fn list_count(&self) -> usize {
        self.list_count.load(Ordering::SeqCst)
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    pub fn describe_count(&self) -> usize {
        self.describe_count.load(Ordering::SeqCst)
    }

    pub fn wait_count(&self) -> usize {
        self.wait_count.load(Ordering::SeqCst)
    }

    /// Every call that reached the authority
    pub fn total_calls(&self) -> usize {
        self.list_count() + self.request_count() + self.describe_count() + self.wait_count()
    }

    pub fn requested_domains(&self) -> Vec<String> {
        self.requested_domains.lock().unwrap().clone()
    }
}

#[async_trait]
impl CertificateAuthority for ScriptedAuthority {
    async fn list_issued(&self, next_token: Option<String>) -> Result<IssuedPage> {
        self.list_count.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = &self.cancel_on_list {
            token.cancel();
        }
        let index = next_token
            .map(|t| t.parse::<usize>().unwrap())
            .unwrap_or(0);
        Ok(self.pages.get(index).cloned().unwrap_or_default())
    }

    async fn request_certificate(&self, domain_name: &str) -> Result<String> {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        self.requested_domains
            .lock()
            .unwrap()
            .push(domain_name.to_string());
        Ok(self.requested_identifier.clone())
    }

    async fn describe_certificate(&self, _identifier: &str) -> Result<CertificateDescription> {
        let seen = self.describe_count.fetch_add(1, Ordering::SeqCst);
        let ready = self.challenge_after.is_some_and(|after| seen >= after);
        Ok(CertificateDescription {
            status: Some("PENDING_VALIDATION".to_string()),
            challenge: ready.then(|| self.challenge.clone()),
        })
    }

    async fn wait_until_validated(&self, _identifier: &str, _budget: Duration) -> Result<()> {
        self.wait_count.fetch_add(1, Ordering::SeqCst);
        match self.validation {
            Validation::Succeeds => Ok(()),
            Validation::Fails => Err(Error::provider("scripted", "validation failed")),
            Validation::Hangs => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }

    fn authority_name(&self) -> &'static str {
        "scripted"
    }
}

/// A MemoryStateStore whose writes can be switched off
pub struct FlakyStateStore {
    inner: MemoryStateStore,
    fail_sets: AtomicBool,
    fail_gets: AtomicBool,
    set_count: Arc<AtomicUsize>,
}

impl FlakyStateStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStateStore::new(),
            fail_sets: AtomicBool::new(false),
            fail_gets: AtomicBool::new(false),
            set_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn fail_sets(&self, fail: bool) {
        self.fail_sets.store(fail, Ordering::SeqCst);
    }

    pub fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    pub fn set_count(&self) -> usize {
        self.set_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateStore for FlakyStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(Error::state_store("disk unreadable"));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.set_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_sets.load(Ordering::SeqCst) {
            return Err(Error::state_store("disk full"));
        }
        self.inner.set(key, value).await
    }
}
