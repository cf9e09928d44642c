//! Per-domain certificate lifecycle
//!
//! A CertificateOrchestrator drives one domain from "no certificate" to
//! "issued and persisted" through DNS validation. Each run is independent:
//! orchestrators share no state with each other and each is the only writer
//! of its own domain's state key.
//!
//! ## Lifecycle
//!
//! ```text
//!            stored id ──────────────────────────────────────────┐
//!           ┌──────────────┐                                     ▼
//!  Idle ────┤ issued match ├──▶ Discovered ──(persist)──────▶ Persisted
//!           └──────────────┘                                     ▲
//!           │ request                                            │ persist
//!           ▼                                                    │
//!       Requested ──(poll describe)──▶ ChallengeDiscovery ──(upsert)──▶
//!       ChallengePublished ──(wait)──▶ Validating ───────────────┘
//!
//!  any non-terminal stage ──(error)──▶ Failed
//! ```
//!
//! `Persisted` and `Failed` are terminal. A failed run is not retried: the
//! operator fixes the external state and restarts the process.
//!
//! The presence of the persisted identifier is the only "already handled"
//! signal, so a restart after success performs no network calls at all.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{CertificatePolicy, DomainRecord};
use crate::error::{Error, Result};
use crate::traits::{CertificateAuthority, ChallengeRecord, DnsPublisher, RecordUpsert, StateStore};

/// Stage of a domain's certificate lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CertificateStage {
    /// Nothing checked yet
    Idle,
    /// An issued certificate for this domain already exists at the authority
    Discovered,
    /// A new certificate was requested
    Requested,
    /// The authority produced the challenge record
    ChallengeDiscovery,
    /// The challenge record was published
    ChallengePublished,
    /// Waiting for the authority to validate
    Validating,
    /// Identifier persisted (terminal)
    Persisted,
    /// Run failed (terminal)
    Failed,
}

impl CertificateStage {
    /// Whether no further transition may happen
    pub fn is_terminal(self) -> bool {
        matches!(self, CertificateStage::Persisted | CertificateStage::Failed)
    }

    /// Whether `self → to` is a legal transition
    pub fn can_transition_to(self, to: CertificateStage) -> bool {
        use CertificateStage::*;

        if self.is_terminal() {
            return false;
        }

        matches!(
            (self, to),
            (Idle, Persisted)
                | (Idle, Discovered)
                | (Idle, Requested)
                | (Discovered, Persisted)
                | (Requested, ChallengeDiscovery)
                | (ChallengeDiscovery, ChallengePublished)
                | (ChallengePublished, Validating)
                | (Validating, Persisted)
                | (_, Failed)
        )
    }
}

impl fmt::Display for CertificateStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CertificateStage::Idle => "idle",
            CertificateStage::Discovered => "discovered",
            CertificateStage::Requested => "requested",
            CertificateStage::ChallengeDiscovery => "challenge-discovery",
            CertificateStage::ChallengePublished => "challenge-published",
            CertificateStage::Validating => "validating",
            CertificateStage::Persisted => "persisted",
            CertificateStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A recorded stage change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageTransition {
    pub from: CertificateStage,
    pub to: CertificateStage,
    pub at: DateTime<Utc>,
}

/// In-memory state of one orchestrator run
#[derive(Debug, Clone)]
pub struct CertificateState {
    domain_name: String,
    identifier: Option<String>,
    stage: CertificateStage,
    history: Vec<StageTransition>,
    failure: Option<String>,
}

impl CertificateState {
    /// Fresh state in `Idle`
    pub fn new(domain_name: impl Into<String>) -> Self {
        Self {
            domain_name: domain_name.into(),
            identifier: None,
            stage: CertificateStage::Idle,
            history: Vec::new(),
            failure: None,
        }
    }

    pub fn domain_name(&self) -> &str {
        &self.domain_name
    }

    /// Opaque certificate identifier, once known
    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    pub fn stage(&self) -> CertificateStage {
        self.stage
    }

    /// Every transition taken so far, oldest first
    pub fn history(&self) -> &[StageTransition] {
        &self.history
    }

    /// The stages visited, starting with `Idle`
    pub fn path(&self) -> Vec<CertificateStage> {
        std::iter::once(CertificateStage::Idle)
            .chain(self.history.iter().map(|t| t.to))
            .collect()
    }

    /// Why the run failed, if it did
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Move to `to`, rejecting illegal transitions
    pub fn advance(&mut self, to: CertificateStage) -> Result<()> {
        if !self.stage.can_transition_to(to) {
            return Err(Error::invalid_input(format!(
                "Illegal certificate transition for {}: {} -> {}",
                self.domain_name, self.stage, to
            )));
        }

        debug!(domain = %self.domain_name, from = %self.stage, to = %to, "Certificate stage change");
        self.history.push(StageTransition {
            from: self.stage,
            to,
            at: Utc::now(),
        });
        self.stage = to;
        Ok(())
    }

    fn fail(&mut self, error: &Error) {
        if self.stage.is_terminal() {
            return;
        }
        self.failure = Some(error.to_string());
        // Failed is reachable from every non-terminal stage
        let _ = self.advance(CertificateStage::Failed);
    }
}

/// Drives one domain's certificate lifecycle
pub struct CertificateOrchestrator {
    /// The domain (its zone receives the challenge record)
    domain: DomainRecord,

    /// DNS provider for the challenge record
    publisher: Arc<dyn DnsPublisher>,

    /// Certificate authority
    authority: Arc<dyn CertificateAuthority>,

    /// Where the identifier is persisted
    store: Arc<dyn StateStore>,

    /// Key of this domain's identifier
    state_key: String,

    /// Timing and matching policy
    policy: CertificatePolicy,

    /// Current lifecycle state
    state: CertificateState,
}

impl CertificateOrchestrator {
    /// Create an orchestrator in `Idle`
    pub fn new(
        domain: DomainRecord,
        publisher: Arc<dyn DnsPublisher>,
        authority: Arc<dyn CertificateAuthority>,
        store: Arc<dyn StateStore>,
        state_key: impl Into<String>,
        policy: CertificatePolicy,
    ) -> Self {
        let state = CertificateState::new(domain.record_name.clone());
        Self {
            domain,
            publisher,
            authority,
            store,
            state_key: state_key.into(),
            policy,
            state,
        }
    }

    /// Current state
    pub fn state(&self) -> &CertificateState {
        &self.state
    }

    /// Run the lifecycle to a terminal stage
    ///
    /// Never returns an error: failures are recorded in the returned state
    /// (`Failed` plus [`CertificateState::failure`]) and logged with the
    /// domain attached.
    pub async fn run(mut self, cancel: CancellationToken) -> CertificateState {
        info!(domain = %self.domain.record_name, "Starting certificate management");

        match self.drive(&cancel).await {
            Ok(()) => {
                info!(
                    domain = %self.domain.record_name,
                    identifier = self.state.identifier().unwrap_or_default(),
                    "Certificate management complete"
                );
            }
            Err(e) => {
                error!(
                    domain = %self.domain.record_name,
                    stage = %self.state.stage(),
                    "Certificate management failed: {}",
                    e
                );
                self.state.fail(&e);
            }
        }

        self.state
    }

    async fn drive(&mut self, cancel: &CancellationToken) -> Result<()> {
        let domain = self.domain.record_name.clone();

        // 1. Local state
        if let Some(identifier) = self.stored_identifier().await? {
            info!(domain = %domain, "Found stored certificate identifier");
            self.state.identifier = Some(identifier);
            return self.state.advance(CertificateStage::Persisted);
        }

        if cancel.is_cancelled() {
            return Err(Error::cancelled(format!("certificate management for {}", domain)));
        }

        // 2. Existing issued certificate at the authority
        if let Some(identifier) = self.find_existing_certificate().await? {
            self.state.identifier = Some(identifier.clone());
            self.state.advance(CertificateStage::Discovered)?;
            self.persist(&identifier).await?;
            return self.state.advance(CertificateStage::Persisted);
        }

        // 3. Request a new certificate, unless shutdown began during the lookup
        if cancel.is_cancelled() {
            return Err(Error::cancelled(format!("certificate management for {}", domain)));
        }
        info!(domain = %domain, "Requesting new certificate");
        let identifier = self.authority.request_certificate(&domain).await?;
        info!(domain = %domain, identifier = %identifier, "Certificate requested, waiting for validation details");
        self.state.identifier = Some(identifier.clone());
        self.state.advance(CertificateStage::Requested)?;

        // 4. Challenge record
        let challenge = self.await_challenge(&identifier, cancel).await?;
        self.state.advance(CertificateStage::ChallengeDiscovery)?;

        let record = RecordUpsert::new(
            &self.domain.zone_id,
            &challenge.name,
            &challenge.record_type,
            &challenge.value,
        );
        self.publisher.upsert(&record).await.map_err(|e| {
            Error::provider(
                self.publisher.provider_name(),
                format!("Failed to publish validation record {}: {}", record, e),
            )
        })?;
        info!(domain = %domain, record = %challenge.name, "Validation record published");
        self.state.advance(CertificateStage::ChallengePublished)?;

        // 5. Validation, on a fresh budget
        self.state.advance(CertificateStage::Validating)?;
        self.await_validation(&identifier, cancel).await?;
        info!(domain = %domain, "Certificate validated and issued");

        // 6. Persist
        self.persist(&identifier).await?;
        self.state.advance(CertificateStage::Persisted)
    }

    async fn stored_identifier(&self) -> Result<Option<String>> {
        let stored = self.store.get(&self.state_key).await?;
        Ok(stored
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()))
    }

    async fn persist(&self, identifier: &str) -> Result<()> {
        self.store.set(&self.state_key, identifier).await.map_err(|e| {
            Error::state_store(format!(
                "Certificate {} known but storing its identifier failed: {}",
                identifier, e
            ))
        })
    }

    /// Walk the paginated issued listing, stopping at the first match
    async fn find_existing_certificate(&self) -> Result<Option<String>> {
        let domain = &self.domain.record_name;
        debug!(domain = %domain, "Checking for existing certificate");

        let mut next_token = None;
        loop {
            let page = self.authority.list_issued(next_token).await?;

            if let Some(found) = page
                .certificates
                .into_iter()
                .find(|c| self.policy.domain_match.matches(&c.domain_name, domain))
            {
                info!(domain = %domain, identifier = %found.identifier, "Found existing issued certificate");
                return Ok(Some(found.identifier));
            }

            match page.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }

        debug!(domain = %domain, "No existing issued certificate found");
        Ok(None)
    }

    /// Poll describe until the challenge record appears or the budget runs out
    async fn await_challenge(
        &self,
        identifier: &str,
        cancel: &CancellationToken,
    ) -> Result<ChallengeRecord> {
        let deadline = Instant::now() + self.policy.discovery_budget;

        while Instant::now() < deadline {
            let description = self.authority.describe_certificate(identifier).await?;
            if let Some(challenge) = description.challenge {
                return Ok(challenge);
            }

            debug!(
                domain = %self.domain.record_name,
                "Validation details not yet available, waiting {:?}",
                self.policy.poll_interval
            );
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(Error::cancelled(format!(
                        "waiting for validation details of {}",
                        self.domain.record_name
                    )));
                }
                _ = tokio::time::sleep(self.policy.poll_interval) => {}
            }
        }

        warn!(domain = %self.domain.record_name, "Budget for validation details exhausted");
        Err(Error::timeout(format!(
            "no validation details for {} within {:?}",
            self.domain.record_name, self.policy.discovery_budget
        )))
    }

    async fn await_validation(&self, identifier: &str, cancel: &CancellationToken) -> Result<()> {
        let budget = self.policy.validation_budget;

        tokio::select! {
            _ = cancel.cancelled() => Err(Error::cancelled(format!(
                "waiting for validation of {}",
                self.domain.record_name
            ))),
            waited = tokio::time::timeout(
                budget,
                self.authority.wait_until_validated(identifier, budget),
            ) => match waited {
                Ok(result) => result,
                Err(_) => Err(Error::timeout(format!(
                    "{} not validated within {:?}",
                    self.domain.record_name, budget
                ))),
            },
        }
    }
}
