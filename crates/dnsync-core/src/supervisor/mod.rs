//! Task supervision
//!
//! The Supervisor owns every long-lived and run-to-completion task of the
//! process:
//! - one ReconciliationScheduler for all domains
//! - one CertificateOrchestrator per distinct TLS domain name
//! - one forwarding task per domain with a forwarding port, when a proxy
//!   controller is configured
//!
//! Tasks run in a `JoinSet` and share nothing but the collaborators they
//! are handed. A task that fails or panics is reported and never affects its
//! siblings. `run` returns once every task has finished, which for the
//! scheduler means once the cancellation token fires.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};

use crate::certificate::{CertificateOrchestrator, CertificateStage, CertificateState};
use crate::config::{DnsyncConfig, DomainRecord};
use crate::error::{Error, Result};
use crate::forwarding::{ForwardingOutcome, ForwardingTask};
use crate::reconcile::ReconciliationScheduler;
use crate::traits::{
    CertificateAuthority, DnsPublisher, ForwardingRule, IpObserver, ProxyController, StateStore,
};

/// Which task a report belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Reconciliation,
    Certificate(String),
    Forwarding(String),
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Reconciliation => f.write_str("reconciliation"),
            TaskKind::Certificate(domain) => write!(f, "certificate({})", domain),
            TaskKind::Forwarding(domain) => write!(f, "forwarding({})", domain),
        }
    }
}

/// How a task ended
#[derive(Debug, Clone)]
pub enum TaskResult {
    /// The reconciliation loop stopped on cancellation
    Stopped,
    /// An orchestrator reached a terminal stage
    Certificate(CertificateState),
    /// A forwarding task finished
    Forwarding(ForwardingOutcome),
    /// The task returned an error or panicked
    Failed(String),
}

/// Final report of one task
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub kind: TaskKind,
    pub result: TaskResult,
}

impl TaskReport {
    /// Whether the task reached its intended end state
    pub fn succeeded(&self) -> bool {
        match &self.result {
            TaskResult::Stopped | TaskResult::Forwarding(_) => true,
            TaskResult::Certificate(state) => state.stage() == CertificateStage::Persisted,
            TaskResult::Failed(_) => false,
        }
    }
}

/// External collaborators handed to the tasks
#[derive(Clone)]
pub struct Collaborators {
    pub observer: Arc<dyn IpObserver>,
    pub publisher: Arc<dyn DnsPublisher>,
    pub store: Arc<dyn StateStore>,
    /// Required when any domain requests TLS
    pub authority: Option<Arc<dyn CertificateAuthority>>,
    /// Required when a proxy is configured
    pub proxy: Option<Arc<dyn ProxyController>>,
}

/// Spawns and watches every task of the process
pub struct Supervisor {
    config: DnsyncConfig,
    collaborators: Collaborators,
}

impl Supervisor {
    /// Create a supervisor, checking the collaborators cover the configuration
    pub fn new(config: DnsyncConfig, collaborators: Collaborators) -> Result<Self> {
        if config.any_tls() && collaborators.authority.is_none() {
            return Err(Error::config(
                "TLS requested for at least one domain but no certificate authority is available",
            ));
        }

        if config.proxy.is_some() && collaborators.proxy.is_none() {
            return Err(Error::config(
                "Proxy configured but no proxy controller is available",
            ));
        }

        Ok(Self {
            config,
            collaborators,
        })
    }

    /// TLS domains, one entry per distinct record name
    pub fn certificate_domains(&self) -> Vec<DomainRecord> {
        distinct(self.config.domains.iter().filter(|d| d.tls), "TLS")
    }

    /// Domains that get a forwarding rule
    ///
    /// Empty when no proxy is configured.
    pub fn forwarding_domains(&self) -> Vec<DomainRecord> {
        if self.config.proxy.is_none() {
            return Vec::new();
        }
        distinct(
            self.config.domains.iter().filter(|d| d.forward_port.is_some()),
            "forwarding",
        )
    }

    /// Spawn every task and wait for all of them
    pub async fn run(self, cancel: CancellationToken) -> Vec<TaskReport> {
        let mut tasks: JoinSet<TaskReport> = JoinSet::new();
        let mut kinds: HashMap<Id, TaskKind> = HashMap::new();

        // Reconciliation
        let scheduler = ReconciliationScheduler::new(
            self.collaborators.observer.clone(),
            self.collaborators.publisher.clone(),
            self.collaborators.store.clone(),
            self.config.domains.clone(),
            self.config.state.ip_key(),
            self.config.interval(),
        );
        let token = cancel.clone();
        let handle = tasks.spawn(
            async move {
                let result = match scheduler.run(token).await {
                    Ok(()) => TaskResult::Stopped,
                    Err(e) => TaskResult::Failed(e.to_string()),
                };
                TaskReport {
                    kind: TaskKind::Reconciliation,
                    result,
                }
            }
            .instrument(info_span!("reconcile")),
        );
        kinds.insert(handle.id(), TaskKind::Reconciliation);

        // Certificates
        if let Some(authority) = &self.collaborators.authority {
            let policy = self.config.certificate.policy();
            for domain in self.certificate_domains() {
                let name = domain.record_name.clone();
                let orchestrator = CertificateOrchestrator::new(
                    domain,
                    self.collaborators.publisher.clone(),
                    authority.clone(),
                    self.collaborators.store.clone(),
                    self.config.state.certificate_key(&name),
                    policy,
                );
                let token = cancel.clone();
                let kind = TaskKind::Certificate(name.clone());
                let report_kind = kind.clone();
                let handle = tasks.spawn(
                    async move {
                        TaskReport {
                            kind: report_kind,
                            result: TaskResult::Certificate(orchestrator.run(token).await),
                        }
                    }
                    .instrument(info_span!("certificate", domain = %name)),
                );
                kinds.insert(handle.id(), kind);
            }
        }

        // Forwarding rules
        if let (Some(proxy_config), Some(controller)) =
            (&self.config.proxy, &self.collaborators.proxy)
        {
            for domain in self.forwarding_domains() {
                let Some(forward_port) = domain.forward_port else {
                    continue;
                };
                let rule = ForwardingRule {
                    domain_name: domain.record_name.clone(),
                    forward_host: proxy_config.forward_host.clone(),
                    forward_port,
                    tls: domain.tls,
                    force_https: domain.force_https,
                };
                let task = ForwardingTask::new(
                    controller.clone(),
                    rule,
                    proxy_config.auth_attempts,
                    proxy_config.auth_backoff(),
                );
                let token = cancel.clone();
                let kind = TaskKind::Forwarding(domain.record_name.clone());
                let report_kind = kind.clone();
                let handle = tasks.spawn(
                    async move {
                        let result = match task.run(token).await {
                            Ok(outcome) => TaskResult::Forwarding(outcome),
                            Err(e) => TaskResult::Failed(e.to_string()),
                        };
                        TaskReport {
                            kind: report_kind,
                            result,
                        }
                    }
                    .instrument(info_span!("forwarding", domain = %domain.record_name)),
                );
                kinds.insert(handle.id(), kind);
            }
        }

        info!(tasks = tasks.len(), "All tasks spawned");

        let mut reports = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next_with_id().await {
            let report = match joined {
                Ok((_, report)) => report,
                Err(join_error) => {
                    let kind = kinds
                        .get(&join_error.id())
                        .cloned()
                        .unwrap_or(TaskKind::Reconciliation);
                    let reason = if join_error.is_panic() {
                        "task panicked".to_string()
                    } else {
                        "task aborted".to_string()
                    };
                    TaskReport {
                        kind,
                        result: TaskResult::Failed(reason),
                    }
                }
            };

            log_report(&report);
            reports.push(report);
        }

        info!(
            finished = reports.len(),
            failed = reports.iter().filter(|r| !r.succeeded()).count(),
            "All tasks finished"
        );
        reports
    }
}

fn distinct<'a>(domains: impl Iterator<Item = &'a DomainRecord>, what: &str) -> Vec<DomainRecord> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for domain in domains {
        if seen.insert(domain.record_name.clone()) {
            out.push(domain.clone());
        } else {
            warn!(
                domain = %domain.record_name,
                "Duplicate {} domain in configuration, ignoring the repeat",
                what
            );
        }
    }
    out
}

fn log_report(report: &TaskReport) {
    match &report.result {
        TaskResult::Stopped => info!(task = %report.kind, "Task stopped"),
        TaskResult::Forwarding(outcome) => info!(task = %report.kind, ?outcome, "Task finished"),
        TaskResult::Certificate(state) if state.stage() == CertificateStage::Persisted => {
            info!(task = %report.kind, "Certificate persisted")
        }
        TaskResult::Certificate(state) => error!(
            task = %report.kind,
            reason = state.failure().unwrap_or_default(),
            "Certificate task failed"
        ),
        TaskResult::Failed(reason) => error!(task = %report.kind, "Task failed: {}", reason),
    }
}
