// # dnsync-core
//
// Core library for keeping DNS A records pointed at the current public IP
// and obtaining DNS-validated certificates for selected names.
//
// ## Architecture Overview
//
// - **IpObserver**: Trait for fetching the current public IP
// - **DnsPublisher**: Trait for idempotent single-record upserts
// - **CertificateAuthority**: Trait for requesting and validating certificates
// - **StateStore**: Trait for durable per-key state (last IP, certificate ids)
// - **ProxyController**: Trait for reverse-proxy forwarding rules
// - **ReconciliationScheduler**: Periodic IP → A record convergence loop
// - **CertificateOrchestrator**: Per-domain certificate state machine
// - **Supervisor**: Spawns and watches every task
// - **ProviderRegistry**: Plugin-based registry for publishers and authorities
//
// ## Design Principles
//
// 1. **Providers are untrusted**: they never retry, sleep or touch state;
//    all timing is owned by core tasks
// 2. **Persist only on success**: state is written after the external
//    change is confirmed, so a restart resumes safely
// 3. **Isolated tasks**: one domain's failure never affects another
// 4. **Library-first**: the daemon is thin wiring over this crate

pub mod traits;
pub mod config;
pub mod error;
pub mod state;
pub mod reconcile;
pub mod certificate;
pub mod forwarding;
pub mod supervisor;
pub mod registry;

// Re-export core types for convenience
pub use traits::{CertificateAuthority, DnsPublisher, IpObserver, ProxyController, StateStore};
pub use config::{DnsyncConfig, DomainMatch, DomainRecord, ProviderConfig};
pub use error::{Error, Result};
pub use state::{FileStateStore, MemoryStateStore};
pub use reconcile::{ReconciliationScheduler, TickOutcome};
pub use certificate::{CertificateOrchestrator, CertificateStage, CertificateState};
pub use forwarding::{ForwardingOutcome, ForwardingTask};
pub use supervisor::{Collaborators, Supervisor, TaskKind, TaskReport, TaskResult};
pub use registry::ProviderRegistry;
