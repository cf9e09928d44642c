//! Collaborator seams for dnsync
//!
//! The reconciliation loop and the certificate orchestrator only talk to
//! the outside world through these traits, so each can be replaced by a
//! fake in tests.
//!
//! - [`StateStore`]: Durable key → opaque string store
//! - [`IpObserver`]: Fetch the current public IP
//! - [`DnsPublisher`]: Idempotent single-record upsert
//! - [`CertificateAuthority`]: Request, describe and wait for DNS-validated certificates
//! - [`ProxyController`]: Reverse-proxy forwarding rules

pub mod state_store;
pub mod ip_observer;
pub mod dns_publisher;
pub mod certificate_authority;
pub mod proxy_controller;

pub use state_store::StateStore;
pub use ip_observer::IpObserver;
pub use dns_publisher::{DnsPublisher, DnsPublisherFactory, RecordUpsert, DEFAULT_TTL};
pub use certificate_authority::{
    CertificateAuthority, CertificateAuthorityFactory, CertificateDescription, ChallengeRecord,
    IssuedCertificate, IssuedPage,
};
pub use proxy_controller::{AuthToken, ForwardingRule, ProxyController, ProxyHost};
