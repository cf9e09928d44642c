// # Certificate Authority Trait
//
// The primitives the certificate orchestrator needs from a CA that issues
// certificates after DNS validation.
//
// ## Implementations
//
// - ACM: `dnsync-provider-aws` crate
//
// Identifiers returned by the authority are opaque: they are stored and
// compared, never parsed.

use async_trait::async_trait;
use std::time::Duration;

/// Summary of an issued certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCertificate {
    /// Primary domain name of the certificate
    pub domain_name: String,
    /// Opaque identifier
    pub identifier: String,
}

/// One page of the issued-certificate listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssuedPage {
    /// Certificates in `Issued` status on this page
    pub certificates: Vec<IssuedCertificate>,
    /// Continuation token, `None` on the last page
    pub next_token: Option<String>,
}

/// A DNS record the authority requires as proof of domain control
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeRecord {
    /// Record name
    pub name: String,
    /// Record type (usually "CNAME")
    pub record_type: String,
    /// Record value
    pub value: String,
}

/// What `describe_certificate` reports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateDescription {
    /// Authority-reported status, if any (informational)
    pub status: Option<String>,
    /// Challenge record of the first domain validation, once available
    pub challenge: Option<ChallengeRecord>,
}

/// Trait for certificate authority implementations
///
/// Like DNS publishers, authorities are single-shot: the orchestrator owns
/// polling cadence and budgets. `wait_until_validated` is the one blocking
/// call and must give up once `budget` has elapsed.
#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    /// List one page of certificates in `Issued` status
    async fn list_issued(&self, next_token: Option<String>) -> Result<IssuedPage, crate::Error>;

    /// Request a new certificate for `domain_name` using DNS validation
    ///
    /// Returns the opaque identifier of the requested certificate.
    async fn request_certificate(&self, domain_name: &str) -> Result<String, crate::Error>;

    /// Describe a certificate, including its challenge record once available
    async fn describe_certificate(
        &self,
        identifier: &str,
    ) -> Result<CertificateDescription, crate::Error>;

    /// Block until the certificate is validated, failing after `budget`
    async fn wait_until_validated(
        &self,
        identifier: &str,
        budget: Duration,
    ) -> Result<(), crate::Error>;

    /// Name of the authority (for logging)
    fn authority_name(&self) -> &'static str;
}

/// Helper trait for constructing certificate authorities from configuration
#[async_trait]
pub trait CertificateAuthorityFactory: Send + Sync {
    /// Create a CertificateAuthority instance from configuration
    async fn create(
        &self,
        config: &crate::config::AuthorityConfig,
    ) -> Result<std::sync::Arc<dyn CertificateAuthority>, crate::Error>;
}
