use async_trait::async_trait;
use aws_sdk_acm::client::Waiters;
use aws_sdk_acm::operation::describe_certificate::DescribeCertificateOutput;
use aws_sdk_acm::operation::list_certificates::ListCertificatesOutput;
use aws_sdk_acm::types::{CertificateStatus, ValidationMethod};
use dnsync_core::config::AuthorityConfig;
use dnsync_core::traits::{
    CertificateAuthority, CertificateAuthorityFactory, CertificateDescription, ChallengeRecord,
    IssuedCertificate, IssuedPage,
};
use dnsync_core::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::{load_sdk_config, sdk_error};

const PROVIDER: &str = "acm";

/// AWS Certificate Manager authority
///
/// Certificate ARNs are the opaque identifiers handed to dnsync-core.
#[derive(Debug, Clone)]
pub struct AcmAuthority {
    client: aws_sdk_acm::Client,
}

impl AcmAuthority {
    pub fn new(client: aws_sdk_acm::Client) -> Self {
        Self { client }
    }

    /// Create an authority from the default credential chain
    pub async fn from_env(region: Option<&str>) -> Result<Self> {
        let config = load_sdk_config(region).await?;
        Ok(Self::new(aws_sdk_acm::Client::new(&config)))
    }
}

/// Issued summaries with both a domain name and an ARN
fn issued_page(output: &ListCertificatesOutput) -> IssuedPage {
    let certificates = output
        .certificate_summary_list()
        .iter()
        .filter_map(|summary| {
            Some(IssuedCertificate {
                domain_name: summary.domain_name()?.to_string(),
                identifier: summary.certificate_arn()?.to_string(),
            })
        })
        .collect();

    IssuedPage {
        certificates,
        next_token: output.next_token().map(str::to_string),
    }
}

/// Status and first domain-validation record of a certificate
fn description(output: &DescribeCertificateOutput) -> CertificateDescription {
    let Some(detail) = output.certificate() else {
        return CertificateDescription::default();
    };

    let challenge = detail
        .domain_validation_options()
        .first()
        .and_then(|validation| validation.resource_record())
        .map(|record| ChallengeRecord {
            name: record.name().to_string(),
            record_type: record.r#type().as_str().to_string(),
            value: record.value().to_string(),
        });

    CertificateDescription {
        status: detail.status().map(|s| s.as_str().to_string()),
        challenge,
    }
}

#[async_trait]
impl CertificateAuthority for AcmAuthority {
    async fn list_issued(&self, next_token: Option<String>) -> Result<IssuedPage> {
        let output = self
            .client
            .list_certificates()
            .certificate_statuses(CertificateStatus::Issued)
            .set_next_token(next_token)
            .send()
            .await
            .map_err(|e| sdk_error(PROVIDER, "list issued certificates", e))?;

        let page = issued_page(&output);
        debug!(
            certificates = page.certificates.len(),
            more = page.next_token.is_some(),
            "Listed issued certificates"
        );
        Ok(page)
    }

    async fn request_certificate(&self, domain_name: &str) -> Result<String> {
        let output = self
            .client
            .request_certificate()
            .domain_name(domain_name)
            .validation_method(ValidationMethod::Dns)
            .send()
            .await
            .map_err(|e| sdk_error(PROVIDER, &format!("request certificate for {}", domain_name), e))?;

        output
            .certificate_arn()
            .map(str::to_string)
            .ok_or_else(|| {
                Error::provider(
                    PROVIDER,
                    format!("Certificate request for {} returned no ARN", domain_name),
                )
            })
    }

    async fn describe_certificate(&self, identifier: &str) -> Result<CertificateDescription> {
        let output = self
            .client
            .describe_certificate()
            .certificate_arn(identifier)
            .send()
            .await
            .map_err(|e| sdk_error(PROVIDER, &format!("describe {}", identifier), e))?;

        Ok(description(&output))
    }

    async fn wait_until_validated(&self, identifier: &str, budget: Duration) -> Result<()> {
        self.client
            .wait_until_certificate_validated()
            .certificate_arn(identifier)
            .wait(budget)
            .await
            .map_err(|e| {
                Error::provider(
                    PROVIDER,
                    format!(
                        "waiting for validation of {}: {}",
                        identifier,
                        aws_sdk_acm::error::DisplayErrorContext(&e)
                    ),
                )
            })?;
        Ok(())
    }

    fn authority_name(&self) -> &'static str {
        PROVIDER
    }
}

/// Factory for creating ACM authorities
pub struct AcmFactory;

#[async_trait]
impl CertificateAuthorityFactory for AcmFactory {
    async fn create(&self, config: &AuthorityConfig) -> Result<Arc<dyn CertificateAuthority>> {
        match config {
            AuthorityConfig::Acm { region } => {
                Ok(Arc::new(AcmAuthority::from_env(region.as_deref()).await?))
            }
        }
    }
}
