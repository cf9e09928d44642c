// # AWS Providers
//
// - [`Route53Publisher`]: DnsPublisher over Route53 `ChangeResourceRecordSets`
//   with the `UPSERT` action
// - [`AcmAuthority`]: CertificateAuthority over AWS Certificate Manager with
//   DNS validation
//
// Credentials and region come from the SDK's default provider chain. A
// missing region is a fatal configuration error.
//
// ## Trust Level: Untrusted
//
// Both providers are single-shot: every method maps to one SDK call (the
// validation waiter being the one blocking call, bounded by the budget it
// is given). Retry cadence and budgets are owned by dnsync-core.

mod acm;
mod route53;

pub use acm::{AcmAuthority, AcmFactory};
pub use route53::{Route53Factory, Route53Publisher};

use aws_config::{BehaviorVersion, Region, SdkConfig};
use dnsync_core::{Error, Result};
use std::fmt::Debug;

/// Load the shared SDK configuration
///
/// `region` overrides the default chain (environment, profile, IMDS).
pub async fn load_sdk_config(region: Option<&str>) -> Result<SdkConfig> {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(Region::new(region.to_string()));
    }

    let config = loader.load().await;
    match config.region() {
        Some(region) => {
            tracing::debug!(region = %region, "AWS configuration loaded");
            Ok(config)
        }
        None => Err(Error::config(
            "AWS region not configured (set DNSYNC_AWS_REGION or AWS_REGION)",
        )),
    }
}

/// Register the Route53 publisher and the ACM authority with a registry
///
/// # Example
///
/// ```rust
/// use dnsync_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// dnsync_provider_aws::register(&registry);
/// assert!(registry.has_publisher("route53"));
/// assert!(registry.has_authority("acm"));
/// ```
pub fn register(registry: &dnsync_core::ProviderRegistry) {
    registry.register_publisher("route53", Box::new(Route53Factory));
    registry.register_authority("acm", Box::new(AcmFactory));
}

/// Map an SDK error to a core error
///
/// Dispatch failures and timeouts never reached the service and are
/// transient; everything else is the service rejecting the call.
pub(crate) fn sdk_error<E, R>(
    provider: &str,
    action: &str,
    err: aws_sdk_route53::error::SdkError<E, R>,
) -> Error
where
    E: std::error::Error + Send + Sync + 'static,
    R: Debug + Send + Sync + 'static,
{
    use aws_sdk_route53::error::{DisplayErrorContext, SdkError};

    match &err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => {
            Error::network(format!("{} {}: {}", provider, action, DisplayErrorContext(&err)))
        }
        _ => Error::provider(provider, format!("{}: {}", action, DisplayErrorContext(&err))),
    }
}
