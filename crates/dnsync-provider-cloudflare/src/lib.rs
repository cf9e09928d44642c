// # Cloudflare DNS Publisher
//
// DnsPublisher over the Cloudflare API v4. The `zone_id` of each record is
// the Cloudflare zone identifier.
//
// ## Upsert
//
// 1. GET `/zones/:zone_id/dns_records?name=...&type=...`
// 2. If a record exists: PUT `/zones/:zone_id/dns_records/:id` with the full
//    record (content and TTL replaced, never appended)
// 3. Otherwise: POST `/zones/:zone_id/dns_records`
// 4. Any further records with the same name and type are DELETEd, so the
//    name ends up holding exactly one value
//
// ## Trust Level: Untrusted
//
// - No retries, no backoff, no background tasks, no state access
// - The API token never appears in logs or `Debug` output
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/

use async_trait::async_trait;
use dnsync_core::config::ProviderConfig;
use dnsync_core::traits::{DnsPublisher, DnsPublisherFactory, RecordUpsert};
use dnsync_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const PROVIDER: &str = "cloudflare";

/// Envelope of every Cloudflare v4 response
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct DnsRecord {
    id: String,
}

/// What an upsert does with the records already under a name and type
#[derive(Debug, PartialEq, Eq)]
struct UpsertPlan {
    /// Record to overwrite in place (`None` creates a new one)
    replace: Option<String>,
    /// Extra records to remove
    remove: Vec<String>,
}

impl UpsertPlan {
    fn from_existing(records: Vec<DnsRecord>) -> Self {
        let mut ids = records.into_iter().map(|r| r.id);
        Self {
            replace: ids.next(),
            remove: ids.collect(),
        }
    }
}

/// Body of a create or full-replace request
#[derive(Debug, Serialize, PartialEq, Eq)]
struct RecordBody<'a> {
    #[serde(rename = "type")]
    record_type: &'a str,
    name: &'a str,
    content: &'a str,
    ttl: u32,
}

impl<'a> RecordBody<'a> {
    fn from_upsert(record: &'a RecordUpsert) -> Self {
        Self {
            record_type: &record.record_type,
            name: normalize_name(&record.name),
            content: &record.value,
            ttl: record.ttl,
        }
    }
}

/// Cloudflare stores names without the trailing root dot
fn normalize_name(name: &str) -> &str {
    name.strip_suffix('.').unwrap_or(name)
}

/// Map a non-success status to an error
///
/// Rate limiting and server errors are transient; everything else is a
/// rejection by the provider.
fn status_error(status: reqwest::StatusCode, body: &str, action: &str) -> Error {
    match status.as_u16() {
        401 | 403 => Error::provider(
            PROVIDER,
            format!(
                "{}: authentication failed, invalid API token or insufficient permissions ({})",
                action, status
            ),
        ),
        429 => Error::network(format!("{}: rate limited by Cloudflare ({})", action, status)),
        500..=599 => Error::network(format!(
            "{}: Cloudflare server error ({}): {}",
            action, status, body
        )),
        _ => Error::provider(PROVIDER, format!("{}: {} - {}", action, status, body)),
    }
}

fn envelope_error(errors: &[ApiMessage], action: &str) -> Error {
    let detail = errors
        .iter()
        .map(|e| format!("{} ({})", e.message, e.code))
        .collect::<Vec<_>>()
        .join("; ");
    Error::provider(PROVIDER, format!("{}: {}", action, detail))
}

/// Cloudflare DNS publisher
pub struct CloudflarePublisher {
    /// Cloudflare API token
    api_token: String,

    /// API base URL
    base_url: String,

    /// HTTP client for API requests
    client: reqwest::Client,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflarePublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflarePublisher")
            .field("api_token", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl CloudflarePublisher {
    /// Create a publisher with a token holding Zone:DNS:Edit permission
    pub fn new(api_token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_token, CLOUDFLARE_API_BASE)
    }

    /// Create a publisher against a different API base URL
    pub fn with_base_url(api_token: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_token,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn records_url(&self, zone_id: &str) -> String {
        format!("{}/zones/{}/dns_records", self.base_url, zone_id)
    }

    /// Decode a response, mapping HTTP and API-level failures
    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        action: &str,
    ) -> Result<Option<T>> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(status_error(status, &body, action));
        }

        let envelope: Envelope<T> = response.json().await.map_err(|e| {
            Error::provider(PROVIDER, format!("{}: failed to parse response: {}", action, e))
        })?;

        if !envelope.success {
            return Err(envelope_error(&envelope.errors, action));
        }
        Ok(envelope.result)
    }

    /// Existing records with this name and type
    async fn find_records(&self, record: &RecordUpsert) -> Result<Vec<DnsRecord>> {
        let response = self
            .client
            .get(self.records_url(&record.zone_id))
            .bearer_auth(&self.api_token)
            .query(&[
                ("name", normalize_name(&record.name)),
                ("type", record.record_type.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::network(format!("Cloudflare record lookup failed: {}", e)))?;

        let records: Option<Vec<DnsRecord>> = Self::decode(response, "record lookup").await?;
        Ok(records.unwrap_or_default())
    }

    async fn delete_record(&self, record: &RecordUpsert, id: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/{}", self.records_url(&record.zone_id), id))
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| Error::network(format!("Cloudflare delete of {} failed: {}", id, e)))?;

        let action = format!("delete duplicate {} {}", record.name, id);
        let _: Option<serde_json::Value> = Self::decode(response, &action).await?;
        Ok(())
    }
}

#[async_trait]
impl DnsPublisher for CloudflarePublisher {
    async fn upsert(&self, record: &RecordUpsert) -> Result<()> {
        let body = RecordBody::from_upsert(record);

        let plan = UpsertPlan::from_existing(self.find_records(record).await?);

        let request = match &plan.replace {
            Some(id) => {
                debug!(zone = %record.zone_id, record = %record.name, "Replacing existing record");
                self.client
                    .put(format!("{}/{}", self.records_url(&record.zone_id), id))
            }
            None => {
                debug!(zone = %record.zone_id, record = %record.name, "Creating record");
                self.client.post(self.records_url(&record.zone_id))
            }
        };

        let response = request
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::network(format!("Cloudflare upsert of {} failed: {}", record, e)))?;

        let action = format!("upsert {}", record);
        let _: Option<serde_json::Value> = Self::decode(response, &action).await?;

        for id in &plan.remove {
            warn!(
                zone = %record.zone_id,
                record = %record.name,
                id = %id,
                "Removing duplicate record"
            );
            self.delete_record(record, id).await?;
        }

        info!(zone = %record.zone_id, record = %record.name, "Cloudflare record upserted");
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

/// Factory for creating Cloudflare publishers
pub struct CloudflareFactory;

#[async_trait]
impl DnsPublisherFactory for CloudflareFactory {
    async fn create(&self, config: &ProviderConfig) -> Result<Arc<dyn DnsPublisher>> {
        match config {
            ProviderConfig::Cloudflare { api_token } => {
                Ok(Arc::new(CloudflarePublisher::new(api_token.clone())?))
            }
            _ => Err(Error::config("Invalid config for Cloudflare provider")),
        }
    }
}

/// Register the Cloudflare publisher with a registry
///
/// # Example
///
/// ```rust
/// use dnsync_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// dnsync_provider_cloudflare::register(&registry);
/// assert!(registry.has_publisher("cloudflare"));
/// ```
pub fn register(registry: &dnsync_core::ProviderRegistry) {
    registry.register_publisher(PROVIDER, Box::new(CloudflareFactory));
}
