// # DNS Publisher Trait
//
// Idempotent create-or-replace of a single DNS resource record.
//
// ## Implementations
//
// - Route53: `dnsync-provider-aws` crate
// - Cloudflare: `dnsync-provider-cloudflare` crate

use async_trait::async_trait;
use std::fmt;

/// Default TTL for published records (seconds)
pub const DEFAULT_TTL: u32 = 300;

/// A single record to create or fully replace
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordUpsert {
    /// Zone the record lives in (provider-specific identifier)
    pub zone_id: String,
    /// Fully qualified record name
    pub name: String,
    /// Record type ("A", "CNAME", ...)
    pub record_type: String,
    /// The single value the record should hold
    pub value: String,
    /// Time-to-live in seconds
    pub ttl: u32,
}

impl RecordUpsert {
    /// Create an upsert with the default TTL
    pub fn new(
        zone_id: impl Into<String>,
        name: impl Into<String>,
        record_type: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            zone_id: zone_id.into(),
            name: name.into(),
            record_type: record_type.into(),
            value: value.into(),
            ttl: DEFAULT_TTL,
        }
    }

    /// An A record pointing `name` at `ip`
    pub fn a_record(zone_id: impl Into<String>, name: impl Into<String>, ip: impl Into<String>) -> Self {
        Self::new(zone_id, name, "A", ip)
    }

    /// Override the TTL
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }
}

impl fmt::Display for RecordUpsert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {} (zone {}, ttl {})",
            self.record_type, self.name, self.value, self.zone_id, self.ttl
        )
    }
}

/// Trait for DNS provider implementations
///
/// # Contract
///
/// `upsert` creates the record if absent, otherwise replaces its value and
/// TTL. Calling it twice with identical arguments leaves the same remote
/// state as calling it once: values are never appended.
///
/// Publishers are single-shot: no retries, no sleeping, no state access.
/// Errors carry enough context to log the zone, name and cause; retry policy
/// belongs to the caller.
#[async_trait]
pub trait DnsPublisher: Send + Sync {
    /// Create or fully replace the record described by `record`
    async fn upsert(&self, record: &RecordUpsert) -> Result<(), crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS publishers from configuration
#[async_trait]
pub trait DnsPublisherFactory: Send + Sync {
    /// Create a DnsPublisher instance from configuration
    async fn create(
        &self,
        config: &crate::config::ProviderConfig,
    ) -> Result<std::sync::Arc<dyn DnsPublisher>, crate::Error>;
}
