use async_trait::async_trait;
use aws_sdk_route53::types::{
    Change, ChangeAction, ChangeBatch, ResourceRecord, ResourceRecordSet, RrType,
};
use dnsync_core::config::ProviderConfig;
use dnsync_core::traits::{DnsPublisher, DnsPublisherFactory, RecordUpsert};
use dnsync_core::{Error, Result};
use std::sync::Arc;
use tracing::info;

use crate::{load_sdk_config, sdk_error};

const PROVIDER: &str = "route53";

/// Route53 DNS publisher
///
/// `zone_id` is the hosted zone ID. Every upsert is a single-change batch
/// with the `UPSERT` action, which creates the record or replaces its value
/// and TTL.
#[derive(Debug, Clone)]
pub struct Route53Publisher {
    client: aws_sdk_route53::Client,
}

impl Route53Publisher {
    pub fn new(client: aws_sdk_route53::Client) -> Self {
        Self { client }
    }

    /// Create a publisher from the default credential chain
    pub async fn from_env(region: Option<&str>) -> Result<Self> {
        let config = load_sdk_config(region).await?;
        Ok(Self::new(aws_sdk_route53::Client::new(&config)))
    }
}

fn build_error(e: aws_sdk_route53::error::BuildError) -> Error {
    Error::invalid_input(format!("Invalid Route53 change: {}", e))
}

/// The single-change UPSERT batch for `record`
pub(crate) fn change_batch(record: &RecordUpsert) -> Result<ChangeBatch> {
    let value = ResourceRecord::builder()
        .value(&record.value)
        .build()
        .map_err(build_error)?;

    let record_set = ResourceRecordSet::builder()
        .name(&record.name)
        .r#type(RrType::from(record.record_type.as_str()))
        .ttl(i64::from(record.ttl))
        .resource_records(value)
        .build()
        .map_err(build_error)?;

    let change = Change::builder()
        .action(ChangeAction::Upsert)
        .resource_record_set(record_set)
        .build()
        .map_err(build_error)?;

    ChangeBatch::builder()
        .comment(format!("dnsync upsert {} {}", record.record_type, record.name))
        .changes(change)
        .build()
        .map_err(build_error)
}

#[async_trait]
impl DnsPublisher for Route53Publisher {
    async fn upsert(&self, record: &RecordUpsert) -> Result<()> {
        let batch = change_batch(record)?;

        let output = self
            .client
            .change_resource_record_sets()
            .hosted_zone_id(&record.zone_id)
            .change_batch(batch)
            .send()
            .await
            .map_err(|e| sdk_error(PROVIDER, &format!("upsert {}", record), e))?;

        info!(
            zone = %record.zone_id,
            record = %record.name,
            change_id = output.change_info().map(|c| c.id()).unwrap_or_default(),
            "Route53 change submitted"
        );
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

/// Factory for creating Route53 publishers
pub struct Route53Factory;

#[async_trait]
impl DnsPublisherFactory for Route53Factory {
    async fn create(&self, config: &ProviderConfig) -> Result<Arc<dyn DnsPublisher>> {
        match config {
            ProviderConfig::Route53 { region } => {
                Ok(Arc::new(Route53Publisher::from_env(region.as_deref()).await?))
            }
            _ => Err(Error::config("Invalid config for Route53 provider")),
        }
    }
}
