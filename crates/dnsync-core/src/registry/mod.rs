//! Plugin-based provider registry
//!
//! DNS publishers and certificate authorities are registered by name at
//! startup, so the daemon picks an implementation from configuration
//! without hardcoded if-else chains.
//!
//! ## Registration
//!
//! Implementation crates expose a `register` function:
//!
//! ```rust,ignore
//! // In dnsync-provider-aws
//! pub fn register(registry: &ProviderRegistry) {
//!     registry.register_publisher("route53", Box::new(Route53Factory));
//!     registry.register_authority("acm", Box::new(AcmFactory));
//! }
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! let registry = ProviderRegistry::new();
//! dnsync_provider_aws::register(&registry);
//!
//! let publisher = registry.create_publisher(&config.dns_provider).await?;
//! ```

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::{AuthorityConfig, ProviderConfig};
use crate::error::{Error, Result};
use crate::traits::{
    CertificateAuthority, CertificateAuthorityFactory, DnsPublisher, DnsPublisherFactory,
};

/// Registry of publisher and authority factories
///
/// Interior mutability via RwLock allows registration through a shared
/// reference. Factories are held behind `Arc` so no lock is held across the
/// async `create` call.
#[derive(Default)]
pub struct ProviderRegistry {
    /// Registered DNS publisher factories
    publishers: RwLock<HashMap<String, Arc<dyn DnsPublisherFactory>>>,

    /// Registered certificate authority factories
    authorities: RwLock<HashMap<String, Arc<dyn CertificateAuthorityFactory>>>,
}

// A panic while holding the lock cannot leave a HashMap half-inserted
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a DNS publisher factory under `name` (e.g. "route53")
    pub fn register_publisher(
        &self,
        name: impl Into<String>,
        factory: Box<dyn DnsPublisherFactory>,
    ) {
        write(&self.publishers).insert(name.into(), Arc::from(factory));
    }

    /// Register a certificate authority factory under `name` (e.g. "acm")
    pub fn register_authority(
        &self,
        name: impl Into<String>,
        factory: Box<dyn CertificateAuthorityFactory>,
    ) {
        write(&self.authorities).insert(name.into(), Arc::from(factory));
    }

    /// Create a DNS publisher from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Arc<dyn DnsPublisher>)`: Created publisher
    /// - `Err(Error::Config)`: If the provider type is not registered
    /// - `Err(Error)`: If creation fails
    pub async fn create_publisher(&self, config: &ProviderConfig) -> Result<Arc<dyn DnsPublisher>> {
        let provider_type = config.type_name();
        let factory = read(&self.publishers)
            .get(provider_type)
            .cloned()
            .ok_or_else(|| Error::config(format!("Unknown DNS provider type: {}", provider_type)))?;

        factory.create(config).await
    }

    /// Create a certificate authority from configuration
    pub async fn create_authority(
        &self,
        config: &AuthorityConfig,
    ) -> Result<Arc<dyn CertificateAuthority>> {
        let authority_type = config.type_name();
        let factory = read(&self.authorities)
            .get(authority_type)
            .cloned()
            .ok_or_else(|| {
                Error::config(format!("Unknown certificate authority type: {}", authority_type))
            })?;

        factory.create(config).await
    }

    /// List all registered publisher types
    pub fn list_publishers(&self) -> Vec<String> {
        read(&self.publishers).keys().cloned().collect()
    }

    /// List all registered authority types
    pub fn list_authorities(&self) -> Vec<String> {
        read(&self.authorities).keys().cloned().collect()
    }

    /// Check if a publisher type is registered
    pub fn has_publisher(&self, name: &str) -> bool {
        read(&self.publishers).contains_key(name)
    }

    /// Check if an authority type is registered
    pub fn has_authority(&self, name: &str) -> bool {
        read(&self.authorities).contains_key(name)
    }
}
