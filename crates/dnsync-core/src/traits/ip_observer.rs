// # IP Observer Trait
//
// Fetches the caller's current public IP from an external service.
//
// ## Implementations
//
// - HTTP address-echo: `dnsync-ip-http` crate

use async_trait::async_trait;

/// Trait for public IP lookups
///
/// One call performs exactly one outbound request. Observers never retry or
/// sleep; the reconciliation loop decides when to ask again.
#[async_trait]
pub trait IpObserver: Send + Sync {
    /// Fetch the current public IP, trimmed of surrounding whitespace
    ///
    /// # Returns
    ///
    /// - `Ok(String)`: The address as reported by the service
    /// - `Err(Error::Network)`: Transport failure or non-success status
    async fn fetch(&self) -> Result<String, crate::Error>;

    /// Name of the observer (for logging)
    fn observer_name(&self) -> &'static str {
        "ip-observer"
    }
}
