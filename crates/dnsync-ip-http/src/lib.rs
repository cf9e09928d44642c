// # HTTP IP Observer
//
// Fetches the caller's public IP from an address-echo endpoint that answers
// with the address as plain text (e.g. https://checkip.amazonaws.com/).
//
// ## Contract
//
// - One GET per `fetch()`, no retries, no caching
// - Only success-class responses are accepted
// - The body is returned with surrounding whitespace and line terminators
//   trimmed; its content is otherwise not interpreted
// - Transport failures and non-success statuses are `Error::Network`

use dnsync_core::config::IpObserverConfig;
use dnsync_core::traits::IpObserver;
use dnsync_core::{Error, Result};

use std::time::Duration;

use tracing::trace;

/// IP observer backed by an HTTP address-echo endpoint
pub struct HttpIpObserver {
    /// URL to fetch the IP from
    url: String,

    /// HTTP client (carries the request timeout)
    client: reqwest::Client,
}

impl HttpIpObserver {
    /// Create an observer for `url` with the given request timeout
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            url: url.into(),
            client,
        })
    }

    /// Create an observer from configuration
    pub fn from_config(config: &IpObserverConfig) -> Result<Self> {
        Self::new(config.url.clone(), Duration::from_secs(config.timeout_secs))
    }

    /// The endpoint this observer queries
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Trim an address-echo body, rejecting an empty one
fn parse_body(body: &str) -> Result<String> {
    let ip = body.trim();
    if ip.is_empty() {
        return Err(Error::network("Address-echo endpoint returned an empty body"));
    }
    Ok(ip.to_string())
}

#[async_trait::async_trait]
impl IpObserver for HttpIpObserver {
    async fn fetch(&self) -> Result<String> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::network(format!("Request to {} failed: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::network(format!(
                "Address-echo endpoint {} returned HTTP {}",
                self.url, status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::network(format!("Failed to read response body: {}", e)))?;

        let ip = parse_body(&body)?;
        trace!(url = %self.url, ip = %ip, "Fetched public IP");
        Ok(ip)
    }

    fn observer_name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_is_trimmed() {
        assert_eq!(parse_body("1.2.3.4\n").unwrap(), "1.2.3.4");
        assert_eq!(parse_body("  1.2.3.4\r\n").unwrap(), "1.2.3.4");
        assert_eq!(parse_body("2001:db8::1").unwrap(), "2001:db8::1");
    }

    #[test]
    fn empty_body_is_network_error() {
        assert!(matches!(parse_body(" \n"), Err(Error::Network(_))));
    }

    #[test]
    fn from_config_uses_configured_url() {
        let observer = HttpIpObserver::from_config(&IpObserverConfig::default()).unwrap();
        assert_eq!(observer.url(), "https://checkip.amazonaws.com/");
        assert_eq!(observer.observer_name(), "http");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_network_error() {
        // Port 9 on localhost is discard and normally closed
        let observer =
            HttpIpObserver::new("http://127.0.0.1:9/", Duration::from_millis(500)).unwrap();
        let result = observer.fetch().await;
        assert!(matches!(result, Err(Error::Network(_))));
    }
}
