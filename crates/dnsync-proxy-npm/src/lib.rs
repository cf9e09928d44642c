// # Nginx Proxy Manager Controller
//
// ProxyController over the Nginx Proxy Manager REST API.
//
// ## API
//
// - POST `/api/tokens` `{identity, secret}` → `{token, expires}`
// - GET  `/api/nginx/proxy-hosts` → `[{domain_names, forward_host, forward_port, ...}]`
// - POST `/api/nginx/proxy-hosts` → creates a forwarding host; with TLS the
//   controller obtains its own certificate (`certificate_id: "new"`)
//
// ## Trust Level: Untrusted
//
// The client is stateless and single-shot. Authentication retries belong to
// the forwarding task in dnsync-core. The secret and the session token never
// appear in logs or `Debug` output.

use async_trait::async_trait;
use dnsync_core::config::ProxyConfig;
use dnsync_core::traits::{AuthToken, ForwardingRule, ProxyController, ProxyHost};
use dnsync_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Default HTTP timeout for API requests
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const CONTROLLER: &str = "nginx-proxy-manager";

#[derive(Serialize)]
struct TokenRequest<'a> {
    identity: &'a str,
    secret: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct HostResponse {
    #[serde(default)]
    domain_names: Vec<String>,
    #[serde(default)]
    forward_host: String,
    #[serde(default)]
    forward_port: u16,
}

impl From<HostResponse> for ProxyHost {
    fn from(host: HostResponse) -> Self {
        ProxyHost {
            domain_names: host.domain_names,
            forward_host: host.forward_host,
            forward_port: host.forward_port,
        }
    }
}

/// Body of a proxy-host creation request
fn host_payload(rule: &ForwardingRule, letsencrypt_email: Option<&str>) -> Value {
    let mut payload = json!({
        "domain_names": [rule.domain_name],
        "forward_scheme": "http",
        "forward_host": rule.forward_host,
        "forward_port": rule.forward_port,
        "access_list_id": 0,
        "block_exploits": true,
        "allow_websocket_upgrade": true,
        "caching_enabled": false,
        "http2_support": rule.tls,
        "hsts_enabled": false,
        "hsts_subdomains": false,
        "ssl_forced": rule.tls && rule.force_https,
        "locations": [],
        "advanced_config": "",
    });

    if rule.tls {
        payload["certificate_id"] = json!("new");
        payload["meta"] = json!({
            "letsencrypt_agree": true,
            "letsencrypt_email": letsencrypt_email.unwrap_or_default(),
            "dns_challenge": false,
        });
    } else {
        payload["certificate_id"] = json!(0);
        payload["meta"] = json!({});
    }

    payload
}

fn status_error(status: reqwest::StatusCode, body: &str, action: &str) -> Error {
    match status.as_u16() {
        401 | 403 => Error::provider(
            CONTROLLER,
            format!("{}: not authorized ({})", action, status),
        ),
        500..=599 => Error::network(format!("{}: controller error ({}): {}", action, status, body)),
        _ => Error::provider(CONTROLLER, format!("{}: {} - {}", action, status, body)),
    }
}

/// Nginx Proxy Manager API client
pub struct NpmController {
    base_url: String,
    identity: String,
    secret: String,
    letsencrypt_email: Option<String>,
    client: reqwest::Client,
}

// Custom Debug implementation that hides the secret
impl std::fmt::Debug for NpmController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NpmController")
            .field("base_url", &self.base_url)
            .field("identity", &self.identity)
            .field("secret", &"<REDACTED>")
            .field("letsencrypt_email", &self.letsencrypt_email)
            .finish()
    }
}

impl NpmController {
    pub fn new(
        base_url: impl Into<String>,
        identity: impl Into<String>,
        secret: impl Into<String>,
        letsencrypt_email: Option<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            identity: identity.into(),
            secret: secret.into(),
            letsencrypt_email,
            client,
        })
    }

    /// Create a client from configuration
    pub fn from_config(config: &ProxyConfig) -> Result<Self> {
        Self::new(
            config.base_url.clone(),
            config.identity.clone(),
            config.secret.clone(),
            config.letsencrypt_email.clone(),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    async fn check(response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());
        Err(status_error(status, &body, action))
    }
}

#[async_trait]
impl ProxyController for NpmController {
    async fn authenticate(&self) -> Result<AuthToken> {
        let response = self
            .client
            .post(self.url("/tokens"))
            .json(&TokenRequest {
                identity: &self.identity,
                secret: &self.secret,
            })
            .send()
            .await
            .map_err(|e| Error::network(format!("Proxy login request failed: {}", e)))?;

        let response = Self::check(response, "login").await?;
        let token: TokenResponse = response.json().await.map_err(|e| {
            Error::provider(CONTROLLER, format!("login: failed to parse response: {}", e))
        })?;

        debug!(base_url = %self.base_url, "Proxy controller session opened");
        Ok(AuthToken::new(token.token))
    }

    async fn list_hosts(&self, token: &AuthToken) -> Result<Vec<ProxyHost>> {
        let response = self
            .client
            .get(self.url("/nginx/proxy-hosts"))
            .bearer_auth(token.expose())
            .send()
            .await
            .map_err(|e| Error::network(format!("Proxy host listing failed: {}", e)))?;

        let response = Self::check(response, "list hosts").await?;
        let hosts: Vec<HostResponse> = response.json().await.map_err(|e| {
            Error::provider(CONTROLLER, format!("list hosts: failed to parse response: {}", e))
        })?;

        Ok(hosts.into_iter().map(ProxyHost::from).collect())
    }

    async fn create_host(&self, token: &AuthToken, rule: &ForwardingRule) -> Result<()> {
        let payload = host_payload(rule, self.letsencrypt_email.as_deref());

        let response = self
            .client
            .post(self.url("/nginx/proxy-hosts"))
            .bearer_auth(token.expose())
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                Error::network(format!(
                    "Proxy host creation for {} failed: {}",
                    rule.domain_name, e
                ))
            })?;

        Self::check(response, &format!("create host {}", rule.domain_name)).await?;
        Ok(())
    }

    fn controller_name(&self) -> &'static str {
        CONTROLLER
    }
}
