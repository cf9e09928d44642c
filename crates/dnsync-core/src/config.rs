//! Configuration types for dnsync
//!
//! The configuration is loaded once at startup and is immutable for the
//! lifetime of the process. Every timing constant used by the tasks is
//! carried here so tests can shrink them.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::state::certificate_key;

/// Main dnsync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsyncConfig {
    /// Seconds between reconciliation ticks
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Domains to keep converged
    pub domains: Vec<DomainRecord>,

    /// Where persisted state lives
    #[serde(default)]
    pub state: StateConfig,

    /// Certificate lifecycle timing and matching
    #[serde(default)]
    pub certificate: CertificateConfig,

    /// Public IP lookup
    #[serde(default)]
    pub ip_observer: IpObserverConfig,

    /// DNS provider used for A records and challenge records
    #[serde(default)]
    pub dns_provider: ProviderConfig,

    /// Certificate authority used for TLS domains
    #[serde(default)]
    pub authority: AuthorityConfig,

    /// Reverse-proxy controller (forwarding rules are skipped when absent)
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
}

impl DnsyncConfig {
    /// Create a configuration with defaults for the given domains
    pub fn new(domains: Vec<DomainRecord>) -> Self {
        Self {
            interval_secs: default_interval_secs(),
            domains,
            state: StateConfig::default(),
            certificate: CertificateConfig::default(),
            ip_observer: IpObserverConfig::default(),
            dns_provider: ProviderConfig::default(),
            authority: AuthorityConfig::default(),
            proxy: None,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.domains.is_empty() {
            return Err(crate::Error::config("No domains configured"));
        }

        if self.interval_secs == 0 {
            return Err(crate::Error::config("Reconciliation interval must be > 0"));
        }

        for domain in &self.domains {
            domain.validate()?;
        }

        self.certificate.validate()?;
        self.ip_observer.validate()?;
        self.dns_provider.validate()?;

        if let Some(proxy) = &self.proxy {
            proxy.validate()?;
        }

        Ok(())
    }

    /// Interval between reconciliation ticks
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Whether any configured domain requests a certificate
    pub fn any_tls(&self) -> bool {
        self.domains.iter().any(|d| d.tls)
    }
}

fn default_interval_secs() -> u64 {
    300
}

/// One managed domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRecord {
    /// Identifier of the authoritative zone holding the record
    pub zone_id: String,

    /// Fully qualified record name (e.g. "home.example.com")
    pub record_name: String,

    /// Whether a certificate should be issued for this name
    #[serde(default)]
    pub tls: bool,

    /// Port the reverse proxy should forward this name to
    #[serde(default)]
    pub forward_port: Option<u16>,

    /// Whether the forwarding rule should redirect HTTP to HTTPS
    #[serde(default)]
    pub force_https: bool,
}

impl DomainRecord {
    /// Create a record without TLS or forwarding
    pub fn new(zone_id: impl Into<String>, record_name: impl Into<String>) -> Self {
        Self {
            zone_id: zone_id.into(),
            record_name: record_name.into(),
            tls: false,
            forward_port: None,
            force_https: false,
        }
    }

    /// Request a certificate for this record
    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Forward this record through the reverse proxy
    pub fn with_forward_port(mut self, port: u16) -> Self {
        self.forward_port = Some(port);
        self
    }

    /// Redirect HTTP to HTTPS on the forwarding rule
    pub fn with_force_https(mut self, force_https: bool) -> Self {
        self.force_https = force_https;
        self
    }

    fn validate(&self) -> Result<(), crate::Error> {
        if self.zone_id.trim().is_empty() {
            return Err(crate::Error::config(format!(
                "Domain {} has an empty zone_id",
                self.record_name
            )));
        }
        if self.record_name.trim().is_empty() {
            return Err(crate::Error::config("Domain record_name cannot be empty"));
        }
        if self.forward_port == Some(0) {
            return Err(crate::Error::config(format!(
                "Domain {} has forward_port 0",
                self.record_name
            )));
        }
        Ok(())
    }
}

/// Persisted state layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Directory holding one file per state key
    #[serde(default = "default_state_dir")]
    pub dir: PathBuf,

    /// Key holding the last successfully published IP
    #[serde(default = "default_ip_file")]
    pub ip_file: String,

    /// Prefix of per-domain certificate keys
    #[serde(default = "default_certificate_prefix")]
    pub certificate_prefix: String,

    /// Suffix of per-domain certificate keys
    #[serde(default = "default_certificate_suffix")]
    pub certificate_suffix: String,
}

impl StateConfig {
    /// Key of the observed IP
    pub fn ip_key(&self) -> &str {
        &self.ip_file
    }

    /// Key of the certificate identifier for `domain`
    pub fn certificate_key(&self, domain: &str) -> String {
        certificate_key(&self.certificate_prefix, domain, &self.certificate_suffix)
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: default_state_dir(),
            ip_file: default_ip_file(),
            certificate_prefix: default_certificate_prefix(),
            certificate_suffix: default_certificate_suffix(),
        }
    }
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_ip_file() -> String {
    "last_ip.txt".to_string()
}

fn default_certificate_prefix() -> String {
    "cert_arn_".to_string()
}

fn default_certificate_suffix() -> String {
    ".txt".to_string()
}

/// How an existing issued certificate's domain is compared to ours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainMatch {
    /// Byte-exact, case-sensitive comparison
    #[default]
    Exact,
    /// ASCII case-insensitive comparison
    CaseInsensitive,
}

impl DomainMatch {
    /// Compare two domain names under this mode
    pub fn matches(self, a: &str, b: &str) -> bool {
        match self {
            DomainMatch::Exact => a == b,
            DomainMatch::CaseInsensitive => a.eq_ignore_ascii_case(b),
        }
    }
}

/// Certificate lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateConfig {
    /// Seconds between describe polls while waiting for the challenge record
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Budget for the challenge record to appear
    #[serde(default = "default_budget_secs")]
    pub discovery_budget_secs: u64,

    /// Budget for validation after the challenge is published
    ///
    /// This is a fresh budget, not the remainder of the discovery budget.
    #[serde(default = "default_budget_secs")]
    pub validation_budget_secs: u64,

    /// Comparison mode for the existing-certificate lookup
    #[serde(default)]
    pub domain_match: DomainMatch,
}

impl CertificateConfig {
    fn validate(&self) -> Result<(), crate::Error> {
        if self.poll_interval_secs == 0 {
            return Err(crate::Error::config("Certificate poll interval must be > 0"));
        }
        if self.discovery_budget_secs == 0 || self.validation_budget_secs == 0 {
            return Err(crate::Error::config("Certificate budgets must be > 0"));
        }
        Ok(())
    }

    /// Timing and matching policy for orchestrators
    pub fn policy(&self) -> CertificatePolicy {
        CertificatePolicy {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            discovery_budget: Duration::from_secs(self.discovery_budget_secs),
            validation_budget: Duration::from_secs(self.validation_budget_secs),
            domain_match: self.domain_match,
        }
    }
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            discovery_budget_secs: default_budget_secs(),
            validation_budget_secs: default_budget_secs(),
            domain_match: DomainMatch::default(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_budget_secs() -> u64 {
    15 * 60
}

/// Resolved certificate timing, in `Duration`s
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CertificatePolicy {
    pub poll_interval: Duration,
    pub discovery_budget: Duration,
    pub validation_budget: Duration,
    pub domain_match: DomainMatch,
}

impl Default for CertificatePolicy {
    fn default() -> Self {
        CertificateConfig::default().policy()
    }
}

/// Public IP lookup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpObserverConfig {
    /// Address-echo endpoint returning the caller's IP as plain text
    #[serde(default = "default_ip_observer_url")]
    pub url: String,

    /// Request timeout in seconds
    #[serde(default = "default_ip_observer_timeout_secs")]
    pub timeout_secs: u64,
}

impl IpObserverConfig {
    fn validate(&self) -> Result<(), crate::Error> {
        if self.url.is_empty() {
            return Err(crate::Error::config("IP observer URL cannot be empty"));
        }
        if !self.url.starts_with("https://") && !self.url.starts_with("http://") {
            return Err(crate::Error::config(format!(
                "IP observer URL must use HTTP or HTTPS. Got: {}",
                self.url
            )));
        }
        if self.timeout_secs == 0 {
            return Err(crate::Error::config("IP observer timeout must be > 0"));
        }
        Ok(())
    }
}

impl Default for IpObserverConfig {
    fn default() -> Self {
        Self {
            url: default_ip_observer_url(),
            timeout_secs: default_ip_observer_timeout_secs(),
        }
    }
}

fn default_ip_observer_url() -> String {
    "https://checkip.amazonaws.com/".to_string()
}

fn default_ip_observer_timeout_secs() -> u64 {
    10
}

/// DNS provider configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// AWS Route53
    Route53 {
        /// Region override (falls back to the SDK's default chain)
        region: Option<String>,
    },

    /// Cloudflare (zone_id of each domain is the Cloudflare zone ID)
    Cloudflare {
        /// Cloudflare API token
        api_token: String,
    },
}

impl ProviderConfig {
    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ProviderConfig::Cloudflare { api_token } if api_token.is_empty() => Err(
                crate::Error::config("Cloudflare API token cannot be empty"),
            ),
            _ => Ok(()),
        }
    }

    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::Route53 { .. } => "route53",
            ProviderConfig::Cloudflare { .. } => "cloudflare",
        }
    }
}

// The API token never reaches logs
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::Route53 { region } => f
                .debug_struct("Route53")
                .field("region", region)
                .finish(),
            ProviderConfig::Cloudflare { .. } => f
                .debug_struct("Cloudflare")
                .field("api_token", &"<REDACTED>")
                .finish(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig::Route53 { region: None }
    }
}

/// Certificate authority configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthorityConfig {
    /// AWS Certificate Manager
    Acm {
        /// Region override (falls back to the SDK's default chain)
        region: Option<String>,
    },
}

impl AuthorityConfig {
    /// Get the authority type name
    pub fn type_name(&self) -> &str {
        match self {
            AuthorityConfig::Acm { .. } => "acm",
        }
    }
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        AuthorityConfig::Acm { region: None }
    }
}

/// Reverse-proxy controller configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Base URL of the controller API (e.g. "http://proxy:81")
    pub base_url: String,

    /// Login identity
    pub identity: String,

    /// Login secret
    pub secret: String,

    /// Upstream host every forwarding rule points at
    pub forward_host: String,

    /// Contact address used when the controller requests a certificate
    #[serde(default)]
    pub letsencrypt_email: Option<String>,

    /// Authentication attempts before giving up
    #[serde(default = "default_auth_attempts")]
    pub auth_attempts: u32,

    /// Fixed delay between authentication attempts
    #[serde(default = "default_auth_backoff_secs")]
    pub auth_backoff_secs: u64,
}

impl ProxyConfig {
    /// Create a proxy configuration with default authentication retries
    pub fn new(
        base_url: impl Into<String>,
        identity: impl Into<String>,
        secret: impl Into<String>,
        forward_host: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            identity: identity.into(),
            secret: secret.into(),
            forward_host: forward_host.into(),
            letsencrypt_email: None,
            auth_attempts: default_auth_attempts(),
            auth_backoff_secs: default_auth_backoff_secs(),
        }
    }

    fn validate(&self) -> Result<(), crate::Error> {
        if self.base_url.is_empty() {
            return Err(crate::Error::config("Proxy base URL cannot be empty"));
        }
        if self.identity.is_empty() || self.secret.is_empty() {
            return Err(crate::Error::config(
                "Proxy identity and secret must both be set",
            ));
        }
        if self.forward_host.is_empty() {
            return Err(crate::Error::config("Proxy forward host cannot be empty"));
        }
        if self.auth_attempts == 0 {
            return Err(crate::Error::config("Proxy auth attempts must be > 0"));
        }
        Ok(())
    }

    /// Delay between authentication attempts
    pub fn auth_backoff(&self) -> Duration {
        Duration::from_secs(self.auth_backoff_secs)
    }
}

// The secret never reaches logs
impl std::fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("base_url", &self.base_url)
            .field("identity", &self.identity)
            .field("secret", &"<REDACTED>")
            .field("forward_host", &self.forward_host)
            .field("letsencrypt_email", &self.letsencrypt_email)
            .field("auth_attempts", &self.auth_attempts)
            .field("auth_backoff_secs", &self.auth_backoff_secs)
            .finish()
    }
}

fn default_auth_attempts() -> u32 {
    5
}

fn default_auth_backoff_secs() -> u64 {
    15
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_list_parses_with_defaults() {
        let json = r#"[
            {"zone_id": "Z1", "record_name": "home.example.com", "tls": true},
            {"zone_id": "Z1", "record_name": "nas.example.com", "forward_port": 5000}
        ]"#;

        let domains: Vec<DomainRecord> = serde_json::from_str(json).unwrap();
        assert_eq!(domains.len(), 2);
        assert!(domains[0].tls);
        assert_eq!(domains[0].forward_port, None);
        assert!(!domains[1].tls);
        assert_eq!(domains[1].forward_port, Some(5000));
        assert!(!domains[1].force_https);
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = DnsyncConfig::new(vec![DomainRecord::new("Z1", "a.example.com")]);
        assert_eq!(config.interval_secs, 300);
        assert_eq!(config.certificate.poll_interval_secs, 30);
        assert_eq!(config.certificate.discovery_budget_secs, 900);
        assert_eq!(config.certificate.validation_budget_secs, 900);
        assert_eq!(config.certificate.domain_match, DomainMatch::Exact);
        assert_eq!(config.ip_observer.url, "https://checkip.amazonaws.com/");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_domains_rejected() {
        let config = DnsyncConfig::new(Vec::new());
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }

    #[test]
    fn zero_forward_port_rejected() {
        let config = DnsyncConfig::new(vec![
            DomainRecord::new("Z1", "a.example.com").with_forward_port(0),
        ]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn certificate_keys_are_sanitized() {
        let state = StateConfig::default();
        assert_eq!(
            state.certificate_key("*.example.com"),
            "cert_arn_wildcard_example_com.txt"
        );
        assert_eq!(state.certificate_key("a.b.com"), "cert_arn_a_b_com.txt");
    }

    #[test]
    fn domain_match_modes() {
        assert!(DomainMatch::Exact.matches("a.example.com", "a.example.com"));
        assert!(!DomainMatch::Exact.matches("A.example.com", "a.example.com"));
        assert!(DomainMatch::CaseInsensitive.matches("A.Example.com", "a.example.com"));
    }

    #[test]
    fn cloudflare_token_redacted_in_debug() {
        let mut config = DnsyncConfig::new(vec![DomainRecord::new("Z1", "a.example.com")]);
        config.dns_provider = ProviderConfig::Cloudflare {
            api_token: "cf-super-secret-token".to_string(),
        };

        let debug = format!("{:?}", config);
        assert!(!debug.contains("cf-super-secret-token"));
        assert!(debug.contains("Cloudflare"));
        assert!(debug.contains("<REDACTED>"));
    }

    #[test]
    fn proxy_secret_redacted_in_debug() {
        let proxy = ProxyConfig {
            base_url: "http://proxy:81".to_string(),
            identity: "admin@example.com".to_string(),
            secret: "hunter2-very-secret".to_string(),
            forward_host: "192.168.1.10".to_string(),
            letsencrypt_email: None,
            auth_attempts: 5,
            auth_backoff_secs: 15,
        };
        let debug = format!("{:?}", proxy);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<REDACTED>"));
    }
}
