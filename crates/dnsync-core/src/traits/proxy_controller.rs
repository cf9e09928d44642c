// # Proxy Controller Trait
//
// Forwarding rules on a reverse-proxy controller. This path is optional:
// without a configured controller the DNS and certificate behaviour is
// unchanged.
//
// ## Implementations
//
// - Nginx Proxy Manager API: `dnsync-proxy-npm` crate

use async_trait::async_trait;

/// Session token returned by the controller
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token for the Authorization header
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuthToken(<REDACTED>)")
    }
}

/// An existing forwarding host on the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyHost {
    pub domain_names: Vec<String>,
    pub forward_host: String,
    pub forward_port: u16,
}

impl ProxyHost {
    /// Whether this host already serves `domain_name`
    pub fn serves(&self, domain_name: &str) -> bool {
        self.domain_names.iter().any(|d| d == domain_name)
    }
}

/// A forwarding rule to create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardingRule {
    pub domain_name: String,
    pub forward_host: String,
    pub forward_port: u16,
    pub tls: bool,
    pub force_https: bool,
}

/// Trait for reverse-proxy controller clients
///
/// The client is stateless: the token is handed back to every call. Retry
/// of `authenticate` is owned by the forwarding task.
#[async_trait]
pub trait ProxyController: Send + Sync {
    /// Exchange the configured identity and secret for a session token
    async fn authenticate(&self) -> Result<AuthToken, crate::Error>;

    /// List all forwarding hosts
    async fn list_hosts(&self, token: &AuthToken) -> Result<Vec<ProxyHost>, crate::Error>;

    /// Create a forwarding host
    async fn create_host(&self, token: &AuthToken, rule: &ForwardingRule)
    -> Result<(), crate::Error>;

    /// Name of the controller (for logging)
    fn controller_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_redacted_in_debug() {
        let token = AuthToken::new("eyJhbGciOi.secret");
        assert_eq!(format!("{:?}", token), "AuthToken(<REDACTED>)");
        assert_eq!(token.expose(), "eyJhbGciOi.secret");
    }

    #[test]
    fn host_serves_exact_domain() {
        let host = ProxyHost {
            domain_names: vec!["a.example.com".to_string(), "b.example.com".to_string()],
            forward_host: "10.0.0.2".to_string(),
            forward_port: 8080,
        };
        assert!(host.serves("b.example.com"));
        assert!(!host.serves("c.example.com"));
    }
}
