// # dnsyncd - dnsync Daemon
//
// This is a thin integration layer: all reconciliation, certificate and
// forwarding logic lives in dnsync-core.
//
// The daemon is responsible for:
// 1. Reading configuration from environment variables (once, at startup)
// 2. Initializing tracing and the runtime
// 3. Registering providers and building collaborators
// 4. Running the Supervisor until SIGTERM/SIGINT
//
// ## Configuration
//
// ### Reconciliation
// - `DNSYNC_SLEEP_TIME`: Seconds between IP checks (default 300)
// - `DNSYNC_RECORDS`: JSON array of domains, e.g.
//   `[{"zone_id":"Z1","record_name":"home.example.com","tls":true,"forward_port":8123}]`
// - `DNSYNC_IP_ECHO_URL`: Address-echo endpoint (default https://checkip.amazonaws.com/)
// - `DNSYNC_STATE_DIR`: Directory for persisted state (default ./data)
//
// ### DNS Provider
// - `DNSYNC_DNS_PROVIDER`: route53 (default) or cloudflare
// - `DNSYNC_CLOUDFLARE_API_TOKEN`: API token (for cloudflare)
// - `DNSYNC_AWS_REGION`: Region override for Route53 and ACM
//
// ### Certificates
// - `DNSYNC_CERT_POLL_SECS`: Seconds between validation-detail polls (default 30)
// - `DNSYNC_CERT_BUDGET_SECS`: Budget for each wait phase (default 900)
// - `DNSYNC_CERT_DOMAIN_MATCH`: exact (default) or case_insensitive
//
// ### Reverse Proxy (enabled when URL, identity and secret are all set)
// - `DNSYNC_PROXY_URL`, `DNSYNC_PROXY_IDENTITY`, `DNSYNC_PROXY_SECRET`
// - `DNSYNC_PROXY_FORWARD_HOST`: Upstream host for forwarding rules
// - `DNSYNC_PROXY_LETSENCRYPT_EMAIL`: Contact for controller-issued certificates
//
// ### Logging
// - `DNSYNC_LOG_LEVEL`: trace, debug, info (default), warn, error
//
// ## Example
//
// ```bash
// export AWS_REGION=eu-west-1
// export DNSYNC_RECORDS='[{"zone_id":"Z0123456789","record_name":"home.example.com","tls":true}]'
// export DNSYNC_STATE_DIR=/var/lib/dnsync
//
// dnsyncd
// ```

use anyhow::{Context, Result};
use dnsync_core::config::{
    AuthorityConfig, CertificateConfig, DomainMatch, IpObserverConfig, ProxyConfig, StateConfig,
};
use dnsync_core::{
    Collaborators, DnsyncConfig, DomainRecord, FileStateStore, ProviderConfig, ProviderRegistry,
    Supervisor,
};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration, credential or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum DnsyncExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DnsyncExitCode> for ExitCode {
    fn from(code: DnsyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration, as read from the environment
struct Config {
    sleep_time: u64,
    records: Vec<DomainRecord>,
    state_dir: PathBuf,
    dns_provider: String,
    cloudflare_api_token: Option<String>,
    aws_region: Option<String>,
    ip_echo_url: Option<String>,
    cert_poll_secs: Option<u64>,
    cert_budget_secs: Option<u64>,
    cert_domain_match: DomainMatch,
    proxy_url: Option<String>,
    proxy_identity: Option<String>,
    proxy_secret: Option<String>,
    proxy_forward_host: Option<String>,
    proxy_letsencrypt_email: Option<String>,
    log_level: String,
}

fn parse_number<T: FromStr>(name: &str, value: Option<String>) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    value
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|e| anyhow::anyhow!("{} must be a number. Got '{}': {}", name, v, e))
        })
        .transpose()
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok().filter(|v| !v.is_empty()))
    }

    /// Load configuration through `lookup`
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let records_json = lookup("DNSYNC_RECORDS").context(
            "DNSYNC_RECORDS is required. \
            Set it to a JSON array, e.g. '[{\"zone_id\":\"Z1\",\"record_name\":\"home.example.com\"}]'",
        )?;
        let records: Vec<DomainRecord> = serde_json::from_str(&records_json)
            .context("DNSYNC_RECORDS is not a valid JSON array of domain records")?;

        let cert_domain_match = match lookup("DNSYNC_CERT_DOMAIN_MATCH").as_deref() {
            None | Some("exact") => DomainMatch::Exact,
            Some("case_insensitive") => DomainMatch::CaseInsensitive,
            Some(other) => anyhow::bail!(
                "DNSYNC_CERT_DOMAIN_MATCH '{}' is not valid. \
                Valid values: exact, case_insensitive",
                other
            ),
        };

        Ok(Self {
            sleep_time: parse_number("DNSYNC_SLEEP_TIME", lookup("DNSYNC_SLEEP_TIME"))?
                .unwrap_or(300),
            records,
            state_dir: lookup("DNSYNC_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| StateConfig::default().dir),
            dns_provider: lookup("DNSYNC_DNS_PROVIDER").unwrap_or_else(|| "route53".to_string()),
            cloudflare_api_token: lookup("DNSYNC_CLOUDFLARE_API_TOKEN"),
            aws_region: lookup("DNSYNC_AWS_REGION"),
            ip_echo_url: lookup("DNSYNC_IP_ECHO_URL"),
            cert_poll_secs: parse_number("DNSYNC_CERT_POLL_SECS", lookup("DNSYNC_CERT_POLL_SECS"))?,
            cert_budget_secs: parse_number(
                "DNSYNC_CERT_BUDGET_SECS",
                lookup("DNSYNC_CERT_BUDGET_SECS"),
            )?,
            cert_domain_match,
            proxy_url: lookup("DNSYNC_PROXY_URL"),
            proxy_identity: lookup("DNSYNC_PROXY_IDENTITY"),
            proxy_secret: lookup("DNSYNC_PROXY_SECRET"),
            proxy_forward_host: lookup("DNSYNC_PROXY_FORWARD_HOST"),
            proxy_letsencrypt_email: lookup("DNSYNC_PROXY_LETSENCRYPT_EMAIL"),
            log_level: lookup("DNSYNC_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "DNSYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        if self
            .ip_echo_url
            .as_deref()
            .is_some_and(|url| url.starts_with("http://"))
        {
            eprintln!(
                "WARNING: DNSYNC_IP_ECHO_URL uses HTTP (not HTTPS). \
                A tampered response would repoint every record."
            );
        }

        self.to_core_config()?.validate()?;
        Ok(())
    }

    fn provider_config(&self) -> Result<ProviderConfig> {
        match self.dns_provider.as_str() {
            "route53" => Ok(ProviderConfig::Route53 {
                region: self.aws_region.clone(),
            }),
            "cloudflare" => Ok(ProviderConfig::Cloudflare {
                api_token: self.cloudflare_api_token.clone().context(
                    "DNSYNC_CLOUDFLARE_API_TOKEN is required when DNSYNC_DNS_PROVIDER=cloudflare",
                )?,
            }),
            other => anyhow::bail!(
                "DNSYNC_DNS_PROVIDER '{}' is not supported. \
                Supported providers: route53, cloudflare",
                other
            ),
        }
    }

    fn proxy_config(&self) -> Option<ProxyConfig> {
        let (Some(base_url), Some(identity), Some(secret)) = (
            self.proxy_url.clone(),
            self.proxy_identity.clone(),
            self.proxy_secret.clone(),
        ) else {
            return None;
        };

        let mut proxy = ProxyConfig::new(
            base_url,
            identity,
            secret,
            self.proxy_forward_host.clone().unwrap_or_default(),
        );
        proxy.letsencrypt_email = self.proxy_letsencrypt_email.clone();
        Some(proxy)
    }

    /// The library configuration this environment describes
    fn to_core_config(&self) -> Result<DnsyncConfig> {
        let mut certificate = CertificateConfig {
            domain_match: self.cert_domain_match,
            ..CertificateConfig::default()
        };
        if let Some(poll) = self.cert_poll_secs {
            certificate.poll_interval_secs = poll;
        }
        if let Some(budget) = self.cert_budget_secs {
            certificate.discovery_budget_secs = budget;
            certificate.validation_budget_secs = budget;
        }

        let mut ip_observer = IpObserverConfig::default();
        if let Some(url) = &self.ip_echo_url {
            ip_observer.url = url.clone();
        }

        let mut config = DnsyncConfig::new(self.records.clone());
        config.interval_secs = self.sleep_time;
        config.state.dir = self.state_dir.clone();
        config.certificate = certificate;
        config.ip_observer = ip_observer;
        config.dns_provider = self.provider_config()?;
        config.authority = AuthorityConfig::Acm {
            region: self.aws_region.clone(),
        };
        config.proxy = self.proxy_config();
        Ok(config)
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return DnsyncExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return DnsyncExitCode::ConfigError.into();
    }

    let core_config = match config.to_core_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return DnsyncExitCode::ConfigError.into();
        }
    };

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DnsyncExitCode::ConfigError.into();
    }

    info!("Starting dnsyncd daemon");
    info!(
        records = core_config.domains.len(),
        tls = core_config.domains.iter().filter(|d| d.tls).count(),
        provider = core_config.dns_provider.type_name(),
        proxy = core_config.proxy.is_some(),
        "Configuration loaded"
    );

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DnsyncExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        let supervisor = match build_supervisor(core_config).await {
            Ok(supervisor) => supervisor,
            Err(e) => {
                error!("Startup failed: {:#}", e);
                return DnsyncExitCode::ConfigError;
            }
        };

        if let Err(e) = run_daemon(supervisor).await {
            error!("Daemon error: {:#}", e);
            DnsyncExitCode::RuntimeError
        } else {
            DnsyncExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Create the provider registry with every compiled-in provider
fn registry() -> ProviderRegistry {
    let registry = ProviderRegistry::new();

    #[cfg(feature = "aws")]
    {
        info!("Registering Route53 publisher and ACM authority");
        dnsync_provider_aws::register(&registry);
    }

    #[cfg(feature = "cloudflare")]
    {
        info!("Registering Cloudflare publisher");
        dnsync_provider_cloudflare::register(&registry);
    }

    registry
}

/// Build every collaborator and the Supervisor
///
/// Any failure here is a configuration or credential problem.
async fn build_supervisor(config: DnsyncConfig) -> Result<Supervisor> {
    let registry = registry();

    let store = FileStateStore::new(&config.state.dir).await?;
    info!(dir = %config.state.dir.display(), "State directory ready");

    let observer = dnsync_ip_http::HttpIpObserver::from_config(&config.ip_observer)?;

    let publisher = registry.create_publisher(&config.dns_provider).await?;

    let authority = if config.any_tls() {
        Some(registry.create_authority(&config.authority).await?)
    } else {
        None
    };

    let proxy = match &config.proxy {
        Some(proxy_config) => Some(proxy_controller(proxy_config)?),
        None => {
            if config.domains.iter().any(|d| d.forward_port.is_some()) {
                warn!("Forwarding ports configured but no proxy controller; skipping forwarding rules");
            }
            None
        }
    };

    Supervisor::new(
        config,
        Collaborators {
            observer: Arc::new(observer),
            publisher,
            store: Arc::new(store),
            authority,
            proxy,
        },
    )
    .context("Supervisor could not be assembled")
}

#[cfg(feature = "proxy")]
fn proxy_controller(
    config: &ProxyConfig,
) -> Result<Arc<dyn dnsync_core::ProxyController>> {
    let controller = dnsync_proxy_npm::NpmController::from_config(config)?;
    Ok(Arc::new(controller))
}

#[cfg(not(feature = "proxy"))]
fn proxy_controller(
    _config: &ProxyConfig,
) -> Result<Arc<dyn dnsync_core::ProxyController>> {
    anyhow::bail!("Proxy configured but dnsyncd was built without the `proxy` feature")
}

/// Run the daemon until a shutdown signal
async fn run_daemon(supervisor: Supervisor) -> Result<()> {
    let cancel = CancellationToken::new();

    let mut shutdown = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            let signal = wait_for_shutdown().await;
            cancel.cancel();
            signal
        }
    });

    info!("Daemon initialized successfully");
    let reports = supervisor.run(cancel.clone()).await;

    // Every task stopped on its own only if the signal task is still waiting
    if !cancel.is_cancelled() {
        shutdown.abort();
        anyhow::bail!("All tasks stopped without a shutdown signal");
    }

    let signal = (&mut shutdown)
        .await
        .context("Shutdown signal task failed")??;
    info!(
        signal,
        tasks = reports.len(),
        failed = reports.iter().filter(|r| !r.succeeded()).count(),
        "Shut down"
    );
    Ok(())
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let received = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    info!("Received shutdown signal: {}", received);
    Ok(received)
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    info!("Received shutdown signal: SIGINT");
    Ok("SIGINT")
}
