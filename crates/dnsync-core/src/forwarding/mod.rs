//! Reverse-proxy forwarding rules
//!
//! One run-to-completion task per domain that declares a forwarding port,
//! spawned only when a proxy controller is configured. The task logs in
//! (with a bounded, fixed-backoff retry), then creates the forwarding host
//! unless one already serves the domain name.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::traits::{AuthToken, ForwardingRule, ProxyController};

/// What a forwarding task did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardingOutcome {
    /// A host already served the domain; nothing was created
    AlreadyPresent,
    /// A new host was created
    Created,
}

/// Authenticate, retrying up to `attempts` times with a fixed `backoff`
///
/// The sleep between attempts is cancellable. The last error is returned
/// once attempts are exhausted.
pub async fn authenticate_with_retry(
    controller: &dyn ProxyController,
    attempts: u32,
    backoff: Duration,
    cancel: &CancellationToken,
) -> Result<AuthToken> {
    let attempts = attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match controller.authenticate().await {
            Ok(token) => {
                debug!(attempt, controller = controller.controller_name(), "Authenticated");
                return Ok(token);
            }
            Err(e) => {
                warn!(
                    attempt,
                    attempts,
                    controller = controller.controller_name(),
                    "Authentication failed: {}",
                    e
                );
                last_error = Some(e);
            }
        }

        if attempt < attempts {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(Error::cancelled("proxy authentication"));
                }
                _ = tokio::time::sleep(backoff) => {}
            }
        }
    }

    Err(last_error.unwrap_or_else(|| Error::network("proxy authentication failed")))
}

/// Ensures a single forwarding rule exists on the controller
pub struct ForwardingTask {
    controller: Arc<dyn ProxyController>,
    rule: ForwardingRule,
    auth_attempts: u32,
    auth_backoff: Duration,
}

impl ForwardingTask {
    pub fn new(
        controller: Arc<dyn ProxyController>,
        rule: ForwardingRule,
        auth_attempts: u32,
        auth_backoff: Duration,
    ) -> Self {
        Self {
            controller,
            rule,
            auth_attempts,
            auth_backoff,
        }
    }

    /// The rule this task ensures
    pub fn rule(&self) -> &ForwardingRule {
        &self.rule
    }

    /// Create the host if no existing host lists this domain name
    pub async fn run(self, cancel: CancellationToken) -> Result<ForwardingOutcome> {
        let domain = &self.rule.domain_name;
        info!(
            domain = %domain,
            forward_host = %self.rule.forward_host,
            forward_port = self.rule.forward_port,
            "Ensuring forwarding rule"
        );

        let token = authenticate_with_retry(
            self.controller.as_ref(),
            self.auth_attempts,
            self.auth_backoff,
            &cancel,
        )
        .await?;

        let hosts = self.controller.list_hosts(&token).await?;
        if hosts.iter().any(|h| h.serves(domain)) {
            info!(domain = %domain, "Forwarding rule already present");
            return Ok(ForwardingOutcome::AlreadyPresent);
        }

        self.controller.create_host(&token, &self.rule).await?;
        info!(domain = %domain, tls = self.rule.tls, "Forwarding rule created");
        Ok(ForwardingOutcome::Created)
    }
}
