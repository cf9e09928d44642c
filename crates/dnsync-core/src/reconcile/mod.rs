//! IP reconciliation loop
//!
//! The ReconciliationScheduler keeps every configured A record pointing at
//! the current public IP:
//! - Fetching the current IP via IpObserver
//! - Comparing it against the last published IP in StateStore
//! - Upserting every A record via DnsPublisher when they differ
//! - Persisting the new IP only when every upsert of the tick succeeded
//!
//! ## Tick Flow
//!
//! ```text
//! ┌─────────────┐  fetch   ┌──────────────────────┐  get/set  ┌─────────────┐
//! │ IpObserver  │────────▶│ ReconciliationSched.  │◀────────▶│ StateStore  │
//! └─────────────┘          └──────────────────────┘           └─────────────┘
//!                                     │ upsert (A) × N
//!                                     ▼
//!                            ┌──────────────┐
//!                            │ DnsPublisher │
//!                            └──────────────┘
//! ```
//!
//! ## Failure Handling
//!
//! - Fetch failure: logged, no state change, sleep
//! - Any upsert failure: stored IP left untouched, so the next tick retries
//!   the whole batch rather than only the failed records
//! - The interval is fixed: no backoff after errors

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::DomainRecord;
use crate::error::Result;
use crate::traits::{DnsPublisher, IpObserver, RecordUpsert, StateStore};

/// What a single tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The IP lookup failed; nothing else happened
    FetchFailed {
        error: String,
    },

    /// The fetched IP equals the stored IP; no upserts
    Unchanged {
        ip: String,
    },

    /// Every record was published and the new IP persisted
    Published {
        ip: String,
        records: usize,
    },

    /// At least one upsert failed; the stored IP was left as it was
    PartiallyFailed {
        ip: String,
        succeeded: usize,
        failed: usize,
    },

    /// Every record was published but persisting the IP failed
    PersistFailed {
        ip: String,
        error: String,
    },
}

impl TickOutcome {
    /// Whether the stored IP now equals the observed IP
    pub fn is_converged(&self) -> bool {
        matches!(self, TickOutcome::Unchanged { .. } | TickOutcome::Published { .. })
    }
}

/// The long-lived IP reconciliation task
///
/// This task is the only writer of the observed-IP key.
pub struct ReconciliationScheduler {
    /// Public IP lookup
    observer: Arc<dyn IpObserver>,

    /// DNS provider for the A records
    publisher: Arc<dyn DnsPublisher>,

    /// Where the last published IP is kept
    store: Arc<dyn StateStore>,

    /// Records to keep pointing at the current IP
    domains: Vec<DomainRecord>,

    /// Key of the observed IP
    ip_key: String,

    /// Fixed sleep between ticks
    interval: Duration,
}

impl ReconciliationScheduler {
    /// Create a new scheduler
    pub fn new(
        observer: Arc<dyn IpObserver>,
        publisher: Arc<dyn DnsPublisher>,
        store: Arc<dyn StateStore>,
        domains: Vec<DomainRecord>,
        ip_key: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            observer,
            publisher,
            store,
            domains,
            ip_key: ip_key.into(),
            interval,
        }
    }

    /// Run ticks until `cancel` fires
    ///
    /// Tick errors never end the loop. The only way out is cancellation,
    /// which interrupts the sleep between ticks; an in-flight tick is allowed
    /// to finish so a batch is never abandoned halfway through persisting.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        info!(
            records = self.domains.len(),
            interval_secs = self.interval.as_secs(),
            "Reconciliation loop started"
        );

        loop {
            let outcome = self.tick().await;
            debug!(?outcome, "Tick finished");

            debug!("Sleeping for {:?}", self.interval);
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Reconciliation loop stopped");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    /// Perform a single reconciliation pass
    pub async fn tick(&self) -> TickOutcome {
        let fetched = match self.observer.fetch().await {
            Ok(ip) => ip,
            Err(e) => {
                error!(observer = self.observer.observer_name(), "IP lookup failed: {}", e);
                return TickOutcome::FetchFailed {
                    error: e.to_string(),
                };
            }
        };

        // Never-observed reads as "", which no real address equals
        let stored = match self.store.get(&self.ip_key).await {
            Ok(value) => value.unwrap_or_default(),
            Err(e) => {
                warn!("Could not read stored IP, treating as absent: {}", e);
                String::new()
            }
        };

        info!(public_ip = %fetched, stored_ip = %stored, "IP check");

        if fetched == stored {
            debug!("IP has not changed");
            return TickOutcome::Unchanged { ip: fetched };
        }

        info!(
            "IP changed to {}, updating {} A record(s)",
            fetched,
            self.domains.len()
        );

        let mut succeeded = 0;
        let mut failed = 0;
        for domain in &self.domains {
            let record = RecordUpsert::a_record(&domain.zone_id, &domain.record_name, &fetched);
            match self.publisher.upsert(&record).await {
                Ok(()) => {
                    debug!(zone = %domain.zone_id, record = %domain.record_name, "A record published");
                    succeeded += 1;
                }
                Err(e) => {
                    error!(
                        zone = %domain.zone_id,
                        record = %domain.record_name,
                        provider = self.publisher.provider_name(),
                        "A record update failed: {}",
                        e
                    );
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            warn!(
                succeeded,
                failed, "Not all records updated; stored IP kept so the next tick retries all"
            );
            return TickOutcome::PartiallyFailed {
                ip: fetched,
                succeeded,
                failed,
            };
        }

        if let Err(e) = self.store.set(&self.ip_key, &fetched).await {
            error!("Records updated but storing IP failed: {}", e);
            return TickOutcome::PersistFailed {
                ip: fetched,
                error: e.to_string(),
            };
        }

        info!(ip = %fetched, "All records updated, IP stored");
        TickOutcome::Published {
            ip: fetched,
            records: succeeded,
        }
    }
}
