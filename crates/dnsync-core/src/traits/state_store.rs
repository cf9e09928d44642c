// # State Store Trait
//
// Durable key → opaque string storage.
//
// ## Keys
//
// One key per tracked resource:
// - the last successfully published IP (written only by the reconciliation loop)
// - one certificate identifier per TLS domain (written only by that domain's orchestrator)
//
// Keys are disjoint between writers, so implementations need no cross-key
// coordination beyond being safe to call from several tasks.
//
// ## Usage
//
// ```rust,ignore
// use dnsync_core::StateStore;
//
// let last_ip = store.get("last_ip.txt").await?.unwrap_or_default();
// store.set("last_ip.txt", "1.2.3.4").await?;
// ```

use async_trait::async_trait;

/// Trait for state store implementations
///
/// # Contract
///
/// - `get` returns `Ok(None)` for a key that was never written. Only real
///   I/O failures (permissions, unreadable data) are errors.
/// - `set` must be durable: a `get` after a crash returns the written value.
///   A failed write is reported, never dropped.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read the value stored under `key`
    async fn get(&self, key: &str) -> Result<Option<String>, crate::Error>;

    /// Store `value` under `key`, replacing any previous value
    async fn set(&self, key: &str, value: &str) -> Result<(), crate::Error>;
}
