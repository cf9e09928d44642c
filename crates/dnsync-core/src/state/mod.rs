// # State Store Implementations
//
// This module provides implementations of the StateStore trait and the
// key derivation shared by the tasks that write to it.

pub mod file;
pub mod memory;

pub use file::FileStateStore;
pub use memory::MemoryStateStore;

/// Turn a domain name into a filesystem-safe token
///
/// `*` becomes `wildcard` and `.` becomes `_`, so `*.example.com` maps to
/// `wildcard_example_com`.
pub fn sanitize_domain(domain: &str) -> String {
    domain.replace('*', "wildcard").replace('.', "_")
}

/// Key of a domain's persisted certificate identifier
pub fn certificate_key(prefix: &str, domain: &str, suffix: &str) -> String {
    format!("{}{}{}", prefix, sanitize_domain(domain), suffix)
}
