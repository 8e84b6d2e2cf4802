//! # bazaar_core
//!
//! Core domain logic for Bazaar: identity and token services, cached
//! authorization data, the todo use cases, persistence behind a
//! Unit-of-Work, notifications and background jobs.

pub mod auth;
pub mod authz;
pub mod cache;
pub mod error;
pub mod events;
pub mod jobs;
pub mod lock;
pub mod migrate;
pub mod models;
pub mod notifications;
pub mod seed;
pub mod store;
pub mod todos;
pub mod uuid;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
