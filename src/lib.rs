//! gamegate: a rate-limited, cache-aside client for third-party game-data APIs
//!
//! The [`Gateway`] wires together the pieces: a dual-bucket
//! [`RateLimiter`](client::RateLimiter), a rotating
//! [`CredentialPool`](client::CredentialPool), a [`CacheStore`](cache::CacheStore)
//! and the [`FetchCoordinator`](fetch::FetchCoordinator) that drives them. The
//! [`DedupLedger`](ledger::DedupLedger) serves background consumers that must
//! process each item once.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod fetch;
pub mod gateway;
pub mod ledger;

pub use config::Config;
pub use error::{Error, Result, UpstreamError, UpstreamErrorKind};
pub use gateway::Gateway;
