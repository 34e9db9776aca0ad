//! Delivery queue and processor for handling outbound mail from the spool
//!
//! This crate turns spooled messages into outbound SMTP deliveries:
//! - `scan` discovers newly spooled messages and groups recipients by domain
//! - `queue` tracks per-message delivery state (status, attempt history, retry timing)
//! - `dns`/`smtp_transaction` resolve MX records and speak the outbound SMTP transaction
//! - `policy` applies per-domain retry/rate-limit/circuit-breaker decisions
//! - `dsn` generates bounce messages for permanently failed deliveries

#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

pub mod circuit_breaker;
pub mod dns;
pub mod domain_config;
pub mod dsn;
pub mod error;
pub mod policy;
pub mod processor;
pub mod queue;
pub mod rate_limiter;
pub mod service;
pub mod smtp_transaction;
pub mod types;

pub use dns::{DnsCacheStats, DnsError, DnsResolver};
pub use domain_config::DomainConfigRegistry;
pub use error::{DeliveryError, PermanentError, SystemError, TemporaryError};
pub use mercator_common::{DeliveryAttempt, DeliveryStatus};
pub use processor::DeliveryProcessor;
pub use queue::DeliveryQueue;
pub use service::DeliveryQueryService;
pub use types::{DeliveryInfo, SmtpTimeouts};
