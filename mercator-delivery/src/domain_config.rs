//! Per-domain delivery configuration
//!
//! Allows customizing delivery behavior for specific recipient domains:
//! - MX server override for testing
//! - TLS requirements for compliance
//! - Connection limits for performance tuning
//! - Rate limiting to avoid blacklisting

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Configuration for a specific domain
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DomainConfig {
    /// Override MX server lookup with a specific host:port
    ///
    /// Use for testing to route messages to a local SMTP server:
    /// ```ron
    /// domains: {
    ///     "test.example.com": (
    ///         mx_override: "localhost:1025",
    ///     ),
    /// }
    /// ```
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mx_override: Option<String>,

    /// Require TLS for delivery to this domain
    ///
    /// Delivery will fail if TLS cannot be negotiated.
    #[serde(default)]
    pub require_tls: bool,

    /// Maximum concurrent connections to this domain
    ///
    /// Prevents overwhelming recipient servers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<usize>,

    /// Rate limit (messages per minute) for this domain
    ///
    /// Prevents being flagged as spam or hitting recipient quotas.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<u32>,

    /// Accept invalid/self-signed TLS certificates from this domain's mail servers
    ///
    /// Overrides the global setting when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accept_invalid_certs: Option<bool>,
}

impl DomainConfig {
    /// Check if this domain has an MX override configured
    #[must_use]
    pub const fn has_mx_override(&self) -> bool {
        self.mx_override.is_some()
    }

    /// Get the MX override server address if configured
    #[must_use]
    pub fn mx_override_address(&self) -> Option<&str> {
        self.mx_override.as_deref()
    }
}

/// Registry of per-domain configurations
///
/// Backed by a lock-free concurrent map so the control interface can update
/// overrides at runtime without taking `&mut` through the delivery processor.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct DomainConfigRegistry {
    domains: DashMap<String, DomainConfig>,
}

impl DomainConfigRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            domains: DashMap::new(),
        }
    }

    /// Get configuration for a specific domain
    ///
    /// Returns `None` if no configuration exists, in which case default behavior applies.
    #[must_use]
    pub fn get(&self, domain: &str) -> Option<DomainConfig> {
        self.domains.get(domain).map(|entry| entry.value().clone())
    }

    /// Add or update configuration for a domain
    pub fn insert(&self, domain: String, config: DomainConfig) {
        self.domains.insert(domain, config);
    }

    /// Check if a domain has any custom configuration
    #[must_use]
    pub fn has_config(&self, domain: &str) -> bool {
        self.domains.contains_key(domain)
    }

    /// Get the number of configured domains
    #[must_use]
    pub fn len(&self) -> usize {
        self.domains.len()
    }

    /// Check if the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// Iterate over every configured domain and its configuration
    pub fn iter(&self) -> impl Iterator<Item = (String, DomainConfig)> + '_ {
        self.domains
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
    }
}
