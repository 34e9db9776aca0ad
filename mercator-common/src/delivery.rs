//! Delivery outcome tracking shared between the delivery queue, the
//! processor, and DSN generation.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Where a message sits in the delivery queue's lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    /// Queued, not yet attempted (or ready for its next retry).
    Pending,
    /// A delivery attempt is currently in flight.
    InProgress,
    /// Delivered successfully; the message can be removed from the spool.
    Completed,
    /// Delivery failed permanently; no further attempts will be made.
    Failed(String),
    /// Delivery failed temporarily and is scheduled to be retried.
    Retry { attempts: u32, last_error: String },
    /// Exceeded its expiration window before being delivered.
    Expired,
}

/// Record of a single delivery attempt against one mail server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub timestamp: SystemTime,
    pub error: Option<String>,
    pub server: String,
}

/// Delivery progress persisted alongside a spooled message, so a restarted
/// delivery processor can resume a message where it left off instead of
/// restarting its retry schedule from scratch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryContext {
    pub status: DeliveryStatus,
    pub attempt_history: Vec<DeliveryAttempt>,
    pub domain: crate::Domain,
    pub current_server_index: usize,
    pub queued_at: SystemTime,
    pub next_retry_at: Option<SystemTime>,
}
