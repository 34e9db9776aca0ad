//! SMTP session state for finite state machine.
//!
//! This module defines the `SessionState` struct which contains only
//! the protocol state needed by the SMTP FSM for pure state transitions.
//! This is separate from the business context (validation, metadata, etc.)
//! to enable clean separation of concerns.

use mercator_common::{context::Context, envelope::Envelope};
use serde::{Deserialize, Serialize};

/// SMTP session state for the finite state machine.
///
/// This struct contains only the protocol state required for FSM transitions:
/// - Client identifier (EHLO/HELO)
/// - ESMTP mode flag
/// - Mail envelope (sender, recipients, parameters)
///
/// This is intentionally separate from business logic context (validation
/// results, metadata, capabilities, etc.) to enable pure FSM transitions
/// without side effects.
///
/// # Design Rationale
///
/// By separating protocol state from business state, we achieve:
/// - Pure state transitions (no hidden side effects)
/// - Testable FSM in isolation
/// - Clear separation of concerns
/// - Proper implementation of the `FiniteStateMachine` trait
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    /// Client identifier from EHLO/HELO command
    pub id: String,

    /// Extended SMTP mode (ESMTP)
    ///
    /// `true` if client sent EHLO (extended SMTP), `false` for HELO (basic SMTP)
    pub extended: bool,

    /// Mail envelope containing transaction state
    ///
    /// Includes:
    /// - Sender address (MAIL FROM)
    /// - Recipient addresses (RCPT TO)
    /// - MAIL FROM parameters (SIZE, BODY, etc.)
    /// - RCPT TO parameters (NOTIFY, ORCPT, etc.)
    pub envelope: Envelope,
}

impl SessionState {
    /// Creates a new session state with default values
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: String::new(),
            extended: false,
            envelope: Envelope::default(),
        }
    }

    /// Creates a session state with a specific client ID and ESMTP mode
    #[must_use]
    pub fn with_id(id: String, extended: bool) -> Self {
        Self {
            id,
            extended,
            envelope: Envelope::default(),
        }
    }

    /// Resets the mail transaction state while preserving session state
    ///
    /// Clears the envelope (sender, recipients, parameters) and any
    /// transaction-specific metadata, but keeps the client ID and
    /// ESMTP mode flag. Used when handling RSET command.
    pub fn reset_transaction(&mut self) {
        self.envelope = Envelope::default();
    }

    /// Returns a reference to the client identifier
    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns whether extended SMTP (ESMTP) is enabled
    #[inline]
    #[must_use]
    pub const fn is_extended(&self) -> bool {
        self.extended
    }

    /// Returns a reference to the mail envelope
    #[inline]
    #[must_use]
    pub const fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// Returns a mutable reference to the mail envelope
    #[inline]
    pub const fn envelope_mut(&mut self) -> &mut Envelope {
        &mut self.envelope
    }

    /// Extracts session state from a business context
    ///
    /// Creates a `SessionState` by copying protocol-level fields from a
    /// business `Context`. This enables FSM transitions to work with pure
    /// protocol state while the business logic maintains the full context.
    #[must_use]
    pub fn from_context(ctx: &Context) -> Self {
        Self {
            id: ctx.id.clone(),
            extended: ctx.extended,
            envelope: ctx.envelope.clone(),
        }
    }

    /// Synchronizes session state back to business context
    ///
    /// Updates the protocol-level fields in a business `Context` from this
    /// `SessionState`. This is used after FSM transitions to ensure the
    /// business context reflects the new protocol state.
    pub fn sync_to_context(&self, ctx: &mut Context) {
        ctx.id.clone_from(&self.id);
        ctx.extended = self.extended;
        ctx.envelope.clone_from(&self.envelope);
    }
}
