//! Restriction-chain policy evaluation, run at each SMTP command boundary.
//!
//! Modeled on Postfix's `smtpd_recipient_restrictions`/`smtpd_check.c`: a
//! session carries an ordered list of [`Restriction`]s per event, evaluated
//! in order until one of them returns [`Verdict::Permit`] or
//! [`Verdict::Reject`]; [`Verdict::Dunno`] falls through to the next
//! restriction, and an empty or exhausted chain defaults to permit.

use mercator_common::{context::Context, status::Status};
use serde::{Deserialize, Serialize};

/// Point in the SMTP transaction a restriction chain is evaluated at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Connect,
    Ehlo,
    MailFrom,
    RcptTo,
    Data,
}

/// The result of evaluating a single restriction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Stop evaluating the chain and accept the command.
    Permit,
    /// Stop evaluating the chain and reject the command with this response.
    Reject(Status, &'static str),
    /// Express no opinion; fall through to the next restriction.
    Dunno,
}

/// A single named restriction in a Postfix-style access control chain.
///
/// Each variant corresponds to a `smtpd_check.c` restriction of the same
/// name. Restrictions that need external state (client IP allowlists,
/// access maps) read it from `Context::metadata`, populated by the
/// connection/session layer before the chain runs.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub enum Restriction {
    /// Accept unconditionally if the client's address is in `mynetworks`.
    PermitMynetworks,
    /// Reject if the client has no PTR record or the PTR doesn't resolve back.
    RejectUnknownClient,
    /// Reject if the client's HELO/EHLO hostname isn't a valid hostname.
    RejectInvalidHostname,
    /// Reject if the HELO/EHLO hostname isn't a fully-qualified domain name.
    RejectNonFqdnHeloHostname,
    /// Reject if the sender address isn't a fully-qualified domain name.
    RejectNonFqdnSender,
    /// Reject if the recipient address isn't a fully-qualified domain name.
    RejectNonFqdnRecipient,
    /// Reject if the sender's domain has no resolvable MX/A record.
    RejectUnknownSenderDomain,
    /// Reject if the recipient's domain has no resolvable MX/A record.
    RejectUnknownRecipientDomain,
    /// Reject relaying to a destination that isn't local or explicitly trusted.
    RejectUnauthDestination,
    /// Reject recipients sent ahead of their MAIL FROM/RCPT TO response (pipelining abuse).
    RejectUnauthPipelining,
    /// Look up the client address, HELO hostname, sender, or recipient against a named map.
    CheckClientAccess(String),
    /// Accept unconditionally.
    PermitAll,
}

impl Restriction {
    /// Evaluate this restriction against the current transaction context.
    ///
    /// This is intentionally conservative: restrictions that depend on data
    /// this layer doesn't have yet (DNS, access maps) return [`Verdict::Dunno`]
    /// rather than guessing, deferring the decision to a later restriction or
    /// to the chain's default permit.
    #[must_use]
    pub fn evaluate(&self, context: &Context) -> Verdict {
        match self {
            Self::PermitMynetworks => {
                if context.metadata.get("client_in_mynetworks").map(String::as_str) == Some("true")
                {
                    Verdict::Permit
                } else {
                    Verdict::Dunno
                }
            }
            Self::RejectUnknownClient => {
                if context.metadata.get("client_ptr").map(String::as_str) == Some("missing") {
                    Verdict::Reject(Status::Error, "Client host rejected: cannot find your hostname")
                } else {
                    Verdict::Dunno
                }
            }
            Self::RejectInvalidHostname | Self::RejectNonFqdnHeloHostname => {
                if context.id().is_empty() {
                    Verdict::Reject(Status::Error, "Helo command rejected: need fully-qualified hostname")
                } else {
                    Verdict::Dunno
                }
            }
            Self::RejectNonFqdnSender => {
                if context.sender().is_empty() || !context.sender().contains('.') {
                    Verdict::Reject(Status::Error, "Sender address rejected: need fully-qualified address")
                } else {
                    Verdict::Dunno
                }
            }
            Self::RejectNonFqdnRecipient => {
                if context.recipients().iter().any(|r| !r.contains('.')) {
                    Verdict::Reject(
                        Status::Error,
                        "Recipient address rejected: need fully-qualified address",
                    )
                } else {
                    Verdict::Dunno
                }
            }
            Self::RejectUnknownSenderDomain | Self::RejectUnknownRecipientDomain => Verdict::Dunno,
            Self::RejectUnauthDestination => {
                if context.metadata.get("relay_authorized").map(String::as_str) == Some("false") {
                    Verdict::Reject(Status::Error, "Relay access denied")
                } else {
                    Verdict::Dunno
                }
            }
            Self::RejectUnauthPipelining => Verdict::Dunno,
            Self::CheckClientAccess(_) => Verdict::Dunno,
            Self::PermitAll => Verdict::Permit,
        }
    }
}

/// An ordered chain of restrictions evaluated per stage.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PolicyChain {
    #[serde(default)]
    pub connect: Vec<Restriction>,
    #[serde(default)]
    pub ehlo: Vec<Restriction>,
    #[serde(default)]
    pub mail_from: Vec<Restriction>,
    #[serde(default)]
    pub rcpt_to: Vec<Restriction>,
    #[serde(default)]
    pub data: Vec<Restriction>,
}

impl PolicyChain {
    fn restrictions(&self, stage: Stage) -> &[Restriction] {
        match stage {
            Stage::Connect => &self.connect,
            Stage::Ehlo => &self.ehlo,
            Stage::MailFrom => &self.mail_from,
            Stage::RcptTo => &self.rcpt_to,
            Stage::Data => &self.data,
        }
    }

    /// Evaluate the chain for `stage`, setting `context.response` and
    /// returning `false` if a restriction rejects. An empty chain, or one
    /// whose restrictions all return [`Verdict::Dunno`], permits by default.
    pub fn evaluate(&self, stage: Stage, context: &mut Context) -> bool {
        for restriction in self.restrictions(stage) {
            match restriction.evaluate(context) {
                Verdict::Permit => return true,
                Verdict::Reject(status, message) => {
                    context.response = Some((status, std::borrow::Cow::Borrowed(message)));
                    return false;
                }
                Verdict::Dunno => {}
            }
        }

        true
    }
}
