//! Per-message context carried through an SMTP transaction, the spool, and delivery.

use std::{borrow::Cow, sync::Arc};

use ahash::AHashMap;

use crate::{delivery::DeliveryContext, envelope::Envelope, status::Status};

/// State accumulated for a single message as it moves from an SMTP session
/// through the spool and into delivery.
///
/// `metadata` carries free-form key/value annotations (e.g. TLS cipher, received
/// protocol) that don't warrant their own field but are useful for tracing and DSNs.
///
/// Not `Serialize`/`Deserialize`: `envelope` holds `mailparse` address types that don't
/// round-trip through serde. The file-backed spool serializes the fields it needs
/// directly (see `mercator_spool::backends::file`) rather than deriving on this type.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Identifier for this message (session-scoped HELO/EHLO id, or queue id once spooled).
    pub id: String,
    /// Sender and recipients for this transaction.
    pub envelope: Envelope,
    /// The raw message data, once received.
    pub data: Option<Arc<[u8]>>,
    /// Response text to send for the final `.` of `DATA`, if overridden by policy.
    pub data_response: Option<String>,
    /// A status/message pair that overrides the session's default response for
    /// the current command, set by policy evaluation.
    pub response: Option<(Status, Cow<'static, str>)>,
    /// Tracking id assigned once the message is written to the spool (a `SpooledMessageId`).
    pub tracking_id: Option<String>,
    /// Whether EHLO (as opposed to HELO) was used for this session.
    pub extended: bool,
    /// Free-form session metadata (TLS cipher/protocol, client address, etc).
    pub metadata: AHashMap<Cow<'static, str>, String>,
    /// Delivery progress, once the message has been picked up by the delivery
    /// processor. Persisted so a restart resumes rather than starts over.
    pub delivery: Option<DeliveryContext>,
    /// The session's greeting banner, copied in so FFI/policy hooks can read
    /// it without a handle back to the session.
    pub banner: Arc<str>,
    /// Maximum message size (bytes) in effect for this session, or `0` for unlimited.
    pub max_message_size: usize,
    /// Extensions advertised to the client for this session, rendered as their
    /// EHLO capability strings (e.g. `"STARTTLS"`, `"SIZE 100000000"`).
    pub capabilities: Vec<String>,
}

impl Context {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn message(&self) -> String {
        self.data.as_deref().map_or_else(Default::default, |data| {
            std::str::from_utf8(data).map_or_else(|_| format!("{data:#?}"), str::to_string)
        })
    }

    #[must_use]
    pub fn sender(&self) -> String {
        self.envelope
            .sender()
            .map(|addr| match addr {
                mailparse::MailAddr::Group(group) => group.to_string(),
                mailparse::MailAddr::Single(single) => single.to_string(),
            })
            .unwrap_or_default()
    }

    #[must_use]
    pub fn recipients(&self) -> Vec<String> {
        self.envelope.recipients().map_or_else(Vec::new, |addrs| {
            addrs
                .iter()
                .map(|addr| match addr {
                    mailparse::MailAddr::Group(group) => {
                        format!("RCPT TO:{}", group.group_name)
                    }
                    mailparse::MailAddr::Single(single) => {
                        format!(
                            "RCPT TO:{}{}",
                            single.display_name.clone().unwrap_or_default(),
                            single.addr
                        )
                    }
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_id() {
        let context = Context {
            id: String::from("Testing"),
            ..Default::default()
        };

        assert_eq!(context.id(), "Testing");
    }

    #[test]
    fn test_recipients() {
        let mut context = Context::default();

        let mut recipients = mailparse::addrparse("test@gmail.com").unwrap();
        recipients.extend_from_slice(&mailparse::addrparse("test@test.com").unwrap()[..]);
        *context.envelope.recipients_mut() = Some(recipients);

        let rendered = context.recipients();
        assert_eq!(rendered.len(), 2);
        assert_eq!(rendered[0], "RCPT TO:test@gmail.com");
        assert_eq!(rendered[1], "RCPT TO:test@test.com");
    }

    #[test]
    fn test_set_sender() {
        let mut context = Context {
            id: String::from("Testing"),
            ..Default::default()
        };

        *context.envelope.sender_mut() = mailparse::addrparse("test@test.com")
            .unwrap()
            .first()
            .cloned();

        assert_eq!(context.sender(), "test@test.com");
    }

    #[test]
    fn test_data() {
        let data = b"Testing Data".to_vec();

        let context = Context {
            data: Some(Arc::from(data.clone())),
            ..Default::default()
        };

        assert_eq!(context.message(), "Testing Data");

        let context = Context {
            data: None,
            ..Default::default()
        };

        assert_eq!(context.message(), "");
    }

    #[test]
    fn test_metadata() {
        let mut context = Context::default();
        context
            .metadata
            .insert(Cow::Borrowed("test"), "true".to_string());

        assert_eq!(context.metadata.get("test").map(String::as_str), Some("true"));
        assert_eq!(context.metadata.get("missing"), None);
    }
}
