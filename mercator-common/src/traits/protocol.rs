use std::{fmt::Debug, net::SocketAddr};

use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;

use crate::{Signal, error::ProtocolError};

/// A session driven to completion by a [`Listener`](crate::traits::Protocol).
pub trait SessionHandler {
    type Error;

    fn run(
        self,
        shutdown: tokio::sync::broadcast::Receiver<Signal>,
    ) -> impl std::future::Future<Output = Result<(), Self::Error>> + Send;
}

/// A wire protocol a listener can accept connections for (SMTP, LMTP, ...).
pub trait Protocol: Default + Send + Sync {
    type Session: SessionHandler + Send + Sync + 'static;

    /// Per-connection state handed to every accepted session (e.g. `HELO` defaults).
    type Context: Default + Clone + Debug + Send + Sync + for<'a> Deserialize<'a>;

    /// Per-listener configuration, deserialized from the listener's config block.
    type Args: Default + Clone + Debug + Send + Sync + Serialize + for<'a> Deserialize<'a>;

    /// A short, human-readable name for this protocol, used in logs.
    fn ty() -> &'static str;

    /// Validates and normalizes this listener's configuration.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid (e.g. a referenced
    /// TLS certificate or key file does not exist).
    fn validate(&mut self, args: &mut Self::Args) -> Result<(), ProtocolError>;

    fn handle(
        &self,
        stream: TcpStream,
        address: SocketAddr,
        context: Self::Context,
        args: Self::Args,
    ) -> Self::Session;
}
