use std::net::SocketAddr;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use mercator_common::{
    Signal, internal,
    traits::protocol::{Protocol, SessionHandler},
    tracing,
};
use mercator_tracing::traced;

#[allow(
    clippy::unsafe_derive_deserialize,
    reason = "The unsafe aspects have nothing to do with the struct"
)]
#[derive(Deserialize, Serialize)]
pub struct Listener<Proto: Protocol> {
    #[serde(skip)]
    handler: Proto,
    socket: SocketAddr,
    #[serde(flatten)]
    args: Proto::Args,
    #[serde(skip_serializing, default)]
    context: Proto::Context,
}

impl<Proto: Protocol> Listener<Proto> {
    /// Validates and normalizes this listener's configuration before it is served.
    ///
    /// # Errors
    /// Returns an error if `Proto::validate` rejects the configured arguments
    /// (e.g. a referenced TLS certificate or key file does not exist).
    pub fn init(&mut self) -> anyhow::Result<()> {
        self.handler.validate(&mut self.args)?;
        Ok(())
    }

    /// Applies `f` to this listener's arguments, e.g. to inject a shared spool handle.
    pub fn map_args(&mut self, f: impl FnOnce(Proto::Args) -> Proto::Args) {
        self.args = f(std::mem::take(&mut self.args));
    }

    #[traced(instrument(level = tracing::Level::TRACE, skip_all, err))]
    pub async fn serve(
        &self,
        mut shutdown: tokio::sync::broadcast::Receiver<Signal>,
    ) -> anyhow::Result<()> {
        internal!("Serving {:?} with {:?}", self.socket, self.context);
        let mut sessions = Vec::default();

        let (address, port) = (self.socket.ip(), self.socket.port());
        let listener = TcpListener::bind(self.socket).await?;

        loop {
            tokio::select! {
                sig = shutdown.recv() => {
                    if matches!(sig, Ok(Signal::Shutdown)) {
                        internal!(level = INFO, "{} Listener {}:{} Received Shutdown signal, finishing sessions ...", Proto::ty(), address, port);
                        join_all(sessions).await;
                        break;
                    }
                }

                connection = listener.accept() => {
                    tracing::debug!("Connection received on {}", self.socket);
                    let (stream, address) = connection?;
                    let handler = self.handler.handle(stream, address, self.context.clone(), self.args.clone());
                    let shutdown = shutdown.resubscribe();
                    sessions.push(tokio::spawn(async move {
                        if let Err(err) = handler.run(shutdown).await {
                            internal!(level = ERROR, "Error: {err}");
                        }
                    }));
                }
            }
        }

        Ok(())
    }
}

impl<Proto: Protocol> Default for Listener<Proto> {
    fn default() -> Self {
        Self {
            handler: Proto::default(),
            socket: SocketAddr::from(([0, 0, 0, 0], 0)),
            args: Proto::Args::default(),
            context: Proto::Context::default(),
        }
    }
}

impl<Proto: Protocol> From<SocketAddr> for Listener<Proto> {
    fn from(socket: SocketAddr) -> Self {
        Self {
            socket,
            ..Self::default()
        }
    }
}
