use futures_util::future::join_all;
use mercator_common::{Signal, internal, traits::protocol::Protocol, tracing};
use mercator_tracing::traced;
use serde::Deserialize;
use tokio::sync::broadcast::Receiver;

use crate::listener::Listener;

#[derive(Default, Deserialize)]
pub struct Controller<Proto: Protocol> {
    #[serde(alias = "listener")]
    listeners: Vec<Listener<Proto>>,
}

impl<Proto: Protocol> Controller<Proto> {
    /// Validates and normalizes every listener's configuration.
    ///
    /// # Errors
    /// Returns an error if any listener's `Proto::validate` rejects its arguments.
    pub fn init(&mut self) -> anyhow::Result<()> {
        internal!("Initialising Controller for {}", Proto::ty());

        self.listeners.iter_mut().try_for_each(Listener::init)
    }

    /// Applies `f` to every listener's arguments, e.g. to inject a shared spool handle.
    pub fn map_args(&mut self, f: impl Fn(Proto::Args) -> Proto::Args) {
        self.listeners
            .iter_mut()
            .for_each(|listener| listener.map_args(&f));
    }

    #[traced(instrument(level = tracing::Level::TRACE, skip(self, signals)), timing(precision = "s"))]
    pub async fn control(self, signals: Vec<Receiver<Signal>>) -> anyhow::Result<()> {
        join_all(
            self.listeners
                .iter()
                .map(|listener| listener.serve(signals[0].resubscribe())),
        )
        .await
        .into_iter()
        .try_for_each(|result| result)
    }
}
