//! Top-level process wiring: owns every subsystem and runs them to completion.

use std::sync::{Arc, LazyLock};

use mercator_common::{Signal, internal, logging, tracing};
use mercator_control::ControlServer;
use mercator_delivery::DeliveryProcessor;
use mercator_health::{HealthChecker, HealthConfig, HealthServer};
use mercator_metrics::MetricsConfig;
use mercator_smtp::{Controller as SmtpController, Smtp};
use mercator_spool::SpoolConfig;
use mercator_tracing::traced;
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::control_handler::MercatorControlHandler;

/// Control socket configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ControlConfig {
    /// Enable or disable the control socket.
    #[serde(default = "default_control_enabled")]
    pub enabled: bool,
    /// Path of the Unix domain socket.
    #[serde(default = "default_control_socket")]
    pub socket_path: String,
}

const fn default_control_enabled() -> bool {
    true
}

fn default_control_socket() -> String {
    mercator_control::DEFAULT_CONTROL_SOCKET.to_string()
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            enabled: default_control_enabled(),
            socket_path: default_control_socket(),
        }
    }
}

/// Top-level configuration and runtime state for a Mercator MTA instance.
#[allow(
    clippy::unsafe_derive_deserialize,
    reason = "The unsafe aspects have nothing to do with the struct"
)]
#[derive(Default, Deserialize)]
pub struct Mercator {
    #[serde(alias = "smtp")]
    smtp_controller: SmtpController<Smtp>,
    #[serde(alias = "spool")]
    spool: SpoolConfig,
    #[serde(alias = "delivery", default)]
    delivery: DeliveryProcessor,
    #[serde(alias = "control", default)]
    control: ControlConfig,
    #[serde(alias = "health", default)]
    health: HealthConfig,
    #[serde(alias = "metrics", default)]
    metrics: MetricsConfig,
}

/// Global shutdown broadcast, subscribed to by every long-running subsystem.
pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

#[traced(instrument(level = tracing::Level::TRACE))]
async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!("CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!("Terminate signal received, shutting down");
        }
    };

    let mut receiver = SHUTDOWN_BROADCAST.subscribe();

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    loop {
        tokio::select! {
            sig = receiver.recv() => {
                match sig {
                    Ok(s) => tracing::debug!("Received {s:?}"),
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(e) => tracing::debug!("Received: {e:?}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    Ok(())
}

impl Mercator {
    /// Run this controller, and everything it controls.
    ///
    /// # Errors
    ///
    /// Returns an error if any subsystem fails to initialise, or if a
    /// subsystem exits with an error while running.
    #[traced(instrument(level = tracing::Level::TRACE, skip_all, err), timing(precision = "s"))]
    pub async fn run(mut self) -> anyhow::Result<()> {
        logging::init();

        internal!("Controller running");

        let spool_type = self.spool.into_spool()?;
        let backing_store = spool_type.backing_store();

        self.smtp_controller
            .map_args(|args| args.with_spool(backing_store.clone()));
        self.smtp_controller.init()?;

        self.delivery.init(backing_store, None)?;
        let delivery = Arc::new(self.delivery);

        let health_checker = Arc::new(HealthChecker::new(self.health.max_queue_size));
        health_checker.set_smtp_ready(true);
        health_checker.set_spool_ready(true);
        health_checker.set_delivery_ready(true);
        health_checker.set_dns_ready(delivery.dns_resolver().is_some());

        if self.metrics.enabled
            && let Err(e) = mercator_metrics::init_metrics(&self.metrics)
        {
            tracing::warn!(error = %e, "Failed to initialise metrics, continuing without them");
        }

        let control_handler = Arc::new(MercatorControlHandler::new(delivery.clone()));
        let control_server = self
            .control
            .enabled
            .then(|| ControlServer::new(self.control.socket_path.clone(), control_handler))
            .transpose()?;

        let health_server = if self.health.enabled {
            Some(HealthServer::new(self.health.clone(), health_checker).await?)
        } else {
            None
        };

        let ret = tokio::select! {
            r = self.smtp_controller.control(vec![SHUTDOWN_BROADCAST.subscribe()]) => {
                r
            }
            r = spool_type.serve(SHUTDOWN_BROADCAST.subscribe()) => {
                r.map_err(anyhow::Error::from)
            }
            r = Arc::clone(&delivery).serve(SHUTDOWN_BROADCAST.subscribe()) => {
                r.map_err(anyhow::Error::from)
            }
            r = Self::serve_control(control_server, SHUTDOWN_BROADCAST.subscribe()) => {
                r
            }
            r = Self::serve_health(health_server, SHUTDOWN_BROADCAST.subscribe()) => {
                r
            }
            r = shutdown() => {
                r
            }
        };

        internal!("Shutting down...");

        ret
    }

    async fn serve_control(
        server: Option<ControlServer>,
        shutdown: broadcast::Receiver<Signal>,
    ) -> anyhow::Result<()> {
        match server {
            Some(server) => server.serve(shutdown).await.map_err(anyhow::Error::from),
            None => {
                let mut rx = shutdown;
                let _ = rx.recv().await;
                Ok(())
            }
        }
    }

    async fn serve_health(
        server: Option<HealthServer>,
        shutdown: broadcast::Receiver<Signal>,
    ) -> anyhow::Result<()> {
        match server {
            Some(server) => server.serve(shutdown).await.map_err(anyhow::Error::from),
            None => {
                let mut rx = shutdown;
                let _ = rx.recv().await;
                Ok(())
            }
        }
    }
}
