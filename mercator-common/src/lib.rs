pub mod address;
pub mod audit;
pub mod config;
pub mod context;
pub mod delivery;
pub mod domain;
pub mod envelope;
pub mod error;
pub mod logging;
pub mod message;
pub mod mime;
pub mod status;
pub mod traits;

pub use context::Context;
pub use delivery::{DeliveryAttempt, DeliveryContext, DeliveryStatus};
pub use domain::Domain;
pub use tracing;

#[derive(Debug, Clone, Copy)]
pub enum Signal {
    Shutdown,
    Finalised,
}
