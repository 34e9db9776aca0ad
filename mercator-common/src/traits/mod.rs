pub mod controller;
pub mod fsm;
pub mod protocol;

pub use self::{controller::Controller, fsm::FiniteStateMachine, protocol::Protocol};
