//! Supervisors: the gateway and its data channels
//!
//! ```text
//! GatewaySupervisor ──► DataChannelSupervisor ──► ConnectionBridge ──► connections
//!                                               └► PassSession (one per started plan)
//! ```
//!
//! Cancellation flows down this tree; `wait()` at any level returns once
//! everything below it has finished.

mod channel;
mod gateway;

pub use channel::DataChannelSupervisor;
pub use gateway::GatewaySupervisor;
