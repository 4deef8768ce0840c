//! Core types shared by every layer of the gateway.
//!
//! - [`FramingKind`] tags telemetry with its physical-layer encoding
//! - [`Plan`] describes a scheduled pass, [`PassWindow`] its validated AOS/LOS
//! - [`Timestamp`] is the platform's wall-clock representation
//! - [`TelemetryRequest`] is what a pass session sends on the platform stream

mod framing;
mod plan;
mod telemetry;

pub use framing::FramingKind;
pub use plan::{PassWindow, Plan, Timestamp};
pub use telemetry::{Telemetry, TelemetryRequest};
