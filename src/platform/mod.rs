//! Platform client traits
//!
//! The gateway talks to the satellite operations platform only through these
//! two traits. A real deployment plugs in an RPC client; the crate ships
//! [`offline::OfflinePlatform`] for running without one.

use bytes::Bytes;
use std::time::SystemTime;

use crate::Result;
use crate::types::{FramingKind, Plan, TelemetryRequest};

pub mod offline;

pub use offline::OfflinePlatform;

/// Connection to the satellite operations platform.
///
/// Implementations are shared by every data channel and pass session, so
/// they must be cheap to call concurrently.
#[async_trait::async_trait]
pub trait PlatformClient: Send + Sync + 'static {
    /// Open the bidirectional telemetry/command stream for a plan.
    ///
    /// Called once per pass session, at AOS. A failure skips the pass.
    async fn open_stream(&self, plan: &Plan) -> Result<Box<dyn PlanStream>>;

    /// Build the telemetry request for one received payload.
    ///
    /// The default builds a plain [`TelemetryRequest`]; clients that need to
    /// attach routing metadata can override it.
    fn telemetry_request(
        &self,
        plan: &Plan,
        framing: FramingKind,
        data: Bytes,
        first_byte: SystemTime,
        last_byte: SystemTime,
    ) -> TelemetryRequest {
        TelemetryRequest::new(plan, framing, data, first_byte, last_byte)
    }

    /// List plans whose pass overlaps `[start, end]`.
    async fn list_plans(&self, start: SystemTime, end: SystemTime) -> Result<Vec<Plan>>;
}

/// Open stream for a single plan.
///
/// Owned exclusively by the pass session that opened it.
#[async_trait::async_trait]
pub trait PlanStream: Send {
    /// Send one telemetry request.
    async fn send(&mut self, request: TelemetryRequest) -> Result<()>;

    /// Wait for the next command payload destined for ground equipment.
    ///
    /// Returns:
    /// - `Ok(Some(bytes))` - command to forward to the data channel
    /// - `Ok(None)` - the platform will send no more commands
    /// - `Err(e)` - the command side failed
    ///
    /// The default never yields, for platforms without an uplink path.
    async fn next_command(&mut self) -> Result<Option<Bytes>> {
        std::future::pending().await
    }

    /// Close the stream. Called exactly once when the session ends.
    async fn close(&mut self) -> Result<()>;
}
