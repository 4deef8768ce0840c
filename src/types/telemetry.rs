//! Telemetry request sent to the platform

use bytes::Bytes;
use std::time::SystemTime;

use super::{FramingKind, Plan};

/// One payload received from ground equipment, with its reception metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Telemetry {
    pub data: Bytes,
    pub framing: FramingKind,
    pub time_first_byte_received: SystemTime,
    pub time_last_byte_received: SystemTime,
    pub downlink_frequency_hz: u64,
}

/// Stream message carrying [`Telemetry`] for a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRequest {
    pub plan_id: String,
    pub telemetry: Telemetry,
}

impl TelemetryRequest {
    /// Build a request for `plan`, taking the downlink frequency from the plan.
    pub fn new(
        plan: &Plan,
        framing: FramingKind,
        data: Bytes,
        first_byte: SystemTime,
        last_byte: SystemTime,
    ) -> Self {
        Self {
            plan_id: plan.plan_id.clone(),
            telemetry: Telemetry {
                data,
                framing,
                time_first_byte_received: first_byte,
                time_last_byte_received: last_byte,
                downlink_frequency_hz: plan.downlink_center_frequency_hz,
            },
        }
    }

    pub fn len(&self) -> usize {
        self.telemetry.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.telemetry.data.is_empty()
    }
}
