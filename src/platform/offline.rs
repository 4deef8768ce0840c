//! Offline platform client backed by a schedule file

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::SystemTime;
use tracing::{debug, info};

use super::{PlanStream, PlatformClient};
use crate::config;
use crate::types::{Plan, TelemetryRequest};
use crate::Result;

/// Schedule file contents: a list of plans.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
#[serde(default)]
pub struct Schedule {
    pub plans: Vec<Plan>,
}

/// Platform client that serves plans from memory and logs telemetry.
///
/// Useful for bench testing ground equipment: passes run exactly as they
/// would against the real platform, but telemetry only reaches the log.
#[derive(Debug, Clone, Default)]
pub struct OfflinePlatform {
    plans: Vec<Plan>,
}

impl OfflinePlatform {
    pub fn new(plans: Vec<Plan>) -> Self {
        Self { plans }
    }

    /// Load plans from a `.yaml`, `.yml` or `.json` schedule file.
    pub fn from_schedule_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let schedule: Schedule = config::load_document(path)?;
        info!("Loaded {} plans from {}", schedule.plans.len(), path.display());
        Ok(Self::new(schedule.plans))
    }

    pub fn plans(&self) -> &[Plan] {
        &self.plans
    }
}

#[async_trait::async_trait]
impl PlatformClient for OfflinePlatform {
    async fn open_stream(&self, plan: &Plan) -> Result<Box<dyn PlanStream>> {
        Ok(Box::new(LoggingStream {
            plan_id: plan.plan_id.clone(),
            requests: 0,
            bytes: 0,
        }))
    }

    async fn list_plans(&self, start: SystemTime, end: SystemTime) -> Result<Vec<Plan>> {
        // Plans with unusable timestamps are passed through so the gateway
        // rejects and logs them.
        Ok(self
            .plans
            .iter()
            .filter(|plan| match plan.window() {
                Ok(window) => window.los >= start && window.aos <= end,
                Err(_) => true,
            })
            .cloned()
            .collect())
    }
}

struct LoggingStream {
    plan_id: String,
    requests: u64,
    bytes: u64,
}

#[async_trait::async_trait]
impl PlanStream for LoggingStream {
    async fn send(&mut self, request: TelemetryRequest) -> Result<()> {
        self.requests += 1;
        self.bytes += request.len() as u64;
        info!(
            plan_id = %request.plan_id,
            framing = %request.telemetry.framing,
            bytes = request.len(),
            downlink_hz = request.telemetry.downlink_frequency_hz,
            "Telemetry received"
        );
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        debug!(
            plan_id = %self.plan_id,
            requests = self.requests,
            bytes = self.bytes,
            "Offline stream closed"
        );
        Ok(())
    }
}
