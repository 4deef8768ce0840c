//! Gateway supervisor: every configured data channel, and shutdown

use futures::future::join_all;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::DataChannelSupervisor;
use crate::Result;
use crate::config::DataChannelConfig;
use crate::platform::PlatformClient;
use crate::session::PassHandle;
use crate::types::Plan;
use crate::watcher::PlanListener;

/// Root of the cancellation tree.
///
/// Broadcasts plan notifications to every data channel; each channel
/// reacts independently.
pub struct GatewaySupervisor {
    channels: Vec<DataChannelSupervisor>,
    cancel: CancellationToken,
}

impl GatewaySupervisor {
    /// Start every configured data channel concurrently.
    ///
    /// A channel that cannot bind is logged and skipped. Fails only when
    /// channels were configured and none of them started.
    pub async fn start(
        configs: &[DataChannelConfig],
        client: Arc<dyn PlatformClient>,
    ) -> Result<Self> {
        let cancel = CancellationToken::new();
        let started = join_all(configs.iter().map(|config| {
            DataChannelSupervisor::start(config.clone(), Arc::clone(&client), &cancel)
        }))
        .await;

        let mut channels = Vec::with_capacity(configs.len());
        let mut last_error = None;
        for (config, result) in configs.iter().zip(started) {
            match result {
                Ok(channel) => channels.push(channel),
                Err(e) => {
                    error!(channel = %config.name, "Data channel not started: {}", e);
                    last_error = Some(e);
                }
            }
        }

        if channels.is_empty() {
            match last_error {
                Some(e) => return Err(e),
                None => warn!("No data channels configured"),
            }
        }

        info!("Gateway started with {} of {} data channels", channels.len(), configs.len());
        Ok(Self { channels, cancel })
    }

    pub fn channels(&self) -> &[DataChannelSupervisor] {
        &self.channels
    }

    pub fn channel(&self, name: &str) -> Option<&DataChannelSupervisor> {
        self.channels.iter().find(|channel| channel.name() == name)
    }

    /// Start `plan` on every data channel. Returns the sessions that were spawned.
    pub fn plan_start(&self, plan: Plan) -> Vec<PassHandle> {
        info!(plan_id = %plan.plan_id, "Plan start: {}", plan);
        let plan = Arc::new(plan);
        self.channels.iter().filter_map(|channel| channel.plan_start(Arc::clone(&plan))).collect()
    }

    pub fn plan_end(&self, plan: &Plan) {
        info!(plan_id = %plan.plan_id, "Plan end");
        for channel in &self.channels {
            channel.plan_end(plan);
        }
    }

    /// Token whose cancellation stops the whole gateway.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            info!("Stopping gateway");
        }
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait until the gateway is stopped and every channel has shut down.
    pub async fn wait(&self) {
        self.cancel.cancelled().await;
        join_all(self.channels.iter().map(|channel| channel.wait())).await;
        info!("Gateway stopped");
    }
}

impl PlanListener for GatewaySupervisor {
    fn plan_start(&self, plan: Plan) {
        GatewaySupervisor::plan_start(self, plan);
    }

    fn plan_end(&self, plan: &Plan) {
        GatewaySupervisor::plan_end(self, plan);
    }
}

impl Drop for GatewaySupervisor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
