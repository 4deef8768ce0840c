//! Data channel supervisor: one bridge plus the pass sessions using it

use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

use crate::Result;
use crate::bridge::ConnectionBridge;
use crate::codec::FrameCodec;
use crate::config::DataChannelConfig;
use crate::platform::PlatformClient;
use crate::session::{PassHandle, PassSession};
use crate::types::Plan;

/// Owns the listener of one configured data channel and spawns a pass
/// session on it for every started plan.
pub struct DataChannelSupervisor {
    config: DataChannelConfig,
    client: Arc<dyn PlatformClient>,
    bridge: ConnectionBridge,
    cancel: CancellationToken,
    sessions: TaskTracker,
}

impl DataChannelSupervisor {
    /// Bind the channel's listener. Stops when `parent` is cancelled.
    pub async fn start(
        config: DataChannelConfig,
        client: Arc<dyn PlatformClient>,
        parent: &CancellationToken,
    ) -> Result<Self> {
        let cancel = parent.child_token();
        let bridge = ConnectionBridge::bind(
            config.name.as_str(),
            &config.address,
            FrameCodec::new(),
            &cancel,
        )
        .await?;

        info!(
            channel = %config.name,
            address = %bridge.local_addr(),
            framing = %config.framing,
            "Data channel started"
        );

        Ok(Self {
            config,
            client,
            bridge,
            cancel,
            sessions: TaskTracker::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &DataChannelConfig {
        &self.config
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.bridge.local_addr()
    }

    pub fn bridge(&self) -> &ConnectionBridge {
        &self.bridge
    }

    /// Spawn a pass session for `plan` without waiting for it.
    ///
    /// Returns `None` when the plan has no usable window or the channel has
    /// been stopped.
    pub fn plan_start(&self, plan: Arc<Plan>) -> Option<PassHandle> {
        if self.cancel.is_cancelled() {
            debug!(
                channel = %self.config.name,
                plan_id = %plan.plan_id,
                "Channel stopped, ignoring plan"
            );
            return None;
        }

        let session = PassSession::new(
            Arc::clone(&plan),
            self.config.framing,
            Arc::clone(&self.client),
            self.bridge.port(),
            self.cancel.child_token(),
        );

        match session {
            Ok(session) => Some(session.spawn_on(&self.sessions)),
            Err(e) => {
                error!(
                    channel = %self.config.name,
                    plan_id = %plan.plan_id,
                    "Rejecting plan: {}", e
                );
                None
            }
        }
    }

    /// LOS ends sessions on its own; this is only recorded.
    pub fn plan_end(&self, plan: &Plan) {
        debug!(channel = %self.config.name, plan_id = %plan.plan_id, "Plan end");
    }

    /// Pass sessions that have not finished yet.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Cancel every pass session and close the listener. Safe to call repeatedly.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            info!(channel = %self.config.name, "Stopping data channel");
        }
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait until the channel is stopped and its sessions and connections are gone.
    pub async fn wait(&self) {
        self.cancel.cancelled().await;
        self.sessions.close();
        self.sessions.wait().await;
        self.bridge.wait().await;
        debug!(channel = %self.config.name, "Data channel stopped");
    }
}

impl Drop for DataChannelSupervisor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
