//! Pass session: one plan on one data channel, from AOS to LOS
//!
//! A session sleeps until AOS, opens the platform stream, then relays frames
//! between the data channel and the stream until LOS or cancellation. The
//! stream is opened at most once and always closed once opened.

mod state;

use bytes::Bytes;
use std::pin::Pin;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Sleep, sleep_until};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace, warn};

pub use state::{EndReason, PassReport, PassState, PassStats};

use crate::Result;
use crate::bridge::{BridgePort, OutboundBinding};
use crate::platform::{PlanStream, PlatformClient};
use crate::types::{FramingKind, PassWindow, Plan};

/// A validated pass waiting to be run.
pub struct PassSession {
    channel: Arc<str>,
    plan: Arc<Plan>,
    window: PassWindow,
    framing: FramingKind,
    client: Arc<dyn PlatformClient>,
    port: BridgePort,
    cancel: CancellationToken,
    state: watch::Sender<PassState>,
}

impl PassSession {
    /// Prepare a session for `plan` on the data channel behind `port`.
    ///
    /// Fails with [`GatewayError::InvalidPlan`](crate::GatewayError::InvalidPlan)
    /// when the plan has no usable AOS/LOS window. `cancel` ends the session
    /// from any state.
    pub fn new(
        plan: Arc<Plan>,
        framing: FramingKind,
        client: Arc<dyn PlatformClient>,
        port: BridgePort,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let window = plan.window()?;
        let channel = Arc::from(port.channel());
        let (state, _) = watch::channel(PassState::Scheduled);
        Ok(Self {
            channel,
            plan,
            window,
            framing,
            client,
            port,
            cancel,
            state,
        })
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn window(&self) -> PassWindow {
        self.window
    }

    /// Run the session as a task on `tracker`.
    pub fn spawn_on(self, tracker: &TaskTracker) -> PassHandle {
        let plan_id = self.plan.plan_id.clone();
        let channel = Arc::clone(&self.channel);
        let state = self.state.subscribe();
        let cancel = self.cancel.clone();
        let join = tracker.spawn(self.run());
        PassHandle {
            plan_id,
            channel,
            state,
            cancel,
            join,
        }
    }

    /// Run the session to completion on the current task.
    pub async fn run(self) -> PassReport {
        let plan_id = self.plan.plan_id.clone();
        let (aos, los) = self.window.deadlines();
        let mut stats = PassStats::default();

        info!(channel = %self.channel, plan_id = %plan_id, "Plan started: {}", self.plan);
        self.publish(PassState::WaitingForAos);

        let reason = self.drive(aos, los, &mut stats).await;
        self.publish(PassState::Ended(reason));

        info!(
            channel = %self.channel,
            plan_id = %plan_id,
            reason = %reason,
            frames = stats.frames_sent,
            bytes = stats.bytes_sent,
            send_failures = stats.send_failures,
            "Plan ended"
        );

        PassReport {
            channel: self.channel.to_string(),
            plan_id,
            reason,
            stats,
        }
    }

    fn publish(&self, state: PassState) {
        debug!(channel = %self.channel, plan_id = %self.plan.plan_id, %state, "Pass state changed");
        self.state.send_replace(state);
    }

    async fn drive(&self, aos: Instant, los: Instant, stats: &mut PassStats) -> EndReason {
        let plan_id = self.plan.plan_id.as_str();

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return EndReason::Cancelled,
            _ = sleep_until(aos) => {}
        }
        info!(channel = %self.channel, plan_id, "AOS");

        let opened = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return EndReason::Cancelled,
            opened = self.client.open_stream(&self.plan) => opened,
        };
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                error!(
                    channel = %self.channel,
                    plan_id,
                    "Couldn't open stream, skipping pass: {}", e
                );
                return EndReason::StreamOpenFailed;
            }
        };
        info!(channel = %self.channel, plan_id, "Stream opened");

        let reason = self.relay(stream.as_mut(), los, stats).await;
        if reason == EndReason::Los {
            info!(channel = %self.channel, plan_id, "LOS");
        }

        if let Err(e) = stream.close().await {
            warn!(channel = %self.channel, plan_id, "Error closing stream: {}", e);
        }
        reason
    }

    async fn relay(
        &self,
        stream: &mut dyn PlanStream,
        los: Instant,
        stats: &mut PassStats,
    ) -> EndReason {
        let plan_id = self.plan.plan_id.as_str();
        let owner = format!("plan {plan_id}");
        let mut inbound = self.port.bind_inbound(&owner);
        let outbound = self.port.bind_outbound(&owner);
        self.publish(PassState::Active);

        let los_timer = sleep_until(los);
        tokio::pin!(los_timer);
        let mut inbound_open = true;
        let mut commands_open = true;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return EndReason::Cancelled,
                _ = &mut los_timer => return EndReason::Los,
                frame = inbound.recv(), if inbound_open => match frame {
                    Some(data) => {
                        stats.frames_received += 1;
                        let timer = los_timer.as_mut();
                        if let Some(reason) = self.forward(stream, data, timer, stats).await {
                            return reason;
                        }
                    }
                    None => {
                        warn!(
                            channel = %self.channel,
                            plan_id,
                            "Inbound binding closed, no more frames"
                        );
                        inbound_open = false;
                    }
                },
                command = stream.next_command(), if commands_open => match command {
                    Ok(Some(payload)) => self.deliver_command(&outbound, payload, stats),
                    Ok(None) => {
                        debug!(
                            channel = %self.channel,
                            plan_id,
                            "Platform closed the command side"
                        );
                        commands_open = false;
                    }
                    Err(e) => {
                        warn!(channel = %self.channel, plan_id, "Error receiving command: {}", e);
                        commands_open = false;
                    }
                },
            }
        }
    }

    /// Send one frame as telemetry. Returns the end reason if the pass ended
    /// while the send was in flight.
    async fn forward(
        &self,
        stream: &mut dyn PlanStream,
        data: Bytes,
        mut los_timer: Pin<&mut Sleep>,
        stats: &mut PassStats,
    ) -> Option<EndReason> {
        let plan_id = self.plan.plan_id.as_str();
        let received = SystemTime::now();
        let request = self
            .client
            .telemetry_request(&self.plan, self.framing, data, received, received);
        let len = request.len() as u64;

        let sent = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Some(EndReason::Cancelled),
            _ = &mut los_timer => return Some(EndReason::Los),
            sent = stream.send(request) => sent,
        };

        match sent {
            Ok(()) => {
                stats.frames_sent += 1;
                stats.bytes_sent += len;
                trace!(channel = %self.channel, plan_id, bytes = len, "Telemetry sent");
            }
            Err(e) => {
                stats.send_failures += 1;
                warn!(channel = %self.channel, plan_id, "Error sending telemetry: {}", e);
            }
        }
        None
    }

    fn deliver_command(&self, outbound: &OutboundBinding, payload: Bytes, stats: &mut PassStats) {
        let plan_id = self.plan.plan_id.as_str();
        match outbound.send(payload) {
            Ok(0) => {
                stats.commands_dropped += 1;
                warn!(channel = %self.channel, plan_id, "No ground connection, command dropped");
            }
            Ok(connections) => {
                stats.commands_forwarded += 1;
                trace!(channel = %self.channel, plan_id, connections, "Command queued");
            }
            Err(e) => {
                stats.commands_dropped += 1;
                warn!(channel = %self.channel, plan_id, "Command dropped: {}", e);
            }
        }
    }
}

/// Handle to a running pass session.
pub struct PassHandle {
    plan_id: String,
    channel: Arc<str>,
    state: watch::Receiver<PassState>,
    cancel: CancellationToken,
    join: JoinHandle<PassReport>,
}

impl PassHandle {
    pub fn plan_id(&self) -> &str {
        &self.plan_id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Current state.
    pub fn state(&self) -> PassState {
        *self.state.borrow()
    }

    /// Stream of state transitions, starting with the current state.
    ///
    /// Intermediate states may be skipped if the consumer falls behind; the
    /// final `Ended` state is always observed.
    pub fn state_updates(&self) -> WatchStream<PassState> {
        WatchStream::new(self.state.clone())
    }

    /// Wait until the state satisfies `predicate`.
    ///
    /// Returns `None` if the session finished without ever satisfying it.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&PassState) -> bool,
    ) -> Option<PassState> {
        let mut state = self.state.clone();
        state.wait_for(|s| predicate(s)).await.ok().map(|s| *s)
    }

    /// End the session from whatever state it is in.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the session to finish.
    ///
    /// Returns `None` only if the session task panicked or was aborted.
    pub async fn wait(self) -> Option<PassReport> {
        match self.join.await {
            Ok(report) => Some(report),
            Err(e) => {
                error!(
                    channel = %self.channel,
                    plan_id = %self.plan_id,
                    "Pass session task failed: {}", e
                );
                None
            }
        }
    }
}

impl std::fmt::Debug for PassHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassHandle")
            .field("channel", &self.channel)
            .field("plan_id", &self.plan_id)
            .field("state", &self.state())
            .finish()
    }
}
