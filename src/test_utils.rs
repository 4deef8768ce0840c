//! Test utilities shared by the gateway's unit tests
//!
//! Provides a recording [`MockPlatform`], plan builders relative to "now",
//! and small helpers for driving data channels over real TCP sockets.

use bytes::Bytes;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::bridge::ConnectionBridge;
use crate::codec::FrameCodec;
use crate::platform::{PlanStream, PlatformClient};
use crate::types::{Plan, TelemetryRequest};
use crate::{GatewayError, Result};

/// Upper bound for anything a test waits on.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Install a test-friendly tracing subscriber (respects `RUST_LOG`).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Await `future`, panicking with `what` if it takes longer than [`TEST_TIMEOUT`].
pub async fn within<F: Future>(what: &str, future: F) -> F::Output {
    tokio::time::timeout(TEST_TIMEOUT, future)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
}

/// Plan whose AOS is `aos_in` from now and which lasts `duration`.
pub fn plan_starting_in(id: &str, aos_in: Duration, duration: Duration) -> Plan {
    let aos = SystemTime::now() + aos_in;
    Plan::new(id, aos, aos + duration).with_downlink_frequency(437_500_000)
}

/// Plan whose AOS was `ago` and whose LOS is `remaining` from now.
pub fn plan_started_ago(id: &str, ago: Duration, remaining: Duration) -> Plan {
    let now = SystemTime::now();
    Plan::new(id, now - ago, now + remaining).with_downlink_frequency(437_500_000)
}

pub async fn connect(addr: SocketAddr) -> TcpStream {
    within("connect", TcpStream::connect(addr)).await.expect("connect to data channel")
}

pub async fn send_frames<I>(stream: &mut TcpStream, frames: I)
where
    I: IntoIterator,
    I::Item: AsRef<[u8]>,
{
    let codec = FrameCodec::new();
    for frame in frames {
        codec.write_frame(stream, frame.as_ref()).await.expect("write frame");
    }
}

/// Wait until `bridge` has registered `count` open connections.
pub async fn wait_for_connections(bridge: &ConnectionBridge, count: usize) {
    within("connections", async {
        while bridge.connection_count() != count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
}

/// Everything the mock platform observed, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformEvent {
    Opened { plan_id: String, at: Instant },
    OpenFailed { plan_id: String },
    Sent {
        plan_id: String,
        request: TelemetryRequest,
        at: Instant,
    },
    SendFailed { plan_id: String },
    Closed { plan_id: String },
}

impl PlatformEvent {
    pub fn plan_id(&self) -> &str {
        match self {
            PlatformEvent::Opened { plan_id, .. }
            | PlatformEvent::OpenFailed { plan_id }
            | PlatformEvent::Sent { plan_id, .. }
            | PlatformEvent::SendFailed { plan_id }
            | PlatformEvent::Closed { plan_id } => plan_id,
        }
    }
}

/// Platform client that records every call as a [`PlatformEvent`].
pub struct MockPlatform {
    events: mpsc::UnboundedSender<PlatformEvent>,
    failing_opens: AtomicUsize,
    fail_sends: Arc<AtomicBool>,
    plans: Mutex<Vec<Plan>>,
    commands: Mutex<Option<mpsc::UnboundedReceiver<Bytes>>>,
}

impl MockPlatform {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<PlatformEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let platform = Arc::new(Self {
            events,
            failing_opens: AtomicUsize::new(0),
            fail_sends: Arc::new(AtomicBool::new(false)),
            plans: Mutex::new(Vec::new()),
            commands: Mutex::new(None),
        });
        (platform, rx)
    }

    /// Make the next `count` calls to `open_stream` fail.
    pub fn fail_next_opens(&self, count: usize) {
        self.failing_opens.store(count, Ordering::SeqCst);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn set_plans(&self, plans: Vec<Plan>) {
        *self.plans.lock().expect("plans lock") = plans;
    }

    /// Sender whose payloads the next opened stream yields as commands.
    pub fn command_feed(&self) -> mpsc::UnboundedSender<Bytes> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.commands.lock().expect("commands lock") = Some(rx);
        tx
    }
}

#[async_trait::async_trait]
impl PlatformClient for MockPlatform {
    async fn open_stream(&self, plan: &Plan) -> Result<Box<dyn PlanStream>> {
        let plan_id = plan.plan_id.clone();
        let fail = self
            .failing_opens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        if fail {
            let _ = self.events.send(PlatformEvent::OpenFailed {
                plan_id: plan_id.clone(),
            });
            return Err(GatewayError::stream_open(plan_id, "mock refused stream"));
        }

        let _ = self.events.send(PlatformEvent::Opened {
            plan_id: plan_id.clone(),
            at: Instant::now(),
        });
        Ok(Box::new(MockStream {
            plan_id,
            events: self.events.clone(),
            fail_sends: Arc::clone(&self.fail_sends),
            commands: self.commands.lock().expect("commands lock").take(),
        }))
    }

    async fn list_plans(&self, _start: SystemTime, _end: SystemTime) -> Result<Vec<Plan>> {
        Ok(self.plans.lock().expect("plans lock").clone())
    }
}

struct MockStream {
    plan_id: String,
    events: mpsc::UnboundedSender<PlatformEvent>,
    fail_sends: Arc<AtomicBool>,
    commands: Option<mpsc::UnboundedReceiver<Bytes>>,
}

#[async_trait::async_trait]
impl PlanStream for MockStream {
    async fn send(&mut self, request: TelemetryRequest) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            let _ = self.events.send(PlatformEvent::SendFailed {
                plan_id: self.plan_id.clone(),
            });
            return Err(GatewayError::stream_send(&self.plan_id, "mock send failure"));
        }
        let _ = self.events.send(PlatformEvent::Sent {
            plan_id: self.plan_id.clone(),
            request,
            at: Instant::now(),
        });
        Ok(())
    }

    async fn next_command(&mut self) -> Result<Option<Bytes>> {
        match self.commands.as_mut() {
            Some(commands) => Ok(commands.recv().await),
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        let _ = self.events.send(PlatformEvent::Closed {
            plan_id: self.plan_id.clone(),
        });
        Ok(())
    }
}

/// Next platform event, panicking after [`TEST_TIMEOUT`].
pub async fn next_event(events: &mut mpsc::UnboundedReceiver<PlatformEvent>) -> PlatformEvent {
    within("platform event", events.recv()).await.expect("platform event channel closed")
}

/// Every event already recorded, without waiting.
pub fn drain_events(events: &mut mpsc::UnboundedReceiver<PlatformEvent>) -> Vec<PlatformEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}
