//! Connection bridge: one TCP listener per data channel
//!
//! The bridge accepts ground equipment connections and frames their bytes.
//! Pass sessions do not touch sockets; they bind to the bridge through a
//! [`BridgePort`] and receive or send whole frames.
//!
//! ```text
//!  ground equipment ──TCP──► inbound loop ──► InboundBinding ──► pass session
//!  ground equipment ◄─TCP─── outbound loop ◄── OutboundBinding ◄── pass session
//! ```

mod binding;
mod connection;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

pub use binding::{INBOUND_QUEUE_DEPTH, InboundBinding, OUTBOUND_QUEUE_DEPTH, OutboundBinding};

use crate::codec::FrameCodec;
use crate::{GatewayError, Result};
use binding::Bindings;

/// How long a single accept attempt may block before cancellation is rechecked.
pub const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// TCP listener for one data channel and the connections it accepted.
pub struct ConnectionBridge {
    bindings: Arc<Bindings>,
    local_addr: SocketAddr,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl ConnectionBridge {
    /// Bind `address` and start accepting connections.
    ///
    /// The bridge stops when `parent` is cancelled or [`stop`](Self::stop) is
    /// called. A bind failure is returned as [`GatewayError::Bind`].
    pub async fn bind(
        channel: impl Into<Arc<str>>,
        address: &str,
        codec: FrameCodec,
        parent: &CancellationToken,
    ) -> Result<Self> {
        let channel = channel.into();
        let listener = TcpListener::bind(address).await.map_err(|source| GatewayError::Bind {
            channel: channel.to_string(),
            address: address.to_string(),
            source,
        })?;
        let local_addr = listener.local_addr()?;

        let bindings = Arc::new(Bindings::new(Arc::clone(&channel)));
        let cancel = parent.child_token();
        let tracker = TaskTracker::new();

        tracker.spawn(accept_loop(
            listener,
            Arc::clone(&bindings),
            codec,
            tracker.clone(),
            cancel.clone(),
        ));

        info!(channel = %channel, %local_addr, "Listening for connections");

        Ok(Self {
            bindings,
            local_addr,
            cancel,
            tracker,
        })
    }

    pub fn channel(&self) -> &str {
        self.bindings.channel()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of currently open connections.
    pub fn connection_count(&self) -> usize {
        self.bindings.connection_count()
    }

    /// Handle through which pass sessions bind to this bridge.
    pub fn port(&self) -> BridgePort {
        BridgePort {
            bindings: Arc::clone(&self.bindings),
        }
    }

    /// Stop accepting and close every connection. Safe to call repeatedly.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            debug!(channel = %self.channel(), "Stopping bridge");
        }
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait until the bridge has stopped and every connection loop has exited.
    pub async fn wait(&self) {
        self.cancel.cancelled().await;
        self.tracker.close();
        self.tracker.wait().await;
    }
}

impl Drop for ConnectionBridge {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Cloneable binding interface of a [`ConnectionBridge`].
#[derive(Clone)]
pub struct BridgePort {
    bindings: Arc<Bindings>,
}

impl BridgePort {
    pub fn channel(&self) -> &str {
        self.bindings.channel()
    }

    /// Become the receiver of frames from ground equipment.
    pub fn bind_inbound(&self, owner: &str) -> InboundBinding {
        self.bindings.bind_inbound(owner)
    }

    /// Become the producer of frames for ground equipment.
    pub fn bind_outbound(&self, owner: &str) -> OutboundBinding {
        self.bindings.bind_outbound(owner)
    }
}

async fn accept_loop(
    listener: TcpListener,
    bindings: Arc<Bindings>,
    codec: FrameCodec,
    tracker: TaskTracker,
    cancel: CancellationToken,
) {
    let channel = Arc::clone(bindings.channel());

    // Each accept is bounded so cancellation is observed within one interval.
    while !cancel.is_cancelled() {
        let accepted = match tokio::time::timeout(ACCEPT_POLL_INTERVAL, listener.accept()).await {
            Err(_elapsed) => continue,
            Ok(accepted) => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                let id = bindings.next_id();
                tracker.spawn(connection::serve(
                    stream,
                    peer,
                    id,
                    Arc::clone(&bindings),
                    codec,
                    tracker.clone(),
                    cancel.child_token(),
                ));
            }
            Err(e) => {
                warn!(channel = %channel, "Error accepting connection: {}", e);
                tokio::time::sleep(ACCEPT_POLL_INTERVAL).await;
            }
        }
    }

    drop(listener);
    info!(channel = %channel, "Listener closed");
}

#[cfg(test)]
mod tests;
