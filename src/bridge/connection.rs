//! Per-connection serving loops

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use super::binding::{Bindings, ConnectionId};
use crate::codec::FrameCodec;

/// Serve one accepted connection until the peer leaves, an I/O or framing
/// error occurs, or `cancel` fires.
///
/// The outbound loop runs as its own task on `tracker`; the inbound loop runs
/// on the calling task. Whichever ends first cancels the other.
pub(crate) async fn serve(
    stream: TcpStream,
    peer: SocketAddr,
    id: ConnectionId,
    bindings: Arc<Bindings>,
    codec: FrameCodec,
    tracker: TaskTracker,
    cancel: CancellationToken,
) {
    let channel = Arc::clone(bindings.channel());
    info!(channel = %channel, %peer, "Connection opened");

    if let Err(e) = stream.set_nodelay(true) {
        debug!(channel = %channel, %peer, "Couldn't set TCP_NODELAY: {}", e);
    }

    let (read_half, write_half) = stream.into_split();
    let outbound = bindings.register_connection(id);

    let outbound_cancel = cancel.clone();
    let outbound_channel = Arc::clone(&channel);
    let outbound_task = tracker.spawn(async move {
        outbound_loop(
            FramedWrite::new(write_half, codec),
            outbound,
            &outbound_channel,
            peer,
            &outbound_cancel,
        )
        .await;
        outbound_cancel.cancel();
    });

    inbound_loop(FramedRead::new(read_half, codec), &bindings, peer, &cancel).await;
    cancel.cancel();

    bindings.unregister_connection(id);
    let _ = outbound_task.await;
    info!(channel = %channel, %peer, "Connection closed");
}

async fn inbound_loop(
    mut frames: FramedRead<OwnedReadHalf, FrameCodec>,
    bindings: &Bindings,
    peer: SocketAddr,
    cancel: &CancellationToken,
) {
    let channel = bindings.channel();
    let mut received = 0u64;

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(channel = %channel, %peer, "Inbound loop cancelled");
                break;
            }
            next = frames.next() => next,
        };

        let payload = match next {
            Some(Ok(payload)) => payload,
            Some(Err(e)) => {
                warn!(channel = %channel, %peer, "Connection error: {}", e);
                break;
            }
            None => {
                debug!(channel = %channel, %peer, "Peer closed connection");
                break;
            }
        };

        received += 1;
        trace!(channel = %channel, %peer, bytes = payload.len(), "Frame {} received", received);

        // Frames arriving while no pass is bound are outside any pass window.
        let Some(tx) = bindings.inbound_sender() else {
            trace!(channel = %channel, %peer, "No pass bound, frame discarded");
            continue;
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            delivered = tx.send(payload) => {
                if delivered.is_err() {
                    trace!(
                        channel = %channel,
                        %peer,
                        "Pass unbound during delivery, frame discarded"
                    );
                }
            }
        }
    }

    debug!(channel = %channel, %peer, "Inbound loop ended after {} frames", received);
}

async fn outbound_loop(
    mut sink: FramedWrite<OwnedWriteHalf, FrameCodec>,
    mut queue: mpsc::Receiver<Bytes>,
    channel: &str,
    peer: SocketAddr,
    cancel: &CancellationToken,
) {
    loop {
        let payload = tokio::select! {
            _ = cancel.cancelled() => break,
            payload = queue.recv() => match payload {
                Some(payload) => payload,
                None => break,
            },
        };

        let len = payload.len();
        let written = tokio::select! {
            _ = cancel.cancelled() => break,
            written = sink.send(payload) => written,
        };

        if let Err(e) = written {
            warn!(channel, %peer, "Connection error: {}", e);
            break;
        }
        trace!(channel, %peer, bytes = len, "Frame sent to ground");
    }
}
