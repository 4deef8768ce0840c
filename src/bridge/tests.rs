//! Bridge tests over real loopback sockets

use super::*;
use crate::test_utils::{connect, init_tracing, send_frames, wait_for_connections, within};
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;

async fn bridge() -> ConnectionBridge {
    init_tracing();
    ConnectionBridge::bind("test", "127.0.0.1:0", FrameCodec::new(), &CancellationToken::new())
        .await
        .expect("bind loopback")
}

#[tokio::test]
async fn frames_reach_the_inbound_binding_in_order() {
    let bridge = bridge().await;
    let mut inbound = bridge.port().bind_inbound("plan-1");
    let mut client = connect(bridge.local_addr()).await;

    send_frames(&mut client, &[&b"f1"[..], &b""[..], &b"f3"[..]]).await;

    assert_eq!(within("f1", inbound.recv()).await, Some(Bytes::from_static(b"f1")));
    assert_eq!(within("empty", inbound.recv()).await, Some(Bytes::new()));
    assert_eq!(within("f3", inbound.recv()).await, Some(Bytes::from_static(b"f3")));
}

#[tokio::test]
async fn frames_without_a_binding_are_discarded() {
    let bridge = bridge().await;
    let mut client = connect(bridge.local_addr()).await;
    wait_for_connections(&bridge, 1).await;

    send_frames(&mut client, &[b"before-aos"]).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut inbound = bridge.port().bind_inbound("plan-1");
    send_frames(&mut client, &[b"during-pass"]).await;

    assert_eq!(within("frame", inbound.recv()).await, Some(Bytes::from_static(b"during-pass")));
}

#[tokio::test]
async fn partial_frame_closes_only_that_connection() {
    let bridge = bridge().await;
    let mut inbound = bridge.port().bind_inbound("plan-1");

    let mut broken = connect(bridge.local_addr()).await;
    broken.write_all(&10u32.to_le_bytes()).await.expect("prefix");
    broken.write_all(b"abc").await.expect("partial payload");
    broken.shutdown().await.expect("half close");

    // The bridge tears the connection down, which the client sees as EOF.
    let mut buf = [0u8; 16];
    let read = within("server close", broken.read(&mut buf)).await.expect("read");
    assert_eq!(read, 0);

    let mut healthy = connect(bridge.local_addr()).await;
    send_frames(&mut healthy, &[b"ok"]).await;
    assert_eq!(within("frame", inbound.recv()).await, Some(Bytes::from_static(b"ok")));
}

#[tokio::test]
async fn newer_inbound_binding_takes_over_until_released() {
    let bridge = bridge().await;
    let port = bridge.port();
    let mut first = port.bind_inbound("plan-1");
    let mut second = port.bind_inbound("plan-2");
    let mut client = connect(bridge.local_addr()).await;

    send_frames(&mut client, &[b"frame"]).await;
    assert_eq!(within("frame", second.recv()).await, Some(Bytes::from_static(b"frame")));
    assert!(!first.is_current());

    drop(second);
    assert!(first.is_current());
    send_frames(&mut client, &[b"after"]).await;
    assert_eq!(within("after", first.recv()).await, Some(Bytes::from_static(b"after")));
}

#[tokio::test]
async fn outbound_frames_reach_ground_equipment() {
    let bridge = bridge().await;
    let mut a = connect(bridge.local_addr()).await;
    let mut b = connect(bridge.local_addr()).await;
    wait_for_connections(&bridge, 2).await;

    let outbound = bridge.port().bind_outbound("plan-1");
    assert_eq!(outbound.send(Bytes::from_static(b"cmd")).expect("bound"), 2);

    let codec = FrameCodec::new();
    for client in [&mut a, &mut b] {
        let frame = within("command", codec.read_frame(client)).await.expect("read");
        assert_eq!(frame, Some(Bytes::from_static(b"cmd")));
    }
}

#[tokio::test]
async fn closed_connections_are_unregistered() {
    let bridge = bridge().await;
    let client = connect(bridge.local_addr()).await;
    wait_for_connections(&bridge, 1).await;

    drop(client);
    wait_for_connections(&bridge, 0).await;
}

#[tokio::test]
async fn stop_closes_listener_and_connections() {
    let bridge = bridge().await;
    let addr = bridge.local_addr();
    let mut client = connect(addr).await;
    wait_for_connections(&bridge, 1).await;

    let started = Instant::now();
    bridge.stop();
    bridge.stop();
    within("bridge wait", bridge.wait()).await;

    assert!(bridge.is_stopped());
    assert!(started.elapsed() < ACCEPT_POLL_INTERVAL * 10);
    assert_eq!(bridge.connection_count(), 0);

    let frame = within("client eof", FrameCodec::new().read_frame(&mut client)).await;
    assert!(matches!(frame, Ok(None)));
    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn parent_cancellation_stops_the_bridge() {
    init_tracing();
    let parent = CancellationToken::new();
    let bridge = ConnectionBridge::bind("child", "127.0.0.1:0", FrameCodec::new(), &parent)
        .await
        .expect("bind loopback");

    parent.cancel();
    within("bridge wait", bridge.wait()).await;
    assert!(bridge.is_stopped());
}

#[tokio::test]
async fn bind_conflict_is_reported() {
    let first = bridge().await;
    let address = first.local_addr().to_string();

    let result = ConnectionBridge::bind(
        "second",
        &address,
        FrameCodec::new(),
        &CancellationToken::new(),
    )
    .await;

    match result {
        Err(error @ GatewayError::Bind { .. }) => {
            assert!(error.is_fatal());
            assert!(error.to_string().contains("second"));
        }
        Err(other) => panic!("Expected Bind error, got {other:?}"),
        Ok(_) => panic!("Expected Bind error, got a second listener"),
    }
}
