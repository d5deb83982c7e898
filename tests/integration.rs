//! Integration tests for shadelink.
//!
//! These drive a full client against the in-memory transport: framing,
//! dispatch, the writer retry loop and the reconnect state machine.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use shadelink::device::{adjustment, monitoring, status, Parameter};
use shadelink::protocol::{build_frame, crc8, Tag};
use shadelink::transport::MemoryTransport;
use shadelink::{
    Client, Command, ConnectionState, LinkError, MessageCodec, MessageType, WriteStatus,
};
use tokio::time::Instant;

type Seen = Arc<Mutex<Vec<(&'static str, i64)>>>;

fn recorder(seen: &Seen, label: &'static str) -> impl Fn(i64) + Send + Sync + 'static {
    let seen = seen.clone();
    move |value| seen.lock().unwrap().push((label, value))
}

async fn connected_client(transport: &MemoryTransport) -> Client<MemoryTransport> {
    let client = Client::builder(transport.clone()).build();
    client.connect(Some("Shade")).await.unwrap();
    client
        .wait_for_state(ConnectionState::Connected)
        .await
        .unwrap();
    client
}

/// Let spawned tasks drain their queues.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

/// A status frame is decoded and its handlers fire once each, in wire order.
#[tokio::test(start_paused = true)]
async fn test_status_frame_dispatch() {
    let transport = MemoryTransport::new().with_device("Shade");
    let client = connected_client(&transport).await;

    let seen = Seen::default();
    client.register(MessageType::Status, status::VERSION, recorder(&seen, "v"));
    client.register(MessageType::Status, status::TARGET, recorder(&seen, "t"));

    let mut chunk = build_frame(MessageType::Status, b"v:23,t:01").as_bytes().to_vec();
    chunk.push(b'\n');
    assert!(transport.notify(&chunk));
    settle().await;

    assert_eq!(*seen.lock().unwrap(), vec![("v", 0x23), ("t", 0x01)]);
}

/// Frames arrive split across notifications and several per notification.
#[tokio::test(start_paused = true)]
async fn test_split_and_coalesced_chunks() {
    let transport = MemoryTransport::new().with_device("Shade");
    let client = connected_client(&transport).await;

    let seen = Seen::default();
    client.register(MessageType::Monitoring, monitoring::POWER_MV, recorder(&seen, "pw"));
    client.register(MessageType::Monitoring, monitoring::MCU_TEMP, recorder(&seen, "tc"));
    client.register(MessageType::Adjustment, adjustment::POSITION_UP, recorder(&seen, "u"));

    let monitoring = build_frame(MessageType::Monitoring, b"pw:12040,tc:-3");
    let adjustments = build_frame(MessageType::Adjustment, b"m:0,u:85");
    let bytes = [monitoring.as_bytes(), adjustments.as_bytes()].concat();

    for piece in bytes.chunks(5) {
        assert!(transport.notify(piece));
    }
    settle().await;

    assert_eq!(
        *seen.lock().unwrap(),
        vec![("pw", 12040), ("tc", -3), ("u", 0x85)]
    );
}

/// A corrupted frame is dropped and the stream recovers at the next one.
#[tokio::test(start_paused = true)]
async fn test_bad_checksum_is_dropped() {
    let transport = MemoryTransport::new().with_device("Shade");
    let client = connected_client(&transport).await;

    let seen = Seen::default();
    client.register(MessageType::Status, status::VERSION, recorder(&seen, "v"));

    let mut corrupted = build_frame(MessageType::Status, b"v:23").as_bytes().to_vec();
    corrupted[4] = b'4';
    assert!(transport.notify(&corrupted));
    assert!(transport.notify(b"garbage without marker"));
    assert!(transport.notify(build_frame(MessageType::Status, b"v:24").as_bytes()));
    settle().await;

    assert_eq!(*seen.lock().unwrap(), vec![("v", 0x24)]);
}

/// Two failed writes are retried at the fixed delay, one write at a time.
#[tokio::test(start_paused = true)]
async fn test_write_retry_until_delivered() {
    let transport = MemoryTransport::new().with_device("Shade");
    transport.set_write_latency(Duration::from_millis(5));
    let client = connected_client(&transport).await;
    let mut status = client.writer().watch_status();

    transport.fail_next_writes(2);
    let start = Instant::now();
    client.send_command(Command::Save).unwrap();

    let delivered = *status
        .wait_for(|s| matches!(s, WriteStatus::Delivered { .. }))
        .await
        .unwrap();

    assert_eq!(delivered, WriteStatus::Delivered { retries: 2 });
    assert!(start.elapsed() >= Duration::from_millis(200));
    assert_eq!(transport.write_attempts(), 3);
    assert_eq!(transport.max_in_flight_writes(), 1);
    assert_eq!(transport.written(), vec![b"#Asave\r".to_vec()]);
}

/// Queued frames reach the device in submission order.
#[tokio::test(start_paused = true)]
async fn test_queued_writes_keep_order() {
    let transport = MemoryTransport::new().with_device("Shade");
    transport.set_write_latency(Duration::from_millis(10));
    let client = connected_client(&transport).await;

    transport.fail_next_writes(1);
    client.send_fixed_command("manual").unwrap();
    client.send_parameter(Parameter::PositionUp, 5).unwrap();
    client.send_fixed_command("up").unwrap();
    assert_eq!(client.pending_writes(), 3);

    while client.pending_writes() > 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(
        transport.written(),
        vec![
            b"#Sm:1\r".to_vec(),
            MessageCodec::encode_parameter(Parameter::PositionUp, 5)
                .as_bytes()
                .to_vec(),
            b"#St:1\r".to_vec(),
        ]
    );
    assert_eq!(transport.max_in_flight_writes(), 1);
}

/// Adjustment frames carry the offset value as two hex digits.
#[tokio::test(start_paused = true)]
async fn test_parameter_encoding_on_the_wire() {
    let transport = MemoryTransport::new().with_device("Shade");
    let client = connected_client(&transport).await;

    client.send_parameter(Parameter::PositionUp, 5).unwrap();
    client.send_adjustment(adjustment::MIN_SPEED, 0x0a).unwrap();
    while client.pending_writes() > 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let written = transport.written();
    assert_eq!(written[0], build_frame(MessageType::Adjustment, b"u:85").as_bytes());
    assert_eq!(written[1], build_frame(MessageType::Adjustment, b"s:0a").as_bytes());
}

/// Link loss leads back to Connected without another connect call.
#[tokio::test(start_paused = true)]
async fn test_reconnect_after_link_loss() {
    let transport = MemoryTransport::new().with_device("Shade");
    let client = connected_client(&transport).await;
    assert_eq!(transport.open_count(), 1);

    transport.fail_next_opens(1);
    assert!(transport.drop_link());
    client
        .wait_for_state(ConnectionState::Reconnecting)
        .await
        .unwrap();
    client
        .wait_for_state(ConnectionState::Connected)
        .await
        .unwrap();

    assert_eq!(transport.open_count(), 3);
    assert_eq!(transport.discover_count(), 1);
    assert!(transport.is_subscribed());

    let seen = Seen::default();
    client.register(MessageType::Status, status::VERSION, recorder(&seen, "v"));
    assert!(transport.notify(build_frame(MessageType::Status, b"v:23").as_bytes()));
    settle().await;
    assert_eq!(*seen.lock().unwrap(), vec![("v", 0x23)]);
}

/// Failures while resolving the characteristic or subscribing are retried.
#[tokio::test(start_paused = true)]
async fn test_establish_stage_failures_are_retried() {
    let transport = MemoryTransport::new().with_device("Shade");
    transport.fail_next_characteristics(1);
    transport.fail_next_subscribes(1);

    let start = Instant::now();
    let client = connected_client(&transport).await;

    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(transport.open_count(), 3);
    assert!(start.elapsed() >= Duration::from_millis(1000));
    assert!(transport.is_session_open());
}

/// A write queued across a reconnect is delivered on the new session.
#[tokio::test(start_paused = true)]
async fn test_write_survives_reconnect() {
    let transport = MemoryTransport::new().with_device("Shade");
    let client = connected_client(&transport).await;

    assert!(transport.drop_link());
    client
        .wait_for_state(ConnectionState::Reconnecting)
        .await
        .unwrap();
    client.send_command(Command::Revert).unwrap();

    client
        .wait_for_state(ConnectionState::Connected)
        .await
        .unwrap();
    while client.pending_writes() > 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(transport.written(), vec![b"#Aback\r".to_vec()]);
}

/// A second connect while active does not discover again.
#[tokio::test(start_paused = true)]
async fn test_connect_is_idempotent() {
    let transport = MemoryTransport::new().with_device("Shade");
    let client = connected_client(&transport).await;

    client.connect(Some("Shade")).await.unwrap();
    client.connect(None).await.unwrap();

    assert_eq!(transport.discover_count(), 1);
    assert_eq!(transport.open_count(), 1);
    assert_eq!(client.state(), ConnectionState::Connected);
}

/// A connect racing a disconnect waits for the old session to close, then
/// owns the link alone.
#[tokio::test(start_paused = true)]
async fn test_connect_during_slow_disconnect() {
    let transport = MemoryTransport::new().with_device("Shade");
    transport.set_close_latency(Duration::from_millis(50));
    let client = connected_client(&transport).await;

    let ((), reconnected) = tokio::join!(client.disconnect(), async {
        tokio::task::yield_now().await;
        client.connect(Some("Shade")).await
    });
    reconnected.unwrap();
    client
        .wait_for_state(ConnectionState::Connected)
        .await
        .unwrap();

    client.send_command(Command::Save).unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(transport.written(), vec![b"#Asave\r".to_vec()]);
    assert_eq!(client.write_status(), WriteStatus::Delivered { retries: 0 });
    assert_eq!(transport.open_count(), 2);
    assert_eq!(transport.live_sessions(), 1);
    assert_eq!(transport.max_live_sessions(), 1);

    client.connect(Some("Shade")).await.unwrap();
    assert_eq!(transport.discover_count(), 2);
}

/// Disconnect returns only after the session is closed.
#[tokio::test(start_paused = true)]
async fn test_disconnect_waits_for_close() {
    let transport = MemoryTransport::new().with_device("Shade");
    transport.set_close_latency(Duration::from_millis(50));
    let client = connected_client(&transport).await;

    let start = Instant::now();
    client.disconnect().await;

    assert!(start.elapsed() >= Duration::from_millis(50));
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(transport.live_sessions(), 0);

    client.connect(None).await.unwrap();
    client
        .wait_for_state(ConnectionState::Connected)
        .await
        .unwrap();
    assert_eq!(transport.max_live_sessions(), 1);
}

/// Discovery errors are surfaced and leave the link disconnected.
#[tokio::test(start_paused = true)]
async fn test_discovery_errors() {
    let transport = MemoryTransport::new().with_device("Shade");
    let client = Client::builder(transport.clone()).build();

    let result = client.connect(Some("Attic")).await;
    assert!(matches!(result, Err(LinkError::DeviceNotFound(_))));
    assert_eq!(client.state(), ConnectionState::Disconnected);

    transport.set_available(false);
    let result = client.connect(None).await;
    assert!(matches!(result, Err(LinkError::TransportUnavailable(_))));
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(matches!(
        client.send_command(Command::Save),
        Err(LinkError::NotConnected)
    ));

    transport.set_available(true);
    client.connect(Some("Shade")).await.unwrap();
    client
        .wait_for_state(ConnectionState::Connected)
        .await
        .unwrap();
}

/// The configured device name is used when connect gets none.
#[tokio::test(start_paused = true)]
async fn test_default_device_name() {
    let transport = MemoryTransport::new()
        .with_device("Kitchen")
        .with_device("Bedroom");
    let client = Client::builder(transport.clone())
        .device_name("Bedroom")
        .build();

    client.connect(None).await.unwrap();
    client
        .wait_for_state(ConnectionState::Connected)
        .await
        .unwrap();
    assert!(transport.is_session_open());
}

/// Disconnect stops reconnect attempts and discards pending writes.
#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_retries() {
    let transport = MemoryTransport::new().with_device("Shade");
    let client = connected_client(&transport).await;

    transport.fail_next_writes(u32::MAX);
    client.send_command(Command::Save).unwrap();
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert!(client.write_status().is_retrying());

    client.disconnect().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(!transport.is_session_open());

    let attempts = transport.write_attempts();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(transport.write_attempts(), attempts);
    assert_eq!(client.pending_writes(), 0);
    assert!(transport.written().is_empty());
}

/// Disconnect during reconnect attempts stops them.
#[tokio::test(start_paused = true)]
async fn test_disconnect_while_reconnecting() {
    let transport = MemoryTransport::new().with_device("Shade");
    let client = connected_client(&transport).await;

    transport.fail_next_opens(u32::MAX);
    assert!(transport.drop_link());
    client
        .wait_for_state(ConnectionState::Reconnecting)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    client.disconnect().await;
    let opens = transport.open_count();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(transport.open_count(), opens);
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

/// A handler can queue a command in reaction to a report.
#[tokio::test(start_paused = true)]
async fn test_handler_sends_command() {
    let transport = MemoryTransport::new().with_device("Shade");
    let client = connected_client(&transport).await;

    let writer = client.writer();
    client.register(MessageType::Adjustment, adjustment::MODIFIED, move |modified| {
        if modified != 0 {
            let _ = writer.send(Command::Save.frame());
        }
    });

    assert!(transport.notify(build_frame(MessageType::Adjustment, b"m:1").as_bytes()));
    settle().await;
    while client.pending_writes() > 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert_eq!(transport.written(), vec![b"#Asave\r".to_vec()]);
}

/// Unregistered tags and unknown types are ignored.
#[tokio::test(start_paused = true)]
async fn test_unhandled_values_are_ignored() {
    let transport = MemoryTransport::new().with_device("Shade");
    let client = connected_client(&transport).await;

    let seen = Seen::default();
    client.register(MessageType::Status, status::ERRORS, recorder(&seen, "e"));
    assert!(client.unregister(MessageType::Status, status::ERRORS));
    client.register(MessageType::Status, Tag::from_static("zz"), recorder(&seen, "zz"));

    assert!(transport.notify(build_frame(MessageType::Status, b"e:80,q:1").as_bytes()));
    let unknown = format!("#Xzz:1{:02x}\r", crc8(b"#Xzz:1"));
    assert!(transport.notify(unknown.as_bytes()));
    settle().await;

    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(client.state(), ConnectionState::Connected);
}
