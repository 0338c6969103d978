#![allow(clippy::unwrap_used)]
// Integration tests for `SubscriptionManager`: a wiremock control plane
// for the liveness probe plus a local WebSocket server as the device's
// event stream.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, oneshot};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use camctl_core::{
    ContextUpdate, LinkState, MessageKind, SubscriptionConfig, SubscriptionEvent,
    SubscriptionFilter, SubscriptionManager,
};

const DEVICE: &str = "127.0.0.1";

// ── Helpers ─────────────────────────────────────────────────────────

/// Control plane answering the liveness probe, plus an unaccepted stream
/// listener.
async fn device() -> (MockServer, TcpListener) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "model": "E2" })))
        .mount(&server)
        .await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    (server, listener)
}

fn config_for(server: &MockServer, listener: &TcpListener) -> SubscriptionConfig {
    SubscriptionConfig {
        http_port: server.address().port(),
        stream_port: listener.local_addr().unwrap().port(),
        probe_timeout: Duration::from_secs(2),
        connect_timeout: Duration::from_secs(2),
        reconnect_delay: Duration::from_millis(20),
        max_reconnect_attempts: 5,
        heartbeat_interval: Duration::from_secs(30),
        heartbeat_timeout: Duration::from_secs(90),
        history_capacity: 100,
    }
}

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (tcp, _) = listener.accept().await.unwrap();
    tokio_tungstenite::accept_async(tcp).await.unwrap()
}

/// Keep the socket open until the client goes away.
async fn hold_open(mut ws: WebSocketStream<TcpStream>) {
    while let Some(Ok(_)) = ws.next().await {}
}

/// Accept one connection, send `text` as a single frame, and stay open.
fn serve_once(listener: TcpListener, text: String) {
    tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        ws.send(Message::Text(text.into())).await.unwrap();
        hold_open(ws).await;
    });
}

type Events = broadcast::Receiver<Arc<SubscriptionEvent>>;

async fn wait_for(
    events: &mut Events,
    predicate: impl Fn(&SubscriptionEvent) -> bool,
) -> Arc<SubscriptionEvent> {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for subscription event")
            .unwrap();
        if predicate(event.as_ref()) {
            return event;
        }
    }
}

fn is_message(event: &SubscriptionEvent) -> bool {
    matches!(event, SubscriptionEvent::Message { .. })
}

fn recording_sink() -> (Arc<Mutex<Vec<ContextUpdate>>>, impl Fn(&ContextUpdate) + Send + Sync) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink_seen = Arc::clone(&seen);
    let sink = move |update: &ContextUpdate| sink_seen.lock().unwrap().push(update.clone());
    (seen, sink)
}

// ── Connect and dispatch ────────────────────────────────────────────

#[tokio::test]
async fn test_status_frames_reach_sink_and_history() {
    let (server, listener) = device().await;
    let config = config_for(&server, &listener);
    let (seen, sink) = recording_sink();
    let manager = SubscriptionManager::with_sink(config, sink);
    let mut events = manager.subscribe();

    serve_once(
        listener,
        [
            r#"{"type":"heartbeat"}"#,
            r#"{"type":"status","battery":81,"recording":true}"#,
            "this is not json",
            r#"{"type":"lens_event","focus":"near"}"#,
        ]
        .join("\n"),
    );

    assert!(manager.connect(DEVICE).await);
    wait_for(&mut events, |e| matches!(e, SubscriptionEvent::Connected { .. })).await;

    let first = wait_for(&mut events, is_message).await;
    let second = wait_for(&mut events, is_message).await;

    match (&*first, &*second) {
        (
            SubscriptionEvent::Message {
                message: status,
                update: Some(update),
                ..
            },
            SubscriptionEvent::Message {
                message: unknown,
                update: None,
                ..
            },
        ) => {
            assert_eq!(status.kind, MessageKind::Status);
            assert_eq!(update.battery, Some(81.0));
            assert_eq!(unknown.kind, MessageKind::Unknown);
            assert_eq!(unknown.payload["focus"], "near");
        }
        other => panic!("unexpected events: {other:?}"),
    }

    let delivered = seen.lock().unwrap().clone();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].device, DEVICE);
    assert_eq!(delivered[0].recording, Some(true));

    let kinds: Vec<MessageKind> = manager
        .message_history(DEVICE)
        .iter()
        .map(|m| m.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![MessageKind::Heartbeat, MessageKind::Status, MessageKind::Unknown]
    );

    let status = manager.connection_status(DEVICE).unwrap();
    assert_eq!(status.state, LinkState::Connected);
    assert!(status.is_connected);
    assert_eq!(status.reconnect_attempts, 0);
    assert!(status.last_heartbeat_at.is_some());
    assert_eq!(manager.active_connections_count(), 1);
}

#[tokio::test]
async fn test_filter_reduces_updates() {
    let (server, listener) = device().await;
    let config = config_for(&server, &listener);
    let (seen, sink) = recording_sink();
    let manager = SubscriptionManager::with_sink(config, sink);
    let mut events = manager.subscribe();

    let battery_only = SubscriptionFilter {
        battery: true,
        ..SubscriptionFilter::none()
    };
    manager.set_subscription_options(DEVICE, battery_only);

    serve_once(
        listener,
        [
            r#"{"type":"status","battery":40,"recording":true}"#,
            r#"{"type":"status","recording":false}"#,
        ]
        .join("\n"),
    );

    assert!(manager.connect(DEVICE).await);
    assert_eq!(manager.subscription_options(DEVICE), Some(battery_only));

    let first = wait_for(&mut events, is_message).await;
    let second = wait_for(&mut events, is_message).await;
    assert!(matches!(&*first, SubscriptionEvent::Message { update: Some(_), .. }));
    assert!(matches!(&*second, SubscriptionEvent::Message { update: None, .. }));

    let delivered = seen.lock().unwrap().clone();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].battery, Some(40.0));
    assert_eq!(delivered[0].recording, None);

    // Both frames are still recorded.
    assert_eq!(manager.message_history(DEVICE).len(), 2);
}

#[tokio::test]
async fn test_history_is_bounded_and_copied() {
    let (server, listener) = device().await;
    let config = config_for(&server, &listener);
    let manager = SubscriptionManager::new(config);
    let mut events = manager.subscribe();

    let frames: Vec<String> = (0..120)
        .map(|seq| json!({ "type": "status", "seq": seq }).to_string())
        .collect();
    serve_once(listener, frames.join("\n"));

    assert!(manager.connect(DEVICE).await);
    wait_for(&mut events, |e| {
        matches!(e, SubscriptionEvent::Message { message, .. } if message.payload["seq"] == 119)
    })
    .await;

    let mut history = manager.message_history(DEVICE);
    assert_eq!(history.len(), 100);
    assert_eq!(history[0].payload["seq"], 20);
    assert_eq!(history[99].payload["seq"], 119);

    history.clear();
    assert_eq!(manager.message_history(DEVICE).len(), 100);

    assert!(manager.clear_message_history(DEVICE));
    assert!(manager.message_history(DEVICE).is_empty());
    assert!(!manager.clear_message_history("10.0.0.99"));
}

#[tokio::test]
async fn test_send_message_reaches_device() {
    let (server, listener) = device().await;
    let config = config_for(&server, &listener);
    let manager = SubscriptionManager::new(config);

    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        while let Some(Ok(message)) = ws.next().await {
            if let Message::Text(text) = message {
                let _ = tx.send(text.as_str().to_owned());
                break;
            }
        }
        hold_open(ws).await;
    });

    assert!(!manager.send_message(DEVICE, &json!({ "cmd": "ping" })));
    assert!(manager.connect(DEVICE).await);
    assert!(manager.send_message(DEVICE, &json!({ "cmd": "subscribe" })));

    let received = tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&received).unwrap(),
        json!({ "cmd": "subscribe" })
    );
}

// ── Connect failures ────────────────────────────────────────────────

#[tokio::test]
async fn test_failed_probe_returns_false_and_records_error() {
    let server = MockServer::start().await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = config_for(&server, &listener);
    let manager = SubscriptionManager::new(config);

    assert!(!manager.connect(DEVICE).await);

    let status = manager.connection_status(DEVICE).unwrap();
    assert_eq!(status.state, LinkState::Disconnected);
    assert!(!status.is_connected);
    assert!(status.last_error.is_some());
    assert_eq!(status.reconnect_attempts, 0);

    let stats = manager.connection_statistics();
    assert_eq!(stats.total_devices, 1);
    assert_eq!(stats.failed_connections, 1);
    assert_eq!(stats.active_connections, 0);
}

#[tokio::test]
async fn test_closed_stream_port_returns_false() {
    let (server, listener) = device().await;
    let config = config_for(&server, &listener);
    drop(listener);
    let manager = SubscriptionManager::new(config);

    assert!(!manager.connect(DEVICE).await);
    let status = manager.connection_status(DEVICE).unwrap();
    assert!(status.last_error.is_some());
    assert_eq!(status.state, LinkState::Disconnected);
}

// ── Reconnection ────────────────────────────────────────────────────

#[tokio::test]
async fn test_reconnect_counter_increments_then_resets() {
    let (server, listener) = device().await;
    let mut config = config_for(&server, &listener);
    config.reconnect_delay = Duration::from_millis(200);
    let manager = SubscriptionManager::new(config);
    let mut events = manager.subscribe();

    tokio::spawn(async move {
        let mut first = accept(&listener).await;
        first.close(None).await.unwrap();
        let second = accept(&listener).await;
        hold_open(second).await;
    });

    assert!(manager.connect(DEVICE).await);

    let reconnecting = wait_for(&mut events, |e| {
        matches!(e, SubscriptionEvent::Reconnecting { .. })
    })
    .await;
    match &*reconnecting {
        SubscriptionEvent::Reconnecting { attempt, delay, .. } => {
            assert_eq!(*attempt, 1);
            assert_eq!(*delay, Duration::from_millis(200));
        }
        other => panic!("unexpected event: {other:?}"),
    }
    let status = manager.connection_status(DEVICE).unwrap();
    assert_eq!(status.state, LinkState::Reconnecting);
    assert_eq!(status.reconnect_attempts, 1);

    wait_for(&mut events, |e| matches!(e, SubscriptionEvent::Connected { .. })).await;
    let status = manager.connection_status(DEVICE).unwrap();
    assert_eq!(status.state, LinkState::Connected);
    assert_eq!(status.reconnect_attempts, 0);
    assert_eq!(status.total_reconnect_attempts, 1);
    assert!(status.last_error.is_none());
    assert_eq!(manager.connection_statistics().total_reconnect_attempts, 1);
}

#[tokio::test]
async fn test_zero_ping_interval_keeps_stream_running() {
    let (server, listener) = device().await;
    let mut config = config_for(&server, &listener);
    config.heartbeat_interval = Duration::ZERO;
    config.heartbeat_timeout = Duration::from_secs(5);
    let manager = SubscriptionManager::new(config);
    let mut events = manager.subscribe();

    serve_once(listener, r#"{"type":"status","battery":64}"#.to_owned());

    assert!(manager.connect(DEVICE).await);
    wait_for(&mut events, is_message).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    let status = manager.connection_status(DEVICE).unwrap();
    assert_eq!(status.state, LinkState::Connected);
    assert!(status.last_heartbeat_at.is_some());
}

#[tokio::test]
async fn test_reconnection_stops_exactly_at_cap() {
    let (server, listener) = device().await;
    let mut config = config_for(&server, &listener);
    config.max_reconnect_attempts = 3;
    config.reconnect_delay = Duration::from_millis(10);
    let manager = SubscriptionManager::new(config);
    let mut events = manager.subscribe();

    tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        drop(listener);
        ws.close(None).await.unwrap();
    });

    assert!(manager.connect(DEVICE).await);

    let mut seen_attempts = Vec::new();
    let gave_up = loop {
        let event = wait_for(&mut events, |e| {
            matches!(
                e,
                SubscriptionEvent::Reconnecting { .. } | SubscriptionEvent::ReconnectFailed { .. }
            )
        })
        .await;
        match &*event {
            SubscriptionEvent::Reconnecting { attempt, .. } => seen_attempts.push(*attempt),
            SubscriptionEvent::ReconnectFailed { attempts, .. } => break *attempts,
            _ => unreachable!(),
        }
    };

    assert_eq!(seen_attempts, vec![1, 2, 3]);
    assert_eq!(gave_up, 3);

    let status = manager.connection_status(DEVICE).unwrap();
    assert_eq!(status.state, LinkState::GivenUp);
    assert!(!status.is_connected);
    assert_eq!(status.reconnect_attempts, 3);

    let stats = manager.connection_statistics();
    assert_eq!(stats.failed_connections, 1);
    assert_eq!(stats.total_reconnect_attempts, 3);
    assert!(!manager.send_message(DEVICE, &json!({})));
}

#[tokio::test]
async fn test_silent_stream_counts_as_unexpected_close() {
    let (server, listener) = device().await;
    let mut config = config_for(&server, &listener);
    config.heartbeat_timeout = Duration::from_millis(150);
    config.max_reconnect_attempts = 0;
    let manager = SubscriptionManager::new(config);
    let mut events = manager.subscribe();

    serve_once(listener, r#"{"type":"status","battery":10}"#.to_owned());

    assert!(manager.connect(DEVICE).await);

    let closed = wait_for(&mut events, |e| {
        matches!(e, SubscriptionEvent::Disconnected { .. })
    })
    .await;
    match &*closed {
        SubscriptionEvent::Disconnected { reason, .. } => {
            assert!(reason.contains("no heartbeat"), "reason: {reason}");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    wait_for(&mut events, |e| {
        matches!(e, SubscriptionEvent::ReconnectFailed { attempts: 0, .. })
    })
    .await;
    assert_eq!(
        manager.connection_status(DEVICE).unwrap().state,
        LinkState::GivenUp
    );
}

// ── Teardown ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_disconnect_forgets_device() {
    let (server, listener) = device().await;
    let config = config_for(&server, &listener);
    let manager = SubscriptionManager::new(config);
    serve_once(listener, r#"{"type":"heartbeat"}"#.to_owned());

    assert!(manager.connect(DEVICE).await);
    assert!(manager.disconnect(DEVICE));
    assert!(!manager.disconnect(DEVICE));

    assert!(manager.connection_status(DEVICE).is_none());
    assert!(manager.message_history(DEVICE).is_empty());
    assert_eq!(manager.active_connections_count(), 0);
    assert!(manager.all_connection_status().is_empty());
}

#[tokio::test]
async fn test_destroy_closes_listeners_and_refuses_connects() {
    let (server, listener) = device().await;
    let config = config_for(&server, &listener);
    let manager = SubscriptionManager::new(config);
    let mut events = manager.subscribe();
    serve_once(listener, r#"{"type":"heartbeat"}"#.to_owned());

    assert!(manager.connect(DEVICE).await);
    manager.destroy();

    wait_for(&mut events, |e| {
        matches!(e, SubscriptionEvent::Disconnected { .. })
    })
    .await;
    loop {
        match events.recv().await {
            Err(broadcast::error::RecvError::Closed) => break,
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
        }
    }

    let mut stream = manager.event_stream();
    assert!(stream.next().await.is_none());

    assert_eq!(manager.connection_statistics().total_devices, 0);
    assert!(!manager.connect(DEVICE).await);
}
