//! State machine tests for the ConnectionManager.
//!
//! These tests drive the manager through a mock transport and verify:
//! - The state feed (replay of the current state, ordering of transitions)
//! - Idempotent connect and the single-handle invariant
//! - Terminal versus transient disconnections and the reconnect timer
//! - Message fan-out and send semantics


use std::sync::Arc;
use std::time::Duration;

use mock_transport::MockTransport;
use rstest::rstest;
use tokio::time::Instant;
use tradefeed_socket::{
    BusStream, CloseCode, ConnectionError, ConnectionManager, ConnectionState, ManagerConfig,
    TransportEvent,
};

use ConnectionState::*;

const ADDRESS: &str = "wss://host/feed";
const TOKEN: &str = "abc";

fn manager_with_mock() -> (ConnectionManager, MockTransport) {
    let transport = MockTransport::new();
    let manager = ConnectionManager::new(ManagerConfig::new(TOKEN), transport.clone())
        .expect("Failed to create manager");
    (manager, transport)
}

async fn next_state(states: &mut BusStream<ConnectionState>) -> ConnectionState {
    states
        .recv_timeout(Duration::from_secs(1))
        .await
        .expect("Timeout waiting for state")
}

async fn expect_states(states: &mut BusStream<ConnectionState>, expected: &[ConnectionState]) {
    for want in expected {
        assert_eq!(next_state(states).await, *want);
    }
}

async fn connected(
    manager: &ConnectionManager,
    transport: &MockTransport,
) -> BusStream<ConnectionState> {
    let mut states = manager.connect(ADDRESS).expect("Failed to connect");
    expect_states(&mut states, &[Disconnected, Connecting]).await;
    transport.connection(0).open();
    expect_states(&mut states, &[Connected]).await;
    states
}

#[tokio::test(start_paused = true)]
async fn test_connect_then_abnormal_close_reconnects_with_same_request() {
    let (manager, transport) = manager_with_mock();

    let mut states = manager.connect(ADDRESS).unwrap();
    expect_states(&mut states, &[Disconnected, Connecting]).await;
    transport.connection(0).open();
    expect_states(&mut states, &[Connected]).await;

    let closed_at = Instant::now();
    transport.connection(0).close_with(CloseCode::ABNORMAL_CLOSURE);
    expect_states(&mut states, &[Disconnecting, Disconnected, Connecting]).await;
    assert!(closed_at.elapsed() >= Duration::from_millis(500));

    assert_eq!(transport.open_count(), 2);
    let replayed = transport.connection(1).request;
    assert_eq!(replayed.address(), ADDRESS);
    assert_eq!(replayed.authorization(), "Bearer abc");
    assert_eq!(replayed, transport.connection(0).request);

    transport.connection(1).open();
    expect_states(&mut states, &[Connected]).await;
    assert_eq!(manager.status(), Connected);
}

#[tokio::test(start_paused = true)]
async fn test_connect_twice_while_connecting_opens_once() {
    let (manager, transport) = manager_with_mock();

    let mut first = manager.connect(ADDRESS).unwrap();
    let mut second = manager.connect(ADDRESS).unwrap();
    assert_eq!(transport.open_count(), 1);

    expect_states(&mut first, &[Disconnected, Connecting]).await;
    expect_states(&mut second, &[Connecting]).await;

    transport.connection(0).open();
    expect_states(&mut first, &[Connected]).await;
    expect_states(&mut second, &[Connected]).await;

    // Still a no-op once connected
    let mut third = manager.connect(ADDRESS).unwrap();
    expect_states(&mut third, &[Connected]).await;
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_connects_open_one_handle() {
    let transport = MockTransport::new();
    let manager = Arc::new(
        ConnectionManager::new(ManagerConfig::new(TOKEN), transport.clone()).unwrap(),
    );

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.connect(ADDRESS).map(|_| ()) })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(transport.open_count(), 1);
    assert_eq!(manager.status(), Connecting);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_is_terminal() {
    let (manager, transport) = manager_with_mock();
    let mut states = connected(&manager, &transport).await;

    manager.disconnect();
    expect_states(&mut states, &[Disconnecting, Disconnected]).await;

    assert_eq!(
        transport.connection(0).close_requests(),
        vec![(1000, "DISCONNECT".to_string())]
    );

    // Nothing else within a generous window
    assert_eq!(states.recv_timeout(Duration::from_secs(10)).await, None);
    assert_eq!(transport.open_count(), 1);
    assert_eq!(manager.status(), Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_while_connecting_then_failure_is_terminal() {
    let (manager, transport) = manager_with_mock();
    transport.set_manual_close(true);

    let mut states = manager.connect(ADDRESS).unwrap();
    expect_states(&mut states, &[Disconnected, Connecting]).await;

    manager.disconnect();
    transport.connection(0).fail("handshake refused");
    expect_states(&mut states, &[Disconnected]).await;

    assert_eq!(states.recv_timeout(Duration::from_secs(10)).await, None);
    assert_eq!(transport.open_count(), 1);
    assert_eq!(
        transport.connection(0).close_requests(),
        vec![(1000, "DISCONNECT".to_string())]
    );
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_then_abnormal_close_is_terminal() {
    let (manager, transport) = manager_with_mock();
    transport.set_manual_close(true);
    let mut states = connected(&manager, &transport).await;

    manager.disconnect();
    transport.connection(0).close_with(CloseCode::ABNORMAL_CLOSURE);
    expect_states(&mut states, &[Disconnecting, Disconnected]).await;

    assert_eq!(states.recv_timeout(Duration::from_secs(10)).await, None);
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_after_disconnect_restores_retries() {
    let (manager, transport) = manager_with_mock();
    transport.set_manual_close(true);

    let mut states = manager.connect(ADDRESS).unwrap();
    expect_states(&mut states, &[Disconnected, Connecting]).await;
    manager.disconnect();
    transport.connection(0).fail("handshake refused");
    expect_states(&mut states, &[Disconnected]).await;

    manager.connect(ADDRESS).unwrap();
    expect_states(&mut states, &[Connecting]).await;
    assert_eq!(transport.open_count(), 2);

    transport.connection(1).fail("network down");
    expect_states(&mut states, &[Disconnected, Connecting]).await;
    assert_eq!(transport.open_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_connect_while_disconnecting_opens_nothing() {
    let (manager, transport) = manager_with_mock();
    transport.set_manual_close(true);
    let mut states = connected(&manager, &transport).await;

    transport.connection(0).emit(TransportEvent::Closing {
        code: 4000,
        reason: String::new(),
    });
    expect_states(&mut states, &[Disconnecting]).await;

    let mut again = manager.connect(ADDRESS).unwrap();
    expect_states(&mut again, &[Disconnecting]).await;
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_peer_normal_close_is_terminal() {
    let (manager, transport) = manager_with_mock();
    let mut states = connected(&manager, &transport).await;

    transport.connection(0).close_with(CloseCode::NORMAL_CLOSURE);
    expect_states(&mut states, &[Disconnecting, Disconnected]).await;

    assert_eq!(states.recv_timeout(Duration::from_secs(10)).await, None);
    assert_eq!(transport.open_count(), 1);
}

#[rstest]
#[case(1001)]
#[case(1005)]
#[case(1006)]
#[case(1011)]
#[case(4000)]
#[tokio::test(start_paused = true)]
async fn test_non_normal_close_codes_reconnect(#[case] code: u16) {
    let (manager, transport) = manager_with_mock();
    let mut states = connected(&manager, &transport).await;

    transport.connection(0).close_with(code);
    expect_states(&mut states, &[Disconnecting, Disconnected, Connecting]).await;
    assert_eq!(transport.open_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failure_reconnects_indefinitely_with_fixed_delay() {
    let (manager, transport) = manager_with_mock();
    let mut states = manager.connect(ADDRESS).unwrap();
    expect_states(&mut states, &[Disconnected, Connecting]).await;

    for attempt in 0..4 {
        let failed_at = Instant::now();
        transport.connection(attempt).fail("connection refused");
        expect_states(&mut states, &[Disconnected, Connecting]).await;

        let waited = failed_at.elapsed();
        assert!(waited >= Duration::from_millis(500));
        assert!(waited < Duration::from_millis(600));
    }

    assert_eq!(transport.open_count(), 5);
    let requests = transport.requests();
    assert!(requests.iter().all(|r| *r == requests[0]));
}

#[tokio::test(start_paused = true)]
async fn test_custom_reconnect_delay() {
    let transport = MockTransport::new();
    let config = ManagerConfig::new(TOKEN).with_reconnect_delay(Duration::from_secs(3));
    let manager = ConnectionManager::new(config, transport.clone()).unwrap();

    let mut states = manager.connect(ADDRESS).unwrap();
    expect_states(&mut states, &[Disconnected, Connecting]).await;

    let failed_at = Instant::now();
    transport.connection(0).fail("reset");
    assert_eq!(next_state(&mut states).await, Disconnected);
    let reconnecting = states.recv_timeout(Duration::from_secs(5)).await;
    assert_eq!(reconnecting, Some(Connecting));
    assert!(failed_at.elapsed() >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_reconnect() {
    let (manager, transport) = manager_with_mock();
    let mut states = connected(&manager, &transport).await;

    transport.connection(0).fail("network down");
    expect_states(&mut states, &[Disconnected]).await;

    manager.disconnect();
    assert_eq!(states.recv_timeout(Duration::from_secs(10)).await, None);
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_during_pending_reconnect_opens_once() {
    let (manager, transport) = manager_with_mock();
    let mut states = connected(&manager, &transport).await;

    transport.connection(0).fail("network down");
    expect_states(&mut states, &[Disconnected]).await;

    let mut again = manager.connect("wss://other/feed").unwrap();
    expect_states(&mut again, &[Disconnected, Connecting]).await;
    assert_eq!(transport.open_count(), 2);
    assert_eq!(transport.connection(1).request.address(), "wss://other/feed");

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(transport.open_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_late_state_subscriber_sees_current_state_first() {
    let (manager, transport) = manager_with_mock();
    let _states = connected(&manager, &transport).await;

    let mut late = manager.observe_state();
    assert_eq!(next_state(&mut late).await, Connected);

    let mut via_connect = manager.connect(ADDRESS).unwrap();
    assert_eq!(next_state(&mut via_connect).await, Connected);
}

#[tokio::test(start_paused = true)]
async fn test_observe_state_before_connect() {
    let (manager, _transport) = manager_with_mock();
    let mut states = manager.observe_state();
    assert_eq!(next_state(&mut states).await, Disconnected);
    assert_eq!(states.recv_timeout(Duration::from_secs(1)).await, None);
}

#[tokio::test(start_paused = true)]
async fn test_message_subscribers_only_see_later_messages() {
    let (manager, transport) = manager_with_mock();
    let mut early = manager.observe_messages();
    let _states = connected(&manager, &transport).await;

    transport.connection(0).message("first");
    assert_eq!(early.recv_timeout(Duration::from_secs(1)).await.as_deref(), Some("first"));

    let mut late = manager.observe_messages();
    transport.connection(0).message("second");

    assert_eq!(early.recv_timeout(Duration::from_secs(1)).await.as_deref(), Some("second"));
    assert_eq!(late.recv_timeout(Duration::from_secs(1)).await.as_deref(), Some("second"));
    assert_eq!(late.try_recv(), None);
}

#[tokio::test(start_paused = true)]
async fn test_events_from_superseded_session_are_ignored() {
    let (manager, transport) = manager_with_mock();
    let mut messages = manager.observe_messages();
    let mut states = connected(&manager, &transport).await;

    let old = transport.connection(0);
    old.close_with(4000);
    expect_states(&mut states, &[Disconnecting, Disconnected, Connecting]).await;
    transport.connection(1).open();
    expect_states(&mut states, &[Connected]).await;
    assert_ne!(old.session(), transport.connection(1).session());

    old.message("stale");
    old.fail("late failure");
    old.emit(TransportEvent::Opened);
    transport.connection(1).message("fresh");

    assert_eq!(
        messages.recv_timeout(Duration::from_secs(1)).await.as_deref(),
        Some("fresh")
    );
    assert_eq!(states.recv_timeout(Duration::from_secs(1)).await, None);
    assert_eq!(manager.status(), Connected);
    assert_eq!(transport.open_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_send_semantics() {
    let (manager, transport) = manager_with_mock();

    assert!(matches!(manager.send("early"), Err(ConnectionError::NotConnected)));

    let mut states = manager.connect(ADDRESS).unwrap();
    expect_states(&mut states, &[Disconnected, Connecting]).await;
    manager.send("queued").unwrap();

    transport.connection(0).open();
    expect_states(&mut states, &[Connected]).await;
    manager.send(String::from("live")).unwrap();

    assert_eq!(transport.connection(0).sent(), vec!["queued", "live"]);

    manager.disconnect();
    expect_states(&mut states, &[Disconnecting, Disconnected]).await;
    assert!(matches!(manager.send("late"), Err(ConnectionError::NotConnected)));
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_waits_for_transport_close() {
    let (manager, transport) = manager_with_mock();
    transport.set_manual_close(true);
    let mut states = connected(&manager, &transport).await;

    manager.disconnect();
    assert_eq!(states.recv_timeout(Duration::from_secs(1)).await, None);
    assert_eq!(manager.status(), Connected);

    let connection = transport.connection(0);
    connection.emit(TransportEvent::Closing {
        code: 1000,
        reason: "DISCONNECT".to_string(),
    });
    connection.emit(TransportEvent::Closed {
        code: 1000,
        reason: "DISCONNECT".to_string(),
    });
    expect_states(&mut states, &[Disconnecting, Disconnected]).await;
}

#[tokio::test(start_paused = true)]
async fn test_mark_ready() {
    let (manager, transport) = manager_with_mock();
    assert!(!manager.mark_ready());

    let mut states = connected(&manager, &transport).await;
    assert!(manager.mark_ready());
    expect_states(&mut states, &[Ready]).await;

    // Ready is live: connect stays a no-op
    manager.connect(ADDRESS).unwrap();
    assert_eq!(transport.open_count(), 1);
    assert!(!manager.mark_ready());
}

#[tokio::test(start_paused = true)]
async fn test_drop_closes_live_handle() {
    let (manager, transport) = manager_with_mock();
    transport.set_manual_close(true);
    let _states = connected(&manager, &transport).await;

    drop(manager);
    assert_eq!(
        transport.connection(0).close_requests(),
        vec![(1000, "DISCONNECT".to_string())]
    );
}

#[tokio::test(start_paused = true)]
async fn test_state_streams_end_when_manager_dropped() {
    let (manager, _transport) = manager_with_mock();
    let mut states = manager.observe_state();
    assert_eq!(next_state(&mut states).await, Disconnected);

    drop(manager);
    assert_eq!(states.recv().await, None);
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_repeated_connects_keep_one_handle(calls in 1usize..20, open_after in 0usize..20) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            let opened = runtime.block_on(async {
                let (manager, transport) = manager_with_mock();
                for call in 0..calls {
                    manager.connect(ADDRESS).unwrap();
                    if call == open_after {
                        transport.connection(0).open();
                        while manager.status() != Connected {
                            tokio::task::yield_now().await;
                        }
                    }
                }
                transport.open_count()
            });

            prop_assert_eq!(opened, 1);
        }
    }
}
