mod common;

use std::sync::Arc;
use std::time::Duration;

use bestflow_client::ws::{ConnectionDriver, ConnectionState, DriverConfig};
use common::{advance, endpoint, settle, Behaviour, MockConnector};

fn driver(connector: Arc<MockConnector>) -> ConnectionDriver {
    ConnectionDriver::new(connector, DriverConfig::default())
}

#[tokio::test(start_paused = true)]
async fn refused_attempts_back_off_up_to_the_cap() {
    let (connector, _accepted) = MockConnector::new(Behaviour::Refuse);
    let driver = driver(connector.clone());

    driver.connect(endpoint("t"));
    advance(Duration::from_secs(100)).await;

    // t = 0, 1, 3, 7, 15, 31, 61, 91
    assert_eq!(connector.gaps_secs(), vec![1, 2, 4, 8, 16, 30, 30]);
    assert_eq!(driver.state(), ConnectionState::Error);
}

#[tokio::test(start_paused = true)]
async fn successful_connect_resets_the_budget() {
    let (connector, mut accepted) = MockConnector::new(Behaviour::Refuse);
    connector.script([Behaviour::Refuse, Behaviour::Refuse, Behaviour::Accept]);
    let driver = driver(connector.clone());

    driver.connect(endpoint("t"));
    advance(Duration::from_millis(3_500)).await;
    assert_eq!(driver.state(), ConnectionState::Connected);
    assert_eq!(driver.attempt(), 0);

    let server = accepted.recv().await.unwrap();
    advance(Duration::from_secs(10)).await;
    server.close();
    settle().await;
    assert_eq!(driver.state(), ConnectionState::Disconnected);
    assert_eq!(driver.pending_timers(), 1);

    advance(Duration::from_secs(5)).await;
    // Refused at t = 0 and 1, accepted at 3, closed at 13.5, retried at 14.5, 16.5
    assert_eq!(connector.gaps_secs(), vec![1, 2, 11, 2]);
}

#[tokio::test(start_paused = true)]
async fn connect_timeout_enters_error_and_retries() {
    let (connector, _accepted) = MockConnector::new(Behaviour::Hang);
    let driver = driver(connector.clone());

    driver.connect(endpoint("t"));
    settle().await;
    assert_eq!(driver.state(), ConnectionState::Connecting);

    advance(Duration::from_millis(29_900)).await;
    assert_eq!(driver.state(), ConnectionState::Connecting);

    advance(Duration::from_millis(200)).await;
    assert_eq!(driver.state(), ConnectionState::Error);
    assert_eq!(connector.attempt_count(), 1);

    // The retry waits in Error, never passing through Disconnected
    let mut states = driver.watch_state();
    advance(Duration::from_millis(800)).await;
    assert_eq!(driver.state(), ConnectionState::Error);
    assert!(!states.has_changed().unwrap());

    advance(Duration::from_millis(200)).await;
    assert_eq!(driver.state(), ConnectionState::Connecting);
    assert_eq!(connector.attempt_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn ping_gets_exactly_one_pong_without_listeners() {
    let (connector, mut accepted) = MockConnector::new(Behaviour::Accept);
    let driver = driver(connector);
    driver.connect(endpoint("t"));
    let mut server = accepted.recv().await.unwrap();
    settle().await;
    assert!(driver.state().is_connected());

    server.push(r#"{"type":"ping","timestamp":"2024-05-01T10:00:00Z"}"#);
    settle().await;
    assert_eq!(server.drain(), vec![r#"{"type":"pong"}"#.to_string()]);

    server.push(r#"{"type":"pong"}"#);
    server.push(r#"{"type":"unread_count","data":{"count":1}}"#);
    settle().await;
    assert!(server.drain().is_empty());
}

#[tokio::test(start_paused = true)]
async fn frames_reach_subscribers_in_order() {
    let (connector, mut accepted) = MockConnector::new(Behaviour::Accept);
    let driver = driver(connector);
    let mut frames = driver.subscribe();
    driver.connect(endpoint("t"));
    let server = accepted.recv().await.unwrap();

    for n in 0..3 {
        server.push(&format!(r#"{{"type":"unread_count","data":{{"count":{n}}}}}"#));
    }
    for n in 0..3 {
        let frame = frames.recv().await.unwrap();
        assert!(frame.contains(&format!(r#""count":{n}"#)));
    }
}

#[tokio::test(start_paused = true)]
async fn send_only_flows_while_connected() {
    let (connector, mut accepted) = MockConnector::new(Behaviour::Accept);
    let driver = driver(connector);

    driver.send("dropped");
    driver.connect(endpoint("t"));
    let mut server = accepted.recv().await.unwrap();
    settle().await;

    driver.send("hello");
    settle().await;
    assert_eq!(server.drain(), vec!["hello".to_string()]);

    driver.disconnect();
    driver.send("also dropped");
    settle().await;
    assert!(server.drain().is_empty());
}

#[tokio::test(start_paused = true)]
async fn connecting_twice_to_the_same_endpoint_is_a_no_op() {
    let (connector, _accepted) = MockConnector::new(Behaviour::Accept);
    let driver = driver(connector.clone());
    driver.connect(endpoint("t"));
    settle().await;
    driver.connect(endpoint("t"));
    settle().await;
    assert_eq!(connector.attempt_count(), 1);

    driver.connect(endpoint("other"));
    settle().await;
    assert_eq!(connector.attempt_count(), 2);
    assert!(connector.last_url().unwrap().ends_with("token=other"));
}

#[tokio::test(start_paused = true)]
async fn disconnect_from_any_state_leaves_nothing_armed() {
    // Disconnected, never connected
    {
        let (connector, _accepted) = MockConnector::new(Behaviour::Refuse);
        let driver = driver(connector);
        driver.disconnect();
        assert_eq!(driver.state(), ConnectionState::Disconnected);
        assert_eq!(driver.pending_timers(), 0);
    }

    // Connecting
    {
        let (connector, _accepted) = MockConnector::new(Behaviour::Hang);
        let driver = driver(connector.clone());
        driver.connect(endpoint("t"));
        settle().await;
        driver.disconnect();
        assert_eq!(driver.state(), ConnectionState::Disconnected);
        assert_eq!(driver.pending_timers(), 0);
        advance(Duration::from_secs(120)).await;
        assert_eq!(driver.state(), ConnectionState::Disconnected);
        assert_eq!(connector.attempt_count(), 1);
    }

    // Connected
    {
        let (connector, mut accepted) = MockConnector::new(Behaviour::Accept);
        let driver = driver(connector.clone());
        driver.connect(endpoint("t"));
        let mut server = accepted.recv().await.unwrap();
        settle().await;
        driver.disconnect();
        assert_eq!(driver.state(), ConnectionState::Disconnected);
        assert_eq!(driver.pending_timers(), 0);
        // The transport is closed
        assert_eq!(server.from_client.recv().await, None);
        advance(Duration::from_secs(120)).await;
        assert_eq!(connector.attempt_count(), 1);
    }

    // Error with a retry pending
    {
        let (connector, _accepted) = MockConnector::new(Behaviour::Refuse);
        let driver = driver(connector.clone());
        driver.connect(endpoint("t"));
        settle().await;
        assert_eq!(driver.state(), ConnectionState::Error);
        assert_eq!(driver.pending_timers(), 1);
        driver.disconnect();
        assert_eq!(driver.state(), ConnectionState::Disconnected);
        assert_eq!(driver.pending_timers(), 0);
        advance(Duration::from_secs(120)).await;
        assert_eq!(connector.attempt_count(), 1);
    }

    // Disconnected after a server close, retry pending
    {
        let (connector, mut accepted) = MockConnector::new(Behaviour::Accept);
        let driver = driver(connector.clone());
        driver.connect(endpoint("t"));
        let server = accepted.recv().await.unwrap();
        server.close();
        settle().await;
        assert_eq!(driver.pending_timers(), 1);
        driver.disconnect();
        assert_eq!(driver.pending_timers(), 0);
        advance(Duration::from_secs(120)).await;
        assert_eq!(connector.attempt_count(), 1);
        assert_eq!(driver.state(), ConnectionState::Disconnected);
    }
}

#[tokio::test(start_paused = true)]
async fn reconnect_restarts_with_a_fresh_budget() {
    let (connector, _accepted) = MockConnector::new(Behaviour::Refuse);
    let driver = driver(connector.clone());
    driver.connect(endpoint("t"));
    advance(Duration::from_secs(4)).await;
    assert_eq!(driver.attempt(), 3);

    driver.disconnect();
    driver.reconnect();
    settle().await;
    assert_eq!(connector.attempt_count(), 4);
    assert_eq!(driver.attempt(), 1);

    advance(Duration::from_millis(1_100)).await;
    assert_eq!(connector.attempt_count(), 5);
}
