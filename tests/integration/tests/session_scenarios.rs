//! Session lifecycle tests against a scripted Pusher server
//!
//! All tests run with paused time, so backoff delays and grace periods
//! elapse instantly once every task is idle.

use std::time::Duration;

use chat_core::{ChannelEventKind, ChatEvent, ConnectionStatus, ErrorCategory, MessageEventKind};
use chat_realtime::protocol::names;
use chat_realtime::SessionPhase;
use integration_tests::{
    events_until, frames, names_of, next_event, signed_in, wait_for, ConnectPlan, FakeAuth,
    Harness, ACTOR, LIVESTREAM, ROOM, SOCKET_ID,
};

const PRIMARY: &str = "chatrooms.668.v2";

fn public_channels() -> Vec<String> {
    [PRIMARY, "chatrooms.668", "chatroom_668", "channel.676", "channel_676"]
        .map(str::to_string)
        .to_vec()
}

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_anonymous_session_subscribes_and_routes_events() {
    let mut h = Harness::builder().spawn();
    let mut events = h.session.subscribe_events();
    h.session.connect().await.unwrap();

    assert_eq!(
        next_event(&mut events).await,
        Some(ChatEvent::Connection {
            room_id: ROOM,
            status: ConnectionStatus::Pending,
        })
    );

    let mut server = h.servers.accept().await;
    server.push(&frames::connection_established(SOCKET_ID));

    let subscribed = server.subscriptions(5).await;
    let channels: Vec<_> = subscribed.iter().map(|(c, _)| c.clone()).collect();
    assert_eq!(channels, public_channels());
    assert!(subscribed.iter().all(|(_, auth)| auth.is_none()));
    assert!(h.auth.requests().is_empty());

    server.push(&frames::subscription_succeeded(PRIMARY));
    assert_eq!(
        wait_for(&mut events, "connection").await,
        ChatEvent::Connection {
            room_id: ROOM,
            status: ConnectionStatus::Success,
        }
    );
    assert_eq!(h.session.state(), SessionPhase::Subscribed);

    server.push(&frames::chat_message(PRIMARY, "hello chat"));
    match next_event(&mut events).await {
        Some(ChatEvent::Message(message)) => {
            assert_eq!(message.kind, MessageEventKind::MessagePosted);
            assert_eq!(message.channel.as_deref(), Some(PRIMARY));
            assert_eq!(message.data["content"], "hello chat");
            assert_eq!(message.data["sender"]["username"], "viewer");
        }
        other => panic!("expected a chat message, got {other:?}"),
    }

    server.push(&frames::stream_started("channel.676"));
    match next_event(&mut events).await {
        Some(ChatEvent::Channel(update)) => {
            assert_eq!(update.kind, ChannelEventKind::StreamStarted);
            assert_eq!(update.data["livestream"]["id"], 5555);
        }
        other => panic!("expected a channel event, got {other:?}"),
    }

    // Unrouted events are dropped; the pong proves both were handled
    server.push(&frames::unknown(PRIMARY));
    server.push(&frames::ping());
    server.expect(names::PONG).await;
    assert!(events.try_recv().is_err());

    let recorded = h.sink.recorded();
    assert_eq!(recorded.successes, vec![(ROOM, 0)]);
    assert!(h.registry.error_log().is_empty());

    h.session.close().await;
    h.session.join().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_signed_in_session_authorizes_private_channels() {
    let mut h = Harness::builder().identity(signed_in(true)).spawn();
    let mut events = h.session.subscribe_events();
    h.session.connect().await.unwrap();

    let mut server = h.servers.accept().await;
    server.push(&frames::connection_established(SOCKET_ID));

    let mut subscribed = server.subscriptions(8).await;
    subscribed.sort();

    let private = [
        format!("private-App.User.{ACTOR}"),
        format!("private-livestream.{LIVESTREAM}"),
        format!("private-userfeed.{ACTOR}"),
    ];
    for channel in &private {
        let (_, auth) = subscribed
            .iter()
            .find(|(c, _)| c == channel)
            .unwrap_or_else(|| panic!("{channel} not subscribed"));
        assert_eq!(auth.as_deref(), Some(FakeAuth::signature(channel, SOCKET_ID).as_str()));
    }
    for channel in public_channels() {
        assert!(subscribed.iter().any(|(c, auth)| *c == channel && auth.is_none()));
    }

    let mut requested: Vec<_> = h.auth.requests().into_iter().map(|(c, _)| c).collect();
    requested.sort();
    assert_eq!(requested, private.to_vec());
    assert!(h.auth.requests().iter().all(|(_, socket)| socket == SOCKET_ID));

    server.push(&frames::subscription_succeeded(PRIMARY));
    wait_for(&mut events, "connection").await;
    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.socket_id.as_deref(), Some(SOCKET_ID));
    assert_eq!(snapshot.subscribed_channels, 8);

    h.session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_denied_private_channel_reports_error_and_continues() {
    let denied = format!("private-userfeed.{ACTOR}");
    let mut h = Harness::builder()
        .identity(signed_in(false))
        .auth(FakeAuth::denying(&denied))
        .spawn();
    let mut events = h.session.subscribe_events();
    h.session.connect().await.unwrap();

    let mut server = h.servers.accept().await;
    server.push(&frames::connection_established(SOCKET_ID));

    match wait_for(&mut events, "error").await {
        ChatEvent::Error {
            category,
            message,
            consecutive_errors,
            ..
        } => {
            assert_eq!(category, ErrorCategory::Api);
            assert!(message.starts_with(&denied));
            assert_eq!(consecutive_errors, 0);
        }
        other => panic!("unexpected {other:?}"),
    }

    // Not live, so only the other actor channel plus the public ones
    let subscribed = server.subscriptions(6).await;
    assert!(subscribed.iter().all(|(c, _)| *c != denied));
    assert!(subscribed
        .iter()
        .any(|(c, auth)| *c == format!("private-App.User.{ACTOR}") && auth.is_some()));

    server.push(&frames::subscription_succeeded(PRIMARY));
    wait_for(&mut events, "connection").await;
    assert_eq!(h.session.snapshot().consecutive_errors, 0);

    h.session.close().await;
}

// ============================================================================
// Error escalation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_three_transport_errors_escalate_and_reconnect() {
    let mut h = Harness::builder().spawn();
    let mut events = h.session.subscribe_events();
    h.session.connect().await.unwrap();

    let server = h.servers.accept().await;
    for _ in 0..3 {
        server.fail("socket hang up");
    }

    let seen = events_until(&mut events, "close").await;
    assert_eq!(
        names_of(&seen),
        ["connection", "error", "error", "error", "connection_failure", "close"]
    );

    let counts: Vec<u32> = seen
        .iter()
        .filter_map(|event| match event {
            ChatEvent::Error {
                category,
                consecutive_errors,
                ..
            } => {
                assert_eq!(*category, ErrorCategory::Network);
                Some(*consecutive_errors)
            }
            _ => None,
        })
        .collect();
    assert_eq!(counts, [1, 2, 3]);

    let records = h.registry.error_log().by_operation("session.transport_error");
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.category == ErrorCategory::Network));
    assert!(records.iter().all(|r| r.room_id == Some(ROOM)));

    // The session survives and dials again after the first backoff step
    let _second = h.servers.accept().await;
    assert_eq!(h.connector.attempts(), 2);
    let recorded = h.sink.recorded();
    assert_eq!(recorded.failures, vec![(ROOM, 0, 3)]);
    assert_eq!(recorded.reconnects, vec![(ROOM, 1, Duration::from_millis(1000))]);
    assert!(!h.session.is_finished());

    h.session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_sends_cost_one_reconnect() {
    let mut h = Harness::builder().spawn();
    let mut events = h.session.subscribe_events();
    h.session.connect().await.unwrap();

    // Five subscribes fail; only the first three count
    let mut server = h.servers.accept().await;
    server.stop_reading();

    let seen = events_until(&mut events, "close").await;
    assert_eq!(
        names_of(&seen),
        ["connection", "error", "error", "error", "connection_failure", "close"]
    );

    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.phase, SessionPhase::Reconnecting);
    assert_eq!(snapshot.reconnect_attempts, 1);
    assert_eq!(snapshot.consecutive_errors, 3);

    let recorded = h.sink.recorded();
    assert_eq!(recorded.failures, vec![(ROOM, 0, 3)]);
    assert_eq!(recorded.reconnects.len(), 1);
    assert_eq!(
        h.registry.error_log().by_operation("session.transport_error").len(),
        3
    );

    let _second = h.servers.accept().await;
    assert_eq!(h.connector.attempts(), 2);
    h.session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_connection_is_not_retried() {
    let mut h = Harness::builder().spawn();
    let mut events = h.session.subscribe_events();
    h.session.connect().await.unwrap();

    let server = h.servers.accept().await;
    server.push(&frames::connection_established(SOCKET_ID));
    server.push(&frames::pusher_error(4009, "Connection is unauthorized"));

    let seen = events_until(&mut events, "connection_failure").await;
    assert_eq!(
        names_of(&seen),
        ["connection", "error", "close", "connection_failure"]
    );
    match &seen[3] {
        ChatEvent::ConnectionFailure { category, .. } => {
            assert_eq!(*category, ErrorCategory::Auth);
        }
        other => panic!("unexpected {other:?}"),
    }

    h.session.join().await.unwrap();
    assert!(!h.session.snapshot().should_reconnect);
    assert!(h.sink.recorded().reconnects.is_empty());
    assert_eq!(h.connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_counters_reset_after_successful_open() {
    let mut h = Harness::builder().spawn();
    // Exhaust the three connect retries of the first attempt
    h.connector
        .script([ConnectPlan::Refuse, ConnectPlan::Refuse, ConnectPlan::Refuse]);
    let mut events = h.session.subscribe_events();
    h.session.connect().await.unwrap();

    match wait_for(&mut events, "error").await {
        ChatEvent::Error {
            category,
            consecutive_errors,
            ..
        } => {
            assert_eq!(category, ErrorCategory::Network);
            assert_eq!(consecutive_errors, 1);
        }
        other => panic!("unexpected {other:?}"),
    }

    let mut server = h.servers.accept().await;
    assert_eq!(h.connector.attempts(), 4);
    server.subscriptions(5).await;

    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.phase, SessionPhase::Authenticating);
    assert_eq!(snapshot.reconnect_attempts, 0);
    assert_eq!(snapshot.consecutive_errors, 0);
    assert_eq!(snapshot.current_delay, Duration::from_millis(1000));

    assert_eq!(
        h.registry.error_log().by_operation("websocket.connect").len(),
        3
    );
    h.session.close().await;
}

// ============================================================================
// Reconnect budget
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_refused_connects_stop_at_max_reconnects() {
    let h = Harness::builder().refusing().spawn();
    let mut events = h.session.subscribe_events();
    h.session.connect().await.unwrap();

    let seen = events_until(&mut events, "max_reconnects_reached").await;
    assert_eq!(
        seen.last(),
        Some(&ChatEvent::MaxReconnectsReached {
            room_id: ROOM,
            attempts: 10,
        })
    );
    let pending = seen
        .iter()
        .filter(|e| matches!(e, ChatEvent::Connection { .. }))
        .count();
    assert_eq!(pending, 10);
    assert!(!seen.iter().any(|e| e.name() == "close"));

    h.session.join().await.unwrap();
    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.phase, SessionPhase::Closed);
    assert!(!snapshot.should_reconnect);
    assert!(h.session.is_finished());

    let delays: Vec<u64> = h
        .sink
        .recorded()
        .reconnects
        .iter()
        .map(|(_, _, delay)| delay.as_millis() as u64)
        .collect();
    assert_eq!(
        delays,
        [1000, 2000, 4000, 8000, 16_000, 30_000, 30_000, 30_000, 30_000]
    );

    // The connect breaker opened along the way
    let recorded = h.sink.recorded();
    assert!(recorded
        .transitions
        .iter()
        .any(|(name, _, _)| name == "websocket:room:668"));
    assert!(h.session.connect().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_server_closes_count_toward_budget() {
    let mut h = Harness::builder().spawn();
    let mut events = h.session.subscribe_events();
    h.session.connect().await.unwrap();

    for round in 1..=10 {
        let server = h.servers.accept().await;
        server.close(1006, "abnormal closure");
        let seen = events_until(&mut events, "close").await;
        assert_eq!(names_of(&seen), ["connection", "close"], "round {round}");
        drop(server);
    }

    wait_for(&mut events, "max_reconnects_reached").await;
    h.session.join().await.unwrap();
    assert_eq!(h.connector.attempts(), 10);
    assert_eq!(h.sink.recorded().reconnects.len(), 9);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(h.servers.try_accept().is_none());
    assert_eq!(h.connector.attempts(), 10);
}

// ============================================================================
// Close codes
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_fatal_close_code_ends_session() {
    let mut h = Harness::builder().spawn();
    let mut events = h.session.subscribe_events();
    h.session.connect().await.unwrap();

    let server = h.servers.accept().await;
    server.close(4001, "App key not in this cluster");

    let seen = events_until(&mut events, "connection_failure").await;
    assert_eq!(names_of(&seen), ["connection", "close", "connection_failure"]);
    match &seen[2] {
        ChatEvent::ConnectionFailure {
            category, message, ..
        } => {
            assert_eq!(*category, ErrorCategory::Transport);
            assert!(message.contains("4001"));
        }
        other => panic!("unexpected {other:?}"),
    }

    h.session.join().await.unwrap();
    assert_eq!(h.session.state(), SessionPhase::Closed);
    assert!(h.sink.recorded().reconnects.is_empty());
    assert_eq!(h.connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_immediate_close_code_reconnects_without_delay() {
    let mut h = Harness::builder().spawn();
    let mut events = h.session.subscribe_events();
    h.session.connect().await.unwrap();

    let server = h.servers.accept().await;
    let closed_at = tokio::time::Instant::now();
    server.close(4200, "Generic reconnect immediately");
    wait_for(&mut events, "close").await;

    let _second = h.servers.accept().await;
    assert!(closed_at.elapsed() < Duration::from_millis(10));
    assert_eq!(
        h.sink.recorded().reconnects,
        vec![(ROOM, 1, Duration::ZERO)]
    );

    h.session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_pusher_error_frames_count_as_errors() {
    let mut h = Harness::builder().spawn();
    let mut events = h.session.subscribe_events();
    h.session.connect().await.unwrap();

    let server = h.servers.accept().await;
    server.push(&frames::pusher_error(4201, "Pong reply not received"));

    match wait_for(&mut events, "error").await {
        ChatEvent::Error {
            message,
            consecutive_errors,
            ..
        } => {
            assert!(message.contains("Pong reply not received"));
            assert_eq!(consecutive_errors, 1);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(h.session.snapshot().consecutive_errors, 1);

    h.session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_quiet_server_is_pinged_then_dropped() {
    let mut h = Harness::builder().spawn();
    let mut events = h.session.subscribe_events();
    h.session.connect().await.unwrap();

    let mut server = h.servers.accept().await;
    server.push(&frames::connection_established(SOCKET_ID));
    server.subscriptions(5).await;
    server.push(&frames::subscription_succeeded(PRIMARY));
    wait_for(&mut events, "connection").await;
    wait_for(&mut events, "connection").await;

    // activity_timeout is 120s in the fixture frame
    let quiet_since = tokio::time::Instant::now();
    server.expect(names::PING).await;
    assert_eq!(quiet_since.elapsed(), Duration::from_secs(120));

    let seen = events_until(&mut events, "close").await;
    assert_eq!(names_of(&seen), ["close"]);
    assert_eq!(quiet_since.elapsed(), Duration::from_secs(150));
    assert!(server.released().await);

    let _second = h.servers.accept().await;
    assert_eq!(h.sink.recorded().reconnects.len(), 1);
    h.session.close().await;
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_close_unsubscribes_then_releases_transport() {
    let mut h = Harness::builder().spawn();
    let mut events = h.session.subscribe_events();
    h.session.connect().await.unwrap();

    let mut server = h.servers.accept().await;
    server.subscriptions(5).await;

    h.session.close().await;

    let mut unsubscribed = Vec::new();
    while let Some(frame) = server.recv().await {
        assert!(frame.is(names::UNSUBSCRIBE));
        let data = frame.data_json().unwrap();
        unsubscribed.push(data["channel"].as_str().unwrap().to_string());
    }
    unsubscribed.sort();
    let mut expected = public_channels();
    expected.sort();
    assert_eq!(unsubscribed, expected);

    match wait_for(&mut events, "close").await {
        ChatEvent::Close { code, reason, .. } => {
            assert_eq!(code, Some(1000));
            assert_eq!(reason, "closed by client");
        }
        other => panic!("unexpected {other:?}"),
    }
    h.session.join().await.unwrap();
    assert_eq!(h.session.snapshot().subscribed_channels, 0);
}

#[tokio::test(start_paused = true)]
async fn test_close_during_backoff_cancels_reconnect() {
    let mut h = Harness::builder().spawn();
    let mut events = h.session.subscribe_events();
    h.session.connect().await.unwrap();

    let server = h.servers.accept().await;
    server.close(1006, "abnormal closure");
    wait_for(&mut events, "close").await;
    assert_eq!(h.session.state(), SessionPhase::Reconnecting);

    h.session.close().await;
    assert_eq!(h.session.state(), SessionPhase::Closed);

    // Well past the scheduled reconnect
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.connector.attempts(), 1);
    assert!(h.servers.try_accept().is_none());
    h.session.join().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_handshake_deadline_drops_silent_connection() {
    let reconnect = chat_common::ReconnectConfig {
        handshake_timeout_ms: Some(5_000),
        ..Default::default()
    };
    let mut h = Harness::builder().reconnect(reconnect).spawn();
    let mut events = h.session.subscribe_events();
    h.session.connect().await.unwrap();

    let mut server = h.servers.accept().await;
    server.subscriptions(5).await;

    let seen = events_until(&mut events, "close").await;
    assert_eq!(names_of(&seen), ["connection", "error", "close"]);
    match &seen[1] {
        ChatEvent::Error { category, .. } => assert_eq!(*category, ErrorCategory::Transport),
        other => panic!("unexpected {other:?}"),
    }
    assert!(server.released().await);

    let _second = h.servers.accept().await;
    h.session.close().await;
}
