//! Session behaviour over the in-memory transport, with a paused clock.

mod common;

use std::time::Duration;

use rc_core::{EchoPolicy, RcError};
use rc_session::{Origin, SessionEvent};
use rc_socket::ConnectionState;
use tokio::time::Instant;

use common::{log_texts, memory_session, wait_for_log_len, wait_for_status, BASE_DELAY};

// ---- Scenarios ----

#[tokio::test(start_paused = true)]
async fn scenario_start_reaches_open() {
    let (mut session, _connector, _peers) = memory_session(EchoPolicy::KeepAll);
    assert_eq!(session.current_status(), ConnectionState::Disconnected);

    session.start();
    wait_for_status(&mut session, ConnectionState::Open).await;
    assert!(session.current_log().is_empty());
}

#[tokio::test(start_paused = true)]
async fn scenario_submit_appends_local_entry_and_sends_trimmed_frame() {
    let (mut session, _connector, mut peers) = memory_session(EchoPolicy::KeepAll);
    session.start();
    wait_for_status(&mut session, ConnectionState::Open).await;
    let mut peer = peers.next().await;

    let entry = session.submit("  hello  ").await.unwrap();
    assert_eq!(entry.text, "hello");
    assert_eq!(entry.origin, Origin::Local);
    assert_eq!(entry.sequence, 0);

    assert_eq!(session.current_log(), &[entry]);
    assert_eq!(peer.next_sent().await.as_deref(), Some("hello"));
    assert!(peer.try_sent().is_none());
}

#[tokio::test(start_paused = true)]
async fn scenario_blank_submit_is_ignored() {
    let (mut session, _connector, mut peers) = memory_session(EchoPolicy::KeepAll);
    session.start();
    wait_for_status(&mut session, ConnectionState::Open).await;
    let mut peer = peers.next().await;

    let result = session.submit("   ").await;
    assert!(matches!(result, Err(RcError::EmptyMessage)));
    assert!(session.current_log().is_empty());

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(peer.try_sent().is_none());
}

#[tokio::test(start_paused = true)]
async fn scenario_inbound_frame_appends_remote_entry() {
    let (mut session, _connector, mut peers) = memory_session(EchoPolicy::KeepAll);
    session.start();
    wait_for_status(&mut session, ConnectionState::Open).await;
    let peer = peers.next().await;

    session.submit("hello").await.unwrap();
    peer.push_frame("hi");
    wait_for_log_len(&mut session, 2).await;

    let remote = &session.current_log()[1];
    assert_eq!(remote.text, "hi");
    assert_eq!(remote.origin, Origin::Remote);
    assert_eq!(remote.sequence, 1);
}

#[tokio::test(start_paused = true)]
async fn scenario_abrupt_close_fails_then_reconnects_after_base_delay() {
    let (mut session, connector, mut peers) = memory_session(EchoPolicy::KeepAll);
    session.start();
    wait_for_status(&mut session, ConnectionState::Open).await;
    let peer = peers.next().await;
    session.submit("before").await.unwrap();

    peer.break_connection("reset by peer");
    wait_for_status(&mut session, ConnectionState::Failed).await;
    let failed_at = Instant::now();
    assert_eq!(session.current_log().len(), 1);

    wait_for_status(&mut session, ConnectionState::Connecting).await;
    assert!(failed_at.elapsed() >= BASE_DELAY);
    assert_eq!(session.current_log().len(), 1);

    wait_for_status(&mut session, ConnectionState::Open).await;
    assert_eq!(connector.attempts(), 2);
    assert_eq!(session.current_log().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn scenario_submit_while_disconnected_is_rejected() {
    let (mut session, connector, _peers) = memory_session(EchoPolicy::KeepAll);

    let result = session.submit("x").await;
    assert!(matches!(result, Err(RcError::NotConnected)));
    assert!(session.current_log().is_empty());
    assert_eq!(connector.attempts(), 0);
}

// ---- Ordering ----

#[tokio::test(start_paused = true)]
async fn frames_received_before_submit_are_logged_first() {
    let (mut session, _connector, mut peers) = memory_session(EchoPolicy::KeepAll);
    session.start();
    wait_for_status(&mut session, ConnectionState::Open).await;
    let peer = peers.next().await;

    peer.push_frame("a");
    peer.push_frame("b");
    // Let the driver deliver both frames without the session applying them.
    tokio::time::sleep(Duration::from_millis(1)).await;

    session.submit("c").await.unwrap();
    assert_eq!(
        log_texts(&session),
        vec![
            ("a".to_string(), Origin::Remote),
            ("b".to_string(), Origin::Remote),
            ("c".to_string(), Origin::Local),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn sequences_are_contiguous_across_mixed_traffic() {
    let (mut session, _connector, mut peers) = memory_session(EchoPolicy::KeepAll);
    session.start();
    wait_for_status(&mut session, ConnectionState::Open).await;
    let peer = peers.next().await;

    for i in 0..20 {
        if i % 3 == 0 {
            session.submit(&format!("local {i}")).await.unwrap();
        } else {
            peer.push_frame(format!("remote {i}"));
        }
    }
    wait_for_log_len(&mut session, 20).await;

    let sequences: Vec<u64> = session.current_log().iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, (0..20).collect::<Vec<u64>>());
    let locals = session
        .current_log()
        .iter()
        .filter(|e| e.origin == Origin::Local)
        .count();
    assert_eq!(locals, 7);
}

// ---- Failures ----

#[tokio::test(start_paused = true)]
async fn submit_while_failed_is_rejected() {
    let (mut session, connector, _peers) = memory_session(EchoPolicy::KeepAll);
    connector.script(rc_socket::testing::ConnectOutcome::Refuse("refused".into()));
    session.start();
    wait_for_status(&mut session, ConnectionState::Failed).await;

    assert!(matches!(session.submit("x").await, Err(RcError::NotConnected)));
    assert!(session.current_log().is_empty());
}

#[tokio::test(start_paused = true)]
async fn send_failure_keeps_entry_and_publishes_event() {
    let (mut session, _connector, mut peers) = memory_session(EchoPolicy::KeepAll);
    let mut events = session.subscribe();
    session.start();
    wait_for_status(&mut session, ConnectionState::Open).await;
    let peer = peers.next().await;
    peer.fail_sends();

    let result = session.submit("lost").await;
    assert!(matches!(result, Err(RcError::SendFailed(_))));
    assert_eq!(log_texts(&session), vec![("lost".to_string(), Origin::Local)]);

    let mut saw_failure = false;
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::SendFailed { sequence, .. } = event {
            assert_eq!(sequence, 0);
            saw_failure = true;
        }
    }
    assert!(saw_failure);
}

// ---- Stop and close ----

#[tokio::test(start_paused = true)]
async fn no_transitions_after_stop() {
    let (mut session, connector, _peers) = memory_session(EchoPolicy::KeepAll);
    connector.script(rc_socket::testing::ConnectOutcome::Refuse("refused".into()));
    session.start();
    wait_for_status(&mut session, ConnectionState::Failed).await;

    session.stop();
    wait_for_status(&mut session, ConnectionState::Disconnected).await;

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(session.drain_events(), 0);
    assert_eq!(session.current_status(), ConnectionState::Disconnected);
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn submit_after_stop_is_rejected_without_entry() {
    let (mut session, _connector, mut peers) = memory_session(EchoPolicy::KeepAll);
    session.start();
    wait_for_status(&mut session, ConnectionState::Open).await;
    let mut peer = peers.next().await;

    session.stop();
    let result = session.submit("after stop").await;
    assert!(matches!(result, Err(RcError::NotConnected)));
    assert!(session.current_log().is_empty());
    assert_ne!(session.current_status(), ConnectionState::Open);

    wait_for_status(&mut session, ConnectionState::Disconnected).await;
    assert!(peer.try_sent().is_none());
}

#[tokio::test(start_paused = true)]
async fn close_returns_when_transport_stalls() {
    let (mut session, _connector, mut peers) = memory_session(EchoPolicy::KeepAll);
    session.start();
    wait_for_status(&mut session, ConnectionState::Open).await;
    let peer = peers.next().await;
    peer.stall_writes();

    let closed = tokio::time::timeout(Duration::from_secs(60), session.close()).await;
    assert!(closed.is_ok(), "close hung on a stalled transport");
}

#[tokio::test(start_paused = true)]
async fn close_performs_graceful_shutdown() {
    let (mut session, _connector, mut peers) = memory_session(EchoPolicy::KeepAll);
    session.start();
    wait_for_status(&mut session, ConnectionState::Open).await;
    let peer = peers.next().await;

    session.close().await;
    assert!(peer.close_requested());
}

#[tokio::test(start_paused = true)]
async fn dropping_session_releases_socket() {
    let (mut session, _connector, mut peers) = memory_session(EchoPolicy::KeepAll);
    session.start();
    wait_for_status(&mut session, ConnectionState::Open).await;
    let mut peer = peers.next().await;

    drop(session);
    assert!(peer.next_sent().await.is_none());
}

// ---- Session events ----

#[tokio::test(start_paused = true)]
async fn session_events_follow_status_and_log() {
    let (mut session, _connector, mut peers) = memory_session(EchoPolicy::KeepAll);
    let mut events = session.subscribe();
    session.start();
    wait_for_status(&mut session, ConnectionState::Open).await;
    let peer = peers.next().await;
    peer.push_frame("hi");
    wait_for_log_len(&mut session, 1).await;

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0], SessionEvent::StatusChanged(ConnectionState::Connecting));
    assert_eq!(seen[1], SessionEvent::StatusChanged(ConnectionState::Open));
    match &seen[2] {
        SessionEvent::EntryAppended(entry) => assert_eq!(entry.text, "hi"),
        other => panic!("expected EntryAppended, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn reconnect_is_reported_on_the_bus() {
    let (mut session, connector, _peers) = memory_session(EchoPolicy::KeepAll);
    connector.script(rc_socket::testing::ConnectOutcome::Refuse("refused".into()));
    let mut events = session.subscribe();
    session.start();
    wait_for_status(&mut session, ConnectionState::Failed).await;

    // The failure detail and the retry follow the transition itself.
    session.drain_events();

    let mut failed = None;
    let mut scheduled = None;
    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::ConnectionFailed(reason) => failed = Some(reason),
            SessionEvent::ReconnectScheduled { attempt, delay } => scheduled = Some((attempt, delay)),
            _ => {}
        }
    }
    assert!(failed.is_some_and(|r| r.contains("refused")));
    assert_eq!(scheduled, Some((1, BASE_DELAY)));
}

// ---- Echo policy ----

#[tokio::test(start_paused = true)]
async fn keep_all_logs_relay_echo() {
    let (mut session, _connector, mut peers) = memory_session(EchoPolicy::KeepAll);
    session.start();
    wait_for_status(&mut session, ConnectionState::Open).await;
    let peer = peers.next().await;

    session.submit("hello").await.unwrap();
    peer.push_frame("hello");
    wait_for_log_len(&mut session, 2).await;
    assert_eq!(
        log_texts(&session),
        vec![
            ("hello".to_string(), Origin::Local),
            ("hello".to_string(), Origin::Remote),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn suppress_own_drops_exactly_one_echo_per_send() {
    let (mut session, _connector, mut peers) = memory_session(EchoPolicy::SuppressOwn);
    session.start();
    wait_for_status(&mut session, ConnectionState::Open).await;
    let peer = peers.next().await;

    session.submit("hello").await.unwrap();
    peer.push_frame("hello");
    peer.push_frame("hello");
    peer.push_frame("other");
    wait_for_log_len(&mut session, 3).await;
    assert_eq!(
        log_texts(&session),
        vec![
            ("hello".to_string(), Origin::Local),
            ("hello".to_string(), Origin::Remote),
            ("other".to_string(), Origin::Remote),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn suppress_own_forgets_echoes_after_reconnect() {
    let (mut session, _connector, mut peers) = memory_session(EchoPolicy::SuppressOwn);
    session.start();
    wait_for_status(&mut session, ConnectionState::Open).await;
    let peer = peers.next().await;
    session.submit("hello").await.unwrap();

    peer.break_connection("reset");
    wait_for_status(&mut session, ConnectionState::Failed).await;
    wait_for_status(&mut session, ConnectionState::Open).await;
    let peer = peers.next().await;

    peer.push_frame("hello");
    wait_for_log_len(&mut session, 2).await;
    assert_eq!(session.current_log()[1].origin, Origin::Remote);
}

// ---- Isolation ----

#[tokio::test(start_paused = true)]
async fn sessions_do_not_share_state() {
    let (mut first, _c1, mut peers1) = memory_session(EchoPolicy::KeepAll);
    let (mut second, _c2, mut peers2) = memory_session(EchoPolicy::KeepAll);
    first.start();
    second.start();
    wait_for_status(&mut first, ConnectionState::Open).await;
    wait_for_status(&mut second, ConnectionState::Open).await;
    let peer1 = peers1.next().await;
    let mut peer2 = peers2.next().await;

    peer1.push_frame("only for first");
    first.submit("from first").await.unwrap();
    wait_for_log_len(&mut first, 2).await;

    tokio::time::sleep(Duration::from_millis(10)).await;
    second.drain_events();
    assert!(second.current_log().is_empty());
    assert!(peer2.try_sent().is_none());

    first.stop();
    wait_for_status(&mut first, ConnectionState::Disconnected).await;
    second.drain_events();
    assert_eq!(second.current_status(), ConnectionState::Open);
}
