//! End-to-end call lifecycle tests over the loopback transport
//!
//! Both roles run as real `CallClient` event loops on paused tokio time, so
//! the 5 minute countdown and the 5 second retries take no wall-clock time.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use duocall_client_core::events::{notice, status};
use duocall_client_core::{
    CallClient, CallEvent, CallState, ClientBuilder, ClientConfig, LoopbackHub, MemoryRoleStore,
    NoopNotifier, NoticeLevel, RoleStore,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("duocall_client_core=debug")
        .with_test_writer()
        .try_init();
}

async fn client(hub: &LoopbackHub, user: &str, config: ClientConfig) -> (CallClient, Arc<MemoryRoleStore>) {
    let store = Arc::new(MemoryRoleStore::with_user(user));
    let client = ClientBuilder::new()
        .config(config)
        .transport_provider(Arc::new(hub.transport()))
        .notifier(Arc::new(NoopNotifier::new()))
        .role_store(store.clone())
        .build()
        .await
        .expect("client should build");
    (client, store)
}

/// Everything already delivered to `rx`
fn drain(rx: &mut broadcast::Receiver<CallEvent>) -> Vec<CallEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

fn countdown_displays(events: &[CallEvent]) -> Vec<Option<String>> {
    events
        .iter()
        .filter_map(|e| match e {
            CallEvent::Countdown { display } => Some(display.clone()),
            _ => None,
        })
        .collect()
}

fn notice_count(events: &[CallEvent], message: &str) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, CallEvent::Notice { message: m, .. } if m == message))
        .count()
}

fn navigations(events: &[CallEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, CallEvent::NavigateToEntry))
        .count()
}

#[tokio::test(start_paused = true)]
async fn test_caller_and_callee_connect() {
    init_tracing();
    let hub = LoopbackHub::new();
    let (caller, _) = client(&hub, "chiu", ClientConfig::default()).await;
    let (callee, _) = client(&hub, "admin", ClientConfig::default()).await;
    let mut caller_events = caller.subscribe_events();
    let mut callee_events = callee.subscribe_events();

    caller.initialize().await.unwrap();
    callee.initialize().await.unwrap();
    assert!(hub.is_registered(&ClientConfig::default().caller_endpoint()));

    caller.start_call().await.unwrap();
    assert_eq!(caller.state(), CallState::WaitingForJoin);
    callee.join_call().await.unwrap();
    assert_eq!(callee.state(), CallState::Searching);

    let caller_snapshot = caller.wait_for_state(CallState::Connected).await.unwrap();
    let callee_snapshot = callee.wait_for_state(CallState::Connected).await.unwrap();
    assert!(caller_snapshot.connected_at.is_some());
    assert_eq!(caller_snapshot.countdown_remaining, None);
    assert_eq!(callee_snapshot.retry_attempts, 0);
    assert!(!callee_snapshot.retry_pending);

    // Let both remote streams arrive
    tokio::time::sleep(Duration::from_millis(10)).await;
    let caller_seen = drain(&mut caller_events);
    let callee_seen = drain(&mut callee_events);
    assert!(caller_seen.iter().any(|e| matches!(e, CallEvent::RemoteStreamBound { .. })));
    assert!(callee_seen.iter().any(|e| matches!(e, CallEvent::RemoteStreamBound { .. })));
    assert_eq!(hub.connect_attempts(), 1);
    assert_eq!(hub.open_sessions(), 2);

    // Caller hangs up, callee is told and torn down
    caller.end_call().await.unwrap();
    assert_eq!(caller.state(), CallState::Ended);
    callee.wait_for_state(CallState::Ended).await.unwrap();

    let callee_seen = drain(&mut callee_events);
    assert_eq!(notice_count(&callee_seen, notice::REMOTE_CLOSED), 1);
    assert_eq!(navigations(&callee_seen), 1);
    assert_eq!(hub.open_sessions(), 0);
    assert!(!hub.is_registered(&ClientConfig::default().caller_endpoint()));
}

#[tokio::test(start_paused = true)]
async fn test_countdown_expires_after_five_minutes() {
    init_tracing();
    let hub = LoopbackHub::new();
    let (caller, store) = client(&hub, "chiu", ClientConfig::default()).await;
    let mut events = caller.subscribe_events();

    caller.initialize().await.unwrap();
    let started = tokio::time::Instant::now();
    caller.start_call().await.unwrap();

    let snapshot = caller.wait_for_state(CallState::Expired).await.unwrap();
    assert_eq!(started.elapsed(), Duration::from_secs(300));
    assert!(snapshot.torn_down);
    assert!(!snapshot.has_pending_timers());
    assert!(!snapshot.binding_held);

    let seen = drain(&mut events);
    let displays = countdown_displays(&seen);
    let shown: Vec<String> = displays.iter().flatten().cloned().collect();
    assert_eq!(shown.len(), 301);
    assert_eq!(shown.first().map(String::as_str), Some("5:00"));
    assert_eq!(shown.last().map(String::as_str), Some("0:00"));
    assert!(shown.contains(&"4:05".to_string()));
    assert!(shown.contains(&"0:09".to_string()));
    let expected: Vec<String> = (0..=300u32)
        .rev()
        .map(|s| format!("{}:{:02}", s / 60, s % 60))
        .collect();
    assert_eq!(shown, expected);
    assert_eq!(displays.last(), Some(&None));

    assert_eq!(notice_count(&seen, notice::STILL_WAITING), 1);
    assert_eq!(notice_count(&seen, notice::EXPIRED), 1);
    assert_eq!(navigations(&seen), 1);
    assert_eq!(store.current_user(), None);
    assert!(!hub.is_registered(&ClientConfig::default().caller_endpoint()));

    // Nothing fires after teardown and teardown is not repeated
    tokio::time::sleep(Duration::from_secs(600)).await;
    caller.end_call().await.unwrap();
    caller.shutdown().await.unwrap();
    let after = drain(&mut events);
    assert!(countdown_displays(&after).is_empty());
    assert_eq!(navigations(&after), 0);
    assert_eq!(caller.state(), CallState::Expired);
}

#[tokio::test(start_paused = true)]
async fn test_callee_finds_caller_that_comes_online_late() {
    init_tracing();
    let hub = LoopbackHub::new();
    let (callee, _) = client(&hub, "admin", ClientConfig::default()).await;
    let mut events = callee.subscribe_events();
    callee.initialize().await.unwrap();
    callee.join_call().await.unwrap();

    // Two failed attempts with nobody registered at the caller endpoint
    tokio::time::sleep(Duration::from_secs(8)).await;
    assert_eq!(callee.state(), CallState::Searching);
    assert_eq!(callee.snapshot().retry_attempts, 2);

    let (caller, _) = client(&hub, "chiu", ClientConfig::default()).await;
    caller.initialize().await.unwrap();
    caller.start_call().await.unwrap();

    callee.wait_for_state(CallState::Connected).await.unwrap();
    caller.wait_for_state(CallState::Connected).await.unwrap();
    assert_eq!(hub.connect_attempts(), 3);
    assert!(!callee.snapshot().retry_pending);

    let seen = drain(&mut events);
    let statuses: Vec<String> = seen
        .iter()
        .filter_map(|e| match e {
            CallEvent::Status { text } => Some(text.clone()),
            _ => None,
        })
        .collect();
    assert!(statuses.contains(&status::retrying(1, 12)));
    assert!(statuses.contains(&status::retrying(2, 12)));
    assert_eq!(statuses.last().map(String::as_str), Some(status::CONNECTED));
}

#[tokio::test(start_paused = true)]
async fn test_callee_gives_up_then_rejoins() {
    init_tracing();
    let hub = LoopbackHub::new();
    let (callee, _) = client(&hub, "admin", ClientConfig::default()).await;
    let mut events = callee.subscribe_events();
    callee.initialize().await.unwrap();
    callee.join_call().await.unwrap();

    let snapshot = callee.wait_for_state(CallState::GaveUp).await.unwrap();
    assert_eq!(hub.connect_attempts(), 13);
    assert!(!snapshot.retry_pending);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(hub.connect_attempts(), 13);

    let seen = drain(&mut events);
    assert_eq!(notice_count(&seen, notice::GAVE_UP), 1);
    assert!(seen.iter().any(|e| matches!(
        e,
        CallEvent::Controls(view) if view.join_visible
    )));

    callee.join_call().await.unwrap();
    assert_eq!(callee.state(), CallState::Searching);
    assert_eq!(callee.snapshot().retry_attempts, 0);
    assert_eq!(hub.connect_attempts(), 14);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_client_runs_unload_teardown() {
    init_tracing();
    let hub = LoopbackHub::new();
    let (caller, store) = client(&hub, "chiu", ClientConfig::default()).await;
    let mut events = caller.subscribe_events();
    caller.initialize().await.unwrap();
    caller.start_call().await.unwrap();

    drop(caller);

    let mut navigated = false;
    loop {
        match events.recv().await {
            Ok(CallEvent::NavigateToEntry) => navigated = true,
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    assert!(navigated);
    assert_eq!(store.current_user(), None);
    assert!(!hub.is_registered(&ClientConfig::default().caller_endpoint()));
}

#[tokio::test(start_paused = true)]
async fn test_commands_after_shutdown_fail() {
    let hub = LoopbackHub::new();
    let (callee, _) = client(&hub, "admin", ClientConfig::default()).await;
    callee.initialize().await.unwrap();
    callee.shutdown().await.unwrap();

    assert_eq!(callee.state(), CallState::Ended);
    assert!(matches!(
        callee.join_call().await,
        Err(duocall_client_core::ClientError::ClientStopped)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_only_one_caller_endpoint() {
    let hub = LoopbackHub::new();
    let (first, _) = client(&hub, "chiu", ClientConfig::default()).await;
    let (second, _) = client(&hub, "chiu", ClientConfig::default()).await;
    let mut events = second.subscribe_events();

    first.initialize().await.unwrap();
    let result = second.initialize().await;

    assert!(matches!(
        result,
        Err(duocall_client_core::ClientError::EndpointUnavailable { .. })
    ));
    assert_eq!(second.state(), CallState::Failed);
    let seen = drain(&mut events);
    assert!(seen.iter().any(|e| e.is_notice(NoticeLevel::Fatal)));
}
