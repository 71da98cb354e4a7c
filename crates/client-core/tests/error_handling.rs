//! Error taxonomy as seen from the outside: fatal errors block, peer
//! terminations notify and tear down, side-channel failures only log.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use duocall_client_core::events::notice;
use duocall_client_core::{
    CallEvent, CallState, ClientBuilder, ClientConfig, ClientError, ClientResult, LoopbackHub,
    MemoryRoleStore, Notifier, NoticeLevel, RoleStore, StaticMediaProvider,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("duocall_client_core=debug")
        .with_test_writer()
        .try_init();
}

fn drain(rx: &mut broadcast::Receiver<CallEvent>) -> Vec<CallEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

fn fatal_notices(events: &[CallEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            CallEvent::Notice {
                level: NoticeLevel::Fatal,
                message,
            } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

/// Notifier whose side channel is always down
#[derive(Default)]
struct BrokenNotifier {
    calls: AtomicUsize,
}

#[async_trait]
impl Notifier for BrokenNotifier {
    async fn notify_call_start(&self) -> ClientResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ClientError::notifier_failed("503 Service Unavailable"))
    }
}

#[tokio::test(start_paused = true)]
async fn test_media_denied_blocks_and_binds_nothing() {
    init_tracing();
    let hub = LoopbackHub::new();
    let client = ClientBuilder::new()
        .transport_provider(Arc::new(hub.transport()))
        .media_provider(Arc::new(StaticMediaProvider::denied()))
        .role_store(Arc::new(MemoryRoleStore::with_user("chiu")))
        .build()
        .await
        .unwrap();
    let mut events = client.subscribe_events();

    let err = client.initialize().await.unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(err.category(), "media");
    assert_eq!(client.state(), CallState::Failed);
    assert!(!hub.is_registered(&ClientConfig::default().caller_endpoint()));

    let seen = drain(&mut events);
    assert_eq!(fatal_notices(&seen), vec![notice::MEDIA_DENIED]);
    assert!(!seen.iter().any(|e| matches!(e, CallEvent::NavigateToEntry)));
    assert!(client.start_call().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_provider_error_requires_restart() {
    init_tracing();
    let hub = LoopbackHub::new();
    let client = ClientBuilder::new()
        .transport_provider(Arc::new(hub.transport()))
        .role_store(Arc::new(MemoryRoleStore::with_user("chiu")))
        .build()
        .await
        .unwrap();
    let mut events = client.subscribe_events();
    client.initialize().await.unwrap();
    client.start_call().await.unwrap();

    let endpoint = ClientConfig::default().caller_endpoint();
    assert!(hub.fail_endpoint(&endpoint, "signalling server lost"));

    let snapshot = client.wait_for_state(CallState::Failed).await.unwrap();
    assert!(!snapshot.has_pending_timers());
    assert!(!snapshot.binding_held);
    assert!(!hub.is_registered(&endpoint));

    let seen = drain(&mut events);
    assert_eq!(fatal_notices(&seen), vec![notice::PROVIDER_ERROR]);
    assert!(matches!(
        seen.iter().rev().find(|e| matches!(e, CallEvent::Countdown { .. })),
        Some(CallEvent::Countdown { display: None })
    ));

    // No automatic recovery
    tokio::time::sleep(Duration::from_secs(400)).await;
    assert_eq!(client.state(), CallState::Failed);
    assert!(fatal_notices(&drain(&mut events)).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_notifier_failure_never_blocks() {
    init_tracing();
    let hub = LoopbackHub::new();
    let notifier = Arc::new(BrokenNotifier::default());
    let client = ClientBuilder::new()
        .transport_provider(Arc::new(hub.transport()))
        .notifier(notifier.clone())
        .role_store(Arc::new(MemoryRoleStore::with_user("chiu")))
        .build()
        .await
        .unwrap();
    let mut events = client.subscribe_events();
    client.initialize().await.unwrap();
    client.start_call().await.unwrap();

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
    assert_eq!(client.state(), CallState::WaitingForJoin);
    assert_eq!(client.snapshot().countdown_remaining, Some(298));
    assert!(!drain(&mut events)
        .iter()
        .any(|e| matches!(e, CallEvent::Notice { level: NoticeLevel::Warning | NoticeLevel::Fatal, .. })));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_user_is_redirected() {
    init_tracing();
    let hub = LoopbackHub::new();
    let store = Arc::new(MemoryRoleStore::with_user("mallory"));
    let client = ClientBuilder::new()
        .transport_provider(Arc::new(hub.transport()))
        .role_store(store.clone())
        .build()
        .await
        .unwrap();
    let mut events = client.subscribe_events();

    client.initialize().await.unwrap();
    assert_eq!(client.state(), CallState::Ended);
    assert_eq!(client.snapshot().role, None);

    let seen = drain(&mut events);
    assert!(seen.iter().any(|e| matches!(e, CallEvent::NavigateToEntry)));
    assert!(!seen.iter().any(|e| matches!(e, CallEvent::Welcome { .. })));
    assert!(!seen.iter().any(|e| matches!(e, CallEvent::Notice { .. })));
    assert_eq!(store.current_user().as_deref(), Some("mallory"));
}

#[tokio::test(start_paused = true)]
async fn test_missing_user_is_redirected() {
    let hub = LoopbackHub::new();
    let client = ClientBuilder::new()
        .transport_provider(Arc::new(hub.transport()))
        .build()
        .await
        .unwrap();

    client.initialize().await.unwrap();
    assert_eq!(client.state(), CallState::Ended);
    assert!(matches!(
        client.initialize().await,
        Err(ClientError::InvalidState { state: CallState::Ended, .. })
    ));
}

#[tokio::test]
async fn test_http_notifier_to_dead_endpoint_is_logged_only() {
    init_tracing();
    let hub = LoopbackHub::new();
    let config = ClientConfig::new()
        .with_notifier_endpoint("http://127.0.0.1:9/notify".parse().unwrap());
    let client = ClientBuilder::new()
        .config(config)
        .transport_provider(Arc::new(hub.transport()))
        .role_store(Arc::new(MemoryRoleStore::with_user("chiu")))
        .build()
        .await
        .unwrap();

    client.initialize().await.unwrap();
    client.start_call().await.unwrap();
    assert_eq!(client.state(), CallState::WaitingForJoin);
    client.shutdown().await.unwrap();
    assert_eq!(client.state(), CallState::Ended);
}
