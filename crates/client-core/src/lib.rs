//! # duocall-client-core
//!
//! Two-party call lifecycle client. One process plays one role:
//!
//! - the **caller** registers at a well-known endpoint, notifies the other
//!   side through a best-effort side channel and waits a bounded time for
//!   them to join
//! - the **callee** reaches out towards that endpoint and retries on a
//!   constant delay until it connects or gives up
//!
//! Media capture, transport negotiation, the call-start notifier and the
//! session-scoped role store are all capabilities behind traits, so the
//! controller can run against real providers, the in-process
//! [`LoopbackHub`], or scripted test doubles.
//!
//! ## Quick Start
//!
//! ```rust
//! use duocall_client_core::{CallEvent, ClientBuilder, LoopbackHub, MemoryRoleStore};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let hub = LoopbackHub::new();
//! let caller = ClientBuilder::new()
//!     .transport_provider(Arc::new(hub.transport()))
//!     .role_store(Arc::new(MemoryRoleStore::with_user("chiu")))
//!     .build()
//!     .await?;
//!
//! let mut events = caller.subscribe_events();
//! caller.initialize().await?;
//! if let Ok(CallEvent::Welcome { user, .. }) = events.recv().await {
//!     println!("Welcome, {user}");
//! }
//! caller.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod call;
pub mod client;
pub mod error;
pub mod events;
pub mod media;
pub mod notifier;
pub mod role;
pub mod transport;

pub use call::{CallState, Role, StateMachine};
pub use client::builder::ClientBuilder;
pub use client::config::{ClientConfig, NotifierConfig, RoleNames, DEFAULT_CALLER_ENDPOINT};
pub use client::controller::{CallController, ControllerEvent, Providers, TeardownReason};
pub use client::countdown::{format_remaining, CountdownConfig};
pub use client::recovery::{RetryDecision, RetryPolicy};
pub use client::types::ControllerSnapshot;
pub use client::CallClient;
pub use error::{ClientError, ClientResult, ErrorSeverity};
pub use events::{CallEvent, ControlsView, NoticeLevel};
pub use media::{LocalMedia, MediaConstraints, MediaProvider, StaticMediaProvider};
pub use notifier::{HttpNotifier, NoopNotifier, Notifier};
pub use role::{resolve_role, MemoryRoleStore, RoleStore};
pub use transport::{
    EndpointId, LoopbackHub, LoopbackTransport, Registration, RemoteStream, SessionHandle,
    SessionId, TransportBinding, TransportEvent, TransportEvents, TransportProvider,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
