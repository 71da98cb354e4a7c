//! Transport provider capability
//!
//! Endpoint registration and peer session negotiation happen outside this
//! crate. A provider binds once per role, hands out session handles and
//! reports everything that happens to them as [`TransportEvent`]s.
//!
//! ```text
//! TransportProvider::bind ──► TransportBinding ──connect──► SessionHandle
//!          │                                                    │
//!          └──────────── TransportEvents (one queue) ◄──────────┘
//! ```

pub mod loopback;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::ClientResult;
use crate::media::LocalMedia;

pub use loopback::{LoopbackHub, LoopbackTransport};

/// Identifier an endpoint is registered under
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointId(pub String);

impl EndpointId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Random identifier, used for provider-assigned registrations
    pub fn generate() -> Self {
        Self(format!("peer-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one session attempt or instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How an endpoint registers with the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// Stable, well-known identifier (caller)
    Fixed(EndpointId),
    /// Identifier chosen by the provider (callee)
    Assigned,
}

/// Media received from the remote side of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStream {
    pub id: String,
    pub audio: bool,
    pub video: bool,
}

/// Everything a provider can report
pub enum TransportEvent {
    /// A remote endpoint opened a session towards us
    IncomingSession(Box<dyn SessionHandle>),
    /// Remote media started flowing on a session
    StreamReceived { session_id: SessionId, stream: RemoteStream },
    /// The session was closed by the remote side
    SessionClosed { session_id: SessionId },
    /// The session failed (during negotiation or mid-call)
    SessionError { session_id: SessionId, reason: String },
    /// Provider-level failure, not tied to a session
    ProviderError { reason: String },
}

impl fmt::Debug for TransportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportEvent::IncomingSession(session) => f
                .debug_struct("IncomingSession")
                .field("session_id", &session.id())
                .field("remote", &session.remote())
                .finish(),
            TransportEvent::StreamReceived { session_id, stream } => f
                .debug_struct("StreamReceived")
                .field("session_id", session_id)
                .field("stream", stream)
                .finish(),
            TransportEvent::SessionClosed { session_id } => f
                .debug_struct("SessionClosed")
                .field("session_id", session_id)
                .finish(),
            TransportEvent::SessionError { session_id, reason } => f
                .debug_struct("SessionError")
                .field("session_id", session_id)
                .field("reason", reason)
                .finish(),
            TransportEvent::ProviderError { reason } => f
                .debug_struct("ProviderError")
                .field("reason", reason)
                .finish(),
        }
    }
}

/// Sink a provider reports its events into
#[derive(Clone)]
pub struct TransportEvents {
    sink: Arc<dyn Fn(TransportEvent) + Send + Sync>,
}

impl TransportEvents {
    pub fn new(sink: impl Fn(TransportEvent) + Send + Sync + 'static) -> Self {
        Self { sink: Arc::new(sink) }
    }

    /// Sink backed by an unbounded channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let events = Self::new(move |event| {
            let _ = tx.send(event);
        });
        (events, rx)
    }

    pub fn emit(&self, event: TransportEvent) {
        (self.sink)(event);
    }
}

impl fmt::Debug for TransportEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TransportEvents")
    }
}

/// Binds an endpoint for one role
#[async_trait]
pub trait TransportProvider: Send + Sync {
    async fn bind(
        &self,
        registration: Registration,
        events: TransportEvents,
    ) -> ClientResult<Box<dyn TransportBinding>>;
}

/// A live registration with the provider. Once released it cannot be reused.
#[async_trait]
pub trait TransportBinding: Send + Sync {
    fn local_endpoint(&self) -> &EndpointId;

    /// Open a session towards `remote`. The handle is returned before
    /// negotiation finishes; the outcome arrives as a [`TransportEvent`].
    async fn connect(
        &self,
        remote: &EndpointId,
        media: &LocalMedia,
    ) -> ClientResult<Box<dyn SessionHandle>>;

    /// Drop the registration and every session it still owns
    fn release(&self);
}

/// One peer session
#[async_trait]
pub trait SessionHandle: Send + Sync {
    fn id(&self) -> SessionId;

    /// Remote endpoint, if known
    fn remote(&self) -> Option<&EndpointId>;

    fn is_open(&self) -> bool;

    /// Answer an incoming session with local media
    async fn answer(&self, media: &LocalMedia) -> ClientResult<()>;

    fn close(&self);
}
