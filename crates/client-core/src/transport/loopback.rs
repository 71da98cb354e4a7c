//! In-process transport provider
//!
//! Every [`LoopbackTransport`] created from the same [`LoopbackHub`] can
//! reach the others. Sessions behave like a real signalling provider:
//!
//! - binding a fixed identifier that is already taken fails the bind
//! - calling an endpoint that is not registered fails the session after the
//!   negotiation delay with "peer unavailable"
//! - answering delivers each side's media to the other as a remote stream
//! - closing one leg reports `SessionClosed` to the other leg's owner
//! - releasing a binding unregisters it and closes every leg it owns

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, trace};
use uuid::Uuid;

use super::{
    EndpointId, Registration, RemoteStream, SessionHandle, SessionId, TransportBinding,
    TransportEvent, TransportEvents, TransportProvider,
};
use crate::error::{ClientError, ClientResult};
use crate::media::LocalMedia;

const DEFAULT_NEGOTIATION_DELAY: Duration = Duration::from_millis(500);

struct Registered {
    binding: Uuid,
    events: TransportEvents,
}

struct Leg {
    id: SessionId,
    owner: EndpointId,
    binding: Uuid,
    remote: Option<EndpointId>,
    peer: Mutex<Option<SessionId>>,
    media: Mutex<Option<LocalMedia>>,
    open: AtomicBool,
}

struct HubInner {
    endpoints: DashMap<EndpointId, Registered>,
    legs: DashMap<SessionId, Arc<Leg>>,
    negotiation_delay: Duration,
    connect_attempts: AtomicUsize,
}

impl HubInner {
    fn leg(&self, id: &SessionId) -> Option<Arc<Leg>> {
        self.legs.get(id).map(|entry| entry.value().clone())
    }

    /// Events sink of the binding that currently owns `endpoint`
    fn sink_for(&self, endpoint: &EndpointId, binding: Uuid) -> Option<TransportEvents> {
        self.endpoints
            .get(endpoint)
            .filter(|entry| entry.binding == binding)
            .map(|entry| entry.events.clone())
    }

    fn emit_to(&self, leg: &Leg, event: TransportEvent) {
        if let Some(sink) = self.sink_for(&leg.owner, leg.binding) {
            sink.emit(event);
        }
    }

    /// Close `id` locally and report the hangup to its peer
    fn close_leg(&self, id: &SessionId) {
        let Some(leg) = self.leg(id) else { return };
        if !leg.open.swap(false, Ordering::SeqCst) {
            return;
        }
        self.legs.remove(id);
        trace!(session_id = %id, owner = %leg.owner, "Loopback leg closed");

        let peer_id = *leg.peer.lock();
        if let Some(peer) = peer_id.and_then(|p| self.leg(&p)) {
            if peer.open.swap(false, Ordering::SeqCst) {
                self.legs.remove(&peer.id);
                self.emit_to(&peer, TransportEvent::SessionClosed { session_id: peer.id });
            }
        }
    }

    /// Fail a still-negotiating leg
    fn fail_leg(&self, leg: &Leg, reason: String) {
        if leg.open.swap(false, Ordering::SeqCst) {
            self.legs.remove(&leg.id);
            self.emit_to(leg, TransportEvent::SessionError { session_id: leg.id, reason });
        }
    }
}

/// Shared rendezvous point for loopback transports
#[derive(Clone)]
pub struct LoopbackHub {
    inner: Arc<HubInner>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::with_negotiation_delay(DEFAULT_NEGOTIATION_DELAY)
    }

    pub fn with_negotiation_delay(delay: Duration) -> Self {
        Self {
            inner: Arc::new(HubInner {
                endpoints: DashMap::new(),
                legs: DashMap::new(),
                negotiation_delay: delay,
                connect_attempts: AtomicUsize::new(0),
            }),
        }
    }

    /// Create a provider attached to this hub
    pub fn transport(&self) -> LoopbackTransport {
        LoopbackTransport { hub: self.clone() }
    }

    pub fn is_registered(&self, endpoint: &EndpointId) -> bool {
        self.inner.endpoints.contains_key(endpoint)
    }

    /// Number of legs that are still open
    pub fn open_sessions(&self) -> usize {
        self.inner
            .legs
            .iter()
            .filter(|entry| entry.value().open.load(Ordering::SeqCst))
            .count()
    }

    /// Number of outgoing connects seen by the hub
    pub fn connect_attempts(&self) -> usize {
        self.inner.connect_attempts.load(Ordering::SeqCst)
    }

    /// Report a provider-level failure to whoever holds `endpoint`
    pub fn fail_endpoint(&self, endpoint: &EndpointId, reason: impl Into<String>) -> bool {
        let sink = self.inner.endpoints.get(endpoint).map(|e| e.events.clone());
        match sink {
            Some(sink) => {
                sink.emit(TransportEvent::ProviderError { reason: reason.into() });
                true
            }
            None => false,
        }
    }
}

impl Default for LoopbackHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Transport provider backed by a [`LoopbackHub`]
#[derive(Clone)]
pub struct LoopbackTransport {
    hub: LoopbackHub,
}

#[async_trait]
impl TransportProvider for LoopbackTransport {
    async fn bind(
        &self,
        registration: Registration,
        events: TransportEvents,
    ) -> ClientResult<Box<dyn TransportBinding>> {
        let endpoint = match registration {
            Registration::Fixed(id) => id,
            Registration::Assigned => EndpointId::generate(),
        };
        let binding = Uuid::new_v4();

        match self.hub.inner.endpoints.entry(endpoint.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(ClientError::EndpointUnavailable {
                    endpoint: endpoint.to_string(),
                });
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Registered { binding, events });
            }
        }

        debug!(endpoint = %endpoint, "Loopback endpoint registered");
        Ok(Box::new(LoopbackBinding {
            hub: self.hub.inner.clone(),
            endpoint,
            binding,
            released: AtomicBool::new(false),
        }))
    }
}

struct LoopbackBinding {
    hub: Arc<HubInner>,
    endpoint: EndpointId,
    binding: Uuid,
    released: AtomicBool,
}

#[async_trait]
impl TransportBinding for LoopbackBinding {
    fn local_endpoint(&self) -> &EndpointId {
        &self.endpoint
    }

    async fn connect(
        &self,
        remote: &EndpointId,
        media: &LocalMedia,
    ) -> ClientResult<Box<dyn SessionHandle>> {
        if self.released.load(Ordering::SeqCst) {
            return Err(ClientError::transport_failed("binding already released"));
        }
        self.hub.connect_attempts.fetch_add(1, Ordering::SeqCst);

        let leg = Arc::new(Leg {
            id: SessionId::new(),
            owner: self.endpoint.clone(),
            binding: self.binding,
            remote: Some(remote.clone()),
            peer: Mutex::new(None),
            media: Mutex::new(Some(media.clone())),
            open: AtomicBool::new(true),
        });
        self.hub.legs.insert(leg.id, leg.clone());

        let hub = self.hub.clone();
        let outgoing = leg.clone();
        let target = remote.clone();
        tokio::spawn(async move {
            tokio::time::sleep(hub.negotiation_delay).await;
            if !outgoing.open.load(Ordering::SeqCst) {
                return;
            }

            let callee_side = hub
                .endpoints
                .get(&target)
                .map(|entry| (entry.binding, entry.events.clone()));
            let Some((binding, sink)) = callee_side else {
                hub.fail_leg(&outgoing, format!("peer unavailable: could not connect to {target}"));
                return;
            };

            let incoming = Arc::new(Leg {
                id: SessionId::new(),
                owner: target.clone(),
                binding,
                remote: Some(outgoing.owner.clone()),
                peer: Mutex::new(Some(outgoing.id)),
                media: Mutex::new(None),
                open: AtomicBool::new(true),
            });
            *outgoing.peer.lock() = Some(incoming.id);
            hub.legs.insert(incoming.id, incoming.clone());

            trace!(from = %outgoing.owner, to = %target, "Loopback session offered");
            sink.emit(TransportEvent::IncomingSession(Box::new(LoopbackSession {
                hub: hub.clone(),
                id: incoming.id,
                remote: incoming.remote.clone(),
            })));
        });

        Ok(Box::new(LoopbackSession {
            hub: self.hub.clone(),
            id: leg.id,
            remote: leg.remote.clone(),
        }))
    }

    fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }

        let owned: Vec<SessionId> = self
            .hub
            .legs
            .iter()
            .filter(|entry| entry.value().binding == self.binding)
            .map(|entry| *entry.key())
            .collect();
        for id in owned {
            self.hub.close_leg(&id);
        }

        self.hub
            .endpoints
            .remove_if(&self.endpoint, |_, entry| entry.binding == self.binding);
        debug!(endpoint = %self.endpoint, "Loopback endpoint released");
    }
}

struct LoopbackSession {
    hub: Arc<HubInner>,
    id: SessionId,
    remote: Option<EndpointId>,
}

#[async_trait]
impl SessionHandle for LoopbackSession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn remote(&self) -> Option<&EndpointId> {
        self.remote.as_ref()
    }

    fn is_open(&self) -> bool {
        self.hub
            .leg(&self.id)
            .map(|leg| leg.open.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    async fn answer(&self, media: &LocalMedia) -> ClientResult<()> {
        let leg = self
            .hub
            .leg(&self.id)
            .filter(|leg| leg.open.load(Ordering::SeqCst))
            .ok_or_else(|| ClientError::session_failed("session is no longer open"))?;
        *leg.media.lock() = Some(media.clone());

        let peer_id = *leg.peer.lock();
        let peer = peer_id
            .and_then(|id| self.hub.leg(&id))
            .filter(|peer| peer.open.load(Ordering::SeqCst))
            .ok_or_else(|| ClientError::session_failed("remote side hung up"))?;
        let peer_media = peer.media.lock().clone();

        // Each side receives the other side's capture as its remote stream
        if let Some(peer_media) = peer_media {
            self.hub.emit_to(
                &leg,
                TransportEvent::StreamReceived {
                    session_id: leg.id,
                    stream: stream_from(&peer_media),
                },
            );
        }
        self.hub.emit_to(
            &peer,
            TransportEvent::StreamReceived {
                session_id: peer.id,
                stream: stream_from(media),
            },
        );
        Ok(())
    }

    fn close(&self) {
        self.hub.close_leg(&self.id);
    }
}

fn stream_from(media: &LocalMedia) -> RemoteStream {
    RemoteStream {
        id: media.id.to_string(),
        audio: media.audio,
        video: media.video,
    }
}
