//! Call lifecycle controller
//!
//! [`CallController`] is the single owned context of one call: the resolved
//! role, the transport binding, local media, the current session and the
//! retry or countdown state. Every input (user commands, transport events and
//! timer firings) goes through one of its methods, one at a time, and each
//! method checks the current state before acting. Anything arriving in a
//! state where it means nothing is logged and dropped.
//!
//! # Caller
//!
//! ```text
//! Idle ──start──► Notifying ──► WaitingForJoin ──incoming──► Connected
//!                                     │
//!                                     └──countdown 0──► Expired (teardown)
//! ```
//!
//! # Callee
//!
//! ```text
//! Idle ──join──► Searching ──stream──► Connected
//!                  │    ▲
//!      error/close │    │ retry timer (constant delay)
//!                  ▼    │
//!              record_failure ──bound exceeded──► GaveUp ──join──► Searching
//! ```

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use super::config::ClientConfig;
use super::countdown::CountdownState;
use super::recovery::{RetryDecision, RetryState};
use super::timer::{TimerFactory, TimerFired, TimerKind};
use super::types::ControllerSnapshot;
use crate::call::{CallState, Role, StateMachine};
use crate::error::{ClientError, ClientResult};
use crate::events::{notice, status, CallEvent, ControlsView, NoticeLevel};
use crate::media::{LocalMedia, MediaConstraints, MediaProvider};
use crate::notifier::Notifier;
use crate::role::{resolve_role, RoleStore};
use crate::transport::{
    Registration, RemoteStream, SessionHandle, SessionId, TransportBinding, TransportEvent,
    TransportEvents, TransportProvider,
};

/// Everything the controller queue carries besides user commands
#[derive(Debug)]
pub enum ControllerEvent {
    Transport(TransportEvent),
    Timer(TimerFired),
}

/// Why a full teardown was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownReason {
    /// The user pressed "end call"
    UserEnded,
    /// The remote side hung up
    RemoteClosed,
    /// The session failed mid-call
    SessionError,
    /// Nobody joined before the countdown ran out
    Expired,
    /// The process is going away
    Unload,
}

impl fmt::Display for TeardownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            TeardownReason::UserEnded => "user ended",
            TeardownReason::RemoteClosed => "remote closed",
            TeardownReason::SessionError => "session error",
            TeardownReason::Expired => "expired",
            TeardownReason::Unload => "unload",
        };
        f.write_str(reason)
    }
}

/// External capabilities the controller drives
#[derive(Clone)]
pub struct Providers {
    pub media: Arc<dyn MediaProvider>,
    pub transport: Arc<dyn TransportProvider>,
    pub notifier: Arc<dyn Notifier>,
    pub role_store: Arc<dyn RoleStore>,
}

pub struct CallController {
    config: ClientConfig,
    providers: Providers,
    role: Option<Role>,
    user: Option<String>,
    state: CallState,
    media: Option<LocalMedia>,
    binding: Option<Box<dyn TransportBinding>>,
    session: Option<Box<dyn SessionHandle>>,
    retry: Option<RetryState>,
    countdown: Option<CountdownState>,
    timers: TimerFactory,
    queue: mpsc::UnboundedSender<ControllerEvent>,
    events: broadcast::Sender<CallEvent>,
    connected_at: Option<DateTime<Utc>>,
    torn_down: bool,
}

impl CallController {
    /// Create a controller feeding timers and transport events into `queue`
    pub fn new(
        config: ClientConfig,
        providers: Providers,
        queue: mpsc::UnboundedSender<ControllerEvent>,
        events: broadcast::Sender<CallEvent>,
    ) -> Self {
        Self {
            config,
            providers,
            role: None,
            user: None,
            state: CallState::Uninitialized,
            media: None,
            binding: None,
            session: None,
            retry: None,
            countdown: None,
            timers: TimerFactory::new(queue.clone()),
            queue,
            events,
            connected_at: None,
            torn_down: false,
        }
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            role: self.role,
            user: self.user.clone(),
            state: self.state,
            retry_attempts: self.retry.as_ref().map_or(0, RetryState::attempts),
            retry_pending: self.retry.as_ref().is_some_and(RetryState::is_pending),
            countdown_remaining: self.countdown.as_ref().map(CountdownState::remaining),
            grace_pending: self
                .countdown
                .as_ref()
                .is_some_and(CountdownState::grace_pending),
            session_current: self.session.is_some(),
            binding_held: self.binding.is_some(),
            torn_down: self.torn_down,
            connected_at: self.connected_at,
        }
    }

    /// Resolve the role, acquire local media and bind the transport
    pub async fn initialize(&mut self) -> ClientResult<()> {
        if self.state != CallState::Uninitialized {
            return Err(self.rejected("initialize"));
        }

        let user = self.providers.role_store.current_user();
        let Some(role) = resolve_role(&self.config.roles, user.as_deref()) else {
            info!(user = ?user, "No role for current user, returning to entry screen");
            self.transition(CallState::Ended);
            self.torn_down = true;
            self.emit(CallEvent::NavigateToEntry);
            return Ok(());
        };
        let user = user.unwrap_or_default();
        info!(%role, user = %user, "Role resolved");
        self.role = Some(role);
        self.user = Some(user.clone());
        self.emit(CallEvent::Welcome { user, role });

        let media = match self
            .providers
            .media
            .acquire(MediaConstraints::default())
            .await
        {
            Ok(media) => media,
            Err(e) => {
                self.fail(&e);
                return Err(e);
            }
        };
        debug!(media_id = %media.id, "Local media acquired");
        self.media = Some(media);
        self.emit(CallEvent::LocalMediaReady);

        let registration = match role {
            Role::Caller => Registration::Fixed(self.config.caller_endpoint()),
            Role::Callee => Registration::Assigned,
        };
        let queue = self.queue.clone();
        let sink = TransportEvents::new(move |event| {
            let _ = queue.send(ControllerEvent::Transport(event));
        });
        let binding = match self.providers.transport.bind(registration, sink).await {
            Ok(binding) => binding,
            Err(e) => {
                self.fail(&e);
                return Err(e);
            }
        };
        info!(%role, endpoint = %binding.local_endpoint(), "Transport bound");
        self.binding = Some(binding);

        self.transition(CallState::Idle);
        self.emit(CallEvent::Controls(ControlsView::ready(role)));
        self.emit(CallEvent::status(match role {
            Role::Caller => status::READY_CALLER,
            Role::Callee => status::READY_CALLEE,
        }));
        Ok(())
    }

    /// Caller: notify the other side and start waiting for them
    pub fn start_call(&mut self) -> ClientResult<()> {
        if self.role != Some(Role::Caller) || self.state != CallState::Idle {
            return Err(self.rejected("start_call"));
        }

        self.transition(CallState::Notifying);
        self.emit(CallEvent::Controls(ControlsView::hidden()));

        let notifier = self.providers.notifier.clone();
        tokio::spawn(async move {
            match notifier.notify_call_start().await {
                Ok(()) => debug!("Call-start notification sent"),
                Err(e) => warn!(error = %e, category = e.category(), "Call-start notification failed"),
            }
        });

        self.transition(CallState::WaitingForJoin);
        let countdown = CountdownState::start(&self.config.countdown, &mut self.timers);
        let display = countdown.display();
        self.countdown = Some(countdown);
        self.emit(CallEvent::status(status::WAITING_FOR_JOIN));
        self.emit(CallEvent::Countdown { display: Some(display) });
        Ok(())
    }

    /// Callee: start (or restart after giving up) searching for the caller
    pub async fn join_call(&mut self) -> ClientResult<()> {
        let joinable = matches!(self.state, CallState::Idle | CallState::GaveUp);
        if self.role != Some(Role::Callee) || !joinable {
            return Err(self.rejected("join_call"));
        }

        self.transition(CallState::Searching);
        // A fresh state drops any stale retry timer from the previous cycle
        self.retry = Some(RetryState::new());
        self.emit(CallEvent::Controls(ControlsView::hidden()));
        self.emit(CallEvent::status(status::SEARCHING));
        self.attempt().await;
        Ok(())
    }

    /// User-initiated hangup
    pub fn end_call(&mut self) -> ClientResult<()> {
        if self.state == CallState::Uninitialized {
            return Err(self.rejected("end_call"));
        }
        self.teardown(TeardownReason::UserEnded);
        Ok(())
    }

    /// Full teardown. Safe to call any number of times.
    pub fn teardown(&mut self, reason: TeardownReason) {
        if self.torn_down {
            debug!(%reason, "Teardown already done");
            return;
        }
        self.torn_down = true;
        info!(%reason, state = ?self.state, role = ?self.role, "Tearing down call");

        self.retry = None;
        if self.countdown.take().is_some() {
            self.emit(CallEvent::Countdown { display: None });
        }
        if let Some(session) = self.session.take() {
            session.close();
        }
        if let Some(binding) = self.binding.take() {
            binding.release();
        }
        self.providers.role_store.clear();

        if !self.state.is_terminal() {
            self.transition(CallState::Ended);
        }
        self.emit(CallEvent::Controls(ControlsView::hidden()));
        self.emit(CallEvent::NavigateToEntry);
    }

    /// Process one queued transport event or timer firing
    pub async fn handle_event(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::Timer(fired) => self.on_timer(fired).await,
            ControllerEvent::Transport(TransportEvent::IncomingSession(session)) => {
                self.on_incoming(session).await
            }
            ControllerEvent::Transport(TransportEvent::StreamReceived { session_id, stream }) => {
                self.on_stream(session_id, stream)
            }
            ControllerEvent::Transport(TransportEvent::SessionClosed { session_id }) => {
                self.on_session_closed(session_id)
            }
            ControllerEvent::Transport(TransportEvent::SessionError { session_id, reason }) => {
                self.on_session_error(session_id, reason)
            }
            ControllerEvent::Transport(TransportEvent::ProviderError { reason }) => {
                if self.state.is_terminal() {
                    debug!(reason = %reason, "Provider error after call ended, ignoring");
                    return;
                }
                self.fail(&ClientError::transport_failed(reason));
            }
        }
    }

    async fn on_timer(&mut self, fired: TimerFired) {
        match fired.kind {
            TimerKind::Retry => {
                if self.state != CallState::Searching {
                    debug!(state = ?self.state, "Retry timer outside search, ignoring");
                    return;
                }
                let owned = self.retry.as_mut().is_some_and(|r| r.take_fired(&fired));
                if owned {
                    self.attempt().await;
                }
            }
            TimerKind::CountdownTick => {
                if self.state != CallState::WaitingForJoin {
                    return;
                }
                let Some(tick) = self.countdown.as_mut().and_then(|c| c.on_tick(&fired)) else {
                    return;
                };
                self.emit(CallEvent::Countdown {
                    display: Some(tick.display),
                });
                if tick.expired {
                    self.expire();
                }
            }
            TimerKind::Grace => {
                if self.state != CallState::WaitingForJoin {
                    return;
                }
                if self.countdown.as_mut().is_some_and(|c| c.on_grace(&fired)) {
                    info!("Grace period elapsed, still waiting for callee");
                    self.emit(CallEvent::notice(NoticeLevel::Info, notice::STILL_WAITING));
                }
            }
        }
    }

    /// One callee attempt towards the caller's well-known endpoint
    async fn attempt(&mut self) {
        if self.session.as_ref().is_some_and(|s| s.is_open()) {
            debug!("Session attempt already in flight");
            return;
        }
        if let Some(stale) = self.session.take() {
            stale.close();
        }
        let (Some(binding), Some(media)) = (self.binding.as_ref(), self.media.as_ref()) else {
            warn!("Cannot attempt a session without binding and media");
            return;
        };

        let target = self.config.caller_endpoint();
        let attempt = self.retry.as_ref().map_or(0, RetryState::attempts) + 1;
        info!(attempt, target = %target, "Connecting to caller");
        match binding.connect(&target, media).await {
            Ok(session) => {
                debug!(session_id = %session.id(), "Session attached");
                self.session = Some(session);
            }
            Err(e) => self.attempt_failed(&e),
        }
    }

    /// Count a failed callee attempt and either retry or give up
    fn attempt_failed(&mut self, err: &ClientError) {
        if let Some(session) = self.session.take() {
            session.close();
        }
        let policy = self.config.retry.clone();
        let Some(retry) = self.retry.as_mut() else {
            return;
        };

        match retry.record_failure(&policy) {
            RetryDecision::Retry { attempt, delay } => {
                debug!(error = %err, category = err.category(), attempt, "Scheduling retry");
                retry.schedule(self.timers.once(TimerKind::Retry, delay));
                self.emit(CallEvent::status(status::retrying(
                    attempt,
                    policy.max_attempts,
                )));
            }
            RetryDecision::GiveUp { attempts } => {
                self.retry = None;
                self.transition(CallState::GaveUp);
                warn!(attempts, error = %err, "Caller unreachable, gave up");
                self.emit(CallEvent::notice(NoticeLevel::Warning, notice::GAVE_UP));
                self.emit(CallEvent::status(status::GAVE_UP));
                self.emit(CallEvent::Controls(ControlsView::ready(Role::Callee)));
            }
        }
    }

    /// Caller: someone reached our well-known endpoint
    async fn on_incoming(&mut self, session: Box<dyn SessionHandle>) {
        let acceptable = matches!(
            self.state,
            CallState::Idle | CallState::WaitingForJoin | CallState::Connected
        );
        if self.role != Some(Role::Caller) || !acceptable {
            debug!(
                session_id = %session.id(),
                state = ?self.state,
                "Rejecting incoming session"
            );
            session.close();
            return;
        }
        let Some(media) = self.media.as_ref() else {
            session.close();
            return;
        };

        if let Err(e) = session.answer(media).await {
            warn!(session_id = %session.id(), error = %e, "Could not answer incoming session");
            session.close();
            return;
        }

        if self.countdown.take().is_some() {
            self.emit(CallEvent::Countdown { display: None });
        }
        if let Some(previous) = self.session.replace(session) {
            debug!(session_id = %previous.id(), "Replacing current session");
            previous.close();
        }
        if self.state != CallState::Connected {
            self.connected();
        }
    }

    fn on_stream(&mut self, session_id: SessionId, stream: RemoteStream) {
        if !self.is_current(session_id) {
            debug!(%session_id, "Stream for a session that is not current, ignoring");
            return;
        }
        if self.state == CallState::Searching {
            if let Some(retry) = self.retry.as_mut() {
                retry.succeed();
            }
            self.retry = None;
            self.connected();
        }
        if self.state == CallState::Connected {
            debug!(%session_id, stream_id = %stream.id, "Remote stream bound");
            self.emit(CallEvent::RemoteStreamBound { session_id, stream });
        }
    }

    fn on_session_closed(&mut self, session_id: SessionId) {
        if !self.is_current(session_id) {
            return;
        }
        let err = ClientError::SessionClosed;
        match self.state {
            CallState::Searching => self.attempt_failed(&err),
            CallState::Connected => {
                info!(%session_id, severity = ?err.severity(), "Remote side ended the call");
                self.emit(CallEvent::notice(NoticeLevel::Warning, notice::REMOTE_CLOSED));
                self.teardown(TeardownReason::RemoteClosed);
            }
            _ => {
                self.session = None;
            }
        }
    }

    fn on_session_error(&mut self, session_id: SessionId, reason: String) {
        if !self.is_current(session_id) {
            return;
        }
        let err = ClientError::session_error(reason);
        match self.state {
            CallState::Searching => self.attempt_failed(&err),
            CallState::Connected => {
                warn!(
                    %session_id,
                    error = %err,
                    severity = ?err.severity(),
                    "Session failed mid-call"
                );
                self.emit(CallEvent::notice(NoticeLevel::Warning, notice::SESSION_ERROR));
                self.teardown(TeardownReason::SessionError);
            }
            _ => {
                if let Some(session) = self.session.take() {
                    session.close();
                }
            }
        }
    }

    fn connected(&mut self) {
        if !self.transition(CallState::Connected) {
            return;
        }
        self.connected_at = Some(Utc::now());
        self.emit(CallEvent::Controls(ControlsView::in_call()));
        self.emit(CallEvent::status(status::CONNECTED));
    }

    fn expire(&mut self) {
        if !self.transition(CallState::Expired) {
            return;
        }
        warn!("Callee did not join in time");
        self.emit(CallEvent::notice(NoticeLevel::Warning, notice::EXPIRED));
        self.teardown(TeardownReason::Expired);
    }

    /// Fatal error: release everything and wait for a manual restart
    fn fail(&mut self, err: &ClientError) {
        error!(error = %err, category = err.category(), "Fatal call error");

        self.retry = None;
        if self.countdown.take().is_some() {
            self.emit(CallEvent::Countdown { display: None });
        }
        if let Some(session) = self.session.take() {
            session.close();
        }
        if let Some(binding) = self.binding.take() {
            binding.release();
        }

        self.transition(CallState::Failed);
        let message = match err {
            ClientError::MediaDenied { .. } => notice::MEDIA_DENIED,
            _ => notice::PROVIDER_ERROR,
        };
        self.emit(CallEvent::notice(NoticeLevel::Fatal, message));
        self.emit(CallEvent::status(status::FATAL));
        self.emit(CallEvent::Controls(ControlsView::hidden()));
    }

    fn is_current(&self, session_id: SessionId) -> bool {
        self.session.as_ref().is_some_and(|s| s.id() == session_id)
    }

    fn transition(&mut self, to: CallState) -> bool {
        let from = self.state;
        if let Err(e) = StateMachine::validate_transition(self.role, from, to) {
            debug!(error = %e, "Ignoring transition");
            return false;
        }
        self.state = to;
        info!(role = ?self.role, ?from, ?to, "Call state changed");
        self.emit(CallEvent::StateChanged {
            previous: from,
            current: to,
            role: self.role,
            at: Utc::now(),
        });
        true
    }

    fn rejected(&self, operation: &str) -> ClientError {
        debug!(operation, state = ?self.state, role = ?self.role, "Operation rejected");
        ClientError::InvalidState {
            operation: operation.to_string(),
            state: self.state,
        }
    }

    fn emit(&self, event: CallEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

impl fmt::Debug for CallController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallController")
            .field("role", &self.role)
            .field("state", &self.state)
            .field("session", &self.session.as_ref().map(|s| s.id()))
            .field("torn_down", &self.torn_down)
            .finish()
    }
}

#[cfg(test)]
impl CallController {
    /// Arm a retry timer without touching the current session
    pub(super) fn arm_retry(&mut self, delay: std::time::Duration) {
        if let Some(retry) = self.retry.as_mut() {
            retry.schedule(self.timers.once(TimerKind::Retry, delay));
        }
    }
}
