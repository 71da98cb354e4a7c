//! Call roles, states and the transition table
//!
//! A process runs exactly one role. The caller walks
//! `Idle -> Notifying -> WaitingForJoin -> {Connected | Expired}` while the
//! callee walks `Idle -> Searching -> {Connected | GaveUp}`, looping inside
//! `Searching` on every retry. Teardown moves any live state to `Ended`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ClientError, ClientResult};

/// Which side of the call this process plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Registers at the well-known endpoint and waits to be reached
    Caller,
    /// Reaches out towards the caller's well-known endpoint
    Callee,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Caller => write!(f, "caller"),
            Role::Callee => write!(f, "callee"),
        }
    }
}

/// Current state of the call lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallState {
    /// Controller created, initialization not run yet
    Uninitialized,
    /// Media acquired and transport bound, waiting for the user
    Idle,
    /// Caller: firing the call-start notification
    Notifying,
    /// Caller: countdown running, waiting for the callee
    WaitingForJoin,
    /// Callee: attempting (and retrying) a session towards the caller
    Searching,
    /// Media is flowing between both parties
    Connected,
    /// Caller: nobody joined before the countdown ran out
    Expired,
    /// Callee: retry bound exceeded, join may be triggered again
    GaveUp,
    /// Fatal error, a full restart is required
    Failed,
    /// Torn down and sent back to the entry screen
    Ended,
}

impl CallState {
    /// Check if no further transitions can happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Expired | CallState::Failed | CallState::Ended)
    }
}

/// Transition table for the call lifecycle
pub struct StateMachine;

impl StateMachine {
    pub fn can_transition(role: Option<Role>, from: CallState, to: CallState) -> bool {
        use CallState::*;

        if from.is_terminal() {
            return false;
        }

        match (role, from, to) {
            (_, Uninitialized, Ended) => true,
            (Some(_), Uninitialized, Idle) => true,
            (_, _, Failed) => true,
            (Some(_), _, Ended) => true,

            (Some(Role::Caller), Idle, Notifying) => true,
            (Some(Role::Caller), Notifying, WaitingForJoin) => true,
            (Some(Role::Caller), WaitingForJoin, Connected) => true,
            // An incoming session before the call was started is still answered
            (Some(Role::Caller), Idle, Connected) => true,
            (Some(Role::Caller), WaitingForJoin, Expired) => true,

            (Some(Role::Callee), Idle, Searching) => true,
            (Some(Role::Callee), GaveUp, Searching) => true,
            (Some(Role::Callee), Searching, Connected) => true,
            (Some(Role::Callee), Searching, GaveUp) => true,

            _ => false,
        }
    }

    pub fn validate_transition(role: Option<Role>, from: CallState, to: CallState) -> ClientResult<()> {
        if Self::can_transition(role, from, to) {
            Ok(())
        } else {
            Err(ClientError::InvalidTransition { from, to })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CallState::*;

    #[test]
    fn test_caller_path() {
        let role = Some(Role::Caller);
        assert!(StateMachine::can_transition(role, Uninitialized, Idle));
        assert!(StateMachine::can_transition(role, Idle, Notifying));
        assert!(StateMachine::can_transition(role, Notifying, WaitingForJoin));
        assert!(StateMachine::can_transition(role, WaitingForJoin, Connected));
        assert!(StateMachine::can_transition(role, WaitingForJoin, Expired));
        assert!(StateMachine::can_transition(role, Connected, Ended));
    }

    #[test]
    fn test_callee_path() {
        let role = Some(Role::Callee);
        assert!(StateMachine::can_transition(role, Idle, Searching));
        assert!(StateMachine::can_transition(role, Searching, GaveUp));
        assert!(StateMachine::can_transition(role, GaveUp, Searching));
        assert!(StateMachine::can_transition(role, Searching, Connected));
    }

    #[test]
    fn test_roles_do_not_share_branches() {
        assert!(!StateMachine::can_transition(Some(Role::Callee), Idle, Notifying));
        assert!(!StateMachine::can_transition(Some(Role::Callee), WaitingForJoin, Expired));
        assert!(!StateMachine::can_transition(Some(Role::Caller), Idle, Searching));
        assert!(!StateMachine::can_transition(Some(Role::Caller), Searching, GaveUp));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [Expired, Failed, Ended] {
            assert!(terminal.is_terminal());
            for to in [Idle, Searching, Connected, Ended, Failed] {
                assert!(!StateMachine::can_transition(Some(Role::Caller), terminal, to));
            }
        }
    }

    #[test]
    fn test_unresolved_role_may_only_redirect() {
        assert!(StateMachine::can_transition(None, Uninitialized, Ended));
        assert!(!StateMachine::can_transition(None, Uninitialized, Idle));
        assert!(matches!(
            StateMachine::validate_transition(None, Uninitialized, Idle),
            Err(ClientError::InvalidTransition { from: Uninitialized, to: Idle })
        ));
    }
}
