//! Client configuration structures
//!
//! All tunables of the call lifecycle live here: the caller's well-known
//! endpoint, the recognised role names, the notifier side channel, the
//! callee retry policy and the caller countdown.
//!
//! # Usage Examples
//!
//! ```rust
//! use duocall_client_core::client::config::ClientConfig;
//!
//! let config = ClientConfig::new()
//!     .with_caller_endpoint("my-caller-endpoint")
//!     .with_role_names("alice", "bob")
//!     .with_retry(3, 2);
//!
//! assert_eq!(config.retry.max_attempts, 3);
//! assert_eq!(config.roles.caller, "alice");
//! assert!(config.validate().is_ok());
//! ```
//!
//! Configuration also loads from TOML:
//!
//! ```rust
//! use duocall_client_core::client::config::ClientConfig;
//!
//! let config: ClientConfig = toml::from_str(r#"
//!     caller_endpoint_id = "family-call"
//!
//!     [roles]
//!     caller = "grandma"
//!     callee = "me"
//!
//!     [countdown]
//!     duration_secs = 120
//! "#).unwrap();
//!
//! assert_eq!(config.countdown.duration_secs, 120);
//! assert_eq!(config.countdown.grace_secs, 60);
//! assert_eq!(config.retry.max_attempts, 12);
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use super::countdown::CountdownConfig;
use super::recovery::RetryPolicy;
use crate::error::{ClientError, ClientResult};
use crate::transport::EndpointId;

/// Identifier the caller always registers under
pub const DEFAULT_CALLER_ENDPOINT: &str = "duocall-caller-peer-a9b8c7d6e5f4";

/// User names recognised on the entry screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleNames {
    /// User name that plays the caller role
    pub caller: String,
    /// User name that plays the callee role
    pub callee: String,
}

impl Default for RoleNames {
    fn default() -> Self {
        Self {
            caller: "chiu".to_string(),
            callee: "admin".to_string(),
        }
    }
}

/// Call-start notification side channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Endpoint to notify; nothing is sent when unset
    pub endpoint: Option<Url>,
    /// Query parameter carrying the intent
    pub query_key: String,
    /// Query value meaning "call start"
    pub query_value: String,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl NotifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            query_key: "type".to_string(),
            query_value: "startcall".to_string(),
            timeout_ms: 10_000,
        }
    }
}

/// Configuration for the call client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Well-known identifier of the caller endpoint
    pub caller_endpoint_id: String,
    /// Role names
    pub roles: RoleNames,
    /// Notifier side channel
    pub notifier: NotifierConfig,
    /// Callee retry policy
    pub retry: RetryPolicy,
    /// Caller countdown
    pub countdown: CountdownConfig,
    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
}

impl ClientConfig {
    /// Create a new client configuration with defaults
    pub fn new() -> Self {
        Self {
            caller_endpoint_id: DEFAULT_CALLER_ENDPOINT.to_string(),
            roles: RoleNames::default(),
            notifier: NotifierConfig::default(),
            retry: RetryPolicy::default(),
            countdown: CountdownConfig::default(),
            event_capacity: 1024,
        }
    }

    /// Set the caller's well-known endpoint
    pub fn with_caller_endpoint(mut self, id: impl Into<String>) -> Self {
        self.caller_endpoint_id = id.into();
        self
    }

    /// Set the recognised role names
    pub fn with_role_names(mut self, caller: impl Into<String>, callee: impl Into<String>) -> Self {
        self.roles = RoleNames {
            caller: caller.into(),
            callee: callee.into(),
        };
        self
    }

    /// Set the notifier endpoint
    pub fn with_notifier_endpoint(mut self, endpoint: Url) -> Self {
        self.notifier.endpoint = Some(endpoint);
        self
    }

    /// Set the retry bound and the fixed delay between attempts
    pub fn with_retry(mut self, max_attempts: u32, delay_secs: u64) -> Self {
        self.retry = RetryPolicy {
            max_attempts,
            delay_secs,
        };
        self
    }

    /// Set the countdown duration and grace notice time
    pub fn with_countdown(mut self, duration_secs: u32, grace_secs: u64) -> Self {
        self.countdown.duration_secs = duration_secs;
        self.countdown.grace_secs = grace_secs;
        self
    }

    pub fn caller_endpoint(&self) -> EndpointId {
        EndpointId::new(self.caller_endpoint_id.clone())
    }

    /// Check the configuration for values the controller cannot run with
    pub fn validate(&self) -> ClientResult<()> {
        if self.caller_endpoint_id.trim().is_empty() {
            return Err(ClientError::invalid_config("caller_endpoint_id", "must not be empty"));
        }
        if self.roles.caller.is_empty() || self.roles.callee.is_empty() {
            return Err(ClientError::invalid_config("roles", "role names must not be empty"));
        }
        if self.roles.caller == self.roles.callee {
            return Err(ClientError::invalid_config("roles", "caller and callee names must differ"));
        }
        if self.retry.max_attempts == 0 {
            return Err(ClientError::invalid_config("retry.max_attempts", "must be at least 1"));
        }
        if self.countdown.tick_secs == 0 {
            return Err(ClientError::invalid_config("countdown.tick_secs", "must be at least 1"));
        }
        if self.countdown.duration_secs == 0 {
            return Err(ClientError::invalid_config("countdown.duration_secs", "must be at least 1"));
        }
        if self.countdown.grace_secs >= u64::from(self.countdown.duration_secs) {
            return Err(ClientError::invalid_config(
                "countdown.grace_secs",
                "must be shorter than the countdown duration",
            ));
        }
        if self.event_capacity == 0 {
            return Err(ClientError::invalid_config("event_capacity", "must be at least 1"));
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}
