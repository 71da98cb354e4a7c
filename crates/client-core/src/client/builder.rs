//! Client builder for creating call clients
//!
//! The builder assembles a [`CallClient`] from a [`ClientConfig`] and the
//! external capabilities it drives. Only the transport provider is required;
//! everything else has an in-process default:
//!
//! - media: [`StaticMediaProvider::granted`]
//! - notifier: [`HttpNotifier`] when `notifier.endpoint` is set, otherwise
//!   [`NoopNotifier`]
//! - role store: an empty [`MemoryRoleStore`]
//!
//! # Examples
//!
//! ```rust
//! use duocall_client_core::{ClientBuilder, ClientConfig, LoopbackHub, MemoryRoleStore};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let hub = LoopbackHub::new();
//! let client = ClientBuilder::new()
//!     .config(ClientConfig::new().with_retry(3, 1))
//!     .transport_provider(Arc::new(hub.transport()))
//!     .role_store(Arc::new(MemoryRoleStore::with_user("admin")))
//!     .build()
//!     .await
//!     .expect("Failed to build client");
//!
//! client.initialize().await.unwrap();
//! client.shutdown().await.unwrap();
//! # }
//! ```

use std::sync::Arc;

use super::config::ClientConfig;
use super::CallClient;
use crate::error::{ClientError, ClientResult};
use crate::media::{MediaProvider, StaticMediaProvider};
use crate::notifier::{HttpNotifier, NoopNotifier, Notifier};
use crate::role::{MemoryRoleStore, RoleStore};
use crate::transport::TransportProvider;

/// Fluent builder for [`CallClient`]
#[derive(Default)]
pub struct ClientBuilder {
    config: ClientConfig,
    media: Option<Arc<dyn MediaProvider>>,
    transport: Option<Arc<dyn TransportProvider>>,
    notifier: Option<Arc<dyn Notifier>>,
    role_store: Option<Arc<dyn RoleStore>>,
}

impl ClientBuilder {
    /// Create a new client builder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the local capture capability
    pub fn media_provider(mut self, media: Arc<dyn MediaProvider>) -> Self {
        self.media = Some(media);
        self
    }

    /// Set the transport capability (required)
    pub fn transport_provider(mut self, transport: Arc<dyn TransportProvider>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Override the call-start notifier
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Set the session-scoped store the role is read from
    pub fn role_store(mut self, role_store: Arc<dyn RoleStore>) -> Self {
        self.role_store = Some(role_store);
        self
    }

    /// Validate the configuration and start the client event loop
    ///
    /// Must be called from within a tokio runtime.
    pub async fn build(self) -> ClientResult<CallClient> {
        self.config.validate()?;

        let transport = self.transport.ok_or_else(|| {
            ClientError::invalid_config("transport", "a transport provider is required")
        })?;
        let notifier: Arc<dyn Notifier> = match self.notifier {
            Some(notifier) => notifier,
            None => match HttpNotifier::from_config(&self.config.notifier)? {
                Some(http) => Arc::new(http),
                None => Arc::new(NoopNotifier::new()),
            },
        };

        Ok(CallClient::spawn(
            self.config,
            super::controller::Providers {
                media: self
                    .media
                    .unwrap_or_else(|| Arc::new(StaticMediaProvider::granted())),
                transport,
                notifier,
                role_store: self
                    .role_store
                    .unwrap_or_else(|| Arc::new(MemoryRoleStore::new())),
            },
        ))
    }
}
