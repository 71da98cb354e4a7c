//! Out-of-band "a call is being requested" signal
//!
//! The notifier is fire-and-forget: the controller dispatches it on a detached
//! task and only ever logs its outcome.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::client::config::NotifierConfig;
use crate::error::{ClientError, ClientResult};

/// One-shot call-start signal
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_call_start(&self) -> ClientResult<()>;
}

/// Sends a single GET with the call-start query to a configured endpoint
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    client: reqwest::Client,
    url: Url,
}

impl HttpNotifier {
    pub fn new(endpoint: Url, query_key: &str, query_value: &str, timeout: Duration) -> ClientResult<Self> {
        let mut url = endpoint;
        url.query_pairs_mut().append_pair(query_key, query_value);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::invalid_config("notifier", e.to_string()))?;

        Ok(Self { client, url })
    }

    /// Build from configuration. `None` when no endpoint is configured.
    pub fn from_config(config: &NotifierConfig) -> ClientResult<Option<Self>> {
        match &config.endpoint {
            Some(endpoint) => Self::new(
                endpoint.clone(),
                &config.query_key,
                &config.query_value,
                config.timeout(),
            )
            .map(Some),
            None => Ok(None),
        }
    }

    /// Full request URL including the call-start query
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify_call_start(&self) -> ClientResult<()> {
        debug!(url = %self.url, "Sending call-start notification");
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| ClientError::notifier_failed(e.to_string()))?;

        // The body carries nothing we need
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ClientError::notifier_failed(format!("endpoint answered {status}")))
        }
    }
}

/// Notifier used when no side channel is configured
#[derive(Debug, Default)]
pub struct NoopNotifier {
    sent: AtomicUsize,
}

impl NoopNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify_call_start(&self) -> ClientResult<()> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        debug!("No notifier endpoint configured, skipping call-start notification");
        Ok(())
    }
}
