//! Local media capture capability
//!
//! Capture itself lives outside this crate. The controller only needs a
//! handle it can attach to outgoing and answered sessions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

use crate::error::{ClientError, ClientResult};

/// What the controller asks the capture device for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self { audio: true, video: true }
    }
}

/// Handle to captured local audio/video
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalMedia {
    pub id: Uuid,
    pub audio: bool,
    pub video: bool,
}

impl LocalMedia {
    pub fn new(constraints: MediaConstraints) -> Self {
        Self {
            id: Uuid::new_v4(),
            audio: constraints.audio,
            video: constraints.video,
        }
    }
}

/// Supplies local capture handles. A failure is fatal to the session.
#[async_trait]
pub trait MediaProvider: Send + Sync {
    async fn acquire(&self, constraints: MediaConstraints) -> ClientResult<LocalMedia>;
}

/// Media provider that grants or refuses access without touching devices
#[derive(Debug)]
pub struct StaticMediaProvider {
    granted: bool,
    requests: AtomicUsize,
}

impl StaticMediaProvider {
    /// A provider that always grants access
    pub fn granted() -> Self {
        Self {
            granted: true,
            requests: AtomicUsize::new(0),
        }
    }

    /// A provider that always refuses access
    pub fn denied() -> Self {
        Self {
            granted: false,
            requests: AtomicUsize::new(0),
        }
    }

    /// Number of acquisition requests seen so far
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaProvider for StaticMediaProvider {
    async fn acquire(&self, constraints: MediaConstraints) -> ClientResult<LocalMedia> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.granted {
            Ok(LocalMedia::new(constraints))
        } else {
            Err(ClientError::media_denied(
                "camera and microphone access was not allowed",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_provider_grants_requested_tracks() {
        let provider = StaticMediaProvider::granted();
        let media = provider
            .acquire(MediaConstraints { audio: true, video: false })
            .await
            .unwrap();
        assert!(media.audio);
        assert!(!media.video);
        assert_eq!(provider.request_count(), 1);
    }

    #[tokio::test]
    async fn test_static_provider_denial_is_fatal() {
        let provider = StaticMediaProvider::denied();
        let err = provider.acquire(MediaConstraints::default()).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, ClientError::MediaDenied { .. }));
    }
}
