//! Trait definitions for remote watch-later queues.
//!
//! The tracker and the bulk cleaner only talk to this interface, so tests can
//! swap in a scripted queue and the YouTube client stays an implementation
//! detail.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// An access credential returned by [`QueueService::authenticate`].
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: None,
        }
    }

    /// A credential past its expiry must not be reused.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

// Keep tokens out of logs.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// One entry of the remote watch-later queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    /// Removal handle for this entry, distinct from the video id.
    pub item_id: String,
    pub video_id: String,
    pub title: String,
}

/// A remote watch-later queue.
pub trait QueueService: Send + Sync {
    /// Obtain a credential, prompting the user if required.
    fn authenticate(&self) -> impl Future<Output = Result<Credential, ApiError>> + Send;

    /// Fetch the first page of the queue.
    fn list_queue_items(
        &self,
        credential: &Credential,
    ) -> impl Future<Output = Result<Vec<QueueItem>, ApiError>> + Send;

    /// Remove one entry by its queue-item handle.
    fn remove_item(
        &self,
        credential: &Credential,
        item_id: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
}
