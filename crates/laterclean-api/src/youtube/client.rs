use std::sync::Mutex;

use chrono::Utc;
use reqwest::Client;

use super::auth::{self, OAuthApp};
use super::types::{PlaylistItem, PlaylistItemsResponse};
use crate::error::ApiError;
use crate::traits::{Credential, QueueItem, QueueService};

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";
pub const WATCH_LATER_PLAYLIST_ID: &str = "WL";
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// YouTube Data API v3 client for the watch-later playlist.
pub struct YouTubeClient {
    base_url: String,
    playlist_id: String,
    page_size: u32,
    oauth: Option<OAuthApp>,
    credential: Mutex<Option<Credential>>,
    http: Client,
}

impl Default for YouTubeClient {
    fn default() -> Self {
        Self::new()
    }
}

impl YouTubeClient {
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            playlist_id: WATCH_LATER_PLAYLIST_ID.into(),
            page_size: DEFAULT_PAGE_SIZE,
            oauth: None,
            credential: Mutex::new(None),
            http: Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_playlist_id(mut self, playlist_id: impl Into<String>) -> Self {
        self.playlist_id = playlist_id.into();
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_oauth(mut self, app: OAuthApp) -> Self {
        self.oauth = Some(app);
        self
    }

    /// Seed the client with a previously stored credential.
    pub fn with_credential(self, credential: Credential) -> Self {
        self.set_credential(Some(credential));
        self
    }

    /// The credential currently cached, if any.
    pub fn credential(&self) -> Option<Credential> {
        self.credential
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_credential(&self, credential: Option<Credential>) {
        *self.credential.lock().unwrap_or_else(|e| e.into_inner()) = credential;
    }

    /// Check the HTTP response for errors and return the body text on failure.
    ///
    /// A 401 drops the cached credential so the next `authenticate` starts over.
    async fn check_response(&self, resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        tracing::warn!(status, "YouTube API error");
        if status == 401 {
            self.set_credential(None);
        }
        Err(ApiError::Api {
            status,
            message: body,
        })
    }
}

impl QueueService for YouTubeClient {
    async fn authenticate(&self) -> Result<Credential, ApiError> {
        if let Some(cred) = self.credential() {
            if !cred.is_expired(Utc::now()) {
                return Ok(cred);
            }
            tracing::debug!("Cached YouTube credential expired");
        }

        let app = self.oauth.as_ref().ok_or_else(|| {
            ApiError::Auth("no stored credential and no OAuth client configured".into())
        })?;

        let cred = auth::authorize(app).await?;
        self.set_credential(Some(cred.clone()));
        Ok(cred)
    }

    async fn list_queue_items(&self, credential: &Credential) -> Result<Vec<QueueItem>, ApiError> {
        let page_size = self.page_size.to_string();
        let resp = self
            .http
            .get(format!("{}/playlistItems", self.base_url))
            .header("Authorization", credential.bearer())
            .header("Accept", "application/json")
            .query(&[
                ("part", "snippet,contentDetails"),
                ("playlistId", self.playlist_id.as_str()),
                ("maxResults", page_size.as_str()),
            ])
            .send()
            .await?;

        let resp = self.check_response(resp).await?;
        let page: PlaylistItemsResponse = resp
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))?;

        if page.next_page_token.is_some() {
            tracing::debug!(
                page_size = self.page_size,
                "Queue has more items than one page; only the first page is used"
            );
        }

        Ok(page
            .items
            .into_iter()
            .filter_map(PlaylistItem::into_queue_item)
            .collect())
    }

    async fn remove_item(&self, credential: &Credential, item_id: &str) -> Result<(), ApiError> {
        let resp = self
            .http
            .delete(format!("{}/playlistItems", self.base_url))
            .header("Authorization", credential.bearer())
            .header("Accept", "application/json")
            .query(&[("id", item_id)])
            .send()
            .await?;

        self.check_response(resp).await?;
        tracing::debug!(item_id, "Removed playlist item");
        Ok(())
    }
}
