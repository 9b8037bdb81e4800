//! In-memory backends for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use laterclean_api::{ApiError, Credential, QueueItem, QueueService};

use crate::error::CleanerError;
use crate::models::{ProgressRecord, Settings, Stats};
use crate::store::{ProgressStore, SettingsProvider, StatsStore};

/// A store that keeps everything in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    progress: Mutex<HashMap<String, ProgressRecord>>,
    settings: Mutex<Option<Settings>>,
    stats: Mutex<Stats>,
    stats_writes: AtomicUsize,
    fail_writes: Mutex<bool>,
    fail_stats_writes: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: Settings) -> Self {
        let store = Self::new();
        *lock(&store.settings) = Some(settings);
        store
    }

    /// Seed a progress record without going through `record_progress`.
    pub fn seed_progress(&self, video_id: &str, percentage: u8) {
        lock(&self.progress).insert(
            video_id.to_string(),
            ProgressRecord {
                video_id: video_id.to_string(),
                percentage,
                last_updated: Some(Utc::now()),
            },
        );
    }

    /// Make every subsequent progress write fail like an unavailable medium.
    pub fn fail_writes(&self) {
        *lock(&self.fail_writes) = true;
    }

    /// Make every stats write fail.
    pub fn fail_stats_writes(&self) {
        *lock(&self.fail_stats_writes) = true;
    }

    /// Number of times stats were written.
    pub fn stats_writes(&self) -> usize {
        self.stats_writes.load(Ordering::SeqCst)
    }
}

impl ProgressStore for MemoryStore {
    async fn record_progress(
        &self,
        video_id: &str,
        percentage: u8,
    ) -> Result<ProgressRecord, CleanerError> {
        if *lock(&self.fail_writes) {
            return Err(CleanerError::Persistence("store unavailable".into()));
        }
        let record = ProgressRecord {
            video_id: video_id.to_string(),
            percentage: percentage.min(100),
            last_updated: Some(Utc::now()),
        };
        lock(&self.progress).insert(video_id.to_string(), record.clone());
        Ok(record)
    }

    async fn read_progress(&self, video_id: &str) -> Result<ProgressRecord, CleanerError> {
        Ok(lock(&self.progress)
            .get(video_id)
            .cloned()
            .unwrap_or_else(|| ProgressRecord::unwatched(video_id)))
    }
}

impl SettingsProvider for MemoryStore {
    async fn get_settings(&self) -> Result<Settings, CleanerError> {
        Ok(lock(&self.settings).clone().unwrap_or_default())
    }

    async fn set_settings(&self, settings: Settings) -> Result<(), CleanerError> {
        settings.validate()?;
        *lock(&self.settings) = Some(settings);
        Ok(())
    }
}

impl StatsStore for MemoryStore {
    async fn get_stats(&self) -> Result<Stats, CleanerError> {
        Ok(lock(&self.stats).clone())
    }

    async fn record_removals(
        &self,
        removed: u64,
        time_saved_secs: u64,
    ) -> Result<Stats, CleanerError> {
        if *lock(&self.fail_stats_writes) {
            return Err(CleanerError::Persistence("stats unavailable".into()));
        }
        self.stats_writes.fetch_add(1, Ordering::SeqCst);
        let mut stats = lock(&self.stats);
        stats.record_removals(removed, time_saved_secs, Utc::now());
        Ok(stats.clone())
    }
}

/// What [`ScriptedQueue::authenticate`] should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScript {
    Grant,
    Deny,
}

/// A queue whose contents and failures are set up by the test.
#[derive(Debug)]
pub struct ScriptedQueue {
    items: Mutex<Vec<QueueItem>>,
    auth: AuthScript,
    list_failure: Option<u16>,
    failing_items: Mutex<HashMap<String, u16>>,
    removal_delay: Option<Duration>,
    auth_calls: AtomicUsize,
    removed: Mutex<Vec<String>>,
    remove_calls: Mutex<Vec<String>>,
}

impl Default for ScriptedQueue {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl ScriptedQueue {
    pub fn new(items: Vec<QueueItem>) -> Self {
        Self {
            items: Mutex::new(items),
            auth: AuthScript::Grant,
            list_failure: None,
            failing_items: Mutex::new(HashMap::new()),
            removal_delay: None,
            auth_calls: AtomicUsize::new(0),
            removed: Mutex::new(Vec::new()),
            remove_calls: Mutex::new(Vec::new()),
        }
    }

    /// Build a queue from `(item_id, video_id)` pairs.
    pub fn with_videos(pairs: &[(&str, &str)]) -> Self {
        Self::new(
            pairs
                .iter()
                .map(|(item_id, video_id)| QueueItem {
                    item_id: item_id.to_string(),
                    video_id: video_id.to_string(),
                    title: format!("Video {video_id}"),
                })
                .collect(),
        )
    }

    pub fn deny_auth(mut self) -> Self {
        self.auth = AuthScript::Deny;
        self
    }

    pub fn fail_listing(mut self, status: u16) -> Self {
        self.list_failure = Some(status);
        self
    }

    /// Make removal of `item_id` fail with `status`.
    pub fn fail_removal(self, item_id: &str, status: u16) -> Self {
        lock(&self.failing_items).insert(item_id.to_string(), status);
        self
    }

    /// Pause inside every removal, to hold a pass open.
    pub fn with_removal_delay(mut self, delay: Duration) -> Self {
        self.removal_delay = Some(delay);
        self
    }

    pub fn auth_calls(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst)
    }

    /// Item ids removed successfully, in order.
    pub fn removed(&self) -> Vec<String> {
        lock(&self.removed).clone()
    }

    /// Every removal attempt, including failed ones.
    pub fn remove_calls(&self) -> Vec<String> {
        lock(&self.remove_calls).clone()
    }

    pub fn remaining(&self) -> Vec<QueueItem> {
        lock(&self.items).clone()
    }
}

impl QueueService for ScriptedQueue {
    async fn authenticate(&self) -> Result<Credential, ApiError> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        match self.auth {
            AuthScript::Grant => Ok(Credential::new("scripted-token")),
            AuthScript::Deny => Err(ApiError::Auth("user denied access".into())),
        }
    }

    async fn list_queue_items(&self, _credential: &Credential) -> Result<Vec<QueueItem>, ApiError> {
        if let Some(status) = self.list_failure {
            return Err(ApiError::Api {
                status,
                message: "listing failed".into(),
            });
        }
        Ok(lock(&self.items).iter().take(50).cloned().collect())
    }

    async fn remove_item(&self, _credential: &Credential, item_id: &str) -> Result<(), ApiError> {
        lock(&self.remove_calls).push(item_id.to_string());
        if let Some(delay) = self.removal_delay {
            tokio::time::sleep(delay).await;
        }
        let failure = lock(&self.failing_items).get(item_id).copied();
        if let Some(status) = failure {
            return Err(ApiError::Api {
                status,
                message: format!("cannot remove {item_id}"),
            });
        }
        let mut items = lock(&self.items);
        let Some(pos) = items.iter().position(|i| i.item_id == item_id) else {
            return Err(ApiError::Api {
                status: 404,
                message: "playlistItemNotFound".into(),
            });
        };
        items.remove(pos);
        drop(items);
        lock(&self.removed).push(item_id.to_string());
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
