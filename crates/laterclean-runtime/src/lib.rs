mod auth;
mod db;
pub mod protocol;

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;

use laterclean_api::youtube::{OAuthApp, YouTubeClient};
use laterclean_api::QueueService;
use laterclean_core::config::AppConfig;
use laterclean_core::error::CleanerError;
use laterclean_core::models::{ProgressRecord, Settings, Stats};
use laterclean_core::orchestrator::{self, ProgressEvent, RemovalOutcome};
use laterclean_core::reconcile;
use laterclean_core::sampler::{self, PlayerProbe, Sampler, TrackedVideo};
use laterclean_core::store::{ProgressStore, SettingsProvider, StatsStore};

pub use auth::PersistentAuth;
pub use db::DbHandle;
pub use protocol::{Ack, CleanResponse, Notification, ProgressReply, Request, Response};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("config error: {0}")]
    Config(String),
    #[error("database error: {0}")]
    Database(String),
}

/// Background coordinator: owns storage, the queue client and the sampler,
/// and answers [`Request`]s.
pub struct Runtime<Q: QueueService + 'static = YouTubeClient> {
    db: DbHandle,
    queue: Arc<PersistentAuth<Q>>,
    config: AppConfig,
    clean_lock: Mutex<()>,
    sampler: Mutex<Sampler>,
    pump: JoinHandle<()>,
}

impl Runtime<YouTubeClient> {
    /// Load config, open the database and build the YouTube client.
    pub async fn new() -> Result<Self, RuntimeError> {
        let config = AppConfig::load().map_err(|e| RuntimeError::Config(e.to_string()))?;
        let db_path =
            AppConfig::ensure_db_path().map_err(|e| RuntimeError::Config(e.to_string()))?;
        let db = DbHandle::open(&db_path).map_err(|e| RuntimeError::Database(e.to_string()))?;

        let stored = db
            .get_token()
            .await
            .map_err(|e| RuntimeError::Database(e.to_string()))?;
        let client = youtube_client(&config, stored.clone());

        Self::with_parts(config, db, client, stored).await
    }

    /// Authenticate interactively if needed and store the credential.
    pub async fn login(&self) -> Result<(), CleanerError> {
        self.queue.authenticate().await?;
        Ok(())
    }
}

fn youtube_client(
    config: &AppConfig,
    stored: Option<laterclean_api::Credential>,
) -> YouTubeClient {
    let yt = &config.youtube;
    let mut client = YouTubeClient::new()
        .with_base_url(&yt.api_base)
        .with_playlist_id(&yt.playlist_id)
        .with_page_size(yt.page_size);
    if let (Some(client_id), Some(client_secret)) = (&yt.client_id, &yt.client_secret) {
        client = client.with_oauth(OAuthApp {
            client_id: client_id.clone(),
            client_secret: client_secret.clone(),
        });
    }
    if let Some(credential) = stored {
        client = client.with_credential(credential);
    }
    client
}

impl<Q: QueueService + 'static> Runtime<Q> {
    /// Assemble a runtime from parts. Must be called inside a tokio runtime.
    pub async fn with_parts(
        config: AppConfig,
        db: DbHandle,
        queue: Q,
        stored: Option<laterclean_api::Credential>,
    ) -> Result<Self, RuntimeError> {
        db.initialize_defaults()
            .await
            .map_err(|e| RuntimeError::Database(e.to_string()))?;

        let queue = Arc::new(PersistentAuth::new(queue, db.clone(), stored.as_ref()));
        let (sampler, events) = Sampler::new(config.sampler.interval());
        let pump = tokio::spawn(pump_progress(events, db.clone(), Arc::clone(&queue)));

        Ok(Self {
            db,
            queue,
            config,
            clean_lock: Mutex::new(()),
            sampler: Mutex::new(sampler),
            pump,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn queue(&self) -> &Q {
        self.queue.inner()
    }

    /// Listen for stats changes.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.db.subscribe()
    }

    /// Dispatch one request.
    pub async fn handle(&self, request: Request) -> Response {
        match request {
            Request::WatchProgress { data } => Response::Progress(self.watch_progress(&data).await),
            Request::GetWatchData { video_id } => {
                Response::WatchData(self.get_watch_data(&video_id).await)
            }
            Request::GetSettings => Response::Settings(self.get_settings().await),
            Request::UpdateSettings { settings } => Response::Ack(
                match self.update_settings(settings).await {
                    Ok(()) => Ack::ok(),
                    Err(e) => Ack::failed(&e),
                },
            ),
            Request::ManualClean => Response::Clean(self.manual_clean().await),
            Request::GetStats => Response::Stats(self.get_stats().await),
        }
    }

    pub async fn watch_progress(&self, event: &ProgressEvent) -> ProgressReply {
        match orchestrator::process_progress(event, &self.db, self.queue.as_ref()).await {
            Ok(outcome) => ProgressReply::from(&outcome),
            Err(e) => {
                tracing::error!(video_id = %event.video_id, "Failed to process progress: {e}");
                ProgressReply::error(&e)
            }
        }
    }

    pub async fn get_watch_data(&self, video_id: &str) -> ProgressRecord {
        self.db.read_progress(video_id).await.unwrap_or_else(|e| {
            tracing::warn!(video_id, "Failed to read progress, using default: {e}");
            ProgressRecord::unwatched(video_id)
        })
    }

    pub async fn get_settings(&self) -> Settings {
        self.db.get_settings().await.unwrap_or_else(|e| {
            tracing::warn!("Failed to read settings, using defaults: {e}");
            Settings::default()
        })
    }

    pub async fn update_settings(&self, settings: Settings) -> Result<(), CleanerError> {
        self.db.set_settings(settings).await?;
        tracing::info!("Settings updated");
        Ok(())
    }

    pub async fn get_stats(&self) -> Stats {
        self.db.get_stats().await.unwrap_or_else(|e| {
            tracing::warn!("Failed to read stats, using defaults: {e}");
            Stats::default()
        })
    }

    /// Run a reconciliation pass. A second call while one is running is
    /// rejected rather than queued.
    pub async fn manual_clean(&self) -> CleanResponse {
        let Ok(_guard) = self.clean_lock.try_lock() else {
            tracing::warn!("Manual clean requested while one is running");
            return CleanResponse::failed(&CleanerError::CleanInProgress);
        };

        let estimated = self.config.clean.estimated_duration_secs as f64;
        match reconcile::clean_queue(&self.db, self.queue.as_ref(), estimated).await {
            Ok(report) => report.into(),
            Err(e) => {
                tracing::error!("Manual clean failed: {e}");
                CleanResponse::failed(&e)
            }
        }
    }

    /// Start sampling a video, replacing whatever was tracked before.
    ///
    /// Waits briefly for the player to report a duration first; sampling
    /// starts either way.
    pub async fn start_tracking<P: PlayerProbe>(&self, video: TrackedVideo, probe: Arc<P>) {
        let mut sampler = self.sampler.lock().await;
        sampler.stop().await;
        sampler::wait_for_player(probe.as_ref(), self.config.sampler.player_wait()).await;
        sampler.track(video, probe).await;
    }

    pub async fn stop_tracking(&self) {
        self.sampler.lock().await.stop().await;
    }

    pub async fn tracked_video(&self) -> Option<TrackedVideo> {
        self.sampler.lock().await.current().cloned()
    }
}

impl<Q: QueueService + 'static> Drop for Runtime<Q> {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Feed sampler events to the evaluator, one at a time.
///
/// Once a video has been removed, later samples for it are still recorded
/// but not evaluated again. Only the most recent removal is remembered:
/// one video is tracked at a time, so a different id means a new session.
async fn pump_progress<Q: QueueService>(
    mut events: mpsc::UnboundedReceiver<ProgressEvent>,
    db: DbHandle,
    queue: Arc<PersistentAuth<Q>>,
) {
    let mut removed: Option<String> = None;

    while let Some(event) = events.recv().await {
        if removed.as_deref() == Some(event.video_id.as_str()) {
            if let Err(e) = db.record_progress(&event.video_id, event.percentage).await {
                tracing::warn!(video_id = %event.video_id, "Failed to record progress: {e}");
            }
            continue;
        }

        match orchestrator::process_progress(&event, &db, queue.as_ref()).await {
            Ok(outcome @ RemovalOutcome::Removed { .. }) => {
                tracing::debug!(?outcome, "Sampler removal");
                removed = Some(event.video_id);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(video_id = %event.video_id, "Failed to process sample: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use laterclean_core::sampler::PlaybackPosition;
    use laterclean_core::testing::ScriptedQueue;

    async fn runtime(queue: ScriptedQueue) -> Runtime<ScriptedQueue> {
        let db = DbHandle::open_memory().unwrap();
        Runtime::with_parts(AppConfig::default(), db, queue, None)
            .await
            .unwrap()
    }

    fn progress(video_id: &str, pct: u8) -> Request {
        Request::WatchProgress {
            data: ProgressEvent {
                video_id: video_id.into(),
                percentage: pct,
                duration: 600.0,
                queue_item_id: Some(format!("item-{video_id}")),
            },
        }
    }

    struct FixedPlayer(StdMutex<PlaybackPosition>);

    impl PlayerProbe for FixedPlayer {
        fn position(&self) -> Option<PlaybackPosition> {
            Some(*self.0.lock().unwrap())
        }
    }

    #[tokio::test]
    async fn test_defaults_initialized() {
        let rt = runtime(ScriptedQueue::default()).await;
        assert_eq!(rt.handle(Request::GetSettings).await, Response::Settings(Settings::default()));
        assert_eq!(rt.handle(Request::GetStats).await, Response::Stats(Stats::default()));
    }

    #[tokio::test]
    async fn test_watch_progress_removes_and_notifies() {
        let rt = runtime(ScriptedQueue::with_videos(&[("item-abc", "abc")])).await;
        let mut rx = rt.subscribe();

        let resp = rt.handle(progress("abc", 80)).await;
        let Response::Progress(reply) = resp else {
            panic!("Expected progress reply, got {resp:?}");
        };
        assert!(reply.removed);
        assert_eq!(rt.queue().removed(), vec!["item-abc".to_string()]);

        let Notification::StatsUpdated { stats } = rx.recv().await.unwrap();
        assert_eq!(stats.videos_removed, 1);
        assert_eq!(stats.total_watch_time_saved, 120);
    }

    #[tokio::test]
    async fn test_get_watch_data_after_progress() {
        let rt = runtime(ScriptedQueue::default()).await;
        rt.handle(progress("abc", 30)).await;

        let resp = rt
            .handle(Request::GetWatchData {
                video_id: "abc".into(),
            })
            .await;
        let Response::WatchData(record) = resp else {
            panic!("Expected watch data, got {resp:?}");
        };
        assert_eq!(record.percentage, 30);
    }

    #[tokio::test]
    async fn test_update_settings_replaces_and_validates() {
        let rt = runtime(ScriptedQueue::default()).await;
        let new = Settings {
            threshold: 90,
            auto_remove: false,
            ..Default::default()
        };
        assert_eq!(
            rt.handle(Request::UpdateSettings {
                settings: new.clone()
            })
            .await,
            Response::Ack(Ack::ok())
        );
        assert_eq!(rt.get_settings().await, new);

        let resp = rt
            .handle(Request::UpdateSettings {
                settings: Settings {
                    threshold: 101,
                    ..Default::default()
                },
            })
            .await;
        assert!(matches!(resp, Response::Ack(Ack { success: false, .. })));
        assert_eq!(rt.get_settings().await, new);
    }

    #[tokio::test]
    async fn test_manual_clean_summary() {
        let rt = runtime(ScriptedQueue::with_videos(&[
            ("item-a", "a"),
            ("item-b", "b"),
            ("item-c", "c"),
        ]))
        .await;
        for (v, p) in [("a", 90), ("b", 50), ("c", 75)] {
            rt.db.record_progress(v, p).await.unwrap();
        }

        let resp = rt.handle(Request::ManualClean).await;
        let Response::Clean(summary) = resp else {
            panic!("Expected clean summary, got {resp:?}");
        };
        assert!(summary.success);
        assert_eq!(summary.removed_count, Some(2));
        assert_eq!(summary.total_videos, Some(3));
        assert_eq!(rt.get_stats().await.videos_removed, 2);
    }

    #[tokio::test]
    async fn test_manual_clean_auth_failure() {
        let rt = runtime(ScriptedQueue::default().deny_auth()).await;
        let Response::Clean(summary) = rt.handle(Request::ManualClean).await else {
            panic!("Expected clean summary");
        };
        assert!(!summary.success);
        assert!(summary.error.unwrap().contains("auth"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_clean_rejected() {
        let queue = ScriptedQueue::with_videos(&[("item-a", "a"), ("item-b", "b")])
            .with_removal_delay(Duration::from_secs(1));
        let rt = runtime(queue).await;
        rt.db.record_progress("a", 90).await.unwrap();
        rt.db.record_progress("b", 95).await.unwrap();

        let (first, second) = tokio::join!(rt.manual_clean(), rt.manual_clean());

        assert!(first.success);
        assert_eq!(first.removed_count, Some(2));
        assert!(!second.success);
        assert_eq!(
            second.error.as_deref(),
            Some(CleanerError::CleanInProgress.to_string().as_str())
        );

        let calls = rt.queue().remove_calls();
        assert_eq!(calls, vec!["item-a".to_string(), "item-b".to_string()]);
        assert_eq!(rt.get_stats().await.videos_removed, 2);

        // The guard is released afterwards.
        let again = rt.manual_clean().await;
        assert!(again.success);
        assert_eq!(again.removed_count, Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracking_removes_once() {
        let rt = runtime(ScriptedQueue::with_videos(&[("item-abc", "abc")])).await;
        let player = Arc::new(FixedPlayer(StdMutex::new(PlaybackPosition {
            position_secs: 480.0,
            duration_secs: 600.0,
        })));

        let mut rx = rt.subscribe();

        rt.start_tracking(TrackedVideo::new("abc", Some("item-abc".into())), player)
            .await;
        tokio::time::sleep(Duration::from_secs(21)).await;
        rt.stop_tracking().await;
        let Notification::StatsUpdated { stats } = rx.recv().await.unwrap();
        assert_eq!(stats.videos_removed, 1);

        assert_eq!(rt.queue().remove_calls(), vec!["item-abc".to_string()]);
        assert_eq!(rt.get_stats().await.videos_removed, 1);
        assert_eq!(rt.get_watch_data("abc").await.percentage, 80);
        assert!(rt.tracked_video().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_removal_memory_follows_tracked_video() {
        // "a" is re-added to the queue under a new item after its first removal.
        let rt = runtime(ScriptedQueue::with_videos(&[
            ("item-a", "a"),
            ("item-b", "b"),
            ("item-a2", "a"),
        ]))
        .await;
        let player = Arc::new(FixedPlayer(StdMutex::new(PlaybackPosition {
            position_secs: 480.0,
            duration_secs: 600.0,
        })));
        let mut rx = rt.subscribe();

        for (video, item) in [("a", "item-a"), ("b", "item-b"), ("a", "item-a2")] {
            rt.start_tracking(TrackedVideo::new(video, Some(item.into())), player.clone())
                .await;
            tokio::time::sleep(Duration::from_secs(21)).await;
            rt.stop_tracking().await;
            let Notification::StatsUpdated { stats } = rx.recv().await.unwrap();
            assert!(stats.videos_removed > 0);
        }

        assert_eq!(
            rt.queue().remove_calls(),
            vec![
                "item-a".to_string(),
                "item-b".to_string(),
                "item-a2".to_string()
            ]
        );
        assert_eq!(rt.get_stats().await.videos_removed, 3);
    }
}
