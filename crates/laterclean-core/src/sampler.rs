//! Periodic playback sampling for the one video currently being watched.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::models::watch_percentage;
use crate::orchestrator::ProgressEvent;

const PLAYER_POLL: Duration = Duration::from_millis(100);

/// Live player state, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackPosition {
    pub position_secs: f64,
    pub duration_secs: f64,
}

/// Reads the current position from whatever is playing the video.
pub trait PlayerProbe: Send + Sync + 'static {
    /// `None` if no player is attached yet.
    fn position(&self) -> Option<PlaybackPosition>;
}

/// The video a session samples, with the queue-item handle its caller resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedVideo {
    pub video_id: String,
    pub queue_item_id: Option<String>,
}

impl TrackedVideo {
    pub fn new(video_id: impl Into<String>, queue_item_id: Option<String>) -> Self {
        Self {
            video_id: video_id.into(),
            queue_item_id,
        }
    }
}

/// Take one sample. Skipped while the duration is zero or unknown.
pub fn sample<P: PlayerProbe + ?Sized>(video: &TrackedVideo, probe: &P) -> Option<ProgressEvent> {
    let pos = probe.position()?;
    let percentage = watch_percentage(pos.position_secs, pos.duration_secs)?;
    Some(ProgressEvent {
        video_id: video.video_id.clone(),
        percentage,
        duration: pos.duration_secs,
        queue_item_id: video.queue_item_id.clone(),
    })
}

/// A running sampler task bound to one video.
///
/// [`stop`](Self::stop) takes a last sample before ending the task; dropping
/// the handle aborts it without one.
#[derive(Debug)]
pub struct TrackingSession {
    video: TrackedVideo,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl TrackingSession {
    pub fn start<P: PlayerProbe>(
        video: TrackedVideo,
        probe: Arc<P>,
        period: Duration,
        events: mpsc::UnboundedSender<ProgressEvent>,
    ) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let task_video = video.clone();

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Some(event) = sample(&task_video, probe.as_ref()) {
                            if events.send(event).is_err() {
                                debug!(
                                    video_id = %task_video.video_id,
                                    "Event receiver gone, ending session"
                                );
                                break;
                            }
                        }
                    }
                    _ = &mut stop_rx => {
                        if let Some(event) = sample(&task_video, probe.as_ref()) {
                            let _ = events.send(event);
                        }
                        break;
                    }
                }
            }
        });

        info!(video_id = %video.video_id, ?period, "Tracking started");
        Self {
            video,
            stop_tx: Some(stop_tx),
            task: Some(task),
        }
    }

    pub fn video(&self) -> &TrackedVideo {
        &self.video
    }

    /// Emit a final sample and wait for the task to end.
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        info!(video_id = %self.video.video_id, "Tracking stopped");
    }
}

impl Drop for TrackingSession {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Owns at most one [`TrackingSession`]; starting a new one stops the old one.
pub struct Sampler {
    period: Duration,
    events: mpsc::UnboundedSender<ProgressEvent>,
    session: Option<TrackingSession>,
}

impl Sampler {
    pub fn new(period: Duration) -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                period,
                events,
                session: None,
            },
            rx,
        )
    }

    /// Start sampling `video`. Any previous session is stopped first.
    pub async fn track<P: PlayerProbe>(&mut self, video: TrackedVideo, probe: Arc<P>) {
        self.stop().await;
        self.session = Some(TrackingSession::start(
            video,
            probe,
            self.period,
            self.events.clone(),
        ));
    }

    pub async fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            session.stop().await;
        }
    }

    pub fn current(&self) -> Option<&TrackedVideo> {
        self.session.as_ref().map(TrackingSession::video)
    }
}

/// Wait until the probe reports a usable duration, at most `timeout`.
///
/// Returns `false` on timeout instead of failing; callers go ahead either way.
pub async fn wait_for_player<P: PlayerProbe + ?Sized>(probe: &P, timeout: Duration) -> bool {
    let ready = async {
        loop {
            if probe
                .position()
                .is_some_and(|p| watch_percentage(p.position_secs, p.duration_secs).is_some())
            {
                return;
            }
            tokio::time::sleep(PLAYER_POLL).await;
        }
    };
    let found = tokio::time::timeout(timeout, ready).await.is_ok();
    if !found {
        debug!(?timeout, "Player not ready, continuing without it");
    }
    found
}
