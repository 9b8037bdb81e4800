use std::path::Path;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot};

use laterclean_api::Credential;
use laterclean_core::error::CleanerError;
use laterclean_core::models::{ProgressRecord, Settings, Stats};
use laterclean_core::storage::Storage;
use laterclean_core::store::{ProgressStore, SettingsProvider, StatsStore};

use crate::protocol::Notification;

const NOTIFICATION_CAPACITY: usize = 16;

/// Handle to the storage actor thread. Cheap to clone.
///
/// Every write goes through one thread, so writes to the same key are
/// applied in the order they were sent.
#[derive(Clone)]
pub struct DbHandle {
    tx: mpsc::UnboundedSender<DbCommand>,
    notify: broadcast::Sender<Notification>,
}

type Reply<T> = oneshot::Sender<Result<T, CleanerError>>;

enum DbCommand {
    RecordProgress {
        video_id: String,
        percentage: u8,
        reply: Reply<ProgressRecord>,
    },
    ReadProgress {
        video_id: String,
        reply: Reply<ProgressRecord>,
    },
    GetSettings {
        reply: Reply<Settings>,
    },
    SaveSettings {
        settings: Settings,
        reply: Reply<()>,
    },
    GetStats {
        reply: Reply<Stats>,
    },
    RecordRemovals {
        removed: u64,
        time_saved_secs: u64,
        reply: Reply<Stats>,
    },
    InitializeDefaults {
        reply: Reply<()>,
    },
    SaveToken {
        credential: Credential,
        reply: Reply<()>,
    },
    GetToken {
        reply: Reply<Option<Credential>>,
    },
    ClearToken {
        reply: Reply<()>,
    },
}

impl DbHandle {
    pub fn open(path: &Path) -> Result<Self, CleanerError> {
        let storage = Storage::open(path).inspect_err(|e| {
            tracing::error!("Failed to open database: {e}");
        })?;
        Self::spawn(storage)
    }

    /// Actor over an in-memory database.
    pub fn open_memory() -> Result<Self, CleanerError> {
        Self::spawn(Storage::open_memory()?)
    }

    fn spawn(storage: Storage) -> Result<Self, CleanerError> {
        let (tx, rx) = mpsc::unbounded_channel();

        std::thread::Builder::new()
            .name("db-actor".into())
            .spawn(move || actor_loop(storage, rx))
            .inspect_err(|e| tracing::error!("Failed to spawn DB thread: {e}"))?;

        let (notify, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Ok(Self { tx, notify })
    }

    /// Receive a [`Notification::StatsUpdated`] after every stats write.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notify.subscribe()
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> DbCommand,
    ) -> Result<T, CleanerError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(make(reply));
        rx.await
            .unwrap_or_else(|_| Err(CleanerError::Persistence("DB actor closed".into())))
    }

    pub async fn initialize_defaults(&self) -> Result<(), CleanerError> {
        self.call(|reply| DbCommand::InitializeDefaults { reply })
            .await
    }

    pub async fn save_token(&self, credential: Credential) -> Result<(), CleanerError> {
        self.call(|reply| DbCommand::SaveToken { credential, reply })
            .await
    }

    pub async fn get_token(&self) -> Result<Option<Credential>, CleanerError> {
        self.call(|reply| DbCommand::GetToken { reply }).await
    }

    pub async fn clear_token(&self) -> Result<(), CleanerError> {
        self.call(|reply| DbCommand::ClearToken { reply }).await
    }
}

impl ProgressStore for DbHandle {
    async fn record_progress(
        &self,
        video_id: &str,
        percentage: u8,
    ) -> Result<ProgressRecord, CleanerError> {
        let video_id = video_id.to_string();
        self.call(|reply| DbCommand::RecordProgress {
            video_id,
            percentage,
            reply,
        })
        .await
    }

    async fn read_progress(&self, video_id: &str) -> Result<ProgressRecord, CleanerError> {
        let video_id = video_id.to_string();
        self.call(|reply| DbCommand::ReadProgress { video_id, reply })
            .await
    }
}

impl SettingsProvider for DbHandle {
    async fn get_settings(&self) -> Result<Settings, CleanerError> {
        self.call(|reply| DbCommand::GetSettings { reply }).await
    }

    async fn set_settings(&self, settings: Settings) -> Result<(), CleanerError> {
        self.call(|reply| DbCommand::SaveSettings { settings, reply })
            .await
    }
}

impl StatsStore for DbHandle {
    async fn get_stats(&self) -> Result<Stats, CleanerError> {
        self.call(|reply| DbCommand::GetStats { reply }).await
    }

    async fn record_removals(
        &self,
        removed: u64,
        time_saved_secs: u64,
    ) -> Result<Stats, CleanerError> {
        let stats = self
            .call(|reply| DbCommand::RecordRemovals {
                removed,
                time_saved_secs,
                reply,
            })
            .await?;
        // Nobody listening is fine.
        let _ = self.notify.send(Notification::StatsUpdated {
            stats: stats.clone(),
        });
        Ok(stats)
    }
}

fn actor_loop(mut storage: Storage, mut rx: mpsc::UnboundedReceiver<DbCommand>) {
    while let Some(cmd) = rx.blocking_recv() {
        match cmd {
            DbCommand::RecordProgress {
                video_id,
                percentage,
                reply,
            } => {
                let _ = reply.send(storage.record_progress(&video_id, percentage));
            }
            DbCommand::ReadProgress { video_id, reply } => {
                let _ = reply.send(storage.read_progress(&video_id));
            }
            DbCommand::GetSettings { reply } => {
                let _ = reply.send(storage.get_settings());
            }
            DbCommand::SaveSettings { settings, reply } => {
                let _ = reply.send(storage.save_settings(&settings));
            }
            DbCommand::GetStats { reply } => {
                let _ = reply.send(storage.get_stats());
            }
            DbCommand::RecordRemovals {
                removed,
                time_saved_secs,
                reply,
            } => {
                let _ = reply.send(storage.record_removals(removed, time_saved_secs, Utc::now()));
            }
            DbCommand::InitializeDefaults { reply } => {
                let _ = reply.send(storage.initialize_defaults());
            }
            DbCommand::SaveToken { credential, reply } => {
                let _ = reply.send(storage.save_token(&credential));
            }
            DbCommand::GetToken { reply } => {
                let _ = reply.send(storage.get_token());
            }
            DbCommand::ClearToken { reply } => {
                let _ = reply.send(storage.clear_token());
            }
        }
    }
    tracing::debug!("DB actor shutting down");
}
