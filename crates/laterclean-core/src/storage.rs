use std::path::Path;

use chrono::{DateTime, Utc};
use laterclean_api::Credential;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CleanerError;
use crate::models::{ProgressRecord, Settings, Stats};

const SCHEMA_V1: &str = include_str!("../../../migrations/001_initial.sql");

const SETTINGS_KEY: &str = "settings";
const STATS_KEY: &str = "stats";
const TOKEN_SERVICE: &str = "youtube";

/// Storage partition a document lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Area {
    /// Follows the user across devices: settings and stats.
    Sync,
    /// Stays on this machine: per-video progress.
    Local,
}

impl Area {
    fn as_str(self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Local => "local",
        }
    }
}

/// Cache key for a video's progress record.
pub fn progress_key(video_id: &str) -> String {
    format!("watch_{video_id}")
}

/// SQLite-backed key/value storage.
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open (or create) the database at the given path and run migrations.
    pub fn open(path: &Path) -> Result<Self, CleanerError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, CleanerError> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    // ── Raw documents ───────────────────────────────────────────

    pub fn get_json<T: DeserializeOwned>(
        &self,
        area: Area,
        key: &str,
    ) -> Result<Option<T>, CleanerError> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM kv WHERE area = ?1 AND key = ?2",
                params![area.as_str(), key],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(Into::into)
    }

    pub fn put_json<T: Serialize>(
        &self,
        area: Area,
        key: &str,
        value: &T,
    ) -> Result<(), CleanerError> {
        let json = serde_json::to_string(value)?;
        self.conn.execute(
            "INSERT INTO kv (area, key, value, updated_at)
             VALUES (?1, ?2, ?3, datetime('now'))
             ON CONFLICT(area, key) DO UPDATE SET
                value = excluded.value, updated_at = excluded.updated_at",
            params![area.as_str(), key, json],
        )?;
        Ok(())
    }

    // ── Progress ────────────────────────────────────────────────

    /// Overwrite the progress record for a video. Last write wins.
    pub fn record_progress(
        &self,
        video_id: &str,
        percentage: u8,
    ) -> Result<ProgressRecord, CleanerError> {
        let record = ProgressRecord {
            video_id: video_id.to_string(),
            percentage: percentage.min(100),
            last_updated: Some(Utc::now()),
        };
        self.put_json(Area::Local, &progress_key(video_id), &record)?;
        Ok(record)
    }

    /// Read the progress record for a video, or the unwatched default.
    pub fn read_progress(&self, video_id: &str) -> Result<ProgressRecord, CleanerError> {
        Ok(self
            .get_json(Area::Local, &progress_key(video_id))?
            .unwrap_or_else(|| ProgressRecord::unwatched(video_id)))
    }

    // ── Settings ────────────────────────────────────────────────

    pub fn get_settings(&self) -> Result<Settings, CleanerError> {
        Ok(self.get_json(Area::Sync, SETTINGS_KEY)?.unwrap_or_default())
    }

    /// Replace the stored settings wholesale.
    pub fn save_settings(&self, settings: &Settings) -> Result<(), CleanerError> {
        settings.validate()?;
        self.put_json(Area::Sync, SETTINGS_KEY, settings)
    }

    // ── Stats ───────────────────────────────────────────────────

    pub fn get_stats(&self) -> Result<Stats, CleanerError> {
        Ok(self.get_json(Area::Sync, STATS_KEY)?.unwrap_or_default())
    }

    /// Fold removals into the stored stats in one transaction and return the result.
    pub fn record_removals(
        &mut self,
        removed: u64,
        time_saved_secs: u64,
        now: DateTime<Utc>,
    ) -> Result<Stats, CleanerError> {
        let tx = self.conn.transaction()?;
        let raw: Option<String> = tx
            .query_row(
                "SELECT value FROM kv WHERE area = ?1 AND key = ?2",
                params![Area::Sync.as_str(), STATS_KEY],
                |row| row.get(0),
            )
            .optional()?;
        let mut stats: Stats = match raw {
            Some(s) => serde_json::from_str(&s)?,
            None => Stats::default(),
        };
        stats.record_removals(removed, time_saved_secs, now);
        tx.execute(
            "INSERT INTO kv (area, key, value, updated_at)
             VALUES (?1, ?2, ?3, datetime('now'))
             ON CONFLICT(area, key) DO UPDATE SET
                value = excluded.value, updated_at = excluded.updated_at",
            params![Area::Sync.as_str(), STATS_KEY, serde_json::to_string(&stats)?],
        )?;
        tx.commit()?;
        Ok(stats)
    }

    /// Write default settings and stats if none are stored yet.
    pub fn initialize_defaults(&self) -> Result<(), CleanerError> {
        if self.get_json::<Settings>(Area::Sync, SETTINGS_KEY)?.is_none() {
            tracing::info!("Initializing default settings");
            self.put_json(Area::Sync, SETTINGS_KEY, &Settings::default())?;
        }
        if self.get_json::<Stats>(Area::Sync, STATS_KEY)?.is_none() {
            self.put_json(Area::Sync, STATS_KEY, &Stats::default())?;
        }
        Ok(())
    }

    // ── Auth Tokens ─────────────────────────────────────────────

    /// Store the API credential.
    pub fn save_token(&self, credential: &Credential) -> Result<(), CleanerError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO auth_tokens (service, token, expires_at)
             VALUES (?1, ?2, ?3)",
            params![
                TOKEN_SERVICE,
                credential.access_token,
                credential.expires_at.map(|t| t.to_rfc3339())
            ],
        )?;
        Ok(())
    }

    /// Get the stored API credential.
    pub fn get_token(&self) -> Result<Option<Credential>, CleanerError> {
        let row: Option<(String, Option<String>)> = self
            .conn
            .query_row(
                "SELECT token, expires_at FROM auth_tokens WHERE service = ?1",
                params![TOKEN_SERVICE],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row.map(|(access_token, expires_at)| Credential {
            access_token,
            expires_at: expires_at.as_deref().and_then(parse_datetime),
        }))
    }

    pub fn clear_token(&self) -> Result<(), CleanerError> {
        self.conn.execute(
            "DELETE FROM auth_tokens WHERE service = ?1",
            params![TOKEN_SERVICE],
        )?;
        Ok(())
    }
}

// ── Migrations ──────────────────────────────────────────────────

/// Run schema migrations using `PRAGMA user_version` for version tracking.
fn run_migrations(conn: &Connection) -> Result<(), CleanerError> {
    let version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .unwrap_or(0);

    if version < 1 {
        conn.execute_batch(SCHEMA_V1)?;
        conn.pragma_update(None, "user_version", 1)?;
    }
    Ok(())
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_read_after_write() {
        let db = Storage::open_memory().unwrap();
        db.record_progress("abc", 42).unwrap();

        let record = db.read_progress("abc").unwrap();
        assert_eq!(record.percentage, 42);
        assert!(record.last_updated.is_some());

        // Unrelated ids stay at the default.
        assert_eq!(
            db.read_progress("other").unwrap(),
            ProgressRecord::unwatched("other")
        );
    }

    #[test]
    fn test_progress_last_write_wins() {
        let db = Storage::open_memory().unwrap();
        db.record_progress("abc", 90).unwrap();
        db.record_progress("abc", 30).unwrap();
        assert_eq!(db.read_progress("abc").unwrap().percentage, 30);

        db.record_progress("abc", 30).unwrap();
        assert_eq!(db.read_progress("abc").unwrap().percentage, 30);
    }

    #[test]
    fn test_progress_key_layout() {
        let db = Storage::open_memory().unwrap();
        db.record_progress("xyz", 10).unwrap();
        let raw: Option<ProgressRecord> = db.get_json(Area::Local, "watch_xyz").unwrap();
        assert_eq!(raw.unwrap().percentage, 10);
        let synced: Option<ProgressRecord> = db.get_json(Area::Sync, "watch_xyz").unwrap();
        assert!(synced.is_none());
    }

    #[test]
    fn test_settings_default_and_replace() {
        let db = Storage::open_memory().unwrap();
        assert_eq!(db.get_settings().unwrap(), Settings::default());

        let custom = Settings {
            enabled: false,
            threshold: 90,
            auto_remove: false,
            show_visual_indicators: false,
        };
        db.save_settings(&custom).unwrap();
        assert_eq!(db.get_settings().unwrap(), custom);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let db = Storage::open_memory().unwrap();
        let bad = Settings {
            threshold: 150,
            ..Default::default()
        };
        assert!(matches!(
            db.save_settings(&bad),
            Err(CleanerError::InvalidSettings(_))
        ));
        assert_eq!(db.get_settings().unwrap().threshold, 75);
    }

    #[test]
    fn test_record_removals_is_cumulative() {
        let mut db = Storage::open_memory().unwrap();
        let now = Utc::now();
        db.record_removals(1, 150, now).unwrap();
        let stats = db.record_removals(2, 60, now).unwrap();
        assert_eq!(stats.videos_removed, 3);
        assert_eq!(stats.total_watch_time_saved, 210);
        assert_eq!(db.get_stats().unwrap(), stats);
    }

    #[test]
    fn test_initialize_defaults_keeps_existing() {
        let db = Storage::open_memory().unwrap();
        let custom = Settings {
            threshold: 50,
            ..Default::default()
        };
        db.save_settings(&custom).unwrap();
        db.initialize_defaults().unwrap();
        assert_eq!(db.get_settings().unwrap().threshold, 50);
        assert_eq!(db.get_stats().unwrap(), Stats::default());
    }

    #[test]
    fn test_auth_tokens() {
        let db = Storage::open_memory().unwrap();
        assert!(db.get_token().unwrap().is_none());

        let cred = Credential {
            access_token: "abc123".into(),
            expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
        };
        db.save_token(&cred).unwrap();
        let stored = db.get_token().unwrap().unwrap();
        assert_eq!(stored.access_token, "abc123");
        assert!(stored.expires_at.is_some());

        db.clear_token().unwrap();
        assert!(db.get_token().unwrap().is_none());
    }

    #[test]
    fn test_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("laterclean.db");
        {
            let db = Storage::open(&path).unwrap();
            db.record_progress("persisted", 77).unwrap();
        }
        let db = Storage::open(&path).unwrap();
        assert_eq!(db.read_progress("persisted").unwrap().percentage, 77);
    }

    #[test]
    fn test_corrupt_document_is_persistence_error() {
        let db = Storage::open_memory().unwrap();
        db.conn
            .execute(
                "INSERT INTO kv (area, key, value) VALUES ('sync', 'settings', 'not json')",
                [],
            )
            .unwrap();
        assert!(matches!(
            db.get_settings(),
            Err(CleanerError::Persistence(_))
        ));
    }
}
