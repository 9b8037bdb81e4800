use std::sync::Mutex;

use laterclean_api::{ApiError, Credential, QueueItem, QueueService};

use crate::db::DbHandle;

/// Wraps a queue client so credentials survive restarts.
///
/// A fresh credential is written to the database after `authenticate`, and a
/// 401 from the remote clears the stored one so the next trigger signs in
/// again.
pub struct PersistentAuth<Q> {
    inner: Q,
    db: DbHandle,
    saved_token: Mutex<Option<String>>,
}

impl<Q: QueueService> PersistentAuth<Q> {
    pub fn new(inner: Q, db: DbHandle, saved: Option<&Credential>) -> Self {
        Self {
            inner,
            db,
            saved_token: Mutex::new(saved.map(|c| c.access_token.clone())),
        }
    }

    pub fn inner(&self) -> &Q {
        &self.inner
    }

    async fn remember(&self, credential: &Credential) {
        let changed = {
            let saved = self.saved_token.lock().unwrap_or_else(|e| e.into_inner());
            saved.as_deref() != Some(credential.access_token.as_str())
        };
        if !changed {
            return;
        }
        match self.db.save_token(credential.clone()).await {
            Ok(()) => {
                tracing::debug!("Stored new YouTube credential");
                *self.saved_token.lock().unwrap_or_else(|e| e.into_inner()) =
                    Some(credential.access_token.clone());
            }
            Err(e) => tracing::warn!("Failed to store credential: {e}"),
        }
    }

    async fn forget_on_unauthorized(&self, err: &ApiError) {
        if !err.is_unauthorized() {
            return;
        }
        tracing::info!("Credential rejected, clearing stored token");
        *self.saved_token.lock().unwrap_or_else(|e| e.into_inner()) = None;
        if let Err(e) = self.db.clear_token().await {
            tracing::warn!("Failed to clear credential: {e}");
        }
    }
}

impl<Q: QueueService> QueueService for PersistentAuth<Q> {
    async fn authenticate(&self) -> Result<Credential, ApiError> {
        let credential = self.inner.authenticate().await?;
        self.remember(&credential).await;
        Ok(credential)
    }

    async fn list_queue_items(&self, credential: &Credential) -> Result<Vec<QueueItem>, ApiError> {
        match self.inner.list_queue_items(credential).await {
            Ok(items) => Ok(items),
            Err(e) => {
                self.forget_on_unauthorized(&e).await;
                Err(e)
            }
        }
    }

    async fn remove_item(&self, credential: &Credential, item_id: &str) -> Result<(), ApiError> {
        match self.inner.remove_item(credential, item_id).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.forget_on_unauthorized(&e).await;
                Err(e)
            }
        }
    }
}
