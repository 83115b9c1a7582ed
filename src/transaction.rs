use crate::backend::{BackendClient, Session};
use crate::pool::{SessionHandle, SessionPool};
use crate::{BridgeError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IsolationLevel {
    Serializable,
    SnapshotReadOnly,
}

/// Engine-facing transaction metadata returned by `begin`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionMeta {
    pub tx_id: String,
    pub session_id: String,
    pub node_id: u32,
    pub isolation: IsolationLevel,
}

struct TxEntry {
    handle: SessionHandle,
    isolation: IsolationLevel,
}

/// Pins one pooled session to one transaction id for its whole lifetime.
/// Sole owner of the `tx_id -> context` mapping; a transaction leaves the
/// map exactly once, via commit, rollback, or forced disposal.
pub struct TransactionManager {
    backend: Arc<dyn BackendClient>,
    pool: Arc<SessionPool>,
    live: Mutex<HashMap<String, TxEntry>>,
}

impl TransactionManager {
    pub fn new(backend: Arc<dyn BackendClient>, pool: Arc<SessionPool>) -> Self {
        Self {
            backend,
            pool,
            live: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire a session and open a backend transaction on it. A session
    /// whose begin call failed is untrustworthy and is destroyed.
    pub async fn begin(&self, isolation: IsolationLevel) -> Result<TransactionMeta> {
        let handle = self.pool.acquire().await?;
        let response = match self
            .backend
            .begin_transaction(&handle.session().session_id, isolation)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                handle.release(Some(&e)).await;
                return Err(e);
            }
        };
        let session = handle.session().clone();
        debug!(tx_id = %response.tx_id, session_id = %session.session_id, "transaction started");
        let meta = TransactionMeta {
            tx_id: response.tx_id.clone(),
            session_id: session.session_id,
            node_id: session.node_id,
            isolation,
        };
        self.live.lock().insert(
            response.tx_id,
            TxEntry { handle, isolation },
        );
        Ok(meta)
    }

    /// The exact session pinned to a live transaction. Every query carrying
    /// this tx id must run on it.
    pub fn session_for(&self, tx_id: &str) -> Result<Session> {
        let live = self.live.lock();
        live.get(tx_id)
            .map(|entry| entry.handle.session().clone())
            .ok_or_else(|| BridgeError::UnknownTransaction(tx_id.to_string()))
    }

    pub fn isolation_of(&self, tx_id: &str) -> Result<IsolationLevel> {
        let live = self.live.lock();
        live.get(tx_id)
            .map(|entry| entry.isolation)
            .ok_or_else(|| BridgeError::UnknownTransaction(tx_id.to_string()))
    }

    pub async fn commit(&self, tx_id: &str) -> Result<()> {
        self.finish(tx_id, true).await
    }

    pub async fn rollback(&self, tx_id: &str) -> Result<()> {
        self.finish(tx_id, false).await
    }

    /// Shared commit/rollback path. Removing the entry first makes a second
    /// finish on the same id fail with `UnknownTransaction`; the pinned
    /// session is released no matter how the backend call goes.
    async fn finish(&self, tx_id: &str, commit: bool) -> Result<()> {
        let entry = self
            .live
            .lock()
            .remove(tx_id)
            .ok_or_else(|| BridgeError::UnknownTransaction(tx_id.to_string()))?;
        let session_id = entry.handle.session().session_id.clone();
        let result = if commit {
            self.backend.commit_transaction(&session_id, tx_id).await
        } else {
            self.backend.rollback_transaction(&session_id, tx_id).await
        };
        entry.handle.release(result.as_ref().err()).await;
        debug!(tx_id, session_id = %session_id, commit, ok = result.is_ok(), "transaction finished");
        result
    }

    /// Force-finish every live transaction at shutdown. Transaction state on
    /// those sessions is indeterminate, so each is destroyed, never pooled.
    pub async fn dispose(&self) {
        let entries: Vec<(String, TxEntry)> = self.live.lock().drain().collect();
        if !entries.is_empty() {
            warn!("disposing {} live transactions", entries.len());
        }
        for (tx_id, entry) in entries {
            let error = BridgeError::Transport(format!("transaction {} forcibly disposed", tx_id));
            entry.handle.release(Some(&error)).await;
        }
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }
}
