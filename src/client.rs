use crate::backend::{BackendClient, ExecuteRequest};
use crate::config::PoolConfig;
use crate::pool::SessionPool;
use crate::prepare::{prepare, PreparedQuery, Query};
use crate::result::{collect_result, QueryResult};
use crate::transaction::{IsolationLevel, TransactionManager, TransactionMeta};
use crate::{BridgeError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Client facade bridging the stateless query contract onto the
/// session-oriented backend: prepares queries, routes them over pooled or
/// transaction-pinned sessions, and normalizes streamed results.
pub struct StratumBridge {
    backend: Arc<dyn BackendClient>,
    pool: Arc<SessionPool>,
    transactions: TransactionManager,
    closed: AtomicBool,
}

impl StratumBridge {
    pub fn new(backend: Arc<dyn BackendClient>, config: PoolConfig) -> Self {
        let pool = Arc::new(SessionPool::new(Arc::clone(&backend), config));
        let transactions = TransactionManager::new(Arc::clone(&backend), Arc::clone(&pool));
        Self {
            backend,
            pool,
            transactions,
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(BridgeError::NotConnected)
        } else {
            Ok(())
        }
    }

    /// Execute a parameterized query. With a `tx_id` the query runs on the
    /// exact session pinned to that transaction, which stays pinned
    /// afterwards; without one, a pooled session is used and released once
    /// the result stream is fully drained or errors.
    pub async fn execute_query(&self, query: &Query, tx_id: Option<&str>) -> Result<QueryResult> {
        self.ensure_open()?;
        let prepared = prepare(query)?;
        match tx_id {
            Some(tx_id) => {
                let session = self.transactions.session_for(tx_id)?;
                self.run(prepared, &session.session_id, Some(tx_id)).await
            }
            None => {
                let handle = self.pool.acquire().await?;
                let result = self
                    .run(prepared, &handle.session().session_id, None)
                    .await;
                handle.release(result.as_ref().err()).await;
                result
            }
        }
    }

    /// Execute a multi-statement script on a dedicated pooled session. No
    /// result rows are expected; any produced are dropped.
    pub async fn execute_script(&self, text: &str) -> Result<()> {
        self.ensure_open()?;
        let prepared = PreparedQuery {
            text: text.to_string(),
            parameters: Vec::new(),
        };
        let handle = self.pool.acquire().await?;
        let result = self
            .run(prepared, &handle.session().session_id, None)
            .await;
        handle.release(result.as_ref().err()).await;
        result.map(|_| ())
    }

    async fn run(
        &self,
        prepared: PreparedQuery,
        session_id: &str,
        tx_id: Option<&str>,
    ) -> Result<QueryResult> {
        let request = ExecuteRequest {
            session_id: session_id.to_string(),
            text: prepared.text,
            parameters: prepared.parameters,
            tx_id: tx_id.map(str::to_string),
        };
        let parts = self.backend.execute_query(request).await?;
        collect_result(parts).await
    }

    pub async fn begin_transaction(&self, isolation: IsolationLevel) -> Result<TransactionMeta> {
        self.ensure_open()?;
        self.transactions.begin(isolation).await
    }

    pub async fn commit_transaction(&self, tx_id: &str) -> Result<()> {
        self.ensure_open()?;
        self.transactions.commit(tx_id).await
    }

    pub async fn rollback_transaction(&self, tx_id: &str) -> Result<()> {
        self.ensure_open()?;
        self.transactions.rollback(tx_id).await
    }

    /// Dispose all live transactions and drain the pool. Idempotent; later
    /// operations fail with `NotConnected`.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("closing client bridge");
        self.transactions.dispose().await;
        self.pool.drain().await;
    }
}
