use crate::transaction::IsolationLevel;
use crate::value::{TypedValue, ValueType};
use crate::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// A backend session. Exclusively owned by at most one logical caller at a
/// time; the pool owns it while idle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub node_id: u32,
}

/// Backend status code attached to every response and result part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status(pub u32);

impl Status {
    pub const SUCCESS: Status = Status(0);

    pub fn is_success(&self) -> bool {
        self.0 == 0
    }
}

/// A single diagnostic attached to a non-success status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: u32,
    pub message: String,
}

/// Column descriptor as reported by the backend. The type is optional on the
/// wire; the normalizer rejects columns that fail to report one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDesc {
    pub name: String,
    pub column_type: Option<ValueType>,
}

/// One result-set shape carried by a streamed part.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResultSet {
    pub columns: Vec<ColumnDesc>,
    pub rows: Vec<Vec<TypedValue>>,
}

/// Per-operation row/byte counters inside a table access phase.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OpStats {
    pub rows: u64,
    pub bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TableAccessStats {
    pub name: String,
    pub reads: Option<OpStats>,
    pub updates: Option<OpStats>,
    pub deletes: Option<OpStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QueryPhaseStats {
    pub duration_us: u64,
    pub table_access: Vec<TableAccessStats>,
}

/// Execution statistics reported alongside a streamed result.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecStats {
    pub query_phases: Vec<QueryPhaseStats>,
    pub total_duration_us: u64,
}

/// One chunk of a streamed query result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResultPart {
    pub status: Status,
    pub issues: Vec<Issue>,
    pub result_set: Option<ResultSet>,
    pub exec_stats: Option<ExecStats>,
}

impl QueryResultPart {
    pub fn success() -> Self {
        Self {
            status: Status::SUCCESS,
            issues: Vec::new(),
            result_set: None,
            exec_stats: None,
        }
    }
}

/// Query execution request sent on an attached session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub session_id: String,
    pub text: String,
    pub parameters: Vec<(String, TypedValue)>,
    pub tx_id: Option<String>,
}

/// Transaction metadata issued by the backend on begin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxResponse {
    pub tx_id: String,
}

/// Finite, non-restartable sequence of streamed result parts. Consuming it is
/// destructive; it is drained exactly once per call.
pub type PartStream = BoxStream<'static, Result<QueryResultPart>>;

/// The network collaborator capable of opening sessions and streaming typed
/// result parts. Implementations map non-success backend statuses on the
/// unary calls to `BridgeError::Status`.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Create a session. Must be attached before use.
    async fn create_session(&self) -> Result<Session>;

    /// Attach to a created session; the session is unusable until this
    /// acknowledges.
    async fn attach_session(&self, session_id: &str) -> Result<()>;

    /// Best-effort teardown; the backend may have already reclaimed the
    /// session.
    async fn delete_session(&self, session_id: &str) -> Result<()>;

    /// Execute a query on a session, streaming result parts.
    async fn execute_query(&self, request: ExecuteRequest) -> Result<PartStream>;

    async fn begin_transaction(
        &self,
        session_id: &str,
        isolation: IsolationLevel,
    ) -> Result<TxResponse>;

    async fn commit_transaction(&self, session_id: &str, tx_id: &str) -> Result<()>;

    async fn rollback_transaction(&self, session_id: &str, tx_id: &str) -> Result<()>;
}
