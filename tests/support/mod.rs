//! Scripted BackendClient double shared by the integration suites.

use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use stratum_client::backend::{
    BackendClient, ColumnDesc, ExecuteRequest, PartStream, QueryResultPart, ResultSet, Session,
    Status, TxResponse,
};
use stratum_client::transaction::IsolationLevel;
use stratum_client::value::{TypedValue, ValueType};
use stratum_client::{BridgeError, Issue, Result};

#[derive(Default)]
struct MockState {
    next_session: u32,
    next_tx: u32,
    created: Vec<String>,
    deleted: Vec<String>,
    executed: Vec<ExecuteRequest>,
    begun: Vec<(String, String, IsolationLevel)>,
    committed: Vec<String>,
    rolled_back: Vec<String>,
    /// Scripts consumed one per execute_query call; default is a single
    /// success part.
    scripted_parts: VecDeque<Vec<QueryResultPart>>,
    fail_next_creates: usize,
    fail_begin: bool,
    fail_commit: bool,
    fail_delete: bool,
}

#[derive(Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
}

#[allow(dead_code)]
impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script_parts(&self, parts: Vec<QueryResultPart>) {
        self.state.lock().scripted_parts.push_back(parts);
    }

    pub fn fail_next_creates(&self, n: usize) {
        self.state.lock().fail_next_creates = n;
    }

    pub fn fail_begin(&self, fail: bool) {
        self.state.lock().fail_begin = fail;
    }

    pub fn fail_commit(&self, fail: bool) {
        self.state.lock().fail_commit = fail;
    }

    pub fn fail_delete(&self, fail: bool) {
        self.state.lock().fail_delete = fail;
    }

    pub fn created(&self) -> Vec<String> {
        self.state.lock().created.clone()
    }

    pub fn created_count(&self) -> usize {
        self.state.lock().created.len()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().deleted.clone()
    }

    pub fn executed(&self) -> Vec<ExecuteRequest> {
        self.state.lock().executed.clone()
    }

    pub fn committed(&self) -> Vec<String> {
        self.state.lock().committed.clone()
    }

    pub fn rolled_back(&self) -> Vec<String> {
        self.state.lock().rolled_back.clone()
    }
}

fn status_error(code: u32, message: &str) -> BridgeError {
    BridgeError::Status {
        code,
        issues: vec![Issue {
            severity: 1,
            message: message.to_string(),
        }],
    }
}

#[async_trait]
impl BackendClient for MockBackend {
    async fn create_session(&self) -> Result<Session> {
        let mut state = self.state.lock();
        if state.fail_next_creates > 0 {
            state.fail_next_creates -= 1;
            return Err(status_error(503, "session create refused"));
        }
        state.next_session += 1;
        let session = Session {
            session_id: format!("sess-{}", state.next_session),
            node_id: state.next_session,
        };
        state.created.push(session.session_id.clone());
        Ok(session)
    }

    async fn attach_session(&self, _session_id: &str) -> Result<()> {
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.deleted.push(session_id.to_string());
        if state.fail_delete {
            return Err(status_error(404, "session already gone"));
        }
        Ok(())
    }

    async fn execute_query(&self, request: ExecuteRequest) -> Result<PartStream> {
        let parts = {
            let mut state = self.state.lock();
            state.executed.push(request);
            state
                .scripted_parts
                .pop_front()
                .unwrap_or_else(|| vec![QueryResultPart::success()])
        };
        Ok(stream::iter(parts.into_iter().map(Ok)).boxed())
    }

    async fn begin_transaction(
        &self,
        session_id: &str,
        isolation: IsolationLevel,
    ) -> Result<TxResponse> {
        let mut state = self.state.lock();
        if state.fail_begin {
            return Err(status_error(500, "begin rejected"));
        }
        state.next_tx += 1;
        let tx_id = format!("tx-{}", state.next_tx);
        state
            .begun
            .push((session_id.to_string(), tx_id.clone(), isolation));
        Ok(TxResponse { tx_id })
    }

    async fn commit_transaction(&self, _session_id: &str, tx_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_commit {
            return Err(status_error(500, "commit rejected"));
        }
        state.committed.push(tx_id.to_string());
        Ok(())
    }

    async fn rollback_transaction(&self, _session_id: &str, tx_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.rolled_back.push(tx_id.to_string());
        Ok(())
    }
}

/// One success part carrying a single int32 column with the given rows.
#[allow(dead_code)]
pub fn rows_part(with_columns: bool, values: Vec<i32>) -> QueryResultPart {
    let mut part = QueryResultPart::success();
    part.result_set = Some(ResultSet {
        columns: if with_columns {
            vec![ColumnDesc {
                name: "id".to_string(),
                column_type: Some(ValueType::Int32),
            }]
        } else {
            Vec::new()
        },
        rows: values
            .into_iter()
            .map(|v| vec![TypedValue::Int32(v)])
            .collect(),
    });
    part
}

/// A non-success part as the backend reports mid-stream failures.
#[allow(dead_code)]
pub fn failing_part(code: u32, message: &str) -> QueryResultPart {
    QueryResultPart {
        status: Status(code),
        issues: vec![Issue {
            severity: 1,
            message: message.to_string(),
        }],
        result_set: None,
        exec_stats: None,
    }
}
