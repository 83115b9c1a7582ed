pub mod backend;
pub mod client;
pub mod config;
pub mod pool;
pub mod prepare;
pub mod result;
pub mod transaction;
pub mod value;

use thiserror::Error;

pub use backend::{BackendClient, ExecuteRequest, Issue, QueryResultPart, Session, Status};
pub use client::StratumBridge;
pub use config::PoolConfig;
pub use pool::{SessionHandle, SessionPool};
pub use prepare::{prepare, PreparedQuery, Query, QueryArg, ScalarKind, TypeHint};
pub use result::{collect_result, Column, QueryResult};
pub use transaction::{IsolationLevel, TransactionManager, TransactionMeta};
pub use value::{ColumnType, TypedValue, Value, ValueType};

/// Core error type for bridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Backend Status {code}: {}", issues_summary(.issues))]
    Status { code: u32, issues: Vec<Issue> },
    #[error("Unknown Transaction: {0}")]
    UnknownTransaction(String),
    #[error("Placeholder ${index} out of range for {arg_count} arguments")]
    PlaceholderOutOfRange { index: usize, arg_count: usize },
    #[error("Query uses {needed} placeholders but only {supplied} arguments were supplied")]
    TooManyPlaceholders { needed: usize, supplied: usize },
    #[error("Query mixes ordinal ($N) and sequential (?) placeholders")]
    MixedPlaceholders,
    #[error("Invalid Parameter Value: {0}")]
    InvalidParameterValue(String),
    #[error("Unsupported Parameter Type: {0}")]
    UnsupportedParameterType(String),
    #[error("Column {0:?} is missing a backend type")]
    MissingColumnType(String),
    #[error("Client is not connected")]
    NotConnected,
    #[error("Transport Error: {0}")]
    Transport(String),
}

fn issues_summary(issues: &[Issue]) -> String {
    if issues.is_empty() {
        "no issues reported".to_string()
    } else {
        issues
            .iter()
            .map(|i| i.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
