use crate::backend::{ExecStats, PartStream};
use crate::value::{decode, ColumnType, Value, ValueType};
use crate::{BridgeError, Result};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Column metadata captured from the first result-set-bearing part.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub backend_type: ValueType,
}

/// Fully materialized, engine-agnostic result. Either every part collected
/// successfully or the whole call failed; partial results never escape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<Column>,
    pub column_types: Vec<ColumnType>,
    pub rows: Vec<Vec<Value>>,
    pub rows_affected: Option<u64>,
    pub stats: Option<ExecStats>,
}

/// Fold a streamed sequence of result parts into one result. Parts are
/// consumed in arrival order and concatenated; the first non-success status
/// aborts collection and everything accumulated so far is discarded.
pub async fn collect_result(mut parts: PartStream) -> Result<QueryResult> {
    let mut columns: Vec<Column> = Vec::new();
    let mut column_types: Vec<ColumnType> = Vec::new();
    let mut rows: Vec<Vec<Value>> = Vec::new();
    let mut rows_affected: Option<u64> = None;
    let mut stats: Option<ExecStats> = None;

    while let Some(part) = parts.next().await {
        let part = part?;
        if !part.status.is_success() {
            return Err(BridgeError::Status {
                code: part.status.0,
                issues: part.issues,
            });
        }
        if let Some(result_set) = part.result_set {
            if columns.is_empty() && !result_set.columns.is_empty() {
                for desc in &result_set.columns {
                    let backend_type = desc
                        .column_type
                        .clone()
                        .ok_or_else(|| BridgeError::MissingColumnType(desc.name.clone()))?;
                    column_types.push(ColumnType::from_value_type(&backend_type));
                    columns.push(Column {
                        name: desc.name.clone(),
                        backend_type,
                    });
                }
            }
            for row in &result_set.rows {
                rows.push(row.iter().map(decode).collect());
            }
        }
        if let Some(exec_stats) = part.exec_stats {
            let affected = affected_rows(&exec_stats);
            *rows_affected.get_or_insert(0) += affected;
            stats = Some(exec_stats);
        }
    }

    debug!(
        columns = columns.len(),
        rows = rows.len(),
        rows_affected,
        "result collected"
    );
    Ok(QueryResult {
        columns,
        column_types,
        rows,
        rows_affected,
        stats,
    })
}

/// Affected-row count: update and delete rows summed across every reported
/// table-access phase.
fn affected_rows(stats: &ExecStats) -> u64 {
    stats
        .query_phases
        .iter()
        .flat_map(|phase| phase.table_access.iter())
        .map(|access| {
            access.updates.as_ref().map(|op| op.rows).unwrap_or(0)
                + access.deletes.as_ref().map(|op| op.rows).unwrap_or(0)
        })
        .sum()
}
