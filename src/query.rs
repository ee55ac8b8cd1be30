//! Ad-hoc SQL execution for `POST /query`.

use serde::Serialize;

use crate::error::{DbError, Error, Result};
use crate::models::{ExecResult, QueryResult};
use crate::state::ConnectionManager;

/// What a caller-supplied statement produced.
#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ExecOutcome {
    Rows(QueryResult),
    Affected(ExecResult),
}

/// Runs `sql` against the active connection.
///
/// The text is tried as a row-returning query first; if that fails it is
/// executed as a plain statement. Both attempts share the query deadline. When
/// both fail the error from the first attempt is returned.
pub async fn execute(connections: &ConnectionManager, sql: &str) -> Result<ExecOutcome> {
    if sql.trim().is_empty() {
        return Err(Error::InvalidArgument("query is required".into()));
    }

    let active = connections.current().await?;
    let limit = connections.timeouts().query;

    let attempt = async {
        let query_err = match active.driver.query(sql).await {
            Ok(result) => return Ok(ExecOutcome::Rows(result)),
            Err(e) if e.is_materialize() => return Err(Error::Materialize(e)),
            Err(e) => e,
        };

        match active.driver.execute(sql).await {
            Ok(rows_affected) => Ok(ExecOutcome::Affected(ExecResult::new(rows_affected))),
            Err(exec_err) => {
                tracing::debug!(
                    connection_id = %active.id,
                    query_error = %query_err,
                    exec_error = %exec_err,
                    "statement failed as query and as exec"
                );
                Err(Error::Query(query_err))
            }
        }
    };

    match tokio::time::timeout(limit, attempt).await {
        Ok(outcome) => outcome,
        Err(_) => Err(Error::Query(DbError::Timeout(limit))),
    }
}
