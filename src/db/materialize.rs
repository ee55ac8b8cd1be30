//! Turns a cursor over rows of unknown shape into [`QueryResult`].

use futures::{Stream, StreamExt};

use crate::error::DbError;
use crate::models::{CellValue, QueryResult, RawValue, RowMap};

/// A row that can be scanned slot by slot without knowing its schema.
pub trait TabularRow {
    fn width(&self) -> usize;
    fn scan(&self, index: usize) -> Result<RawValue, DbError>;
}

impl TabularRow for Vec<RawValue> {
    fn width(&self) -> usize {
        self.len()
    }

    fn scan(&self, index: usize) -> Result<RawValue, DbError> {
        self.get(index)
            .cloned()
            .ok_or_else(|| DbError::Scan(format!("no value at index {index}")))
    }
}

/// Drains `cursor` into column names plus name → value row maps.
///
/// A cursor error before the first row is returned as is (the statement itself
/// failed); after that it becomes [`DbError::Iteration`]. Nothing partial is
/// returned.
pub async fn materialize<S, R>(columns: Vec<String>, mut cursor: S) -> Result<QueryResult, DbError>
where
    S: Stream<Item = Result<R, DbError>> + Unpin,
    R: TabularRow,
{
    let mut rows = Vec::new();
    let mut buffer: Vec<RawValue> = Vec::with_capacity(columns.len());

    while let Some(next) = cursor.next().await {
        let row = match next {
            Ok(row) => row,
            Err(e) if rows.is_empty() => return Err(e),
            Err(e) => return Err(DbError::Iteration(e.to_string())),
        };

        if row.width() != columns.len() {
            return Err(DbError::Scan(format!(
                "row has {} values, expected {}",
                row.width(),
                columns.len()
            )));
        }

        buffer.clear();
        for index in 0..columns.len() {
            buffer.push(row.scan(index)?);
        }

        let mut map = RowMap::new();
        for (name, raw) in columns.iter().zip(buffer.drain(..)) {
            map.insert(name.clone(), CellValue::from(raw));
        }
        rows.push(map);
    }

    Ok(QueryResult { columns, rows })
}
