//! Catalog introspection against the active connection.
//!
//! Every listing uses fixed, parameterized SQL except [`list_table_data`],
//! which goes through [`QualifiedTable`] for its relation name.

use crate::db::{with_deadline, QualifiedTable};
use crate::error::{Error, Result};
use crate::models::{ColumnDefinition, IndexDefinition, QueryResult};
use crate::state::ConnectionManager;

/// Names that are never reported as user schemas.
pub fn is_system_schema(name: &str) -> bool {
    name.starts_with("pg_") || name == "information_schema"
}

pub async fn list_schemas(connections: &ConnectionManager) -> Result<Vec<String>> {
    let active = connections.current().await?;
    let mut schemas = with_deadline(connections.timeouts().catalog, active.driver.get_schemas())
        .await
        .map_err(|source| Error::Catalog {
            what: "schemas",
            source,
        })?;

    schemas.retain(|s| !is_system_schema(s));
    schemas.sort();
    Ok(schemas)
}

pub async fn list_tables(connections: &ConnectionManager, schema: &str) -> Result<Vec<String>> {
    let active = connections.current().await?;
    with_deadline(connections.timeouts().catalog, active.driver.get_tables(schema))
        .await
        .map_err(|source| Error::Catalog {
            what: "tables",
            source,
        })
}

pub async fn list_views(connections: &ConnectionManager, schema: &str) -> Result<Vec<String>> {
    let active = connections.current().await?;
    with_deadline(connections.timeouts().catalog, active.driver.get_views(schema))
        .await
        .map_err(|source| Error::Catalog {
            what: "views",
            source,
        })
}

pub async fn list_indexes(
    connections: &ConnectionManager,
    schema: &str,
) -> Result<Vec<IndexDefinition>> {
    let active = connections.current().await?;
    with_deadline(connections.timeouts().catalog, active.driver.get_indexes(schema))
        .await
        .map_err(|source| Error::Catalog {
            what: "indexes",
            source,
        })
}

pub async fn list_columns(
    connections: &ConnectionManager,
    schema: &str,
    table: &str,
) -> Result<Vec<ColumnDefinition>> {
    require_names(schema, table)?;
    let active = connections.current().await?;
    with_deadline(
        connections.timeouts().catalog,
        active.driver.get_columns(schema, table),
    )
    .await
    .map_err(|source| Error::Catalog {
        what: "columns",
        source,
    })
}

/// Every row of `schema.table`.
pub async fn list_table_data(
    connections: &ConnectionManager,
    schema: &str,
    table: &str,
) -> Result<QueryResult> {
    require_names(schema, table)?;
    let relation = QualifiedTable::new(schema, table)
        .map_err(|e| Error::InvalidArgument(format!("invalid table reference: {e}")))?;

    let active = connections.current().await?;
    with_deadline(
        connections.timeouts().table_data,
        active.driver.get_table_data(&relation),
    )
    .await
    .map_err(|source| {
        if source.is_materialize() {
            Error::Materialize(source)
        } else {
            Error::Catalog {
                what: "table data",
                source,
            }
        }
    })
}

fn require_names(schema: &str, table: &str) -> Result<()> {
    if schema.is_empty() || table.is_empty() {
        return Err(Error::InvalidArgument(
            "schema and table parameters are required".into(),
        ));
    }
    Ok(())
}
