//! Identifier quoting for the one query whose relation name comes from the
//! caller.
//!
//! Schema and table names cannot be bound as parameters, so `list_table_data`
//! has to splice them into SQL text. This module is the only place allowed to
//! do that: every caller-supplied identifier goes through [`quote_identifier`],
//! and the driver only accepts a [`QualifiedTable`], which can only be built
//! here.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuoteError {
    #[error("identifier must not be empty")]
    Empty,
    #[error("identifier must not contain NUL characters")]
    ContainsNul,
}

/// Wraps `name` in double quotes, doubling any embedded double quote.
pub fn quote_identifier(name: &str) -> Result<String, QuoteError> {
    if name.is_empty() {
        return Err(QuoteError::Empty);
    }
    // Postgres cannot store NUL in an identifier; refuse instead of truncating.
    if name.contains('\0') {
        return Err(QuoteError::ContainsNul);
    }

    let mut quoted = String::with_capacity(name.len() + 2);
    quoted.push('"');
    for c in name.chars() {
        if c == '"' {
            quoted.push('"');
        }
        quoted.push(c);
    }
    quoted.push('"');
    Ok(quoted)
}

/// A `"schema"."table"` reference built from caller input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedTable {
    schema: String,
    table: String,
    quoted: String,
}

impl QualifiedTable {
    pub fn new(schema: &str, table: &str) -> Result<Self, QuoteError> {
        let quoted = format!("{}.{}", quote_identifier(schema)?, quote_identifier(table)?);
        Ok(Self {
            schema: schema.to_owned(),
            table: table.to_owned(),
            quoted,
        })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn select_all_sql(&self) -> String {
        format!("SELECT * FROM {}", self.quoted)
    }
}

impl fmt::Display for QualifiedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.quoted)
    }
}
