use async_trait::async_trait;
use thiserror::Error;
use tokio_postgres::types::{ToSql, Type};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Postgres(#[from] tokio_postgres::Error),
    #[error("table [{table}] has {expected} columns but a row has {actual} values")]
    ColumnCount {
        table: String,
        expected: usize,
        actual: usize,
    },
    #[error("unexpected value in column [{column}] of table [{table}]")]
    UnexpectedValue { table: String, column: String },
    #[error("unknown column [{column}] of table [{table}]")]
    UnknownColumn { table: String, column: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Varchar(u16),
    Text,
    Int4,
}

impl ColumnType {
    pub fn ddl(&self) -> String {
        match self {
            ColumnType::Varchar(len) => format!("varchar({})", len),
            ColumnType::Text => "text".to_string(),
            ColumnType::Int4 => "int4".to_string(),
        }
    }

    pub fn pg_type(&self) -> Type {
        match self {
            ColumnType::Varchar(_) => Type::VARCHAR,
            ColumnType::Text => Type::TEXT,
            ColumnType::Int4 => Type::INT4,
        }
    }

    pub fn is_text(&self) -> bool {
        !matches!(self, ColumnType::Int4)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnDesc {
    pub name: &'static str,
    pub column_type: ColumnType,
}

/// Static description of a persisted table. Every column is `not null`.
#[derive(Debug, Clone, Copy)]
pub struct TableDesc {
    pub schema: &'static str,
    pub name: &'static str,
    pub columns: &'static [ColumnDesc],
    /// Index key lists, each rendered inside `create index ... (<key>)`.
    pub indexes: &'static [&'static str],
}

impl TableDesc {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    pub fn column_index(&self, name: &str) -> Result<usize, StorageError> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| StorageError::UnknownColumn {
                table: self.qualified_name(),
                column: name.to_string(),
            })
    }

    /// Reject a row whose arity does not match the column list.
    pub fn check_row(&self, row: &[ColumnValue]) -> Result<(), StorageError> {
        if row.len() != self.columns.len() {
            return Err(StorageError::ColumnCount {
                table: self.qualified_name(),
                expected: self.columns.len(),
                actual: row.len(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnValue {
    Text(String),
    Integer(i32),
}

impl ColumnValue {
    pub fn as_sql(&self) -> &(dyn ToSql + Sync) {
        match self {
            ColumnValue::Text(s) => s,
            ColumnValue::Integer(i) => i,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ColumnValue::Text(s) => Some(s),
            ColumnValue::Integer(_) => None,
        }
    }

    pub fn as_integer(&self) -> Option<i32> {
        match self {
            ColumnValue::Integer(i) => Some(*i),
            ColumnValue::Text(_) => None,
        }
    }

    /// Equality used by key lookups: text ignores case, integers compare
    /// exactly.
    pub fn matches(&self, other: &ColumnValue) -> bool {
        match (self, other) {
            (ColumnValue::Text(a), ColumnValue::Text(b)) => a.to_lowercase() == b.to_lowercase(),
            (ColumnValue::Integer(a), ColumnValue::Integer(b)) => a == b,
            _ => false,
        }
    }
}

impl From<&str> for ColumnValue {
    fn from(value: &str) -> Self {
        ColumnValue::Text(value.to_string())
    }
}

impl From<String> for ColumnValue {
    fn from(value: String) -> Self {
        ColumnValue::Text(value)
    }
}

impl From<i32> for ColumnValue {
    fn from(value: i32) -> Self {
        ColumnValue::Integer(value)
    }
}

pub type StoredRow = Vec<ColumnValue>;

/// Persistence backend for mapping tables.
#[async_trait]
pub trait MappingStorage: Send + Sync {
    /// Drop the table, create it anew, load `rows` and build its indexes.
    async fn recreate_table(&self, desc: &TableDesc, rows: Vec<StoredRow>)
        -> Result<(), StorageError>;

    /// Rows whose key columns equal the given values. Text keys compare
    /// case-insensitively.
    async fn select_matching(
        &self,
        desc: &TableDesc,
        keys: &[(&str, ColumnValue)],
    ) -> Result<Vec<StoredRow>, StorageError>;
}
