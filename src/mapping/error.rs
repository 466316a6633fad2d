use thiserror::Error;

use crate::db::StorageError;

#[derive(Debug, Error)]
pub enum MappingError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("invalid property mapping [{text}] of table [{table}]")]
    MalformedProperty { table: String, text: String },
    #[error("unknown table type [{0}]")]
    UnknownTableType(String),
    #[error("mapping for table [{0}] was not loaded before translation")]
    NotLoaded(String),
    #[error("duplicate {kind} table name [{name}]")]
    DuplicateName { kind: &'static str, name: String },
    #[error("property [{property}] of table [{table}] references unknown table [{nested}]")]
    UnknownNestedTable {
        table: String,
        property: String,
        nested: String,
    },
    #[error("table [{0}] is a reference target but has no type index")]
    MissingIndex(String),
    #[error("type index [{index}] of table [{table}] is not encoded in its physical name [{db_table_name}]")]
    IndexMismatch {
        table: String,
        index: i32,
        db_table_name: String,
    },
}
