use thiserror::Error;

use crate::ast::KnownFunction;
use crate::mapping::MappingError;

#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("[{function}] function expected to have {expected} arguments but was [{actual}]")]
    ArgumentCount {
        function: KnownFunction,
        expected: String,
        actual: usize,
    },
    #[error("expected {function} function parameters to be integer literals, but was [{arguments}]")]
    LiteralRequired {
        function: KnownFunction,
        arguments: String,
    },
    #[error("invalid date components [{0}]")]
    InvalidDate(String),
    #[error("[{0}] function expected to have column reference as an argument")]
    ColumnReferenceRequired(KnownFunction),
    #[error("can't find table for column reference [{column}]")]
    UnresolvedTable { column: String },
    #[error("[TypeIdentifier] function not supported for table function column reference [{column}]")]
    UnsupportedTable { column: String },
    #[error("can't find mapping for table [{table}] in column reference [{column}] for function [TypeIdentifier]")]
    UnmappedTable { table: String, column: String },
    #[error("can't find indexed mapping for [{nested}] following column reference [{column}] for function [TypeIdentifier]")]
    NestedTableUnmapped { nested: String, column: String },
    #[error("[TypeIdentifier] function not supported for non-reference columns, [{column}]")]
    NonReferenceColumn { column: String },
    #[error("could not find columns [{column}] for function [TypeIdentifier]")]
    UnresolvedColumn { column: String },
    #[error("can't find field [{column}] in union branch")]
    MissingUnionField { column: String },
    #[error("field [{column}] matches more than one field of a union branch")]
    AmbiguousUnionField { column: String },
    #[error("field [{column}] of union branch is not a column reference")]
    UnionFieldNotColumn { column: String },
    #[error("derived tables behind [{column}] are nested deeper than {limit} levels")]
    UnionDepthExceeded { column: String, limit: usize },
    #[error("derived table behind [{column}] is not a SELECT")]
    UnsupportedSubquery { column: String },
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error(transparent)]
    Parse(#[from] anyhow::Error),
}
