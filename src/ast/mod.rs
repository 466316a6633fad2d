/// Query AST and its frontend/backend.
///
/// ```text
/// Query text
///       ↓
/// Parser                  (parser.rs, sqlparser PostgreSQL dialect)
///       ↓
/// Query AST               (types.rs)
///       ↓
/// Rewrite passes          (visit.rs traversal, crate::translation)
///       ↓
/// SQL Compiler            (compiler.rs)
/// ```
pub mod compiler;
pub mod parser;
pub mod types;
pub mod visit;

pub use compiler::compile;
pub use parser::{parse_single, parse_sql};
pub use types::*;
pub use visit::{collect_table_names, rewrite_query, QueryRewriter, Scope};
