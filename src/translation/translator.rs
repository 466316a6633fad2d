use std::sync::Arc;

use tracing::{debug, info};

use super::error::TranslationError;
use super::pipeline::Pipeline;
use crate::ast::compiler::compile;
use crate::ast::parser::parse_single;
use crate::ast::Query;
use crate::db::MappingStorage;
use crate::mapping::{MappingSet, MappingSource, SchemaStore};

/// Translates query text against mappings held in a [`SchemaStore`].
pub struct Translator<S> {
    store: Arc<SchemaStore<S>>,
}

impl<S: MappingStorage> Translator<S> {
    pub fn new(store: Arc<SchemaStore<S>>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &SchemaStore<S> {
        &self.store
    }

    /// Parse one statement, load the mappings it needs, rewrite it and
    /// render PostgreSQL text.
    pub async fn translate(&self, sql: &str) -> Result<String, TranslationError> {
        let query = parse_single(sql)?;
        self.store.warm_for_query(&query).await?;
        let output = rewrite_and_compile(self.store.as_ref(), query)?;
        info!(bytes = output.len(), "query translated");
        Ok(output)
    }
}

/// Translate with an in-memory mapping set; no database is involved.
pub fn translate_offline(sql: &str, mappings: &MappingSet) -> Result<String, TranslationError> {
    let query = parse_single(sql)?;
    rewrite_and_compile(mappings, query)
}

fn rewrite_and_compile<M: MappingSource + ?Sized>(
    mappings: &M,
    query: Query,
) -> Result<String, TranslationError> {
    let rewritten = Pipeline::with_defaults(mappings).run(query)?;
    let output = compile(&rewritten);
    debug!(sql = %output, "compiled");
    Ok(output)
}
