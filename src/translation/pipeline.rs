//! Ordered rewrite passes over a parsed query.
//!
//! Each pass takes a query and returns the transformed query. Passes run in
//! the order they were added; the first failing pass aborts the pipeline.

use tracing::debug;

use super::error::TranslationError;
use super::function_rewriter::QueryFunctionRewriter;
use crate::ast::visit::rewrite_query;
use crate::ast::Query;
use crate::mapping::MappingSource;

/// A single transformation over a query AST.
pub trait RewritePass {
    /// Unique name identifying this pass.
    fn name(&self) -> &str;

    fn transform(&self, query: Query) -> Result<Query, TranslationError>;
}

impl<M: MappingSource + ?Sized> RewritePass for QueryFunctionRewriter<'_, M> {
    fn name(&self) -> &str {
        "query_functions"
    }

    fn transform(&self, query: Query) -> Result<Query, TranslationError> {
        rewrite_query(&mut &*self, query)
    }
}

#[derive(Default)]
pub struct Pipeline<'a> {
    passes: Vec<Box<dyn RewritePass + 'a>>,
}

impl<'a> Pipeline<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pipeline with the standard passes, reading mappings from `mappings`.
    pub fn with_defaults<M: MappingSource + ?Sized>(mappings: &'a M) -> Self {
        let mut pipeline = Self::new();
        pipeline.add_pass(Box::new(QueryFunctionRewriter::new(mappings)));
        pipeline
    }

    pub fn add_pass(&mut self, pass: Box<dyn RewritePass + 'a>) {
        self.passes.push(pass);
    }

    pub fn run(&self, query: Query) -> Result<Query, TranslationError> {
        let mut current = query;
        for pass in &self.passes {
            debug!(pass = pass.name(), "running rewrite pass");
            current = pass.transform(current)?;
        }
        Ok(current)
    }

    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(|p| p.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::compiler::compile;
    use crate::ast::parser::parse_single;
    use crate::ast::{SelectItem, SelectQuery};
    use crate::mapping::MappingSet;

    /// Appends a constant projection, to observe pass ordering.
    struct AppendLiteral(i64);

    impl RewritePass for AppendLiteral {
        fn name(&self) -> &str {
            "append_literal"
        }

        fn transform(&self, query: Query) -> Result<Query, TranslationError> {
            match query {
                Query::Select(mut s) => {
                    s.projections.push(SelectItem::Expression {
                        expr: crate::ast::Expression::integer(self.0),
                        alias: None,
                    });
                    Ok(Query::Select(s))
                }
                other => Ok(other),
            }
        }
    }

    #[test]
    fn test_default_pipeline_rewrites_functions() {
        let mappings = MappingSet::default();
        let pipeline = Pipeline::with_defaults(&mappings);
        assert_eq!(pipeline.pass_names(), vec!["query_functions"]);
        let query = parse_single("SELECT PRESENTATION(t.name) FROM t").unwrap();
        assert_eq!(
            compile(&pipeline.run(query).unwrap()),
            "SELECT t.name FROM t"
        );
    }

    #[test]
    fn test_passes_run_in_order() {
        let mut pipeline = Pipeline::new();
        pipeline.add_pass(Box::new(AppendLiteral(1)));
        pipeline.add_pass(Box::new(AppendLiteral(2)));
        let query = Query::Select(Box::new(SelectQuery::default()));
        assert_eq!(compile(&pipeline.run(query).unwrap()), "SELECT 1, 2");
    }

    #[test]
    fn test_failing_pass_aborts() {
        let mappings = MappingSet::default();
        let mut pipeline = Pipeline::with_defaults(&mappings);
        pipeline.add_pass(Box::new(AppendLiteral(1)));
        let query = parse_single("SELECT TYPEIDENTIFIER(t.owner) FROM t").unwrap();
        assert!(matches!(
            pipeline.run(query),
            Err(TranslationError::UnmappedTable { .. })
        ));
    }
}
