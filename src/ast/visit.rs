//! Post-order traversal over the query AST.
//!
//! `rewrite_query` walks a query bottom-up: sub-queries in FROM first, then
//! every expression of the SELECT (children before parents), then the
//! remaining branches of a set-operation chain. Implementors of
//! `QueryRewriter` only see calls to known functions, already carrying
//! rewritten arguments, together with the `Scope` of the SELECT that
//! contains them.

use std::collections::BTreeSet;

use super::types::*;

/// Table sources visible to the expressions of one SELECT.
pub struct Scope<'a> {
    from: &'a mut [TableRef],
    joins: &'a mut [Join],
}

impl<'a> Scope<'a> {
    pub fn new(from: &'a mut [TableRef], joins: &'a mut [Join]) -> Self {
        Self { from, joins }
    }

    /// Find the table source a column qualifier refers to: the alias of an
    /// aliased source, otherwise its table name. An unqualified lookup
    /// succeeds only when exactly one source is in scope.
    pub fn find_mut(&mut self, qualifier: Option<&str>) -> Option<&mut TableRef> {
        let sources = self
            .from
            .iter_mut()
            .chain(self.joins.iter_mut().map(|j| &mut j.table));
        match qualifier {
            None => {
                let mut all: Vec<&mut TableRef> = sources.collect();
                if all.len() == 1 {
                    all.pop()
                } else {
                    None
                }
            }
            Some(qualifier) => {
                for source in sources {
                    if source.binding_name() == Some(qualifier) {
                        return Some(source);
                    }
                }
                None
            }
        }
    }
}

/// A transformation applied to every known-function call in a query.
pub trait QueryRewriter {
    type Error;

    /// Rewrite one call. Its arguments have already been rewritten.
    fn rewrite_function(
        &mut self,
        call: FunctionCall,
        scope: &mut Scope<'_>,
    ) -> Result<Expression, Self::Error>;
}

/// Rewrite a query bottom-up, stopping at the first error.
pub fn rewrite_query<R: QueryRewriter>(rewriter: &mut R, query: Query) -> Result<Query, R::Error> {
    match query {
        Query::Select(select) => Ok(Query::Select(Box::new(rewrite_select(rewriter, *select)?))),
        Query::With(mut cte) => {
            cte.ctes = cte
                .ctes
                .into_iter()
                .map(|c| {
                    Ok(CTE {
                        query: rewrite_query(rewriter, c.query)?,
                        ..c
                    })
                })
                .collect::<Result<Vec<_>, R::Error>>()?;
            cte.body = Box::new(rewrite_query(rewriter, *cte.body)?);
            Ok(Query::With(cte))
        }
        Query::Raw(sql) => Ok(Query::Raw(sql)),
    }
}

fn rewrite_select<R: QueryRewriter>(
    rewriter: &mut R,
    mut select: SelectQuery,
) -> Result<SelectQuery, R::Error> {
    select.from = select
        .from
        .into_iter()
        .map(|t| rewrite_table_ref(rewriter, t))
        .collect::<Result<Vec<_>, _>>()?;
    select.joins = select
        .joins
        .into_iter()
        .map(|j| {
            Ok(Join {
                table: rewrite_table_ref(rewriter, j.table)?,
                ..j
            })
        })
        .collect::<Result<Vec<_>, R::Error>>()?;

    let SelectQuery {
        distinct,
        projections,
        mut from,
        mut joins,
        filter,
        group_by,
        having,
        order_by,
        limit,
        offset,
        set_op,
    } = select;

    // Join conditions are expressions of this SELECT, but they live inside
    // the join list that also forms the scope; detach them while walking.
    let conditions: Vec<Option<JoinCondition>> =
        joins.iter_mut().map(|j| j.condition.take()).collect();

    let (projections, conditions, filter, group_by, having, order_by, limit, offset) = {
        let mut scope = Scope::new(&mut from, &mut joins);
        let scope = &mut scope;
        let projections = projections
            .into_iter()
            .map(|item| match item {
                SelectItem::Expression { expr, alias } => Ok(SelectItem::Expression {
                    expr: rewrite_expr(rewriter, expr, scope)?,
                    alias,
                }),
                other => Ok(other),
            })
            .collect::<Result<Vec<_>, R::Error>>()?;
        let conditions = conditions
            .into_iter()
            .map(|c| match c {
                Some(JoinCondition::On(expr)) => {
                    Ok(Some(JoinCondition::On(rewrite_expr(rewriter, expr, scope)?)))
                }
                other => Ok(other),
            })
            .collect::<Result<Vec<_>, R::Error>>()?;
        let filter = rewrite_opt(rewriter, filter, scope)?;
        let group_by = group_by
            .into_iter()
            .map(|e| rewrite_expr(rewriter, e, scope))
            .collect::<Result<Vec<_>, _>>()?;
        let having = rewrite_opt(rewriter, having, scope)?;
        let order_by = order_by
            .into_iter()
            .map(|o| {
                Ok(OrderByExpr {
                    expr: rewrite_expr(rewriter, o.expr, scope)?,
                    ..o
                })
            })
            .collect::<Result<Vec<_>, R::Error>>()?;
        let limit = rewrite_opt(rewriter, limit, scope)?;
        let offset = rewrite_opt(rewriter, offset, scope)?;
        (
            projections,
            conditions,
            filter,
            group_by,
            having,
            order_by,
            limit,
            offset,
        )
    };

    for (join, condition) in joins.iter_mut().zip(conditions) {
        join.condition = condition;
    }

    let set_op = match set_op {
        Some(op) => {
            let SetOperation { op, all, right } = *op;
            Some(Box::new(SetOperation {
                op,
                all,
                right: rewrite_query(rewriter, right)?,
            }))
        }
        None => None,
    };

    Ok(SelectQuery {
        distinct,
        projections,
        from,
        joins,
        filter,
        group_by,
        having,
        order_by,
        limit,
        offset,
        set_op,
    })
}

fn rewrite_table_ref<R: QueryRewriter>(
    rewriter: &mut R,
    table: TableRef,
) -> Result<TableRef, R::Error> {
    match table {
        TableRef::Subquery { query, alias } => Ok(TableRef::Subquery {
            query: Box::new(rewrite_query(rewriter, *query)?),
            alias,
        }),
        other => Ok(other),
    }
}

fn rewrite_opt<R: QueryRewriter>(
    rewriter: &mut R,
    expr: Option<Expression>,
    scope: &mut Scope<'_>,
) -> Result<Option<Expression>, R::Error> {
    expr.map(|e| rewrite_expr(rewriter, e, scope)).transpose()
}

fn rewrite_boxed<R: QueryRewriter>(
    rewriter: &mut R,
    expr: Box<Expression>,
    scope: &mut Scope<'_>,
) -> Result<Box<Expression>, R::Error> {
    Ok(Box::new(rewrite_expr(rewriter, *expr, scope)?))
}

fn rewrite_list<R: QueryRewriter>(
    rewriter: &mut R,
    exprs: Vec<Expression>,
    scope: &mut Scope<'_>,
) -> Result<Vec<Expression>, R::Error> {
    exprs
        .into_iter()
        .map(|e| rewrite_expr(rewriter, e, scope))
        .collect()
}

fn rewrite_expr<R: QueryRewriter>(
    rewriter: &mut R,
    expr: Expression,
    scope: &mut Scope<'_>,
) -> Result<Expression, R::Error> {
    Ok(match expr {
        Expression::QueryFunction(FunctionCall { function, args }) => {
            let args = rewrite_list(rewriter, args, scope)?;
            rewriter.rewrite_function(FunctionCall { function, args }, scope)?
        }
        Expression::BinaryOp { left, op, right } => Expression::BinaryOp {
            left: rewrite_boxed(rewriter, left, scope)?,
            op,
            right: rewrite_boxed(rewriter, right, scope)?,
        },
        Expression::UnaryOp { op, expr } => Expression::UnaryOp {
            op,
            expr: rewrite_boxed(rewriter, expr, scope)?,
        },
        Expression::Function {
            name,
            args,
            distinct,
        } => Expression::Function {
            name,
            args: rewrite_list(rewriter, args, scope)?,
            distinct,
        },
        Expression::Aggregate {
            name,
            args,
            distinct,
            filter,
        } => Expression::Aggregate {
            name,
            args: rewrite_list(rewriter, args, scope)?,
            distinct,
            filter: filter
                .map(|f| rewrite_boxed(rewriter, f, scope))
                .transpose()?,
        },
        Expression::Case {
            operand,
            when_clauses,
            else_clause,
        } => Expression::Case {
            operand: operand
                .map(|o| rewrite_boxed(rewriter, o, scope))
                .transpose()?,
            when_clauses: when_clauses
                .into_iter()
                .map(|(when, then)| {
                    Ok((
                        rewrite_expr(rewriter, when, scope)?,
                        rewrite_expr(rewriter, then, scope)?,
                    ))
                })
                .collect::<Result<Vec<_>, R::Error>>()?,
            else_clause: else_clause
                .map(|e| rewrite_boxed(rewriter, e, scope))
                .transpose()?,
        },
        Expression::Subquery(q) => Expression::Subquery(Box::new(rewrite_query(rewriter, *q)?)),
        Expression::Exists(q) => Expression::Exists(Box::new(rewrite_query(rewriter, *q)?)),
        Expression::InList {
            expr,
            list,
            negated,
        } => Expression::InList {
            expr: rewrite_boxed(rewriter, expr, scope)?,
            list: rewrite_list(rewriter, list, scope)?,
            negated,
        },
        Expression::InSubquery {
            expr,
            subquery,
            negated,
        } => Expression::InSubquery {
            expr: rewrite_boxed(rewriter, expr, scope)?,
            subquery: Box::new(rewrite_query(rewriter, *subquery)?),
            negated,
        },
        Expression::Between {
            expr,
            low,
            high,
            negated,
        } => Expression::Between {
            expr: rewrite_boxed(rewriter, expr, scope)?,
            low: rewrite_boxed(rewriter, low, scope)?,
            high: rewrite_boxed(rewriter, high, scope)?,
            negated,
        },
        Expression::IsNull { expr, negated } => Expression::IsNull {
            expr: rewrite_boxed(rewriter, expr, scope)?,
            negated,
        },
        Expression::Cast { expr, data_type } => Expression::Cast {
            expr: rewrite_boxed(rewriter, expr, scope)?,
            data_type,
        },
        Expression::Nested(inner) => Expression::Nested(rewrite_boxed(rewriter, inner, scope)?),
        leaf @ (Expression::Column { .. }
        | Expression::Literal(_)
        | Expression::Wildcard
        | Expression::Parameter(_)) => leaf,
    })
}

/// Names of every realized table the query reads, including tables inside
/// derived tables, CTEs and expression sub-queries.
pub fn collect_table_names(query: &Query) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    collect_from_query(query, &mut names);
    names
}

fn collect_from_query(query: &Query, names: &mut BTreeSet<String>) {
    match query {
        Query::Select(s) => {
            for table in s.from.iter().chain(s.joins.iter().map(|j| &j.table)) {
                match table {
                    TableRef::Table { name, .. } => {
                        names.insert(name.clone());
                    }
                    TableRef::Subquery { query, .. } => collect_from_query(query, names),
                    TableRef::Function { .. } => {}
                }
            }
            let exprs = s
                .projections
                .iter()
                .filter_map(|item| match item {
                    SelectItem::Expression { expr, .. } => Some(expr),
                    _ => None,
                })
                .chain(s.joins.iter().filter_map(|j| match &j.condition {
                    Some(JoinCondition::On(expr)) => Some(expr),
                    _ => None,
                }))
                .chain(s.filter.iter())
                .chain(s.having.iter());
            for expr in exprs {
                collect_from_expr(expr, names);
            }
            if let Some(op) = &s.set_op {
                collect_from_query(&op.right, names);
            }
        }
        Query::With(cte) => {
            for c in &cte.ctes {
                collect_from_query(&c.query, names);
            }
            collect_from_query(&cte.body, names);
        }
        Query::Raw(_) => {}
    }
}

fn collect_from_expr(expr: &Expression, names: &mut BTreeSet<String>) {
    match expr {
        Expression::Subquery(q) | Expression::Exists(q) => collect_from_query(q, names),
        Expression::InSubquery { expr, subquery, .. } => {
            collect_from_expr(expr, names);
            collect_from_query(subquery, names);
        }
        Expression::BinaryOp { left, right, .. } => {
            collect_from_expr(left, names);
            collect_from_expr(right, names);
        }
        Expression::UnaryOp { expr, .. }
        | Expression::IsNull { expr, .. }
        | Expression::Cast { expr, .. }
        | Expression::Nested(expr) => collect_from_expr(expr, names),
        Expression::QueryFunction(FunctionCall { args, .. })
        | Expression::Function { args, .. }
        | Expression::Aggregate { args, .. } => {
            for arg in args {
                collect_from_expr(arg, names);
            }
        }
        Expression::Case {
            when_clauses,
            else_clause,
            ..
        } => {
            for (when, then) in when_clauses {
                collect_from_expr(when, names);
                collect_from_expr(then, names);
            }
            if let Some(e) = else_clause {
                collect_from_expr(e, names);
            }
        }
        Expression::InList { expr, list, .. } => {
            collect_from_expr(expr, names);
            for e in list {
                collect_from_expr(e, names);
            }
        }
        Expression::Between {
            expr, low, high, ..
        } => {
            collect_from_expr(expr, names);
            collect_from_expr(low, names);
            collect_from_expr(high, names);
        }
        Expression::Column { .. }
        | Expression::Literal(_)
        | Expression::Wildcard
        | Expression::Parameter(_) => {}
    }
}
