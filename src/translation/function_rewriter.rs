//! Rewrites logical query functions into PostgreSQL constructs.
//!
//! Calls are visited bottom-up, so every handler sees arguments that are
//! already rewritten. `TypeIdentifier(ref)` is resolved against the mapping
//! of the table `ref` belongs to: a reference with a fixed target becomes a
//! constant discriminator, a polymorphic reference becomes its discriminator
//! column. When `ref` comes from a derived table (usually a UNION over
//! several physical tables), each branch gets an extra `<ref>_Type` field
//! and the call turns into a reference to that field.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::trace;

use super::error::TranslationError;
use crate::ast::compiler::compile_expr;
use crate::ast::visit::{QueryRewriter, Scope};
use crate::ast::{
    Expression, FunctionCall, KnownFunction, Literal, Query, SelectItem, SelectQuery, TableRef,
};
use crate::mapping::{MappingSource, PropertyLayout};

/// Nesting limit for derived tables followed by `TypeIdentifier`.
pub const MAX_UNION_DEPTH: usize = 32;

const TYPE_COLUMN_SUFFIX: &str = "_Type";

pub struct QueryFunctionRewriter<'a, M: ?Sized> {
    mappings: &'a M,
}

impl<'a, M: MappingSource + ?Sized> QueryFunctionRewriter<'a, M> {
    pub fn new(mappings: &'a M) -> Self {
        Self { mappings }
    }

    fn rewrite_call(
        &self,
        call: FunctionCall,
        scope: &mut Scope<'_>,
    ) -> Result<Expression, TranslationError> {
        let FunctionCall { function, args } = call;
        match function {
            KnownFunction::DateTime => {
                expect_arguments(function, &args, &[3, 6])?;
                date_time(&args)
            }
            KnownFunction::Year | KnownFunction::Quarter => {
                let [value] = arguments(function, args)?;
                let part = if function == KnownFunction::Year {
                    "year"
                } else {
                    "quarter"
                };
                Ok(Expression::call(
                    KnownFunction::SqlDatePart,
                    vec![Expression::string(part), value],
                ))
            }
            KnownFunction::Presentation => {
                let [value] = arguments(function, args)?;
                Ok(value)
            }
            KnownFunction::IsNull => {
                let [value, fallback] = arguments(function, args)?;
                Ok(Expression::Case {
                    operand: None,
                    when_clauses: vec![(
                        Expression::IsNull {
                            expr: Box::new(value.clone()),
                            negated: false,
                        },
                        fallback,
                    )],
                    else_clause: Some(Box::new(value)),
                })
            }
            KnownFunction::Substring => {
                let [text, start, length] = arguments(function, args)?;
                Ok(Expression::call(
                    KnownFunction::Substring,
                    vec![Expression::cast(text, "varchar"), start, length],
                ))
            }
            KnownFunction::SqlDateTrunc => {
                let [value, period] = arguments(function, args)?;
                Ok(Expression::call(KnownFunction::SqlDateTrunc, vec![period, value]))
            }
            KnownFunction::TypeIdentifier => {
                let [argument] = arguments(function, args)?;
                match argument {
                    Expression::Column { table, name } => {
                        self.type_column_ref(table.as_deref(), &name, scope, 0)
                    }
                    _ => Err(TranslationError::ColumnReferenceRequired(function)),
                }
            }
            KnownFunction::SqlDatePart => {
                Ok(Expression::QueryFunction(FunctionCall { function, args }))
            }
        }
    }

    /// Expression yielding the type discriminator of the reference column
    /// `qualifier.column`.
    fn type_column_ref(
        &self,
        qualifier: Option<&str>,
        column: &str,
        scope: &mut Scope<'_>,
        depth: usize,
    ) -> Result<Expression, TranslationError> {
        let shown = display_column(qualifier, column);
        let source = scope
            .find_mut(qualifier)
            .ok_or_else(|| TranslationError::UnresolvedTable {
                column: shown.clone(),
            })?;
        match source {
            TableRef::Table { name, .. } => self.realized_type_ref(name, qualifier, column),
            TableRef::Subquery { query, .. } => {
                if depth >= MAX_UNION_DEPTH {
                    return Err(TranslationError::UnionDepthExceeded {
                        column: shown,
                        limit: MAX_UNION_DEPTH,
                    });
                }
                let alias = format!("{}{}", column, TYPE_COLUMN_SUFFIX);
                self.add_type_column(query, column, &alias, depth + 1)?;
                trace!(column = %shown, %alias, "type column added to derived table");
                Ok(Expression::column(qualifier, alias))
            }
            TableRef::Function { .. } => Err(TranslationError::UnsupportedTable { column: shown }),
        }
    }

    fn realized_type_ref(
        &self,
        table: &str,
        qualifier: Option<&str>,
        column: &str,
    ) -> Result<Expression, TranslationError> {
        let shown = display_column(qualifier, column);
        let mapping = self
            .mappings
            .resolve_table_by_db_name(table)?
            .ok_or_else(|| TranslationError::UnmappedTable {
                table: table.to_string(),
                column: shown.clone(),
            })?;

        let single = mapping.properties.iter().find_map(|p| match &p.layout {
            PropertyLayout::Single {
                db_column_name,
                nested_table_name,
            } if db_column_name == column => Some(nested_table_name),
            _ => None,
        });
        if let Some(nested) = single {
            let nested = nested
                .as_deref()
                .ok_or_else(|| TranslationError::NonReferenceColumn {
                    column: shown.clone(),
                })?;
            let index = self
                .mappings
                .resolve_table(nested)?
                .and_then(|target| target.index)
                .ok_or_else(|| TranslationError::NestedTableUnmapped {
                    nested: nested.to_string(),
                    column: shown.clone(),
                })?;
            trace!(column = %shown, index, "constant type discriminator");
            return Ok(Expression::Literal(Literal::type_index(index)));
        }

        mapping
            .properties
            .iter()
            .find_map(|p| match &p.layout {
                PropertyLayout::Union {
                    reference_column_name,
                    table_index_column_name,
                } if reference_column_name == column => {
                    Some(Expression::column(qualifier, table_index_column_name.clone()))
                }
                _ => None,
            })
            .ok_or(TranslationError::UnresolvedColumn { column: shown })
    }

    fn add_type_column(
        &self,
        query: &mut Query,
        column: &str,
        alias: &str,
        depth: usize,
    ) -> Result<(), TranslationError> {
        match query {
            Query::Select(select) => {
                self.add_type_column_to_branch(select, column, alias, depth)?;
                if let Some(op) = select.set_op.as_mut() {
                    self.add_type_column(&mut op.right, column, alias, depth)?;
                }
                Ok(())
            }
            Query::With(cte) => self.add_type_column(&mut cte.body, column, alias, depth),
            Query::Raw(_) => Err(TranslationError::UnsupportedSubquery {
                column: column.to_string(),
            }),
        }
    }

    fn add_type_column_to_branch(
        &self,
        select: &mut SelectQuery,
        column: &str,
        alias: &str,
        depth: usize,
    ) -> Result<(), TranslationError> {
        // A second TypeIdentifier over the same column reuses the field.
        if select.projections.iter().any(|item| {
            matches!(item, SelectItem::Expression { alias: Some(a), .. } if a == alias)
        }) {
            return Ok(());
        }

        let field = find_branch_field(&select.projections, column)?;
        let Expression::Column {
            table: field_qualifier,
            name: field_name,
        } = field
        else {
            return Err(TranslationError::UnionFieldNotColumn {
                column: column.to_string(),
            });
        };
        let (field_qualifier, field_name) = (field_qualifier.clone(), field_name.clone());

        let mut scope = Scope::new(&mut select.from, &mut select.joins);
        let resolved =
            self.type_column_ref(field_qualifier.as_deref(), &field_name, &mut scope, depth)?;
        select.projections.push(SelectItem::aliased(resolved, alias));
        Ok(())
    }
}

impl<M: MappingSource + ?Sized> QueryRewriter for &QueryFunctionRewriter<'_, M> {
    type Error = TranslationError;

    fn rewrite_function(
        &mut self,
        call: FunctionCall,
        scope: &mut Scope<'_>,
    ) -> Result<Expression, TranslationError> {
        trace!(function = %call.function, args = call.args.len(), "rewriting call");
        self.rewrite_call(call, scope)
    }
}

/// The field of a union branch that exposes `column`: a field aliased
/// `column`, otherwise an unaliased or aliased plain reference to a column
/// named `column`.
fn find_branch_field<'s>(
    projections: &'s [SelectItem],
    column: &str,
) -> Result<&'s Expression, TranslationError> {
    let fields = projections.iter().filter_map(|item| match item {
        SelectItem::Expression { expr, alias } => Some((expr, alias.as_deref())),
        _ => None,
    });

    let by_alias: Vec<&Expression> = fields
        .clone()
        .filter(|(_, alias)| *alias == Some(column))
        .map(|(expr, _)| expr)
        .collect();
    let candidates: Vec<&Expression> = if by_alias.is_empty() {
        fields
            .filter(|(expr, _)| matches!(expr, Expression::Column { name, .. } if name == column))
            .map(|(expr, _)| expr)
            .collect()
    } else {
        by_alias
    };

    match candidates.as_slice() {
        [field] => Ok(*field),
        [] => Err(TranslationError::MissingUnionField {
            column: column.to_string(),
        }),
        _ => Err(TranslationError::AmbiguousUnionField {
            column: column.to_string(),
        }),
    }
}

fn expect_arguments(
    function: KnownFunction,
    args: &[Expression],
    counts: &[usize],
) -> Result<(), TranslationError> {
    if counts.contains(&args.len()) {
        return Ok(());
    }
    let expected = match counts {
        [only] => format!("exactly [{}]", only),
        _ => counts
            .iter()
            .map(|c| format!("[{}]", c))
            .collect::<Vec<_>>()
            .join(" or "),
    };
    Err(TranslationError::ArgumentCount {
        function,
        expected,
        actual: args.len(),
    })
}

fn date_time(args: &[Expression]) -> Result<Expression, TranslationError> {
    let components = args
        .iter()
        .map(|arg| match arg {
            Expression::Literal(Literal::Integer(value)) => Some(*value),
            _ => None,
        })
        .collect::<Option<Vec<i64>>>()
        .ok_or_else(|| TranslationError::LiteralRequired {
            function: KnownFunction::DateTime,
            arguments: args.iter().map(compile_expr).collect::<Vec<_>>().join(","),
        })?;
    let invalid = || {
        TranslationError::InvalidDate(
            components
                .iter()
                .map(i64::to_string)
                .collect::<Vec<_>>()
                .join(","),
        )
    };

    let year = i32::try_from(components[0]).map_err(|_| invalid())?;
    let unsigned = |i: usize| u32::try_from(components[i]).map_err(|_| invalid());
    let date = NaiveDate::from_ymd_opt(year, unsigned(1)?, unsigned(2)?).ok_or_else(invalid)?;

    if components.len() == 3 {
        return Ok(Expression::cast(
            Expression::string(date.format("%Y-%m-%d").to_string()),
            "date",
        ));
    }
    let time =
        NaiveTime::from_hms_opt(unsigned(3)?, unsigned(4)?, unsigned(5)?).ok_or_else(invalid)?;
    Ok(Expression::cast(
        Expression::string(
            NaiveDateTime::new(date, time)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
        ),
        "timestamp",
    ))
}

fn display_column(qualifier: Option<&str>, column: &str) -> String {
    match qualifier {
        Some(q) => format!("{}.{}", q, column),
        None => column.to_string(),
    }
}

/// The arguments of a fixed-arity call.
fn arguments<const N: usize>(
    function: KnownFunction,
    args: Vec<Expression>,
) -> Result<[Expression; N], TranslationError> {
    expect_arguments(function, &args, &[N])?;
    args.try_into().map_err(|args: Vec<Expression>| TranslationError::ArgumentCount {
        function,
        expected: format!("exactly [{}]", N),
        actual: args.len(),
    })
}
