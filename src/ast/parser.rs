/// SQL → query AST parser.
///
/// Translates query text into our AST using `sqlparser` as the parsing
/// frontend. Calls to logical functions (`DATETIME`, `PRESENTATION`,
/// `TYPEIDENTIFIER`, ...) are recognized here and tagged with
/// `KnownFunction`; everything else stays a plain function call.
use anyhow::{anyhow, bail, Result};
use sqlparser::ast as sp;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser as SqlParser;

use super::types::*;

/// Parse a SQL string into our AST.
pub fn parse_sql(sql: &str) -> Result<Vec<Query>> {
    let dialect = PostgreSqlDialect {};
    let statements =
        SqlParser::parse_sql(&dialect, sql).map_err(|e| anyhow!("SQL parse error: {}", e))?;

    statements.into_iter().map(convert_statement).collect()
}

/// Parse a single SQL statement. Returns an error if the input contains
/// more than one statement.
pub fn parse_single(sql: &str) -> Result<Query> {
    let mut queries = parse_sql(sql)?;
    if queries.len() != 1 {
        bail!("Expected 1 statement, found {}", queries.len());
    }
    Ok(queries.remove(0))
}

fn convert_statement(stmt: sp::Statement) -> Result<Query> {
    match stmt {
        sp::Statement::Query(q) => convert_query(*q),
        _ => Ok(Query::Raw(stmt.to_string())),
    }
}

fn convert_query(query: sp::Query) -> Result<Query> {
    let order_by_exprs: Vec<sp::OrderByExpr> =
        query.order_by.map(|ob| ob.exprs).unwrap_or_default();

    if let Some(with) = query.with {
        let recursive = with.recursive;
        let ctes = with
            .cte_tables
            .into_iter()
            .map(convert_cte)
            .collect::<Result<Vec<_>>>()?;

        let body = convert_set_expr(*query.body)?;
        let body = apply_query_modifiers(body, &order_by_exprs, &query.limit, &query.offset)?;

        return Ok(Query::With(CTEQuery {
            recursive,
            ctes,
            body: Box::new(body),
        }));
    }

    let body = convert_set_expr(*query.body)?;
    apply_query_modifiers(body, &order_by_exprs, &query.limit, &query.offset)
}

fn apply_query_modifiers(
    query: Query,
    order_by: &[sp::OrderByExpr],
    limit: &Option<sp::Expr>,
    offset: &Option<sp::Offset>,
) -> Result<Query> {
    if let Query::Select(mut select) = query {
        if !order_by.is_empty() {
            select.order_by = order_by
                .iter()
                .map(|o| convert_order_by(o.clone()))
                .collect::<Result<Vec<_>>>()?;
        }
        if let Some(l) = limit {
            select.limit = Some(convert_expr(l.clone())?);
        }
        if let Some(o) = offset {
            select.offset = Some(convert_expr(o.value.clone())?);
        }
        Ok(Query::Select(select))
    } else {
        Ok(query)
    }
}

fn convert_cte(cte: sp::Cte) -> Result<CTE> {
    Ok(CTE {
        name: cte.alias.name.value.clone(),
        columns: cte
            .alias
            .columns
            .iter()
            .map(|c| c.name.value.clone())
            .collect(),
        query: convert_query(*cte.query)?,
    })
}

fn convert_set_expr(expr: sp::SetExpr) -> Result<Query> {
    match expr {
        sp::SetExpr::Select(select) => convert_select(*select),
        sp::SetExpr::Query(query) => convert_query(*query),
        sp::SetExpr::SetOperation {
            op,
            set_quantifier,
            left,
            right,
            ..
        } => {
            let left_query = convert_set_operand(*left)?;
            let right_query = convert_set_operand(*right)?;

            let set_op = SetOperation {
                op: match op {
                    sp::SetOperator::Union => SetOperator::Union,
                    sp::SetOperator::Intersect => SetOperator::Intersect,
                    sp::SetOperator::Except => SetOperator::Except,
                },
                all: matches!(
                    set_quantifier,
                    sp::SetQuantifier::All | sp::SetQuantifier::AllByName
                ),
                right: right_query,
            };

            // `a UNION b UNION c` arrives left-nested; append to the end of
            // the chain so every branch stays reachable through `set_op`.
            match left_query {
                Query::Select(mut s) => {
                    append_set_operation(&mut s, set_op)?;
                    Ok(Query::Select(s))
                }
                _ => Err(anyhow!("Unsupported left side of a set operation")),
            }
        }
        _ => Ok(Query::Raw(expr.to_string())),
    }
}

/// A set-operation branch. The AST keeps branches as one flat chain, so a
/// parenthesized branch is only accepted when dropping the parentheses keeps
/// its meaning: a plain SELECT with no ORDER BY, LIMIT, OFFSET or WITH.
fn convert_set_operand(expr: sp::SetExpr) -> Result<Query> {
    match expr {
        sp::SetExpr::Query(query) => {
            let query = *query;
            let plain = query.with.is_none()
                && query.order_by.is_none()
                && query.limit.is_none()
                && query.offset.is_none()
                && query.fetch.is_none()
                && matches!(*query.body, sp::SetExpr::Select(_));
            if !plain {
                bail!(
                    "Unsupported parenthesized branch of a set operation: ({})",
                    query
                );
            }
            convert_set_expr(*query.body)
        }
        other => convert_set_expr(other),
    }
}

fn append_set_operation(select: &mut SelectQuery, set_op: SetOperation) -> Result<()> {
    match select.set_op.as_mut() {
        Some(existing) => match &mut existing.right {
            Query::Select(inner) => append_set_operation(inner, set_op),
            _ => Err(anyhow!("Unsupported branch inside a set operation")),
        },
        None => {
            select.set_op = Some(Box::new(set_op));
            Ok(())
        }
    }
}

fn convert_select(select: sp::Select) -> Result<Query> {
    let distinct = select.distinct.is_some();

    let projections = select
        .projection
        .into_iter()
        .map(convert_select_item)
        .collect::<Result<Vec<_>>>()?;

    let from = select
        .from
        .into_iter()
        .map(convert_table_with_joins)
        .collect::<Result<Vec<_>>>()?;

    // Flatten: first element is the table, rest are joins
    let (tables, join_lists): (Vec<_>, Vec<_>) = from.into_iter().unzip();
    let joins: Vec<Join> = join_lists.into_iter().flatten().collect();

    let filter = select.selection.map(convert_expr).transpose()?;

    let group_by = match select.group_by {
        sp::GroupByExpr::Expressions(exprs, _modifiers) => exprs
            .into_iter()
            .map(convert_expr)
            .collect::<Result<Vec<_>>>()?,
        sp::GroupByExpr::All(_) => vec![],
    };

    let having = select.having.map(convert_expr).transpose()?;

    Ok(Query::Select(Box::new(SelectQuery {
        distinct,
        projections,
        from: tables,
        joins,
        filter,
        group_by,
        having,
        order_by: vec![],
        limit: None,
        offset: None,
        set_op: None,
    })))
}

fn convert_table_with_joins(twj: sp::TableWithJoins) -> Result<(TableRef, Vec<Join>)> {
    let table = convert_table_factor(twj.relation)?;
    let joins = twj
        .joins
        .into_iter()
        .map(convert_join)
        .collect::<Result<Vec<_>>>()?;
    Ok((table, joins))
}

fn convert_table_factor(tf: sp::TableFactor) -> Result<TableRef> {
    match tf {
        sp::TableFactor::Table {
            name,
            alias,
            args: Some(table_args),
            ..
        } => Ok(TableRef::Function {
            name: name.to_string(),
            args: convert_function_args(table_args.args)?,
            alias: alias.map(|a| a.name.value),
        }),
        sp::TableFactor::Table { name, alias, .. } => {
            let parts: Vec<&str> = name.0.iter().map(|p| p.value.as_str()).collect();
            let (schema, table_name) = match parts.as_slice() {
                [table] => (None, table.to_string()),
                [schema, table] => (Some(schema.to_string()), table.to_string()),
                _ => (None, name.to_string()),
            };
            Ok(TableRef::Table {
                schema,
                name: table_name,
                alias: alias.map(|a| a.name.value),
            })
        }
        sp::TableFactor::Derived {
            subquery, alias, ..
        } => {
            let alias = alias
                .map(|a| a.name.value)
                .ok_or_else(|| anyhow!("Derived table requires an alias"))?;
            Ok(TableRef::Subquery {
                query: Box::new(convert_query(*subquery)?),
                alias,
            })
        }
        sp::TableFactor::TableFunction { expr, alias } => Ok(TableRef::Function {
            name: expr.to_string(),
            args: vec![],
            alias: alias.map(|a| a.name.value),
        }),
        other => Err(anyhow!("Unsupported table factor: {}", other)),
    }
}

fn convert_join(join: sp::Join) -> Result<Join> {
    let (join_type, constraint) = match join.join_operator {
        sp::JoinOperator::Inner(c) => (JoinType::Inner, Some(c)),
        sp::JoinOperator::LeftOuter(c) => (JoinType::Left, Some(c)),
        sp::JoinOperator::RightOuter(c) => (JoinType::Right, Some(c)),
        sp::JoinOperator::FullOuter(c) => (JoinType::Full, Some(c)),
        sp::JoinOperator::CrossJoin => (JoinType::Cross, None),
        other => return Err(anyhow!("Unsupported join operator: {:?}", other)),
    };

    let condition = match constraint {
        Some(c) => convert_join_constraint(c)?,
        None => None,
    };

    Ok(Join {
        join_type,
        table: convert_table_factor(join.relation)?,
        condition,
    })
}

fn convert_join_constraint(constraint: sp::JoinConstraint) -> Result<Option<JoinCondition>> {
    match constraint {
        sp::JoinConstraint::On(expr) => Ok(Some(JoinCondition::On(convert_expr(expr)?))),
        sp::JoinConstraint::Using(cols) => Ok(Some(JoinCondition::Using(
            cols.iter().map(|c| c.to_string()).collect(),
        ))),
        sp::JoinConstraint::Natural => Ok(Some(JoinCondition::Natural)),
        sp::JoinConstraint::None => Ok(None),
    }
}

fn convert_select_item(item: sp::SelectItem) -> Result<SelectItem> {
    match item {
        sp::SelectItem::UnnamedExpr(expr) => Ok(SelectItem::Expression {
            expr: convert_expr(expr)?,
            alias: None,
        }),
        sp::SelectItem::ExprWithAlias { expr, alias } => Ok(SelectItem::Expression {
            expr: convert_expr(expr)?,
            alias: Some(alias.value),
        }),
        sp::SelectItem::Wildcard(_) => Ok(SelectItem::Wildcard),
        sp::SelectItem::QualifiedWildcard(name, _) => {
            Ok(SelectItem::QualifiedWildcard(name.to_string()))
        }
    }
}

fn convert_expr(expr: sp::Expr) -> Result<Expression> {
    match expr {
        sp::Expr::Identifier(ident) => Ok(Expression::Column {
            table: None,
            name: ident.value,
        }),
        sp::Expr::CompoundIdentifier(parts) => {
            let mut names: Vec<String> = parts.into_iter().map(|p| p.value).collect();
            match names.len() {
                2 => {
                    let name = names.remove(1);
                    Ok(Expression::Column {
                        table: Some(names.remove(0)),
                        name,
                    })
                }
                _ => Ok(Expression::Column {
                    table: None,
                    name: names.join("."),
                }),
            }
        }
        sp::Expr::Value(val) => convert_value(val),
        sp::Expr::BinaryOp { left, op, right } => Ok(Expression::BinaryOp {
            left: Box::new(convert_expr(*left)?),
            op: convert_binary_op(op)?,
            right: Box::new(convert_expr(*right)?),
        }),
        sp::Expr::UnaryOp { op, expr } => Ok(Expression::UnaryOp {
            op: convert_unary_op(op)?,
            expr: Box::new(convert_expr(*expr)?),
        }),
        sp::Expr::Function(func) => convert_function(func),
        sp::Expr::Substring {
            expr,
            substring_from,
            substring_for,
            ..
        } => {
            let mut args = vec![convert_expr(*expr)?];
            if let Some(from) = substring_from {
                args.push(convert_expr(*from)?);
            }
            if let Some(length) = substring_for {
                args.push(convert_expr(*length)?);
            }
            Ok(Expression::call(KnownFunction::Substring, args))
        }
        sp::Expr::Case {
            operand,
            conditions,
            results,
            else_result,
        } => {
            let when_clauses = conditions
                .into_iter()
                .zip(results)
                .map(|(c, r)| Ok((convert_expr(c)?, convert_expr(r)?)))
                .collect::<Result<Vec<_>>>()?;
            Ok(Expression::Case {
                operand: operand.map(|o| convert_expr(*o)).transpose()?.map(Box::new),
                when_clauses,
                else_clause: else_result
                    .map(|e| convert_expr(*e))
                    .transpose()?
                    .map(Box::new),
            })
        }
        sp::Expr::Subquery(q) => Ok(Expression::Subquery(Box::new(convert_query(*q)?))),
        sp::Expr::Exists { subquery, negated } => {
            let exists = Expression::Exists(Box::new(convert_query(*subquery)?));
            if negated {
                Ok(Expression::UnaryOp {
                    op: UnaryOperator::Not,
                    expr: Box::new(exists),
                })
            } else {
                Ok(exists)
            }
        }
        sp::Expr::InList {
            expr,
            list,
            negated,
        } => Ok(Expression::InList {
            expr: Box::new(convert_expr(*expr)?),
            list: list
                .into_iter()
                .map(convert_expr)
                .collect::<Result<Vec<_>>>()?,
            negated,
        }),
        sp::Expr::InSubquery {
            expr,
            subquery,
            negated,
        } => Ok(Expression::InSubquery {
            expr: Box::new(convert_expr(*expr)?),
            subquery: Box::new(convert_query(*subquery)?),
            negated,
        }),
        sp::Expr::Between {
            expr,
            negated,
            low,
            high,
        } => Ok(Expression::Between {
            expr: Box::new(convert_expr(*expr)?),
            low: Box::new(convert_expr(*low)?),
            high: Box::new(convert_expr(*high)?),
            negated,
        }),
        sp::Expr::IsNull(expr) => Ok(Expression::IsNull {
            expr: Box::new(convert_expr(*expr)?),
            negated: false,
        }),
        sp::Expr::IsNotNull(expr) => Ok(Expression::IsNull {
            expr: Box::new(convert_expr(*expr)?),
            negated: true,
        }),
        sp::Expr::Cast {
            expr, data_type, ..
        } => Ok(Expression::Cast {
            expr: Box::new(convert_expr(*expr)?),
            data_type: data_type.to_string(),
        }),
        sp::Expr::Nested(expr) => Ok(Expression::Nested(Box::new(convert_expr(*expr)?))),
        sp::Expr::Like {
            negated,
            expr,
            pattern,
            ..
        } => Ok(Expression::BinaryOp {
            left: Box::new(convert_expr(*expr)?),
            op: if negated {
                BinaryOperator::NotLike
            } else {
                BinaryOperator::Like
            },
            right: Box::new(convert_expr(*pattern)?),
        }),
        sp::Expr::ILike {
            negated,
            expr,
            pattern,
            ..
        } => Ok(Expression::BinaryOp {
            left: Box::new(convert_expr(*expr)?),
            op: if negated {
                BinaryOperator::NotILike
            } else {
                BinaryOperator::ILike
            },
            right: Box::new(convert_expr(*pattern)?),
        }),
        other => Err(anyhow!("Unsupported expression: {}", other)),
    }
}

fn convert_value(val: sp::Value) -> Result<Expression> {
    match val {
        sp::Value::Null => Ok(Expression::Literal(Literal::Null)),
        sp::Value::Boolean(b) => Ok(Expression::Literal(Literal::Boolean(b))),
        sp::Value::Number(n, _) => {
            if let Ok(i) = n.parse::<i64>() {
                Ok(Expression::Literal(Literal::Integer(i)))
            } else if let Ok(f) = n.parse::<f64>() {
                Ok(Expression::Literal(Literal::Float(f)))
            } else {
                Err(anyhow!("Invalid numeric literal: {}", n))
            }
        }
        sp::Value::SingleQuotedString(s) => Ok(Expression::Literal(Literal::String(s))),
        sp::Value::Placeholder(p) => p
            .strip_prefix('$')
            .and_then(|n| n.parse::<usize>().ok())
            .map(Expression::Parameter)
            .ok_or_else(|| anyhow!("Unsupported placeholder: {}", p)),
        other => Err(anyhow!("Unsupported literal: {}", other)),
    }
}

fn convert_binary_op(op: sp::BinaryOperator) -> Result<BinaryOperator> {
    match op {
        sp::BinaryOperator::Eq => Ok(BinaryOperator::Eq),
        sp::BinaryOperator::NotEq => Ok(BinaryOperator::NotEq),
        sp::BinaryOperator::Lt => Ok(BinaryOperator::Lt),
        sp::BinaryOperator::LtEq => Ok(BinaryOperator::LtEq),
        sp::BinaryOperator::Gt => Ok(BinaryOperator::Gt),
        sp::BinaryOperator::GtEq => Ok(BinaryOperator::GtEq),
        sp::BinaryOperator::And => Ok(BinaryOperator::And),
        sp::BinaryOperator::Or => Ok(BinaryOperator::Or),
        sp::BinaryOperator::Plus => Ok(BinaryOperator::Plus),
        sp::BinaryOperator::Minus => Ok(BinaryOperator::Minus),
        sp::BinaryOperator::Multiply => Ok(BinaryOperator::Multiply),
        sp::BinaryOperator::Divide => Ok(BinaryOperator::Divide),
        sp::BinaryOperator::Modulo => Ok(BinaryOperator::Modulo),
        sp::BinaryOperator::StringConcat => Ok(BinaryOperator::Concat),
        _ => Err(anyhow!("Unsupported binary operator: {:?}", op)),
    }
}

fn convert_unary_op(op: sp::UnaryOperator) -> Result<UnaryOperator> {
    match op {
        sp::UnaryOperator::Not => Ok(UnaryOperator::Not),
        sp::UnaryOperator::Minus => Ok(UnaryOperator::Minus),
        sp::UnaryOperator::Plus => Ok(UnaryOperator::Plus),
        _ => Err(anyhow!("Unsupported unary operator: {:?}", op)),
    }
}

fn convert_function(func: sp::Function) -> Result<Expression> {
    let name = func.name.to_string().to_uppercase();

    if func.over.is_some() {
        bail!("Window functions are not supported: {}", name);
    }
    let filter = func
        .filter
        .map(|f| convert_expr(*f))
        .transpose()?
        .map(Box::new);

    let (args, distinct) = match func.args {
        sp::FunctionArguments::List(arg_list) => {
            let distinct = matches!(
                arg_list.duplicate_treatment,
                Some(sp::DuplicateTreatment::Distinct)
            );
            (convert_function_args(arg_list.args)?, distinct)
        }
        sp::FunctionArguments::None => (vec![], false),
        sp::FunctionArguments::Subquery(q) => (
            vec![Expression::Subquery(Box::new(convert_query(*q)?))],
            false,
        ),
    };

    if filter.is_some() && !is_aggregate(&name) {
        bail!("FILTER is only supported on aggregates: {}", name);
    }

    if let Some(function) = KnownFunction::from_name(&name) {
        return Ok(Expression::call(function, args));
    }

    if is_aggregate(&name) {
        Ok(Expression::Aggregate {
            name,
            args,
            distinct,
            filter,
        })
    } else {
        Ok(Expression::Function {
            name,
            args,
            distinct,
        })
    }
}

fn is_aggregate(name: &str) -> bool {
    matches!(
        name,
        "COUNT" | "SUM" | "AVG" | "MIN" | "MAX" | "ARRAY_AGG" | "STRING_AGG" | "BOOL_AND" | "BOOL_OR"
    )
}

fn convert_function_args(args: Vec<sp::FunctionArg>) -> Result<Vec<Expression>> {
    args.into_iter()
        .filter_map(|a| match a {
            sp::FunctionArg::Unnamed(sp::FunctionArgExpr::Expr(e)) => Some(convert_expr(e)),
            sp::FunctionArg::Unnamed(sp::FunctionArgExpr::Wildcard) => {
                Some(Ok(Expression::Wildcard))
            }
            sp::FunctionArg::Named {
                arg: sp::FunctionArgExpr::Expr(e),
                ..
            } => Some(convert_expr(e)),
            _ => None,
        })
        .collect()
}

fn convert_order_by(order: sp::OrderByExpr) -> Result<OrderByExpr> {
    Ok(OrderByExpr {
        expr: convert_expr(order.expr)?,
        asc: order.asc,
        nulls_first: order.nulls_first,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select(sql: &str) -> SelectQuery {
        match parse_single(sql).expect("Failed to parse") {
            Query::Select(s) => *s,
            other => panic!("Expected SELECT, got {:?}", other),
        }
    }

    fn first_projection(s: &SelectQuery) -> &Expression {
        match &s.projections[0] {
            SelectItem::Expression { expr, .. } => expr,
            other => panic!("Expected expression, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_simple_select() {
        let s = select("SELECT id, name FROM users");
        assert_eq!(s.projections.len(), 2);
        assert_eq!(s.from.len(), 1);
    }

    #[test]
    fn test_parse_presentation_as_known_function() {
        let s = select("SELECT Presentation(t.name) FROM _reference12 AS t");
        assert_eq!(
            first_projection(&s),
            &Expression::call(
                KnownFunction::Presentation,
                vec![Expression::column(Some("t"), "name")]
            )
        );
    }

    #[test]
    fn test_parse_type_identifier() {
        let s = select("SELECT TypeIdentifier(t.owner) AS owner_type FROM _reference12 t");
        match &s.projections[0] {
            SelectItem::Expression { expr, alias } => {
                assert_eq!(alias.as_deref(), Some("owner_type"));
                assert_eq!(
                    expr,
                    &Expression::call(
                        KnownFunction::TypeIdentifier,
                        vec![Expression::column(Some("t"), "owner")]
                    )
                );
            }
            other => panic!("Expected expression, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_begin_of_period_keeps_argument_order() {
        let s = select("SELECT BeginOfPeriod(d.posted_at, 'month') FROM _document7 d");
        assert_eq!(
            first_projection(&s),
            &Expression::call(
                KnownFunction::SqlDateTrunc,
                vec![
                    Expression::column(Some("d"), "posted_at"),
                    Expression::string("month")
                ]
            )
        );
    }

    #[test]
    fn test_parse_substring_from_for_syntax() {
        let s = select("SELECT SUBSTRING(t.code FROM 1 FOR 5) FROM _reference12 t");
        assert_eq!(
            first_projection(&s),
            &Expression::call(
                KnownFunction::Substring,
                vec![
                    Expression::column(Some("t"), "code"),
                    Expression::integer(1),
                    Expression::integer(5)
                ]
            )
        );
    }

    #[test]
    fn test_parse_unknown_function_passes_through() {
        let s = select("SELECT COALESCE(a, b) FROM t");
        assert!(matches!(
            first_projection(&s),
            Expression::Function { name, args, .. } if name == "COALESCE" && args.len() == 2
        ));
    }

    #[test]
    fn test_parse_union_subquery_branches() {
        let s = select(
            "SELECT u.owner FROM (SELECT a.owner FROM _reference1 a \
             UNION ALL SELECT b.owner FROM _reference2 b \
             UNION ALL SELECT c.owner FROM _reference3 c) AS u",
        );
        let TableRef::Subquery { query, alias } = &s.from[0] else {
            panic!("Expected subquery");
        };
        assert_eq!(alias, "u");
        let Query::Select(first) = query.as_ref() else {
            panic!("Expected SELECT branch");
        };
        let mut branches = 1;
        let mut current = first.set_op.as_ref();
        while let Some(op) = current {
            branches += 1;
            assert!(op.all);
            current = match &op.right {
                Query::Select(next) => next.set_op.as_ref(),
                _ => None,
            };
        }
        assert_eq!(branches, 3);
    }

    #[test]
    fn test_parse_rejects_grouped_set_operation_branches() {
        for sql in [
            "SELECT t.a FROM t UNION (SELECT u.a FROM u EXCEPT SELECT v.a FROM v)",
            "SELECT t.a FROM t UNION ALL (SELECT u.a FROM u ORDER BY u.a LIMIT 1)",
            "(SELECT t.a FROM t UNION SELECT u.a FROM u) INTERSECT SELECT v.a FROM v",
        ] {
            let err = parse_single(sql).unwrap_err();
            assert!(
                err.to_string().contains("parenthesized branch"),
                "{}: {}",
                sql,
                err
            );
        }
    }

    #[test]
    fn test_parse_accepts_parenthesized_plain_branch() {
        let s = select("(SELECT t.a FROM t) UNION SELECT u.a FROM u");
        let op = s.set_op.as_ref().expect("set operation");
        assert_eq!(op.op, SetOperator::Union);
        assert!(matches!(&op.right, Query::Select(right) if right.set_op.is_none()));
    }

    #[test]
    fn test_parse_filter_requires_aggregate() {
        assert!(parse_single("SELECT COUNT(*) FILTER (WHERE t.x > 1) FROM t").is_ok());
        assert!(parse_single("SELECT UPPER(t.x) FILTER (WHERE t.x > 1) FROM t").is_err());
    }

    #[test]
    fn test_parse_derived_table_requires_alias() {
        assert!(parse_single("SELECT x FROM (SELECT 1 AS x)").is_err());
    }

    #[test]
    fn test_parse_join_with_condition() {
        let s = select("SELECT a.id FROM _reference1 a LEFT JOIN _reference2 b ON a.ref = b.id");
        assert_eq!(s.joins.len(), 1);
        assert_eq!(s.joins[0].join_type, JoinType::Left);
        assert!(matches!(s.joins[0].condition, Some(JoinCondition::On(_))));
    }

    #[test]
    fn test_parse_table_function() {
        let s = select("SELECT g.x FROM generate_series(1, 3) AS g");
        assert_eq!(
            s.from[0],
            TableRef::Function {
                name: "generate_series".into(),
                args: vec![Expression::integer(1), Expression::integer(3)],
                alias: Some("g".into()),
            }
        );
    }

    #[test]
    fn test_parse_multiple_statements() {
        assert_eq!(parse_sql("SELECT 1; SELECT 2").unwrap().len(), 2);
        assert!(parse_single("SELECT 1; SELECT 2").is_err());
    }

    #[test]
    fn test_parse_invalid_sql() {
        assert!(parse_sql("SELEC * FORM users").is_err());
    }
}
