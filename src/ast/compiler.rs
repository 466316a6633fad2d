/// AST → SQL compiler.
///
/// Converts a rewritten query AST into PostgreSQL text. Logical functions
/// that survived translation are rendered by their logical name, which
/// PostgreSQL will reject; a fully translated query only contains
/// `date_part`, `date_trunc` and `substring` calls.
use super::types::*;

/// Compile a query AST into a PostgreSQL SQL string.
pub fn compile(query: &Query) -> String {
    match query {
        Query::Select(s) => compile_select(s),
        Query::With(cte) => compile_cte(cte),
        Query::Raw(sql) => sql.clone(),
    }
}

fn compile_select(select: &SelectQuery) -> String {
    let mut parts = Vec::new();

    let mut select_clause = String::from("SELECT ");
    if select.distinct {
        select_clause.push_str("DISTINCT ");
    }

    if select.projections.is_empty() {
        select_clause.push('*');
    } else {
        let items: Vec<String> = select.projections.iter().map(compile_select_item).collect();
        select_clause.push_str(&items.join(", "));
    }
    parts.push(select_clause);

    if !select.from.is_empty() {
        let tables: Vec<String> = select.from.iter().map(compile_table_ref).collect();
        parts.push(format!("FROM {}", tables.join(", ")));
    }

    for join in &select.joins {
        parts.push(compile_join(join));
    }

    if let Some(ref filter) = select.filter {
        parts.push(format!("WHERE {}", compile_expr(filter)));
    }

    if !select.group_by.is_empty() {
        let groups: Vec<String> = select.group_by.iter().map(compile_expr).collect();
        parts.push(format!("GROUP BY {}", groups.join(", ")));
    }

    if let Some(ref having) = select.having {
        parts.push(format!("HAVING {}", compile_expr(having)));
    }

    if let Some(ref set_op) = select.set_op {
        let op_str = match set_op.op {
            SetOperator::Union => "UNION",
            SetOperator::Intersect => "INTERSECT",
            SetOperator::Except => "EXCEPT",
        };
        let all_str = if set_op.all { " ALL" } else { "" };
        parts.push(format!("{}{} {}", op_str, all_str, compile(&set_op.right)));
    }

    if !select.order_by.is_empty() {
        let orders: Vec<String> = select.order_by.iter().map(compile_order_by).collect();
        parts.push(format!("ORDER BY {}", orders.join(", ")));
    }

    if let Some(ref limit) = select.limit {
        parts.push(format!("LIMIT {}", compile_expr(limit)));
    }

    if let Some(ref offset) = select.offset {
        parts.push(format!("OFFSET {}", compile_expr(offset)));
    }

    parts.join(" ")
}

fn compile_select_item(item: &SelectItem) -> String {
    match item {
        SelectItem::Wildcard => "*".to_string(),
        SelectItem::QualifiedWildcard(table) => format!("{}.*", table),
        SelectItem::Expression { expr, alias } => {
            let expr_str = compile_expr(expr);
            match alias {
                Some(a) => format!("{} AS {}", expr_str, a),
                None => expr_str,
            }
        }
    }
}

fn compile_table_ref(table: &TableRef) -> String {
    match table {
        TableRef::Table {
            schema,
            name,
            alias,
        } => {
            let mut s = match schema {
                Some(sc) => format!("{}.{}", sc, name),
                None => name.clone(),
            };
            if let Some(a) = alias {
                s.push_str(&format!(" AS {}", a));
            }
            s
        }
        TableRef::Subquery { query, alias } => {
            format!("({}) AS {}", compile(query), alias)
        }
        TableRef::Function { name, args, alias } => {
            let args_str: Vec<String> = args.iter().map(compile_expr).collect();
            let mut s = format!("{}({})", name, args_str.join(", "));
            if let Some(a) = alias {
                s.push_str(&format!(" AS {}", a));
            }
            s
        }
    }
}

fn compile_join(join: &Join) -> String {
    let type_str = match join.join_type {
        JoinType::Inner => "JOIN",
        JoinType::Left => "LEFT JOIN",
        JoinType::Right => "RIGHT JOIN",
        JoinType::Full => "FULL JOIN",
        JoinType::Cross => "CROSS JOIN",
    };

    let (natural, condition_str) = match &join.condition {
        Some(JoinCondition::On(expr)) => ("", format!(" ON {}", compile_expr(expr))),
        Some(JoinCondition::Using(cols)) => ("", format!(" USING ({})", cols.join(", "))),
        Some(JoinCondition::Natural) => ("NATURAL ", String::new()),
        None => ("", String::new()),
    };

    format!(
        "{}{} {}{}",
        natural,
        type_str,
        compile_table_ref(&join.table),
        condition_str
    )
}

fn compile_args(args: &[Expression]) -> String {
    args.iter().map(compile_expr).collect::<Vec<_>>().join(", ")
}

pub(crate) fn compile_expr(expr: &Expression) -> String {
    match expr {
        Expression::Column { table, name } => match table {
            Some(t) => format!("{}.{}", t, name),
            None => name.clone(),
        },
        Expression::Literal(lit) => compile_literal(lit),
        Expression::BinaryOp { left, op, right } => {
            let op_str = match op {
                BinaryOperator::Eq => "=",
                BinaryOperator::NotEq => "<>",
                BinaryOperator::Lt => "<",
                BinaryOperator::LtEq => "<=",
                BinaryOperator::Gt => ">",
                BinaryOperator::GtEq => ">=",
                BinaryOperator::And => "AND",
                BinaryOperator::Or => "OR",
                BinaryOperator::Plus => "+",
                BinaryOperator::Minus => "-",
                BinaryOperator::Multiply => "*",
                BinaryOperator::Divide => "/",
                BinaryOperator::Modulo => "%",
                BinaryOperator::Like => "LIKE",
                BinaryOperator::ILike => "ILIKE",
                BinaryOperator::NotLike => "NOT LIKE",
                BinaryOperator::NotILike => "NOT ILIKE",
                BinaryOperator::Concat => "||",
            };
            format!("{} {} {}", compile_expr(left), op_str, compile_expr(right))
        }
        Expression::UnaryOp { op, expr } => {
            let op_str = match op {
                UnaryOperator::Not => "NOT",
                UnaryOperator::Minus => "-",
                UnaryOperator::Plus => "+",
            };
            format!("{} {}", op_str, compile_expr(expr))
        }
        Expression::QueryFunction(call) => {
            format!("{}({})", call.function.sql_name(), compile_args(&call.args))
        }
        Expression::Function {
            name,
            args,
            distinct,
        } => {
            let distinct_str = if *distinct { "DISTINCT " } else { "" };
            format!("{}({}{})", name, distinct_str, compile_args(args))
        }
        Expression::Aggregate {
            name,
            args,
            distinct,
            filter,
        } => {
            let distinct_str = if *distinct { "DISTINCT " } else { "" };
            let mut s = format!("{}({}{})", name, distinct_str, compile_args(args));
            if let Some(f) = filter {
                s.push_str(&format!(" FILTER (WHERE {})", compile_expr(f)));
            }
            s
        }
        Expression::Case {
            operand,
            when_clauses,
            else_clause,
        } => {
            let mut s = String::from("CASE");
            if let Some(op) = operand {
                s.push_str(&format!(" {}", compile_expr(op)));
            }
            for (when, then) in when_clauses {
                s.push_str(&format!(
                    " WHEN {} THEN {}",
                    compile_expr(when),
                    compile_expr(then)
                ));
            }
            if let Some(else_expr) = else_clause {
                s.push_str(&format!(" ELSE {}", compile_expr(else_expr)));
            }
            s.push_str(" END");
            s
        }
        Expression::Subquery(q) => format!("({})", compile(q)),
        Expression::Exists(q) => format!("EXISTS ({})", compile(q)),
        Expression::InList {
            expr,
            list,
            negated,
        } => {
            let not_str = if *negated { "NOT " } else { "" };
            format!("{} {}IN ({})", compile_expr(expr), not_str, compile_args(list))
        }
        Expression::InSubquery {
            expr,
            subquery,
            negated,
        } => {
            let not_str = if *negated { "NOT " } else { "" };
            format!(
                "{} {}IN ({})",
                compile_expr(expr),
                not_str,
                compile(subquery)
            )
        }
        Expression::Between {
            expr,
            low,
            high,
            negated,
        } => {
            let not_str = if *negated { "NOT " } else { "" };
            format!(
                "{} {}BETWEEN {} AND {}",
                compile_expr(expr),
                not_str,
                compile_expr(low),
                compile_expr(high)
            )
        }
        Expression::IsNull { expr, negated } => {
            if *negated {
                format!("{} IS NOT NULL", compile_expr(expr))
            } else {
                format!("{} IS NULL", compile_expr(expr))
            }
        }
        Expression::Cast { expr, data_type } => {
            format!("CAST({} AS {})", compile_expr(expr), data_type)
        }
        Expression::Wildcard => "*".to_string(),
        Expression::Parameter(idx) => format!("${}", idx),
        Expression::Nested(expr) => format!("({})", compile_expr(expr)),
    }
}

fn compile_literal(lit: &Literal) -> String {
    match lit {
        Literal::Null => "NULL".to_string(),
        Literal::Boolean(true) => "TRUE".to_string(),
        Literal::Boolean(false) => "FALSE".to_string(),
        Literal::Integer(i) => i.to_string(),
        Literal::Float(f) => format!("{}", f),
        Literal::String(s) => format!("'{}'", s.replace('\'', "''")),
        Literal::Binary(bytes) => {
            let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
            format!("'\\x{}'::bytea", hex)
        }
    }
}

fn compile_order_by(order: &OrderByExpr) -> String {
    let mut s = compile_expr(&order.expr);
    match order.asc {
        Some(true) => s.push_str(" ASC"),
        Some(false) => s.push_str(" DESC"),
        None => {}
    }
    match order.nulls_first {
        Some(true) => s.push_str(" NULLS FIRST"),
        Some(false) => s.push_str(" NULLS LAST"),
        None => {}
    }
    s
}

fn compile_cte(cte: &CTEQuery) -> String {
    let recursive = if cte.recursive { "RECURSIVE " } else { "" };

    let ctes: Vec<String> = cte
        .ctes
        .iter()
        .map(|c| {
            let cols = if c.columns.is_empty() {
                String::new()
            } else {
                format!("({})", c.columns.join(", "))
            };
            format!("{}{} AS ({})", c.name, cols, compile(&c.query))
        })
        .collect();

    format!(
        "WITH {}{} {}",
        recursive,
        ctes.join(", "),
        compile(&cte.body)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parser::parse_single;

    fn round_trip(sql: &str) -> String {
        let query = parse_single(sql).expect("Failed to parse");
        compile(&query)
    }

    #[test]
    fn test_compile_simple_select() {
        assert_eq!(
            round_trip("SELECT t.name AS name FROM _reference12 AS t"),
            "SELECT t.name AS name FROM _reference12 AS t"
        );
    }

    #[test]
    fn test_compile_union_chain() {
        let compiled = round_trip("SELECT a.x FROM t1 a UNION ALL SELECT b.x FROM t2 b");
        assert_eq!(
            compiled,
            "SELECT a.x FROM t1 AS a UNION ALL SELECT b.x FROM t2 AS b"
        );
    }

    #[test]
    fn test_compile_set_operator_precedence_survives() {
        let sql = "SELECT t.a FROM t UNION SELECT u.a FROM u INTERSECT SELECT v.a FROM v";
        assert_eq!(round_trip(sql), sql);
    }

    #[test]
    fn test_compile_union_modifiers_apply_to_whole_chain() {
        assert_eq!(
            round_trip("SELECT t.a FROM t UNION ALL SELECT u.a FROM u ORDER BY a LIMIT 1"),
            "SELECT t.a FROM t UNION ALL SELECT u.a FROM u ORDER BY a LIMIT 1"
        );
    }

    #[test]
    fn test_compile_natural_join() {
        assert_eq!(
            round_trip("SELECT a.x FROM t1 a NATURAL JOIN t2 b"),
            "SELECT a.x FROM t1 AS a NATURAL JOIN t2 AS b"
        );
    }

    #[test]
    fn test_compile_aggregate_filter() {
        assert_eq!(
            round_trip("SELECT COUNT(*) FILTER (WHERE t.x > 1) FROM _document9 t"),
            "SELECT COUNT(*) FILTER (WHERE t.x > 1) FROM _document9 AS t"
        );
    }

    #[test]
    fn test_compile_parameter_placeholder() {
        assert_eq!(
            round_trip("SELECT t.x FROM t WHERE t.id = $1"),
            "SELECT t.x FROM t WHERE t.id = $1"
        );
    }

    #[test]
    fn test_compile_binary_literal() {
        assert_eq!(
            compile_expr(&Expression::Literal(Literal::type_index(5))),
            "'\\x00000005'::bytea"
        );
    }

    #[test]
    fn test_compile_date_functions() {
        let part = Expression::call(
            KnownFunction::SqlDatePart,
            vec![
                Expression::string("year"),
                Expression::column(Some("d"), "posted_at"),
            ],
        );
        assert_eq!(compile_expr(&part), "date_part('year', d.posted_at)");

        let trunc = Expression::call(
            KnownFunction::SqlDateTrunc,
            vec![
                Expression::string("month"),
                Expression::column(Some("d"), "posted_at"),
            ],
        );
        assert_eq!(compile_expr(&trunc), "date_trunc('month', d.posted_at)");
    }

    #[test]
    fn test_compile_cast_and_case() {
        let expr = Expression::Case {
            operand: None,
            when_clauses: vec![(
                Expression::IsNull {
                    expr: Box::new(Expression::column(None, "a")),
                    negated: false,
                },
                Expression::column(None, "b"),
            )],
            else_clause: Some(Box::new(Expression::cast(
                Expression::column(None, "a"),
                "varchar",
            ))),
        };
        assert_eq!(
            compile_expr(&expr),
            "CASE WHEN a IS NULL THEN b ELSE CAST(a AS varchar) END"
        );
    }

    #[test]
    fn test_compile_string_escaping() {
        assert_eq!(
            compile_expr(&Expression::string("O'Brien")),
            "'O''Brien'"
        );
    }
}
