//! Query AST types for catalogsql.
//!
//! This module defines the representation produced by the parser, rewritten
//! by translation passes, and rendered by the SQL compiler. Every node kind
//! is a closed enum variant so that passes match exhaustively:
//! - Column references carry an optional qualifier which binds them to a
//!   table source of the enclosing SELECT (see `ast::visit::Scope`)
//! - Logical query functions are tagged with `KnownFunction` instead of
//!   being left as free-form names
//! - Set operations chain branches through `SelectQuery::set_op`

use std::fmt;

/// Top-level query representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Select(Box<SelectQuery>),
    /// Common Table Expressions wrapping an inner query.
    With(CTEQuery),
    /// Raw SQL passthrough for statements the translator does not touch.
    Raw(String),
}

/// A SELECT query with all standard SQL clauses.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectQuery {
    pub distinct: bool,
    pub projections: Vec<SelectItem>,
    pub from: Vec<TableRef>,
    pub joins: Vec<Join>,
    pub filter: Option<Expression>,
    pub group_by: Vec<Expression>,
    pub having: Option<Expression>,
    pub order_by: Vec<OrderByExpr>,
    pub limit: Option<Expression>,
    pub offset: Option<Expression>,
    /// Set operations (UNION, INTERSECT, EXCEPT).
    pub set_op: Option<Box<SetOperation>>,
}

/// A single item in the SELECT projection list.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// `*`
    Wildcard,
    /// `table.*`
    QualifiedWildcard(String),
    /// An expression, optionally aliased: `expr AS alias`.
    Expression {
        expr: Expression,
        alias: Option<String>,
    },
}

impl SelectItem {
    pub fn aliased(expr: Expression, alias: impl Into<String>) -> Self {
        SelectItem::Expression {
            expr,
            alias: Some(alias.into()),
        }
    }
}

/// Table reference in FROM clause.
#[derive(Debug, Clone, PartialEq)]
pub enum TableRef {
    /// A realized table: `schema.table AS alias`
    Table {
        schema: Option<String>,
        name: String,
        alias: Option<String>,
    },
    /// A derived table: `(SELECT ... UNION SELECT ...) AS alias`
    Subquery { query: Box<Query>, alias: String },
    /// Table-valued function: `generate_series(1, 10) AS alias`
    Function {
        name: String,
        args: Vec<Expression>,
        alias: Option<String>,
    },
}

impl TableRef {
    /// Name a column qualifier must use to refer to this source.
    pub fn binding_name(&self) -> Option<&str> {
        match self {
            TableRef::Table { name, alias, .. } => Some(alias.as_deref().unwrap_or(name)),
            TableRef::Subquery { alias, .. } => Some(alias),
            TableRef::Function { alias, .. } => alias.as_deref(),
        }
    }
}

/// JOIN clause representation.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub join_type: JoinType,
    pub table: TableRef,
    pub condition: Option<JoinCondition>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinCondition {
    On(Expression),
    Using(Vec<String>),
    Natural,
}

/// Logical functions the translator knows how to rewrite, plus the
/// PostgreSQL-side functions they are rewritten into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownFunction {
    DateTime,
    Year,
    Quarter,
    Presentation,
    IsNull,
    Substring,
    SqlDateTrunc,
    SqlDatePart,
    TypeIdentifier,
}

impl KnownFunction {
    /// Look up a logical function by its query-language name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_uppercase().as_str() {
            "DATETIME" => Some(KnownFunction::DateTime),
            "YEAR" => Some(KnownFunction::Year),
            "QUARTER" => Some(KnownFunction::Quarter),
            "PRESENTATION" => Some(KnownFunction::Presentation),
            "ISNULL" => Some(KnownFunction::IsNull),
            "SUBSTRING" => Some(KnownFunction::Substring),
            "BEGINOFPERIOD" => Some(KnownFunction::SqlDateTrunc),
            "TYPEIDENTIFIER" => Some(KnownFunction::TypeIdentifier),
            _ => None,
        }
    }

    /// Name used when rendering the call as SQL.
    pub fn sql_name(&self) -> &'static str {
        match self {
            KnownFunction::DateTime => "DATETIME",
            KnownFunction::Year => "YEAR",
            KnownFunction::Quarter => "QUARTER",
            KnownFunction::Presentation => "PRESENTATION",
            KnownFunction::IsNull => "ISNULL",
            KnownFunction::Substring => "substring",
            KnownFunction::SqlDateTrunc => "date_trunc",
            KnownFunction::SqlDatePart => "date_part",
            KnownFunction::TypeIdentifier => "TYPEIDENTIFIER",
        }
    }
}

impl fmt::Display for KnownFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A call to a `KnownFunction`.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub function: KnownFunction,
    pub args: Vec<Expression>,
}

impl FunctionCall {
    pub fn new(function: KnownFunction, args: Vec<Expression>) -> Self {
        Self { function, args }
    }
}

/// Core expression type. Recursive to support arbitrary nesting.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Column reference: `table.column` or just `column`.
    Column { table: Option<String>, name: String },
    /// Literal value.
    Literal(Literal),
    /// Binary operation: `left op right`.
    BinaryOp {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },
    /// Unary operation: `op expr` (e.g., NOT, -).
    UnaryOp {
        op: UnaryOperator,
        expr: Box<Expression>,
    },
    /// Call of a logical or translator-produced function.
    QueryFunction(FunctionCall),
    /// Any other function call: `name(args)`, passed through untouched.
    Function {
        name: String,
        args: Vec<Expression>,
        distinct: bool,
    },
    /// Aggregate function with optional filter.
    Aggregate {
        name: String,
        args: Vec<Expression>,
        distinct: bool,
        filter: Option<Box<Expression>>,
    },
    /// CASE expression.
    Case {
        operand: Option<Box<Expression>>,
        when_clauses: Vec<(Expression, Expression)>,
        else_clause: Option<Box<Expression>>,
    },
    /// Subquery expression: `(SELECT ...)`.
    Subquery(Box<Query>),
    /// EXISTS (SELECT ...).
    Exists(Box<Query>),
    /// expr IN (values).
    InList {
        expr: Box<Expression>,
        list: Vec<Expression>,
        negated: bool,
    },
    InSubquery {
        expr: Box<Expression>,
        subquery: Box<Query>,
        negated: bool,
    },
    /// expr BETWEEN low AND high.
    Between {
        expr: Box<Expression>,
        low: Box<Expression>,
        high: Box<Expression>,
        negated: bool,
    },
    /// expr IS NULL / IS NOT NULL.
    IsNull {
        expr: Box<Expression>,
        negated: bool,
    },
    /// CAST(expr AS type).
    Cast {
        expr: Box<Expression>,
        data_type: String,
    },
    /// Wildcard `*` (used in COUNT(*)).
    Wildcard,
    /// Parameter placeholder: `$1`, `$2`, etc.
    Parameter(usize),
    /// Nested expression (parenthesized).
    Nested(Box<Expression>),
}

impl Expression {
    pub fn column(table: Option<&str>, name: impl Into<String>) -> Self {
        Expression::Column {
            table: table.map(str::to_string),
            name: name.into(),
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expression::Literal(Literal::String(value.into()))
    }

    pub fn integer(value: i64) -> Self {
        Expression::Literal(Literal::Integer(value))
    }

    pub fn cast(expr: Expression, data_type: impl Into<String>) -> Self {
        Expression::Cast {
            expr: Box::new(expr),
            data_type: data_type.into(),
        }
    }

    pub fn call(function: KnownFunction, args: Vec<Expression>) -> Self {
        Expression::QueryFunction(FunctionCall::new(function, args))
    }
}

/// Literal values in SQL.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// Fixed-size binary value, rendered as a `bytea` literal.
    Binary(Vec<u8>),
}

impl Literal {
    /// Binary literal carrying a type discriminator, 4 bytes big-endian.
    pub fn type_index(index: i32) -> Self {
        Literal::Binary(index.to_be_bytes().to_vec())
    }
}

/// Binary operators.
#[derive(Debug, Clone, PartialEq)]
pub enum BinaryOperator {
    // Comparison
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    // Logical
    And,
    Or,
    // Arithmetic
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    // String
    Like,
    ILike,
    NotLike,
    NotILike,
    Concat,
}

/// Unary operators.
#[derive(Debug, Clone, PartialEq)]
pub enum UnaryOperator {
    Not,
    Minus,
    Plus,
}

/// ORDER BY expression.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByExpr {
    pub expr: Expression,
    pub asc: Option<bool>,
    pub nulls_first: Option<bool>,
}

/// Set operations (UNION, INTERSECT, EXCEPT).
#[derive(Debug, Clone, PartialEq)]
pub struct SetOperation {
    pub op: SetOperator,
    pub all: bool,
    pub right: Query,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SetOperator {
    Union,
    Intersect,
    Except,
}

/// Common Table Expression (WITH clause).
#[derive(Debug, Clone, PartialEq)]
pub struct CTEQuery {
    pub recursive: bool,
    pub ctes: Vec<CTE>,
    pub body: Box<Query>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CTE {
    pub name: String,
    pub columns: Vec<String>,
    pub query: Query,
}
