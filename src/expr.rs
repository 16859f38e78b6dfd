//! Query description nodes and the fluent builders that assemble them.
//!
//! Building a tree never touches the engine: it is pure data assembly,
//! translated to SQL only when handed to the compiler.

use crate::value::SqlValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Like,
}

impl BinaryOp {
    pub(crate) fn sql_token(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Like => "LIKE",
        }
    }
}

/// One node of a query expression. Nodes own their children; a finished
/// tree is immutable.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(SqlValue),
    Column {
        table: Option<String>,
        name: String,
    },
    /// `*`, valid in projections and aggregate arguments.
    Star,
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Function {
        name: String,
        args: Vec<Expr>,
    },
    /// Attaches a result name usable elsewhere in the same tree via
    /// [`alias_ref`].
    Alias {
        name: String,
        expr: Box<Expr>,
    },
    AliasRef {
        name: String,
    },
    InList {
        expr: Box<Expr>,
        items: Vec<Expr>,
        negated: bool,
    },
    InSelect {
        expr: Box<Expr>,
        select: Box<Select>,
        negated: bool,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    /// A parenthesized sub-select used as a scalar expression.
    Subquery(Box<Select>),
}

/// Reference a column by bare name.
pub fn col(name: impl Into<String>) -> Expr {
    Expr::Column {
        table: None,
        name: name.into(),
    }
}

/// Reference a column qualified by table (or CTE, or join alias) name.
pub fn col_of(table: impl Into<String>, name: impl Into<String>) -> Expr {
    Expr::Column {
        table: Some(table.into()),
        name: name.into(),
    }
}

/// A literal value. Literals are always bound as parameters, never written
/// into the SQL text.
pub fn lit(value: impl Into<SqlValue>) -> Expr {
    Expr::Literal(value.into())
}

/// Re-reference a name attached earlier with [`Expr::as_alias`].
pub fn alias_ref(name: impl Into<String>) -> Expr {
    Expr::AliasRef { name: name.into() }
}

/// An arbitrary scalar or aggregate function call.
pub fn func(name: impl Into<String>, args: Vec<Expr>) -> Expr {
    Expr::Function {
        name: name.into(),
        args,
    }
}

pub fn count(expr: Expr) -> Expr {
    func("COUNT", vec![expr])
}

pub fn count_all() -> Expr {
    func("COUNT", vec![Expr::Star])
}

pub fn sum(expr: Expr) -> Expr {
    func("SUM", vec![expr])
}

pub fn avg(expr: Expr) -> Expr {
    func("AVG", vec![expr])
}

pub fn min(expr: Expr) -> Expr {
    func("MIN", vec![expr])
}

pub fn max(expr: Expr) -> Expr {
    func("MAX", vec![expr])
}

macro_rules! binary_method {
    ($($method:ident => $op:ident),+ $(,)?) => {$(
        pub fn $method(self, other: impl Into<Expr>) -> Expr {
            Expr::Binary {
                op: BinaryOp::$op,
                lhs: Box::new(self),
                rhs: Box::new(other.into()),
            }
        }
    )+}
}

impl Expr {
    binary_method!(
        eq => Eq,
        ne => Ne,
        lt => Lt,
        le => Le,
        gt => Gt,
        ge => Ge,
        and => And,
        or => Or,
        add => Add,
        sub => Sub,
        mul => Mul,
        div => Div,
        rem => Mod,
        like => Like,
    );

    pub fn not(self) -> Expr {
        Expr::Unary {
            op: UnaryOp::Not,
            expr: Box::new(self),
        }
    }

    pub fn neg(self) -> Expr {
        Expr::Unary {
            op: UnaryOp::Neg,
            expr: Box::new(self),
        }
    }

    pub fn as_alias(self, name: impl Into<String>) -> Expr {
        Expr::Alias {
            name: name.into(),
            expr: Box::new(self),
        }
    }

    pub fn is_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    pub fn is_not_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    pub fn in_values<I>(self, items: I) -> Expr
    where
        I: IntoIterator,
        I::Item: Into<Expr>,
    {
        Expr::InList {
            expr: Box::new(self),
            items: items.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    pub fn not_in_values<I>(self, items: I) -> Expr
    where
        I: IntoIterator,
        I::Item: Into<Expr>,
    {
        Expr::InList {
            expr: Box::new(self),
            items: items.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    pub fn in_select(self, select: Select) -> Expr {
        Expr::InSelect {
            expr: Box::new(self),
            select: Box::new(select),
            negated: false,
        }
    }

    pub fn between(self, low: impl Into<Expr>, high: impl Into<Expr>) -> Expr {
        Expr::Between {
            expr: Box::new(self),
            low: Box::new(low.into()),
            high: Box::new(high.into()),
        }
    }
}

impl From<SqlValue> for Expr {
    fn from(value: SqlValue) -> Self {
        Expr::Literal(value)
    }
}

macro_rules! literal_into_expr {
    ($($t:ty),+ $(,)?) => {$(
        impl From<$t> for Expr {
            fn from(value: $t) -> Self {
                Expr::Literal(value.into())
            }
        }
    )+}
}

literal_into_expr!(i32, i64, f64, bool, &str, String, Vec<u8>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Cross,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub(crate) name: String,
    pub(crate) alias: Option<String>,
}

impl TableRef {
    pub(crate) fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub(crate) kind: JoinKind,
    pub(crate) table: TableRef,
    pub(crate) on: Option<Expr>,
}

impl Join {
    pub fn inner(table: impl Into<String>) -> Self {
        Self::new(JoinKind::Inner, table)
    }

    pub fn left(table: impl Into<String>) -> Self {
        Self::new(JoinKind::Left, table)
    }

    pub fn cross(table: impl Into<String>) -> Self {
        Self::new(JoinKind::Cross, table)
    }

    fn new(kind: JoinKind, table: impl Into<String>) -> Self {
        Self {
            kind,
            table: TableRef {
                name: table.into(),
                alias: None,
            },
            on: None,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.table.alias = Some(alias.into());
        self
    }

    pub fn on(mut self, condition: Expr) -> Self {
        self.on = Some(condition);
        self
    }
}

/// A named common table expression attached to a [`Select`].
#[derive(Debug, Clone, PartialEq)]
pub struct Cte {
    pub(crate) name: String,
    pub(crate) select: Select,
}

/// Composable, immutable query description.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Select {
    pub(crate) projection: Vec<Expr>,
    pub(crate) from: Option<TableRef>,
    pub(crate) joins: Vec<Join>,
    pub(crate) where_clause: Option<Expr>,
    pub(crate) group_by: Vec<Expr>,
    pub(crate) having: Option<Expr>,
    pub(crate) order_by: Vec<(Expr, Order)>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    pub(crate) ctes: Vec<Cte>,
    pub(crate) distinct: bool,
}

impl Select {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_table(table: impl Into<String>) -> Self {
        Self {
            from: Some(TableRef {
                name: table.into(),
                alias: None,
            }),
            ..Self::default()
        }
    }

    pub fn from_table_as(table: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            from: Some(TableRef {
                name: table.into(),
                alias: Some(alias.into()),
            }),
            ..Self::default()
        }
    }

    pub fn with_columns<I>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = Expr>,
    {
        self.projection.extend(columns);
        self
    }

    pub fn with_column(mut self, column: Expr) -> Self {
        self.projection.push(column);
        self
    }

    /// Add a condition; conditions given across multiple calls are ANDed.
    pub fn with_where(mut self, condition: Expr) -> Self {
        self.where_clause = Some(match self.where_clause.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    pub fn with_join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    pub fn with_group_by(mut self, expr: Expr) -> Self {
        self.group_by.push(expr);
        self
    }

    pub fn with_having(mut self, condition: Expr) -> Self {
        self.having = Some(match self.having.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    pub fn with_order_by(mut self, expr: Expr, order: Order) -> Self {
        self.order_by.push((expr, order));
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Attach a named sub-select usable as a table in `FROM`, joins, and
    /// column qualifiers.
    pub fn with_cte(mut self, name: impl Into<String>, select: Select) -> Self {
        self.ctes.push(Cte {
            name: name.into(),
            select,
        });
        self
    }

    pub fn with_distinct(mut self) -> Self {
        self.distinct = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_compose_without_touching_the_engine() {
        let q = Select::from_table("users")
            .with_columns([col("name")])
            .with_where(col("id").eq(1).and(col("age").ge(18)))
            .with_order_by(col("name"), Order::Asc)
            .with_limit(10);
        assert_eq!(q.projection.len(), 1);
        assert!(q.where_clause.is_some());
        assert_eq!(q.limit, Some(10));
    }

    #[test]
    fn repeated_where_calls_are_anded() {
        let q = Select::from_table("t")
            .with_where(col("a").eq(1))
            .with_where(col("b").eq(2));
        match q.where_clause.unwrap() {
            Expr::Binary { op: BinaryOp::And, .. } => {}
            other => panic!("expected AND, got {other:?}"),
        }
    }

    #[test]
    fn tree_construction_is_pure_data() {
        let a = col("x").in_values([1, 2, 3]);
        let b = col("x").in_values([1, 2, 3]);
        assert_eq!(a, b);
    }
}
