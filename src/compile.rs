//! Translation of query descriptions into parameterized SQL.
//!
//! The walk is recursive descent in clause order. Every literal becomes a
//! `?` placeholder and pushes its value onto the bind plan at that moment,
//! so placeholder position i always corresponds to plan entry i. That
//! ordering is what positional binding relies on; nothing may reorder it.

use crate::error::{Result, StorageError};
use crate::expr::{Expr, Join, JoinKind, Order, Select, TableRef, UnaryOp};
use crate::schema::TableDefinition;
use crate::value::SqlValue;

/// Values to bind, one per placeholder, in placeholder order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindPlan(Vec<SqlValue>);

impl BindPlan {
    pub fn values(&self) -> &[SqlValue] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn push(&mut self, value: SqlValue) {
        self.0.push(value);
    }

    pub(crate) fn iter(&self) -> std::slice::Iter<'_, SqlValue> {
        self.0.iter()
    }
}

/// A compiled statement: SQL text plus its bind plan.
#[derive(Debug, Clone, PartialEq)]
pub struct Compiled {
    pub sql: String,
    pub binds: BindPlan,
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn write_table_ref(table: &TableRef, sql: &mut String) {
    sql.push_str(&quote_ident(&table.name));
    if let Some(alias) = &table.alias {
        sql.push_str(" AS ");
        sql.push_str(&quote_ident(alias));
    }
}

/// Compile a stand-alone SELECT description.
pub fn compile_select(select: &Select) -> Result<Compiled> {
    let mut sql = String::new();
    let mut binds = BindPlan::default();
    write_select(select, &mut sql, &mut binds)?;
    Ok(Compiled { sql, binds })
}

fn write_select(select: &Select, sql: &mut String, binds: &mut BindPlan) -> Result<()> {
    if !select.ctes.is_empty() {
        sql.push_str("WITH ");
        for (i, cte) in select.ctes.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&quote_ident(&cte.name));
            sql.push_str(" AS (");
            write_select(&cte.select, sql, binds)?;
            sql.push(')');
        }
        sql.push(' ');
    }

    sql.push_str("SELECT ");
    if select.distinct {
        sql.push_str("DISTINCT ");
    }
    if select.projection.is_empty() {
        sql.push('*');
    } else {
        for (i, expr) in select.projection.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            write_expr(expr, sql, binds)?;
        }
    }

    if let Some(from) = &select.from {
        sql.push_str(" FROM ");
        write_table_ref(from, sql);
    }

    for join in &select.joins {
        write_join(join, sql, binds)?;
    }

    if let Some(condition) = &select.where_clause {
        sql.push_str(" WHERE ");
        write_expr(condition, sql, binds)?;
    }

    if !select.group_by.is_empty() {
        sql.push_str(" GROUP BY ");
        for (i, expr) in select.group_by.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            write_expr(expr, sql, binds)?;
        }
    }

    if let Some(condition) = &select.having {
        sql.push_str(" HAVING ");
        write_expr(condition, sql, binds)?;
    }

    if !select.order_by.is_empty() {
        sql.push_str(" ORDER BY ");
        for (i, (expr, order)) in select.order_by.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            write_expr(expr, sql, binds)?;
            sql.push_str(match order {
                Order::Asc => " ASC",
                Order::Desc => " DESC",
            });
        }
    }

    match (select.limit, select.offset) {
        (Some(limit), offset) => {
            sql.push_str(" LIMIT ?");
            binds.push(SqlValue::Integer(limit as i64));
            if let Some(offset) = offset {
                sql.push_str(" OFFSET ?");
                binds.push(SqlValue::Integer(offset as i64));
            }
        }
        (None, Some(offset)) => {
            // the engine requires a LIMIT clause to carry an OFFSET
            sql.push_str(" LIMIT -1 OFFSET ?");
            binds.push(SqlValue::Integer(offset as i64));
        }
        (None, None) => {}
    }

    Ok(())
}

fn write_join(join: &Join, sql: &mut String, binds: &mut BindPlan) -> Result<()> {
    sql.push_str(match join.kind {
        JoinKind::Inner => " INNER JOIN ",
        JoinKind::Left => " LEFT JOIN ",
        JoinKind::Cross => " CROSS JOIN ",
    });
    write_table_ref(&join.table, sql);
    if let Some(on) = &join.on {
        sql.push_str(" ON ");
        write_expr(on, sql, binds)?;
    }
    Ok(())
}

fn write_expr(expr: &Expr, sql: &mut String, binds: &mut BindPlan) -> Result<()> {
    match expr {
        Expr::Literal(SqlValue::Pointer { tag, .. }) => {
            return Err(StorageError::Unsupported(format!(
                "pointer value `{tag}` cannot appear in a query expression"
            )));
        }
        Expr::Literal(value) => {
            sql.push('?');
            binds.push(value.clone());
        }
        Expr::Column { table, name } => {
            if let Some(table) = table {
                sql.push_str(&quote_ident(table));
                sql.push('.');
            }
            sql.push_str(&quote_ident(name));
        }
        Expr::Star => sql.push('*'),
        Expr::Unary { op, expr } => {
            sql.push('(');
            sql.push_str(match op {
                UnaryOp::Not => "NOT ",
                UnaryOp::Neg => "-",
            });
            write_expr(expr, sql, binds)?;
            sql.push(')');
        }
        Expr::Binary { op, lhs, rhs } => {
            sql.push('(');
            write_expr(lhs, sql, binds)?;
            sql.push(' ');
            sql.push_str(op.sql_token());
            sql.push(' ');
            write_expr(rhs, sql, binds)?;
            sql.push(')');
        }
        Expr::Function { name, args } => {
            sql.push_str(name);
            sql.push('(');
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                write_expr(arg, sql, binds)?;
            }
            sql.push(')');
        }
        Expr::Alias { name, expr } => {
            write_expr(expr, sql, binds)?;
            sql.push_str(" AS ");
            sql.push_str(&quote_ident(name));
        }
        Expr::AliasRef { name } => {
            sql.push_str(&quote_ident(name));
        }
        Expr::InList {
            expr,
            items,
            negated,
        } => {
            sql.push('(');
            write_expr(expr, sql, binds)?;
            sql.push_str(if *negated { " NOT IN (" } else { " IN (" });
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                write_expr(item, sql, binds)?;
            }
            sql.push_str("))");
        }
        Expr::InSelect {
            expr,
            select,
            negated,
        } => {
            sql.push('(');
            write_expr(expr, sql, binds)?;
            sql.push_str(if *negated { " NOT IN (" } else { " IN (" });
            write_select(select, sql, binds)?;
            sql.push_str("))");
        }
        Expr::Between { expr, low, high } => {
            sql.push('(');
            write_expr(expr, sql, binds)?;
            sql.push_str(" BETWEEN ");
            write_expr(low, sql, binds)?;
            sql.push_str(" AND ");
            write_expr(high, sql, binds)?;
            sql.push(')');
        }
        Expr::IsNull { expr, negated } => {
            sql.push('(');
            write_expr(expr, sql, binds)?;
            sql.push_str(if *negated { " IS NOT NULL" } else { " IS NULL" });
            sql.push(')');
        }
        Expr::Subquery(select) => {
            sql.push('(');
            write_select(select, sql, binds)?;
            sql.push(')');
        }
    }
    Ok(())
}

/// Compile an INSERT for a mapped object. Autoincrement columns are left to
/// the engine to fill in.
pub(crate) fn compile_insert<T>(
    table: &TableDefinition<T>,
    obj: &T,
    or_replace: bool,
) -> Result<Compiled> {
    let mut binds = BindPlan::default();
    let mut names = Vec::new();
    for col in table.columns() {
        if col.is_autoincrement() {
            continue;
        }
        names.push(quote_ident(col.name()));
        binds.push(col.read(obj)?);
    }
    let placeholders = vec!["?"; names.len()].join(", ");
    let sql = format!(
        "INSERT {}INTO {} ({}) VALUES ({})",
        if or_replace { "OR REPLACE " } else { "" },
        quote_ident(table.name()),
        names.join(", "),
        placeholders
    );
    Ok(Compiled { sql, binds })
}

/// Compile an UPDATE-by-primary-key for a mapped object. SET values bind
/// first, key values after, matching placeholder order.
pub(crate) fn compile_update<T>(table: &TableDefinition<T>, obj: &T) -> Result<Compiled> {
    let pk = table.primary_key_columns();
    if pk.is_empty() {
        return Err(StorageError::Unsupported(format!(
            "update requires a primary key on table `{}`",
            table.name()
        )));
    }

    let mut binds = BindPlan::default();
    let mut assignments = Vec::new();
    for col in table.columns() {
        if col.is_primary_key() {
            continue;
        }
        assignments.push(format!("{} = ?", quote_ident(col.name())));
        binds.push(col.read(obj)?);
    }
    if assignments.is_empty() {
        return Err(StorageError::Unsupported(format!(
            "table `{}` has no non-key columns to update",
            table.name()
        )));
    }

    let mut predicates = Vec::new();
    for col in &pk {
        predicates.push(format!("{} = ?", quote_ident(col.name())));
        binds.push(col.read(obj)?);
    }

    let sql = format!(
        "UPDATE {} SET {} WHERE {}",
        quote_ident(table.name()),
        assignments.join(", "),
        predicates.join(" AND ")
    );
    Ok(Compiled { sql, binds })
}

/// Compile a DELETE with an optional condition.
pub(crate) fn compile_delete(table_name: &str, condition: Option<&Expr>) -> Result<Compiled> {
    let mut sql = format!("DELETE FROM {}", quote_ident(table_name));
    let mut binds = BindPlan::default();
    if let Some(condition) = condition {
        sql.push_str(" WHERE ");
        write_expr(condition, &mut sql, &mut binds)?;
    }
    Ok(Compiled { sql, binds })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{alias_ref, col, col_of, count_all, lit};
    use crate::schema::column;

    #[test]
    fn select_by_key_compiles_to_one_placeholder() {
        let q = Select::from_table("T")
            .with_columns([col("name")])
            .with_where(col("id").eq(1));
        let compiled = compile_select(&q).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT \"name\" FROM \"T\" WHERE (\"id\" = ?)"
        );
        assert_eq!(compiled.binds.values(), &[SqlValue::Integer(1)]);
    }

    #[test]
    fn placeholders_appear_in_bind_plan_order() {
        let q = Select::from_table("t").with_where(
            col("a")
                .eq(10)
                .and(col("b").in_values([20, 30]))
                .or(col("c").between(40, 50)),
        );
        let compiled = compile_select(&q).unwrap();
        let placeholder_count = compiled.sql.matches('?').count();
        assert_eq!(placeholder_count, 5);
        assert_eq!(
            compiled.binds.values(),
            &[
                SqlValue::Integer(10),
                SqlValue::Integer(20),
                SqlValue::Integer(30),
                SqlValue::Integer(40),
                SqlValue::Integer(50),
            ]
        );
    }

    #[test]
    fn literals_are_never_inlined() {
        let q = Select::new().with_column(lit("x'); DROP TABLE users; --"));
        let compiled = compile_select(&q).unwrap();
        assert_eq!(compiled.sql, "SELECT ?");
        assert!(!compiled.sql.contains("DROP"));
    }

    #[test]
    fn joins_aliases_and_ctes_render_in_clause_order() {
        let recent = Select::from_table("posts")
            .with_columns([col("author_id")])
            .with_where(col("created").gt(100));
        let q = Select::from_table_as("users", "u")
            .with_columns([col_of("u", "name"), count_all().as_alias("n")])
            .with_cte("recent", recent)
            .with_join(
                Join::inner("recent").on(col_of("recent", "author_id").eq(col_of("u", "id"))),
            )
            .with_group_by(col_of("u", "id"))
            .with_order_by(alias_ref("n"), Order::Desc)
            .with_limit(5);
        let compiled = compile_select(&q).unwrap();
        assert_eq!(
            compiled.sql,
            "WITH \"recent\" AS (SELECT \"author_id\" FROM \"posts\" WHERE (\"created\" > ?)) \
             SELECT \"u\".\"name\", COUNT(*) AS \"n\" FROM \"users\" AS \"u\" \
             INNER JOIN \"recent\" ON (\"recent\".\"author_id\" = \"u\".\"id\") \
             GROUP BY \"u\".\"id\" ORDER BY \"n\" DESC LIMIT ?"
        );
        assert_eq!(
            compiled.binds.values(),
            &[SqlValue::Integer(100), SqlValue::Integer(5)]
        );
    }

    #[test]
    fn subquery_in_where_shares_the_bind_plan() {
        let inner = Select::from_table("banned")
            .with_columns([col("user_id")])
            .with_where(col("until").gt(7));
        let q = Select::from_table("users").with_where(col("id").in_select(inner));
        let compiled = compile_select(&q).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT * FROM \"users\" WHERE (\"id\" IN \
             (SELECT \"user_id\" FROM \"banned\" WHERE (\"until\" > ?)))"
        );
        assert_eq!(compiled.binds.values(), &[SqlValue::Integer(7)]);
    }

    #[test]
    fn pointer_literals_are_rejected() {
        use crate::value::{PointerBind, PointerKind};
        struct H;
        impl PointerKind for H {
            const TAG: &'static str = "h";
        }
        let q = Select::from_table("t")
            .with_where(col("a").eq(Expr::Literal(PointerBind::new(H).to_value())));
        assert!(matches!(
            compile_select(&q),
            Err(StorageError::Unsupported(_))
        ));
    }

    #[derive(Default)]
    struct User {
        id: i64,
        name: String,
    }

    fn user_table() -> TableDefinition<User> {
        TableDefinition::new("users")
            .with_column(column("id", |u: &User| u.id, |u, v| u.id = v).primary_key())
            .with_column(column("name", |u: &User| u.name.clone(), |u, v| u.name = v))
    }

    #[test]
    fn insert_binds_follow_column_order() {
        let user = User {
            id: 3,
            name: "ada".into(),
        };
        let compiled = compile_insert(&user_table(), &user, false).unwrap();
        assert_eq!(
            compiled.sql,
            "INSERT INTO \"users\" (\"id\", \"name\") VALUES (?, ?)"
        );
        assert_eq!(
            compiled.binds.values(),
            &[SqlValue::Integer(3), SqlValue::Text("ada".into())]
        );
    }

    #[test]
    fn update_sets_non_key_columns_then_filters_by_key() {
        let user = User {
            id: 3,
            name: "ada".into(),
        };
        let compiled = compile_update(&user_table(), &user).unwrap();
        assert_eq!(
            compiled.sql,
            "UPDATE \"users\" SET \"name\" = ? WHERE \"id\" = ?"
        );
        assert_eq!(
            compiled.binds.values(),
            &[SqlValue::Text("ada".into()), SqlValue::Integer(3)]
        );
    }
}
