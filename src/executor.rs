//! Statement execution against the engine.
//!
//! Statements are prepared through the connection's statement cache, bound
//! positionally from the bind plan, and stepped to completion. Cursor-mode
//! queries decode each result column through the typed accessors; the
//! callback-style text mode renders columns to text first and decodes
//! through the text path.

use rusqlite::{params_from_iter, Connection};
use tracing::debug;

use crate::codec::FromRow;
use crate::compile::Compiled;
use crate::error::Result;
use crate::schema::TableDefinition;
use crate::value::SqlValue;

/// Run a statement that returns no rows; yields the affected row count.
pub(crate) fn execute(conn: &Connection, compiled: &Compiled) -> Result<usize> {
    debug!("execute: {}", compiled.sql);
    let mut stmt = conn.prepare_cached(&compiled.sql)?;
    Ok(stmt.execute(params_from_iter(compiled.binds.iter()))?)
}

/// Cursor mode: step the statement, decoding every row via the typed
/// column accessors.
pub(crate) fn query_rows<R: FromRow>(conn: &Connection, compiled: &Compiled) -> Result<Vec<R>> {
    debug!("query: {}", compiled.sql);
    let mut stmt = conn.prepare_cached(&compiled.sql)?;
    let mut rows = stmt.query(params_from_iter(compiled.binds.iter()))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(R::from_row(row)?);
    }
    Ok(out)
}

/// Cursor mode materializing whole mapped objects, columns in declaration
/// order.
pub(crate) fn query_objects<T: Default>(
    conn: &Connection,
    compiled: &Compiled,
    table: &TableDefinition<T>,
) -> Result<Vec<T>> {
    debug!("query objects: {}", compiled.sql);
    let mut stmt = conn.prepare_cached(&compiled.sql)?;
    let mut rows = stmt.query(params_from_iter(compiled.binds.iter()))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(table.object_from_row(row)?);
    }
    Ok(out)
}

/// One-step mode: every column is rendered to its text form and decoded
/// through the text path, the way a per-row callback receives raw strings.
pub(crate) fn query_text_rows<R: FromRow>(
    conn: &Connection,
    compiled: &Compiled,
) -> Result<Vec<R>> {
    debug!("query text rows: {}", compiled.sql);
    let mut stmt = conn.prepare_cached(&compiled.sql)?;
    let column_count = stmt.column_count();
    let mut rows = stmt.query(params_from_iter(compiled.binds.iter()))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut argv: Vec<Option<String>> = Vec::with_capacity(column_count);
        for index in 0..column_count {
            argv.push(SqlValue::from(row.get_ref(index)?).to_column_text());
        }
        let argv_refs: Vec<Option<&str>> = argv.iter().map(|text| text.as_deref()).collect();
        out.push(R::from_argv(&argv_refs)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile_select;
    use crate::expr::{col, Select};

    fn seeded_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (id INTEGER, name TEXT, score REAL);
             INSERT INTO t VALUES (1, 'a', 1.5), (2, 'b', 2.5), (3, NULL, NULL);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn cursor_and_text_modes_agree_on_mixed_rows() {
        let conn = seeded_connection();
        let q = Select::from_table("t")
            .with_columns([col("id"), col("name"), col("score")])
            .with_where(col("id").ge(1));
        let compiled = compile_select(&q).unwrap();

        let typed: Vec<(i64, String, f64)> = query_rows(&conn, &compiled).unwrap();
        let text: Vec<(i64, String, f64)> = query_text_rows(&conn, &compiled).unwrap();
        assert_eq!(typed, text);
        assert_eq!(typed.len(), 3);
        // NULL decodes per type policy: empty string, zero
        assert_eq!(typed[2], (3, String::new(), 0.0));
    }

    #[test]
    fn execute_reports_affected_rows() {
        let conn = seeded_connection();
        let compiled = crate::compile::compile_delete("t", Some(&col("id").ge(2))).unwrap();
        assert_eq!(execute(&conn, &compiled).unwrap(), 2);
    }

    #[test]
    fn prepared_statements_are_reused_from_the_cache() {
        let conn = seeded_connection();
        let q = Select::from_table("t").with_columns([col("id")]).with_where(col("id").eq(1));
        let compiled = compile_select(&q).unwrap();
        for _ in 0..3 {
            let rows: Vec<i64> = query_rows(&conn, &compiled).unwrap();
            assert_eq!(rows, vec![1]);
        }
    }
}
