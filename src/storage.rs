//! The user-facing session object: owns a connection, orchestrates
//! transactions, and dispatches high-level operations to the compiler and
//! executor.

use std::panic::UnwindSafe;
use std::sync::Arc;

use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, InterruptHandle};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::codec::{FromRow, SqlDecode};
use crate::compile::{compile_delete, compile_insert, compile_select, compile_update};
use crate::error::{Result, StorageError};
use crate::executor;
use crate::expr::{col, count_all, Expr, Select};
use crate::pragma::JournalMode;
use crate::schema::Schema;
use crate::value::SqlValue;

/// SQLite storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// Path to the SQLite database file.
    pub db_path: String,
    /// Journal mode applied when the connection opens.
    pub journal_mode: Option<JournalMode>,
}

impl SqliteConfig {
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            journal_mode: None,
        }
    }

    pub fn with_journal_mode(mut self, mode: JournalMode) -> Self {
        self.journal_mode = Some(mode);
        self
    }
}

/// A storage session bound to one connection and one schema.
///
/// All calls are blocking and synchronous. A session is not internally
/// synchronized; share it across threads only behind external locking.
pub struct SqliteStorage {
    conn: Connection,
    schema: Arc<Schema>,
}

impl SqliteStorage {
    /// Open a file-backed database and apply the configured journal mode.
    pub fn open(config: SqliteConfig, schema: Schema) -> Result<Self> {
        info!("opening sqlite storage at {}", config.db_path);
        let conn = Connection::open(&config.db_path)?;
        let storage = Self {
            conn,
            schema: Arc::new(schema),
        };
        if let Some(mode) = config.journal_mode {
            storage.set_journal_mode(mode)?;
        }
        Ok(storage)
    }

    pub fn open_in_memory(schema: Schema) -> Result<Self> {
        info!("opening in-memory sqlite storage");
        Ok(Self {
            conn: Connection::open_in_memory()?,
            schema: Arc::new(schema),
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Create every registered table that does not exist yet.
    pub fn sync_schema(&self) -> Result<()> {
        for (name, ddl) in self.schema.ddl_statements() {
            debug!("syncing table {name}");
            self.conn.execute_batch(ddl)?;
        }
        info!("schema synced, {} table(s)", self.schema.len());
        Ok(())
    }

    /// Insert a mapped object; returns the new rowid.
    pub fn insert<T: 'static>(&self, obj: &T) -> Result<i64> {
        insert_impl(&self.conn, &self.schema, obj, false)
    }

    /// Insert, replacing any existing row with the same primary key.
    pub fn replace<T: 'static>(&self, obj: &T) -> Result<i64> {
        insert_impl(&self.conn, &self.schema, obj, true)
    }

    /// Update all non-key columns of the row matching the object's primary
    /// key.
    pub fn update<T: 'static>(&self, obj: &T) -> Result<()> {
        update_impl(&self.conn, &self.schema, obj)
    }

    /// Delete the row with the given single-column primary key.
    pub fn remove<T: 'static, K: Into<SqlValue>>(&self, pk: K) -> Result<()> {
        remove_impl::<T>(&self.conn, &self.schema, pk.into())
    }

    /// Delete every row matching a condition; returns the affected count.
    pub fn remove_where<T: 'static>(&self, condition: Expr) -> Result<usize> {
        remove_where_impl::<T>(&self.conn, &self.schema, condition)
    }

    /// Fetch by single-column primary key; fails if the row is missing.
    pub fn get<T: Default + 'static, K: Into<SqlValue>>(&self, pk: K) -> Result<T> {
        get_optional_impl::<T>(&self.conn, &self.schema, pk.into())?
            .ok_or(StorageError::Engine(rusqlite::Error::QueryReturnedNoRows))
    }

    pub fn get_optional<T: Default + 'static, K: Into<SqlValue>>(
        &self,
        pk: K,
    ) -> Result<Option<T>> {
        get_optional_impl::<T>(&self.conn, &self.schema, pk.into())
    }

    pub fn get_all<T: Default + 'static>(&self) -> Result<Vec<T>> {
        select_impl::<T>(&self.conn, &self.schema, Select::new())
    }

    /// Run a query description and materialize mapped objects. The
    /// projection is replaced with the table's full column list so result
    /// columns line up with the descriptor.
    pub fn select<T: Default + 'static>(&self, select: Select) -> Result<Vec<T>> {
        select_impl::<T>(&self.conn, &self.schema, select)
    }

    /// Run a query description and decode rows as scalars or tuples,
    /// cursor mode.
    pub fn query_rows<R: FromRow>(&self, select: &Select) -> Result<Vec<R>> {
        executor::query_rows(&self.conn, &compile_select(select)?)
    }

    /// Run a query description through the one-step text path.
    pub fn query_text_rows<R: FromRow>(&self, select: &Select) -> Result<Vec<R>> {
        executor::query_text_rows(&self.conn, &compile_select(select)?)
    }

    pub fn count<T: 'static>(&self, condition: Option<Expr>) -> Result<i64> {
        count_impl::<T>(&self.conn, &self.schema, condition)
    }

    /// Run raw SQL statements. Intended for pragmas and test fixtures that
    /// fall outside the mapped surface.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        Ok(self.conn.execute_batch(sql)?)
    }

    /// Run a closure inside a transaction. Commits when it returns `Ok`,
    /// rolls back on `Err`; an unwind rolls back on drop.
    pub fn transaction<R>(
        &mut self,
        f: impl FnOnce(&StorageTransaction<'_>) -> Result<R>,
    ) -> Result<R> {
        let schema = Arc::clone(&self.schema);
        let tx = self.conn.transaction()?;
        debug!("transaction begin");
        let stx = StorageTransaction { tx, schema };
        match f(&stx) {
            Ok(value) => {
                stx.tx.commit()?;
                debug!("transaction commit");
                Ok(value)
            }
            Err(err) => {
                debug!("transaction rollback: {err}");
                if let Err(rollback_err) = stx.tx.rollback() {
                    warn!("rollback failed: {rollback_err}");
                }
                Err(err)
            }
        }
    }

    /// Register an application-defined scalar function. Arguments arrive as
    /// boxed dynamic values; failures surface through the engine as
    /// function errors.
    pub fn create_scalar_function<F>(&self, name: &str, n_args: i32, f: F) -> Result<()>
    where
        F: Fn(&[SqlValue]) -> anyhow::Result<SqlValue> + Send + Sync + UnwindSafe + 'static,
    {
        debug!("registering scalar function {name}/{n_args}");
        self.conn.create_scalar_function(
            name,
            n_args,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            move |ctx| {
                let mut args = Vec::with_capacity(ctx.len());
                for index in 0..ctx.len() {
                    args.push(SqlValue::from(ctx.get_raw(index)));
                }
                f(&args).map_err(|err| rusqlite::Error::UserFunctionError(err.into()))
            },
        )?;
        Ok(())
    }

    /// Current journal mode, decoded strictly.
    pub fn journal_mode(&self) -> Result<JournalMode> {
        self.query_pragma_mode("PRAGMA journal_mode")
    }

    /// Change the journal mode; returns the mode the engine actually chose.
    pub fn set_journal_mode(&self, mode: JournalMode) -> Result<JournalMode> {
        info!("setting journal mode to {mode}");
        self.query_pragma_mode(&format!("PRAGMA journal_mode = {mode}"))
    }

    fn query_pragma_mode(&self, sql: &str) -> Result<JournalMode> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => JournalMode::from_row(row, 0),
            None => Err(StorageError::Configuration(
                "journal mode string is absent".to_string(),
            )),
        }
    }

    /// Handle for cooperative cancellation from another thread; the
    /// interrupted step fails with an engine error.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.conn.get_interrupt_handle()
    }
}

/// Transaction-scoped view over a storage session. Dropped without a commit
/// (for example during an unwind) the underlying transaction rolls back.
pub struct StorageTransaction<'conn> {
    tx: rusqlite::Transaction<'conn>,
    schema: Arc<Schema>,
}

impl StorageTransaction<'_> {
    pub fn insert<T: 'static>(&self, obj: &T) -> Result<i64> {
        insert_impl(&self.tx, &self.schema, obj, false)
    }

    pub fn replace<T: 'static>(&self, obj: &T) -> Result<i64> {
        insert_impl(&self.tx, &self.schema, obj, true)
    }

    pub fn update<T: 'static>(&self, obj: &T) -> Result<()> {
        update_impl(&self.tx, &self.schema, obj)
    }

    pub fn remove<T: 'static, K: Into<SqlValue>>(&self, pk: K) -> Result<()> {
        remove_impl::<T>(&self.tx, &self.schema, pk.into())
    }

    pub fn remove_where<T: 'static>(&self, condition: Expr) -> Result<usize> {
        remove_where_impl::<T>(&self.tx, &self.schema, condition)
    }

    pub fn get<T: Default + 'static, K: Into<SqlValue>>(&self, pk: K) -> Result<T> {
        get_optional_impl::<T>(&self.tx, &self.schema, pk.into())?
            .ok_or(StorageError::Engine(rusqlite::Error::QueryReturnedNoRows))
    }

    pub fn get_optional<T: Default + 'static, K: Into<SqlValue>>(
        &self,
        pk: K,
    ) -> Result<Option<T>> {
        get_optional_impl::<T>(&self.tx, &self.schema, pk.into())
    }

    pub fn get_all<T: Default + 'static>(&self) -> Result<Vec<T>> {
        select_impl::<T>(&self.tx, &self.schema, Select::new())
    }

    pub fn select<T: Default + 'static>(&self, select: Select) -> Result<Vec<T>> {
        select_impl::<T>(&self.tx, &self.schema, select)
    }

    pub fn query_rows<R: FromRow>(&self, select: &Select) -> Result<Vec<R>> {
        executor::query_rows(&self.tx, &compile_select(select)?)
    }

    pub fn count<T: 'static>(&self, condition: Option<Expr>) -> Result<i64> {
        count_impl::<T>(&self.tx, &self.schema, condition)
    }
}

fn insert_impl<T: 'static>(
    conn: &Connection,
    schema: &Schema,
    obj: &T,
    or_replace: bool,
) -> Result<i64> {
    let table = schema.resolve::<T>()?;
    let compiled = compile_insert(table, obj, or_replace)?;
    executor::execute(conn, &compiled)?;
    Ok(conn.last_insert_rowid())
}

fn update_impl<T: 'static>(conn: &Connection, schema: &Schema, obj: &T) -> Result<()> {
    let table = schema.resolve::<T>()?;
    let compiled = compile_update(table, obj)?;
    let changed = executor::execute(conn, &compiled)?;
    debug!("updated {changed} row(s) in {}", table.name());
    Ok(())
}

fn single_pk_condition<T: 'static>(schema: &Schema, pk: SqlValue) -> Result<(String, Expr)> {
    let table = schema.resolve::<T>()?;
    let pk_columns = table.primary_key_columns();
    if pk_columns.len() != 1 {
        return Err(StorageError::Unsupported(format!(
            "table `{}` does not have a single-column primary key",
            table.name()
        )));
    }
    Ok((
        table.name().to_string(),
        col(pk_columns[0].name()).eq(Expr::Literal(pk)),
    ))
}

fn remove_impl<T: 'static>(conn: &Connection, schema: &Schema, pk: SqlValue) -> Result<()> {
    let (table_name, condition) = single_pk_condition::<T>(schema, pk)?;
    let compiled = compile_delete(&table_name, Some(&condition))?;
    executor::execute(conn, &compiled)?;
    Ok(())
}

fn remove_where_impl<T: 'static>(
    conn: &Connection,
    schema: &Schema,
    condition: Expr,
) -> Result<usize> {
    let table = schema.resolve::<T>()?;
    let compiled = compile_delete(table.name(), Some(&condition))?;
    executor::execute(conn, &compiled)
}

fn get_optional_impl<T: Default + 'static>(
    conn: &Connection,
    schema: &Schema,
    pk: SqlValue,
) -> Result<Option<T>> {
    let (_, condition) = single_pk_condition::<T>(schema, pk)?;
    let mut rows = select_impl::<T>(conn, schema, Select::new().with_where(condition))?;
    Ok(if rows.is_empty() {
        None
    } else {
        Some(rows.swap_remove(0))
    })
}

fn select_impl<T: Default + 'static>(
    conn: &Connection,
    schema: &Schema,
    mut select: Select,
) -> Result<Vec<T>> {
    let table = schema.resolve::<T>()?;
    if select.from.is_none() {
        select.from = Some(crate::expr::TableRef::named(table.name()));
    }
    // result columns must line up with the descriptor's declaration order
    select.projection = table.column_names().into_iter().map(col).collect();
    let compiled = compile_select(&select)?;
    executor::query_objects(conn, &compiled, table)
}

fn count_impl<T: 'static>(
    conn: &Connection,
    schema: &Schema,
    condition: Option<Expr>,
) -> Result<i64> {
    let table = schema.resolve::<T>()?;
    let mut select = Select::from_table(table.name()).with_columns([count_all()]);
    if let Some(condition) = condition {
        select = select.with_where(condition);
    }
    let counts: Vec<i64> = executor::query_rows(conn, &compile_select(&select)?)?;
    Ok(counts.first().copied().unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{column, TableDefinition};

    #[derive(Debug, Default, Clone, PartialEq)]
    struct User {
        id: i64,
        name: String,
    }

    fn schema() -> Schema {
        Schema::new().add_table(
            TableDefinition::new("users")
                .with_column(column("id", |u: &User| u.id, |u, v| u.id = v).primary_key())
                .with_column(column("name", |u: &User| u.name.clone(), |u, v| u.name = v)),
        )
    }

    fn storage() -> SqliteStorage {
        let storage = SqliteStorage::open_in_memory(schema()).unwrap();
        storage.sync_schema().unwrap();
        storage
    }

    #[test]
    fn insert_then_get_round_trips() {
        let storage = storage();
        let user = User {
            id: 1,
            name: "a".into(),
        };
        storage.insert(&user).unwrap();
        assert_eq!(storage.get::<User, _>(1i64).unwrap(), user);
        assert!(storage.get_optional::<User, _>(2i64).unwrap().is_none());
    }

    #[test]
    fn transaction_rolls_back_on_error() {
        let mut storage = storage();
        let result: Result<()> = storage.transaction(|tx| {
            tx.insert(&User {
                id: 1,
                name: "a".into(),
            })?;
            Err(StorageError::Configuration("abort".into()))
        });
        assert!(result.is_err());
        assert_eq!(storage.count::<User>(None).unwrap(), 0);
    }

    #[test]
    fn transaction_commits_on_ok() {
        let mut storage = storage();
        storage
            .transaction(|tx| {
                tx.insert(&User {
                    id: 1,
                    name: "a".into(),
                })
            })
            .unwrap();
        assert_eq!(storage.count::<User>(None).unwrap(), 1);
    }

    #[test]
    fn journal_mode_of_memory_database_decodes_strictly() {
        let storage = storage();
        assert_eq!(storage.journal_mode().unwrap(), JournalMode::Memory);
        assert_eq!(
            storage.set_journal_mode(JournalMode::Off).unwrap(),
            JournalMode::Off
        );
    }
}
