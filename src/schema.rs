//! Schema definitions: the single source of truth mapping native types to
//! tables and columns.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use rusqlite::Row;

use crate::codec::{SqlDecode, SqlEncode};
use crate::error::{Result, StorageError};
use crate::value::SqlValue;

/// Declared column type, one of the engine's storage classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Integer,
    Real,
    Text,
    Blob,
}

impl DataType {
    pub fn sql_name(&self) -> &'static str {
        match self {
            DataType::Integer => "INTEGER",
            DataType::Real => "REAL",
            DataType::Text => "TEXT",
            DataType::Blob => "BLOB",
        }
    }
}

/// Maps a native field type to its declared column type.
pub trait SqlColumnType {
    const DATA_TYPE: DataType;
}

macro_rules! column_type {
    ($dt:expr => $($t:ty),+ $(,)?) => {$(
        impl SqlColumnType for $t {
            const DATA_TYPE: DataType = $dt;
        }
    )+}
}

column_type!(DataType::Integer => i8, i16, i32, i64, u8, u16, u32, u64, isize, usize, bool);
column_type!(DataType::Real => f32, f64);
column_type!(DataType::Text => String, Vec<u16>);
column_type!(DataType::Blob => Vec<u8>);

impl<T: SqlColumnType> SqlColumnType for Option<T> {
    const DATA_TYPE: DataType = T::DATA_TYPE;
}

impl<T: SqlColumnType> SqlColumnType for Box<T> {
    const DATA_TYPE: DataType = T::DATA_TYPE;
}

impl<T: SqlColumnType> SqlColumnType for Rc<T> {
    const DATA_TYPE: DataType = T::DATA_TYPE;
}

impl<T: SqlColumnType> SqlColumnType for Arc<T> {
    const DATA_TYPE: DataType = T::DATA_TYPE;
}

/// Default value rendered into the table definition.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Integer(i64),
    Real(f64),
    Text(String),
    Null,
    CurrentTimestamp,
}

impl DefaultValue {
    fn render(&self) -> String {
        match self {
            DefaultValue::Integer(i) => i.to_string(),
            DefaultValue::Real(r) => r.to_string(),
            DefaultValue::Text(t) => format!("'{}'", t.replace('\'', "''")),
            DefaultValue::Null => "NULL".to_string(),
            DefaultValue::CurrentTimestamp => "CURRENT_TIMESTAMP".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForeignKeyAction {
    NoAction,
    Cascade,
    SetNull,
    SetDefault,
    Restrict,
}

impl ForeignKeyAction {
    fn sql_name(&self) -> &'static str {
        match self {
            ForeignKeyAction::NoAction => "NO ACTION",
            ForeignKeyAction::Cascade => "CASCADE",
            ForeignKeyAction::SetNull => "SET NULL",
            ForeignKeyAction::SetDefault => "SET DEFAULT",
            ForeignKeyAction::Restrict => "RESTRICT",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    pub column: String,
    pub foreign_table: String,
    pub foreign_column: String,
    pub on_delete: ForeignKeyAction,
    pub on_update: ForeignKeyAction,
}

impl ForeignKey {
    pub fn new(
        column: impl Into<String>,
        foreign_table: impl Into<String>,
        foreign_column: impl Into<String>,
    ) -> Self {
        Self {
            column: column.into(),
            foreign_table: foreign_table.into(),
            foreign_column: foreign_column.into(),
            on_delete: ForeignKeyAction::NoAction,
            on_update: ForeignKeyAction::NoAction,
        }
    }

    pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = action;
        self
    }

    pub fn on_update(mut self, action: ForeignKeyAction) -> Self {
        self.on_update = action;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnConstraint {
    PrimaryKey,
    Autoincrement,
    NotNull,
    Unique,
    Default(DefaultValue),
    Collate(String),
}

/// One mapped column: declared type, constraints, and the accessor pair
/// connecting it to a field of `T`.
pub struct ColumnDefinition<T> {
    name: String,
    data_type: DataType,
    constraints: Vec<ColumnConstraint>,
    read: Box<dyn Fn(&T) -> Result<SqlValue> + Send + Sync>,
    write_value: Box<dyn Fn(&mut T, &SqlValue) -> Result<()> + Send + Sync>,
    write_column: Box<dyn Fn(&mut T, &Row<'_>, usize) -> Result<()> + Send + Sync>,
}

impl<T> fmt::Debug for ColumnDefinition<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnDefinition")
            .field("name", &self.name)
            .field("data_type", &self.data_type)
            .field("constraints", &self.constraints)
            .finish()
    }
}

/// Define a column mapped through a getter/setter pair.
pub fn column<T, F>(
    name: impl Into<String>,
    get: impl Fn(&T) -> F + Send + Sync + 'static,
    set: impl Fn(&mut T, F) + Send + Sync + 'static,
) -> ColumnDefinition<T>
where
    F: SqlEncode + SqlDecode + SqlColumnType + 'static,
{
    let set = Arc::new(set);
    let set_from_column = Arc::clone(&set);
    ColumnDefinition {
        name: name.into(),
        data_type: F::DATA_TYPE,
        constraints: Vec::new(),
        read: Box::new(move |obj| get(obj).encode()),
        write_value: Box::new(move |obj, value| {
            set(obj, F::from_boxed(value)?);
            Ok(())
        }),
        write_column: Box::new(move |obj, row, index| {
            set_from_column(obj, F::from_row(row, index)?);
            Ok(())
        }),
    }
}

impl<T> ColumnDefinition<T> {
    pub fn primary_key(mut self) -> Self {
        self.constraints.push(ColumnConstraint::PrimaryKey);
        self
    }

    pub fn autoincrement(mut self) -> Self {
        self.constraints.push(ColumnConstraint::Autoincrement);
        self
    }

    pub fn not_null(mut self) -> Self {
        self.constraints.push(ColumnConstraint::NotNull);
        self
    }

    pub fn unique(mut self) -> Self {
        self.constraints.push(ColumnConstraint::Unique);
        self
    }

    pub fn default_value(mut self, value: DefaultValue) -> Self {
        self.constraints.push(ColumnConstraint::Default(value));
        self
    }

    pub fn collate(mut self, collation: impl Into<String>) -> Self {
        self.constraints
            .push(ColumnConstraint::Collate(collation.into()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn constraints(&self) -> &[ColumnConstraint] {
        &self.constraints
    }

    pub fn is_primary_key(&self) -> bool {
        self.constraints
            .iter()
            .any(|c| matches!(c, ColumnConstraint::PrimaryKey))
    }

    pub(crate) fn is_autoincrement(&self) -> bool {
        self.constraints
            .iter()
            .any(|c| matches!(c, ColumnConstraint::Autoincrement))
    }

    /// Read this column's value out of an object.
    pub fn read(&self, obj: &T) -> Result<SqlValue> {
        (self.read)(obj)
    }

    /// Store a dynamic value into an object's field.
    pub(crate) fn write_value(&self, obj: &mut T, value: &SqlValue) -> Result<()> {
        (self.write_value)(obj, value)
    }

    /// Decode a result column directly into an object's field.
    pub(crate) fn write_column(&self, obj: &mut T, row: &Row<'_>, index: usize) -> Result<()> {
        (self.write_column)(obj, row, index)
    }

    fn render_ddl(&self, inline_pk: bool) -> String {
        let mut sql = format!("\"{}\" {}", self.name, self.data_type.sql_name());
        if inline_pk {
            sql.push_str(" PRIMARY KEY");
            if self.is_autoincrement() {
                sql.push_str(" AUTOINCREMENT");
            }
        }
        for constraint in &self.constraints {
            match constraint {
                ColumnConstraint::PrimaryKey | ColumnConstraint::Autoincrement => {}
                ColumnConstraint::NotNull => sql.push_str(" NOT NULL"),
                ColumnConstraint::Unique => sql.push_str(" UNIQUE"),
                ColumnConstraint::Default(value) => {
                    sql.push_str(" DEFAULT ");
                    sql.push_str(&value.render());
                }
                ColumnConstraint::Collate(collation) => {
                    sql.push_str(" COLLATE ");
                    sql.push_str(collation);
                }
            }
        }
        sql
    }
}

/// A table and its ordered column list. Column order is stable and defines
/// the positional bind and result-column correspondence.
#[derive(Debug)]
pub struct TableDefinition<T> {
    name: String,
    columns: Vec<ColumnDefinition<T>>,
    foreign_keys: Vec<ForeignKey>,
}

impl<T> TableDefinition<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn with_column(mut self, column: ColumnDefinition<T>) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_foreign_key(mut self, foreign_key: ForeignKey) -> Self {
        self.foreign_keys.push(foreign_key);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnDefinition<T>] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name()).collect()
    }

    pub fn find_column(&self, name: &str) -> Option<&ColumnDefinition<T>> {
        self.columns.iter().find(|c| c.name() == name)
    }

    /// Primary-key columns in declaration order, possibly empty.
    pub fn primary_key_columns(&self) -> Vec<&ColumnDefinition<T>> {
        self.columns.iter().filter(|c| c.is_primary_key()).collect()
    }

    /// Render the `CREATE TABLE IF NOT EXISTS` statement for this table.
    ///
    /// A single primary-key column is declared inline; a composite key
    /// becomes a table constraint. AUTOINCREMENT is only meaningful on a
    /// lone INTEGER primary key; anything else is left for the engine to
    /// reject.
    pub fn create_table_sql(&self) -> String {
        let pk: Vec<&ColumnDefinition<T>> = self.primary_key_columns();
        let inline_pk_name = if pk.len() == 1 { Some(pk[0].name()) } else { None };

        let mut parts: Vec<String> = self
            .columns
            .iter()
            .map(|c| c.render_ddl(inline_pk_name == Some(c.name())))
            .collect();

        if pk.len() > 1 {
            let names: Vec<String> = pk.iter().map(|c| format!("\"{}\"", c.name())).collect();
            parts.push(format!("PRIMARY KEY ({})", names.join(", ")));
        }

        for fk in &self.foreign_keys {
            let mut clause = format!(
                "FOREIGN KEY (\"{}\") REFERENCES \"{}\" (\"{}\")",
                fk.column, fk.foreign_table, fk.foreign_column
            );
            if fk.on_delete != ForeignKeyAction::NoAction {
                clause.push_str(" ON DELETE ");
                clause.push_str(fk.on_delete.sql_name());
            }
            if fk.on_update != ForeignKeyAction::NoAction {
                clause.push_str(" ON UPDATE ");
                clause.push_str(fk.on_update.sql_name());
            }
            parts.push(clause);
        }

        format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" ({})",
            self.name,
            parts.join(", ")
        )
    }
}

impl<T: Default> TableDefinition<T> {
    /// Construct a mapped object from a result row whose columns appear in
    /// declaration order.
    pub fn object_from_row(&self, row: &Row<'_>) -> Result<T> {
        let mut obj = T::default();
        for (index, col) in self.columns.iter().enumerate() {
            col.write_column(&mut obj, row, index)?;
        }
        Ok(obj)
    }
}

struct TableMeta {
    type_id: TypeId,
    table_name: String,
    ddl: String,
}

/// Registry of table definitions, keyed by the mapped native type.
///
/// Built once before any query activity; read-only afterwards.
#[derive(Default)]
pub struct Schema {
    tables: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    metas: Vec<TableMeta>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table. Re-registering the same type replaces the earlier
    /// definition.
    pub fn add_table<T: 'static>(mut self, table: TableDefinition<T>) -> Self {
        let type_id = TypeId::of::<T>();
        let meta = TableMeta {
            type_id,
            table_name: table.name().to_string(),
            ddl: table.create_table_sql(),
        };
        self.metas.retain(|m| m.type_id != type_id);
        self.metas.push(meta);
        self.tables.insert(type_id, Box::new(table));
        self
    }

    /// Look up the table mapped to `T`.
    pub fn resolve<T: 'static>(&self) -> Result<&TableDefinition<T>> {
        self.tables
            .get(&TypeId::of::<T>())
            .and_then(|t| t.downcast_ref::<TableDefinition<T>>())
            .ok_or_else(|| StorageError::UnmappedType(type_name::<T>()))
    }

    pub fn is_empty(&self) -> bool {
        self.metas.is_empty()
    }

    pub fn len(&self) -> usize {
        self.metas.len()
    }

    /// Table name and DDL for every registered table, in registration order.
    pub(crate) fn ddl_statements(&self) -> impl Iterator<Item = (&str, &str)> {
        self.metas
            .iter()
            .map(|m| (m.table_name.as_str(), m.ddl.as_str()))
    }
}
