//! Typed SQLite object mapping for the Runar ecosystem.
//!
//! # Intention
//!
//! - Map native record types to table schemas declared once, up front.
//! - Compile fluent query descriptions into parameterized SQL plus an
//!   ordered bind plan; literals are never written into the SQL text.
//! - Convert between native typed values and the engine's dynamic values
//!   through one codec surface with three extraction contexts (column
//!   text, typed result columns, boxed function arguments).
//!
//! # Architectural Boundaries
//!
//! - The SQL engine itself stays behind `rusqlite`: no query planning or
//!   storage lives here.
//! - Only SQLite/database code belongs here. No business logic or
//!   unrelated utilities.

pub mod codec;
pub mod compile;
pub mod error;
mod executor;
pub mod expr;
pub mod pragma;
pub mod schema;
pub mod storage;
pub mod value;

pub use codec::{FromRow, SqlDecode, SqlEncode};
pub use compile::{compile_select, BindPlan, Compiled};
pub use error::{Result, StorageError};
pub use expr::{
    alias_ref, avg, col, col_of, count, count_all, func, lit, max, min, sum, BinaryOp, Cte, Expr,
    Join, JoinKind, Order, Select, UnaryOp,
};
pub use pragma::JournalMode;
pub use schema::{
    column, ColumnConstraint, ColumnDefinition, DataType, DefaultValue, ForeignKey,
    ForeignKeyAction, Schema, SqlColumnType, TableDefinition,
};
pub use storage::{SqliteConfig, SqliteStorage, StorageTransaction};
pub use value::{PointerArg, PointerBind, PointerKind, SqlValue};
