//! Conversions between native typed values and the engine's dynamic values.
//!
//! Every decodable type supports three extraction contexts:
//! column text (one-step callback queries), typed result columns
//! (multi-step cursor queries), and boxed dynamic values (application-defined
//! function arguments). All three paths agree on the logical value for the
//! same underlying data.

use std::rc::Rc;
use std::sync::Arc;

use rusqlite::types::ValueRef;
use rusqlite::Row;

use crate::error::{Result, StorageError};
use crate::value::{PointerArg, PointerKind, SqlValue};

/// Encode a native value into a dynamic engine value.
pub trait SqlEncode {
    fn encode(&self) -> Result<SqlValue>;
}

/// Decode a native value out of the engine, from any of the three contexts.
///
/// Null handling is a per-type policy, not a uniform rule: numbers decode
/// NULL to zero, text and blobs to empty, `Option` to `None`, and pointer
/// handles refuse the text and column contexts entirely.
pub trait SqlDecode: Sized {
    /// One-step (callback) mode: raw column text, `None` for SQL NULL.
    fn from_column_text(text: Option<&str>) -> Result<Self>;

    /// Multi-step (cursor) mode: typed column accessor by index.
    fn from_row(row: &Row<'_>, index: usize) -> Result<Self>;

    /// Boxed dynamic value, used to unbox function arguments.
    fn from_boxed(value: &SqlValue) -> Result<Self>;
}

/// Decode a whole result row into a scalar, tuple, or other projection.
pub trait FromRow: Sized {
    /// Cursor mode: element `i` reads result column `i`.
    fn from_row(row: &Row<'_>) -> Result<Self>;

    /// Callback mode: element `i` reads `argv[i]`; a missing or `None`
    /// entry is SQL NULL.
    fn from_argv(argv: &[Option<&str>]) -> Result<Self>;
}

// Locale-independent numeric parsing of column text: consume the longest
// leading prefix that still reads as a number, zero when there is none.

fn int_text(text: &str) -> i64 {
    let t = text.trim();
    let mut end = 0;
    for (i, c) in t.char_indices() {
        if c.is_ascii_digit() || ((c == '-' || c == '+') && i == 0) {
            end = i + c.len_utf8();
        } else {
            break;
        }
    }
    let prefix = &t[..end];
    if prefix.is_empty() || prefix == "-" || prefix == "+" {
        return 0;
    }
    match prefix.parse::<i64>() {
        Ok(v) => v,
        // out of range: go through the real path, which saturates
        Err(_) => real_to_int(prefix.parse::<f64>().unwrap_or(0.0)),
    }
}

fn real_text(text: &str) -> f64 {
    let t = text.trim();
    let mut end = 0;
    let mut seen_dot = false;
    for (i, c) in t.char_indices() {
        let ok = c.is_ascii_digit() || ((c == '-' || c == '+') && i == 0) || (c == '.' && !seen_dot);
        if !ok {
            break;
        }
        if c == '.' {
            seen_dot = true;
        }
        end = i + c.len_utf8();
    }
    let prefix = &t[..end];
    if prefix.is_empty() {
        0.0
    } else {
        prefix.parse::<f64>().unwrap_or(0.0)
    }
}

fn real_to_int(r: f64) -> i64 {
    if r >= i64::MAX as f64 {
        i64::MAX
    } else if r <= i64::MIN as f64 {
        i64::MIN
    } else {
        r as i64
    }
}

fn int_of_ref(value: ValueRef<'_>) -> i64 {
    match value {
        ValueRef::Null => 0,
        ValueRef::Integer(i) => i,
        ValueRef::Real(r) => real_to_int(r),
        ValueRef::Text(t) => int_text(&String::from_utf8_lossy(t)),
        ValueRef::Blob(b) => int_text(&String::from_utf8_lossy(b)),
    }
}

fn int_of_boxed(value: &SqlValue) -> i64 {
    match value {
        // pointer values surface as NULL through ordinary accessors
        SqlValue::Null | SqlValue::Pointer { .. } => 0,
        SqlValue::Integer(i) => *i,
        SqlValue::Real(r) => real_to_int(*r),
        SqlValue::Text(t) => int_text(t),
        SqlValue::Blob(b) => int_text(&String::from_utf8_lossy(b)),
    }
}

fn real_of_ref(value: ValueRef<'_>) -> f64 {
    match value {
        ValueRef::Null => 0.0,
        ValueRef::Integer(i) => i as f64,
        ValueRef::Real(r) => r,
        ValueRef::Text(t) => real_text(&String::from_utf8_lossy(t)),
        ValueRef::Blob(b) => real_text(&String::from_utf8_lossy(b)),
    }
}

fn real_of_boxed(value: &SqlValue) -> f64 {
    match value {
        SqlValue::Null | SqlValue::Pointer { .. } => 0.0,
        SqlValue::Integer(i) => *i as f64,
        SqlValue::Real(r) => *r,
        SqlValue::Text(t) => real_text(t),
        SqlValue::Blob(b) => real_text(&String::from_utf8_lossy(b)),
    }
}

fn text_of_ref(value: ValueRef<'_>) -> Result<Option<String>> {
    match value {
        ValueRef::Null => Ok(None),
        ValueRef::Integer(i) => Ok(Some(i.to_string())),
        ValueRef::Real(r) => Ok(Some(r.to_string())),
        ValueRef::Text(t) | ValueRef::Blob(t) => String::from_utf8(t.to_vec())
            .map(Some)
            .map_err(|e| StorageError::Decode(format!("column text is not valid utf-8: {e}"))),
    }
}

fn text_of_boxed(value: &SqlValue) -> Result<Option<String>> {
    match value {
        SqlValue::Null | SqlValue::Pointer { .. } => Ok(None),
        SqlValue::Integer(i) => Ok(Some(i.to_string())),
        SqlValue::Real(r) => Ok(Some(r.to_string())),
        SqlValue::Text(t) => Ok(Some(t.clone())),
        SqlValue::Blob(b) => String::from_utf8(b.clone())
            .map(Some)
            .map_err(|e| StorageError::Decode(format!("blob is not valid utf-8 text: {e}"))),
    }
}

fn blob_of_ref(value: ValueRef<'_>) -> Vec<u8> {
    match value {
        ValueRef::Null => Vec::new(),
        ValueRef::Integer(i) => i.to_string().into_bytes(),
        ValueRef::Real(r) => r.to_string().into_bytes(),
        ValueRef::Text(t) | ValueRef::Blob(t) => t.to_vec(),
    }
}

fn blob_of_boxed(value: &SqlValue) -> Vec<u8> {
    match value {
        SqlValue::Null | SqlValue::Pointer { .. } => Vec::new(),
        SqlValue::Integer(i) => i.to_string().into_bytes(),
        SqlValue::Real(r) => r.to_string().into_bytes(),
        SqlValue::Text(t) => t.as_bytes().to_vec(),
        SqlValue::Blob(b) => b.clone(),
    }
}

macro_rules! integer_codec {
    ($($t:ty),+ $(,)?) => {$(
        impl SqlDecode for $t {
            fn from_column_text(text: Option<&str>) -> Result<Self> {
                Ok(int_text(text.unwrap_or("")) as $t)
            }

            fn from_row(row: &Row<'_>, index: usize) -> Result<Self> {
                Ok(int_of_ref(row.get_ref(index)?) as $t)
            }

            fn from_boxed(value: &SqlValue) -> Result<Self> {
                Ok(int_of_boxed(value) as $t)
            }
        }

        impl SqlEncode for $t {
            fn encode(&self) -> Result<SqlValue> {
                Ok(SqlValue::Integer(*self as i64))
            }
        }
    )+}
}

integer_codec!(i8, i16, i32, i64, u8, u16, u32, isize);

macro_rules! unsigned_bigint_codec {
    ($($t:ty),+ $(,)?) => {$(
        impl SqlDecode for $t {
            fn from_column_text(text: Option<&str>) -> Result<Self> {
                Ok(int_text(text.unwrap_or("")) as $t)
            }

            fn from_row(row: &Row<'_>, index: usize) -> Result<Self> {
                Ok(int_of_ref(row.get_ref(index)?) as $t)
            }

            fn from_boxed(value: &SqlValue) -> Result<Self> {
                Ok(int_of_boxed(value) as $t)
            }
        }

        impl SqlEncode for $t {
            fn encode(&self) -> Result<SqlValue> {
                // engine integers are signed 64-bit
                i64::try_from(*self)
                    .map(SqlValue::Integer)
                    .map_err(|_| StorageError::Decode(format!(
                        "unsigned value {self} exceeds the engine integer range"
                    )))
            }
        }
    )+}
}

unsigned_bigint_codec!(u64, usize);

macro_rules! real_codec {
    ($($t:ty),+ $(,)?) => {$(
        impl SqlDecode for $t {
            fn from_column_text(text: Option<&str>) -> Result<Self> {
                Ok(real_text(text.unwrap_or("")) as $t)
            }

            fn from_row(row: &Row<'_>, index: usize) -> Result<Self> {
                Ok(real_of_ref(row.get_ref(index)?) as $t)
            }

            fn from_boxed(value: &SqlValue) -> Result<Self> {
                Ok(real_of_boxed(value) as $t)
            }
        }

        impl SqlEncode for $t {
            fn encode(&self) -> Result<SqlValue> {
                Ok(SqlValue::Real(*self as f64))
            }
        }
    )+}
}

real_codec!(f32, f64);

impl SqlDecode for bool {
    fn from_column_text(text: Option<&str>) -> Result<Self> {
        Ok(int_text(text.unwrap_or("")) != 0)
    }

    fn from_row(row: &Row<'_>, index: usize) -> Result<Self> {
        Ok(int_of_ref(row.get_ref(index)?) != 0)
    }

    fn from_boxed(value: &SqlValue) -> Result<Self> {
        Ok(int_of_boxed(value) != 0)
    }
}

impl SqlEncode for bool {
    fn encode(&self) -> Result<SqlValue> {
        Ok(SqlValue::Integer(*self as i64))
    }
}

impl SqlDecode for String {
    fn from_column_text(text: Option<&str>) -> Result<Self> {
        Ok(text.unwrap_or("").to_string())
    }

    fn from_row(row: &Row<'_>, index: usize) -> Result<Self> {
        Ok(text_of_ref(row.get_ref(index)?)?.unwrap_or_default())
    }

    fn from_boxed(value: &SqlValue) -> Result<Self> {
        Ok(text_of_boxed(value)?.unwrap_or_default())
    }
}

impl SqlEncode for String {
    fn encode(&self) -> Result<SqlValue> {
        Ok(SqlValue::Text(self.clone()))
    }
}

/// UTF-16 text, converted from the engine's 8-bit column text.
impl SqlDecode for Vec<u16> {
    fn from_column_text(text: Option<&str>) -> Result<Self> {
        Ok(text.unwrap_or("").encode_utf16().collect())
    }

    fn from_row(row: &Row<'_>, index: usize) -> Result<Self> {
        let text = text_of_ref(row.get_ref(index)?)?.unwrap_or_default();
        Ok(text.encode_utf16().collect())
    }

    fn from_boxed(value: &SqlValue) -> Result<Self> {
        let text = text_of_boxed(value)?.unwrap_or_default();
        Ok(text.encode_utf16().collect())
    }
}

impl SqlEncode for Vec<u16> {
    fn encode(&self) -> Result<SqlValue> {
        String::from_utf16(self)
            .map(SqlValue::Text)
            .map_err(|e| StorageError::Decode(format!("invalid utf-16 text: {e}")))
    }
}

impl SqlDecode for Vec<u8> {
    fn from_column_text(text: Option<&str>) -> Result<Self> {
        Ok(text.unwrap_or("").as_bytes().to_vec())
    }

    fn from_row(row: &Row<'_>, index: usize) -> Result<Self> {
        Ok(blob_of_ref(row.get_ref(index)?))
    }

    fn from_boxed(value: &SqlValue) -> Result<Self> {
        Ok(blob_of_boxed(value))
    }
}

impl SqlEncode for Vec<u8> {
    fn encode(&self) -> Result<SqlValue> {
        Ok(SqlValue::Blob(self.clone()))
    }
}

/// The null type: decodes to no value regardless of input.
impl SqlDecode for () {
    fn from_column_text(_text: Option<&str>) -> Result<Self> {
        Ok(())
    }

    fn from_row(_row: &Row<'_>, _index: usize) -> Result<Self> {
        Ok(())
    }

    fn from_boxed(_value: &SqlValue) -> Result<Self> {
        Ok(())
    }
}

impl SqlEncode for () {
    fn encode(&self) -> Result<SqlValue> {
        Ok(SqlValue::Null)
    }
}

impl<T: SqlDecode> SqlDecode for Option<T> {
    fn from_column_text(text: Option<&str>) -> Result<Self> {
        match text {
            Some(t) => Ok(Some(T::from_column_text(Some(t))?)),
            None => Ok(None),
        }
    }

    fn from_row(row: &Row<'_>, index: usize) -> Result<Self> {
        if matches!(row.get_ref(index)?, ValueRef::Null) {
            Ok(None)
        } else {
            Ok(Some(T::from_row(row, index)?))
        }
    }

    fn from_boxed(value: &SqlValue) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            Ok(Some(T::from_boxed(value)?))
        }
    }
}

impl<T: SqlEncode> SqlEncode for Option<T> {
    fn encode(&self) -> Result<SqlValue> {
        match self {
            Some(v) => v.encode(),
            None => Ok(SqlValue::Null),
        }
    }
}

// Smart pointers materialize the wrapped type via their own allocation.
// Absence is expressed by wrapping in Option, which keeps the NULL policy
// of the inner type out of the pointer itself.
macro_rules! smart_pointer_codec {
    ($($p:ident),+ $(,)?) => {$(
        impl<T: SqlDecode> SqlDecode for $p<T> {
            fn from_column_text(text: Option<&str>) -> Result<Self> {
                Ok($p::new(T::from_column_text(text)?))
            }

            fn from_row(row: &Row<'_>, index: usize) -> Result<Self> {
                Ok($p::new(T::from_row(row, index)?))
            }

            fn from_boxed(value: &SqlValue) -> Result<Self> {
                Ok($p::new(T::from_boxed(value)?))
            }
        }

        impl<T: SqlEncode> SqlEncode for $p<T> {
            fn encode(&self) -> Result<SqlValue> {
                (**self).encode()
            }
        }
    )+}
}

smart_pointer_codec!(Box, Rc, Arc);

impl<P: PointerKind> SqlDecode for PointerArg<P> {
    fn from_column_text(_text: Option<&str>) -> Result<Self> {
        Err(StorageError::Decode(format!(
            "pointer kind `{}` cannot be extracted from column text",
            P::TAG
        )))
    }

    fn from_row(_row: &Row<'_>, _index: usize) -> Result<Self> {
        Err(StorageError::Decode(format!(
            "pointer kind `{}` cannot be extracted from a result column",
            P::TAG
        )))
    }

    fn from_boxed(value: &SqlValue) -> Result<Self> {
        match value {
            SqlValue::Pointer { tag, handle } => {
                if *tag != P::TAG {
                    return Err(StorageError::Decode(format!(
                        "pointer tag mismatch: expected `{}`, got `{tag}`",
                        P::TAG
                    )));
                }
                Arc::clone(handle)
                    .downcast::<P>()
                    .map(PointerArg::from_handle)
                    .map_err(|_| {
                        StorageError::Decode(format!(
                            "pointer tagged `{tag}` holds a different native type"
                        ))
                    })
            }
            other => Err(StorageError::Decode(format!(
                "expected a pointer value, got {}",
                other.kind_name()
            ))),
        }
    }
}

impl<P: PointerKind> SqlEncode for crate::value::PointerBind<P> {
    fn encode(&self) -> Result<SqlValue> {
        Ok(self.to_value())
    }
}

macro_rules! single_column_row {
    ($($t:ty),+ $(,)?) => {$(
        impl FromRow for $t {
            fn from_row(row: &Row<'_>) -> Result<Self> {
                <$t as SqlDecode>::from_row(row, 0)
            }

            fn from_argv(argv: &[Option<&str>]) -> Result<Self> {
                <$t as SqlDecode>::from_column_text(argv.first().copied().flatten())
            }
        }
    )+}
}

single_column_row!(
    i8,
    i16,
    i32,
    i64,
    u8,
    u16,
    u32,
    u64,
    isize,
    usize,
    f32,
    f64,
    bool,
    String,
    Vec<u8>,
    Vec<u16>,
    (),
);

impl<T: SqlDecode> FromRow for Option<T> {
    fn from_row(row: &Row<'_>) -> Result<Self> {
        <Option<T> as SqlDecode>::from_row(row, 0)
    }

    fn from_argv(argv: &[Option<&str>]) -> Result<Self> {
        <Option<T> as SqlDecode>::from_column_text(argv.first().copied().flatten())
    }
}

// Tuple projections decode positionally: element i from column i.
macro_rules! tuple_row {
    ($(($idx:tt, $t:ident)),+) => {
        impl<$($t: SqlDecode),+> FromRow for ($($t,)+) {
            fn from_row(row: &Row<'_>) -> Result<Self> {
                Ok(($($t::from_row(row, $idx)?,)+))
            }

            fn from_argv(argv: &[Option<&str>]) -> Result<Self> {
                Ok(($($t::from_column_text(argv.get($idx).copied().flatten())?,)+))
            }
        }
    };
}

tuple_row!((0, A));
tuple_row!((0, A), (1, B));
tuple_row!((0, A), (1, B), (2, C));
tuple_row!((0, A), (1, B), (2, C), (3, D));
tuple_row!((0, A), (1, B), (2, C), (3, D), (4, E));
tuple_row!((0, A), (1, B), (2, C), (3, D), (4, E), (5, F));
tuple_row!((0, A), (1, B), (2, C), (3, D), (4, E), (5, F), (6, G));
tuple_row!((0, A), (1, B), (2, C), (3, D), (4, E), (5, F), (6, G), (7, H));
