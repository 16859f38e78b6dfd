use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use rusqlite::types::{ToSqlOutput, Value as EngineValue, ValueRef};
use rusqlite::ToSql;

/// Core value type exchanged with the engine.
///
/// `Pointer` carries an opaque native object through the value layer without
/// serialization. Pointer values never originate from table columns; they
/// only appear as arguments to application-defined functions.
#[derive(Debug, Clone)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Pointer {
        tag: &'static str,
        handle: Arc<dyn Any + Send + Sync>,
    },
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Render the value the way the engine renders result columns as text.
    /// `None` stands for SQL NULL. Pointer values surface as NULL through
    /// ordinary accessors.
    pub fn to_column_text(&self) -> Option<String> {
        match self {
            SqlValue::Null | SqlValue::Pointer { .. } => None,
            SqlValue::Integer(i) => Some(i.to_string()),
            SqlValue::Real(r) => Some(r.to_string()),
            SqlValue::Text(t) => Some(t.clone()),
            SqlValue::Blob(b) => Some(String::from_utf8_lossy(b).into_owned()),
        }
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Integer(_) => "integer",
            SqlValue::Real(_) => "real",
            SqlValue::Text(_) => "text",
            SqlValue::Blob(_) => "blob",
            SqlValue::Pointer { .. } => "pointer",
        }
    }
}

impl PartialEq for SqlValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SqlValue::Null, SqlValue::Null) => true,
            (SqlValue::Integer(a), SqlValue::Integer(b)) => a == b,
            (SqlValue::Real(a), SqlValue::Real(b)) => a == b,
            (SqlValue::Text(a), SqlValue::Text(b)) => a == b,
            (SqlValue::Blob(a), SqlValue::Blob(b)) => a == b,
            (
                SqlValue::Pointer { tag: ta, handle: ha },
                SqlValue::Pointer { tag: tb, handle: hb },
            ) => ta == tb && Arc::ptr_eq(ha, hb),
            _ => false,
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Integer(i) => write!(f, "{i}"),
            SqlValue::Real(r) => write!(f, "{r}"),
            SqlValue::Text(t) => write!(f, "{t}"),
            SqlValue::Blob(b) => write!(f, "<blob {} bytes>", b.len()),
            SqlValue::Pointer { tag, .. } => write!(f, "<pointer:{tag}>"),
        }
    }
}

impl From<ValueRef<'_>> for SqlValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => SqlValue::Null,
            ValueRef::Integer(i) => SqlValue::Integer(i),
            ValueRef::Real(r) => SqlValue::Real(r),
            ValueRef::Text(t) => SqlValue::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => SqlValue::Blob(b.to_vec()),
        }
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            SqlValue::Null => Ok(ToSqlOutput::Owned(EngineValue::Null)),
            SqlValue::Integer(i) => Ok(ToSqlOutput::Owned(EngineValue::Integer(*i))),
            SqlValue::Real(r) => Ok(ToSqlOutput::Owned(EngineValue::Real(*r))),
            SqlValue::Text(t) => Ok(ToSqlOutput::Borrowed(ValueRef::Text(t.as_bytes()))),
            SqlValue::Blob(b) => Ok(ToSqlOutput::Borrowed(ValueRef::Blob(b))),
            SqlValue::Pointer { tag, .. } => Err(rusqlite::Error::ToSqlConversionFailure(
                format!("pointer value `{tag}` cannot be bound to a statement parameter").into(),
            )),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Integer(v as i64)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Integer(v as i64)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Blob(v)
    }
}

impl<T> From<Option<T>> for SqlValue
where
    T: Into<SqlValue>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => SqlValue::Null,
        }
    }
}

/// Names a pointer kind with a compile-time string tag. The tag is checked
/// whenever a pointer argument is unboxed, so a handle registered under one
/// kind can never be read back as another.
pub trait PointerKind: Send + Sync + 'static {
    const TAG: &'static str;
}

/// Owning pointer binding: hands a native object to the engine's value
/// system under its kind tag. Encode-only; pointer values cannot be read
/// back from result columns, so this type deliberately has no decode path.
#[derive(Clone)]
pub struct PointerBind<P: PointerKind> {
    value: Arc<P>,
}

impl<P: PointerKind> PointerBind<P> {
    pub fn new(value: P) -> Self {
        Self {
            value: Arc::new(value),
        }
    }

    pub fn tag(&self) -> &'static str {
        P::TAG
    }

    pub(crate) fn to_value(&self) -> SqlValue {
        SqlValue::Pointer {
            tag: P::TAG,
            handle: Arc::clone(&self.value) as Arc<dyn Any + Send + Sync>,
        }
    }
}

impl<P: PointerKind> fmt::Debug for PointerBind<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PointerBind({})", P::TAG)
    }
}

/// Borrowed pointer argument, decoded from a boxed function value.
///
/// The only legal source is the boxed-value decode path; extraction from
/// column text or a prepared-statement column fails fast.
#[derive(Clone)]
pub struct PointerArg<P: PointerKind> {
    value: Arc<P>,
}

impl<P: PointerKind> PointerArg<P> {
    pub(crate) fn from_handle(value: Arc<P>) -> Self {
        Self { value }
    }

    pub fn tag(&self) -> &'static str {
        P::TAG
    }
}

impl<P: PointerKind> Deref for PointerArg<P> {
    type Target = P;

    fn deref(&self) -> &P {
        &self.value
    }
}

impl<P: PointerKind> fmt::Debug for PointerArg<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PointerArg({})", P::TAG)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Vec2 {
        #[allow(dead_code)]
        x: f64,
        #[allow(dead_code)]
        y: f64,
    }

    impl PointerKind for Vec2 {
        const TAG: &'static str = "vec2";
    }

    #[test]
    fn column_text_rendering_matches_engine_text_form() {
        assert_eq!(SqlValue::Null.to_column_text(), None);
        assert_eq!(SqlValue::Integer(42).to_column_text(), Some("42".into()));
        assert_eq!(SqlValue::Real(1.5).to_column_text(), Some("1.5".into()));
        assert_eq!(
            SqlValue::Text("abc".into()).to_column_text(),
            Some("abc".into())
        );
        assert_eq!(
            SqlValue::Blob(b"ab".to_vec()).to_column_text(),
            Some("ab".into())
        );
    }

    #[test]
    fn pointer_values_surface_as_null_text() {
        let bind = PointerBind::new(Vec2 { x: 1.0, y: 2.0 });
        assert_eq!(bind.to_value().to_column_text(), None);
    }

    #[test]
    fn pointer_values_refuse_to_bind() {
        let bind = PointerBind::new(Vec2 { x: 0.0, y: 0.0 });
        assert!(bind.to_value().to_sql().is_err());
    }
}
