use std::fmt;
use std::str::FromStr;

use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::codec::{SqlDecode, SqlEncode};
use crate::error::{Result, StorageError};
use crate::value::SqlValue;

/// Journal mode of a connection.
///
/// Unlike ordinary value decoding, parsing a journal mode is strict: an
/// unrecognized token or an absent value is a configuration error, never a
/// default. A connection reporting something unreadable here is misconfigured
/// and must not be papered over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    Delete,
    Truncate,
    Persist,
    Memory,
    Wal,
    Off,
}

impl JournalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            JournalMode::Delete => "delete",
            JournalMode::Truncate => "truncate",
            JournalMode::Persist => "persist",
            JournalMode::Memory => "memory",
            JournalMode::Wal => "wal",
            JournalMode::Off => "off",
        }
    }
}

impl fmt::Display for JournalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JournalMode {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "delete" => Ok(JournalMode::Delete),
            "truncate" => Ok(JournalMode::Truncate),
            "persist" => Ok(JournalMode::Persist),
            "memory" => Ok(JournalMode::Memory),
            "wal" => Ok(JournalMode::Wal),
            "off" => Ok(JournalMode::Off),
            other => Err(StorageError::Configuration(format!(
                "unrecognized journal mode `{other}`"
            ))),
        }
    }
}

impl SqlDecode for JournalMode {
    fn from_column_text(text: Option<&str>) -> Result<Self> {
        match text {
            Some(t) => t.parse(),
            None => Err(StorageError::Configuration(
                "journal mode string is absent".to_string(),
            )),
        }
    }

    fn from_row(row: &Row<'_>, index: usize) -> Result<Self> {
        let text: Option<String> = Option::<String>::from_row(row, index)?;
        Self::from_column_text(text.as_deref())
    }

    fn from_boxed(value: &SqlValue) -> Result<Self> {
        Self::from_column_text(value.to_column_text().as_deref())
    }
}

impl SqlEncode for JournalMode {
    fn encode(&self) -> Result<SqlValue> {
        Ok(SqlValue::Text(self.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_tokens_parse_case_insensitively() {
        assert_eq!(
            JournalMode::from_column_text(Some("wal")).unwrap(),
            JournalMode::Wal
        );
        assert_eq!(
            JournalMode::from_column_text(Some("DELETE")).unwrap(),
            JournalMode::Delete
        );
    }

    #[test]
    fn unknown_or_absent_token_is_a_configuration_error() {
        assert!(matches!(
            JournalMode::from_column_text(Some("bogus")),
            Err(StorageError::Configuration(_))
        ));
        assert!(matches!(
            JournalMode::from_column_text(None),
            Err(StorageError::Configuration(_))
        ));
        assert!(matches!(
            JournalMode::from_boxed(&SqlValue::Null),
            Err(StorageError::Configuration(_))
        ));
    }
}
