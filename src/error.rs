use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors produced by the mapping layer.
///
/// Engine-level failures (prepare, bind, step) are wrapped unchanged in
/// [`StorageError::Engine`]; retry policy for transient engine codes is the
/// caller's responsibility.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Malformed or unexpected dynamic-value shape during value conversion.
    #[error("decode error: {0}")]
    Decode(String),

    /// No table was registered for the given native type.
    #[error("no table registered for type `{0}`")]
    UnmappedType(&'static str),

    /// A query shape the compiler cannot translate.
    #[error("unsupported expression: {0}")]
    Unsupported(String),

    /// Underlying engine error, surfaced unchanged.
    #[error("engine error: {0}")]
    Engine(#[from] rusqlite::Error),

    /// Unrecognized enumerated token during a strict decode.
    #[error("configuration error: {0}")]
    Configuration(String),
}
