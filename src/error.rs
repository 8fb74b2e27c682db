use thiserror::Error;

/// Crate-wide error type.
///
/// Variants follow the failure taxonomy of the engine: parse errors from the
/// Cypher front-end, recognized-but-unimplemented constructs, schema and
/// referential violations on the write path, store errors bubbled up from
/// SQLite, and internal planner invariants that must never fire.
#[derive(Debug, Error)]
pub enum Error {
    #[error("parse error:\n{0}")]
    Parse(String),

    #[error("not supported: {0}")]
    Unsupported(String),

    #[error("schema violation: {0}")]
    Schema(String),

    #[error("referential violation: {0}")]
    Referential(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("internal invariant violated: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn unsupported(what: impl Into<String>) -> Self {
        Error::Unsupported(what.into())
    }

    pub fn schema(what: impl Into<String>) -> Self {
        Error::Schema(what.into())
    }

    pub fn internal(what: impl Into<String>) -> Self {
        Error::Internal(what.into())
    }
}
