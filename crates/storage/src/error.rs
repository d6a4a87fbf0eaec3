use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Ordering invariant broken or entities that should agree do not.
    #[error("consistency error: {0}")]
    Consistency(String),

    #[error("core error: {0}")]
    Core(#[from] formstack_core::CoreError),
}
