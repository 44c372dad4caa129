use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("unsupported file type: {0}")]
    UnsupportedFormat(String),

    #[error("storage failure at {path}: {message}")]
    Storage { path: PathBuf, message: String },

    #[error("embedding failure: {0}")]
    Embedding(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("docstore error: {0}")]
    Redb(#[from] redb::Error),

    #[error("docstore storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("docstore transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("docstore table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("docstore commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("docstore database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),
}

impl Error {
    /// Build an [`Error::Storage`] for a failed operation on a persisted
    /// artifact, keeping the path for diagnosis.
    pub fn storage(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
        }
    }
}
