//! Runtime error types.
//!
//! Storage failures always propagate to the caller unchanged; the
//! runtime performs no retries.

use std::io;

use progression_kernel::ConfigurationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("schema version {requested} is not supported (latest is {supported})")]
    UnsupportedSchemaVersion { requested: u32, supported: u32 },

    #[error("store is at schema version {persisted}, cannot open at older version {requested}")]
    SchemaDowngrade { persisted: u32, requested: u32 },

    #[error("corrupt archive: {0}")]
    CorruptArchive(String),

    #[error("archive import requires an empty event log ({existing} events present)")]
    ArchiveConflict { existing: usize },
}

impl From<prost::DecodeError> for StorageError {
    fn from(err: prost::DecodeError) -> Self {
        StorageError::CorruptArchive(format!("protobuf decode error: {}", err))
    }
}

/// Error surfaced by the orchestration API.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("invalid config file: {0}")]
    ConfigFile(String),
}
