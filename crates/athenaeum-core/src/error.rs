use std::path::PathBuf;

use thiserror::Error;

/// All errors that can occur in athenaeum-core.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("storage failure: {0}")]
    StorageFailure(String),

    #[error("integrity conflict: {0}")]
    IntegrityConflict(String),

    #[error("ingest skipped: {0}")]
    IngestSkip(String),

    #[error("artifact missing: {path}")]
    ArtifactMissing { path: PathBuf },

    #[error("external dependency unavailable: {0}")]
    ExternalUnavailable(String),

    #[error("database lock contention exhausted after {attempts} attempts")]
    LockContention { attempts: u32 },

    #[error("invalid client request: {0}")]
    ClientRequestInvalid(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Exit codes matching the external interface contract.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    Fatal = 1,
}

impl Error {
    /// Whether this error represents transient lock contention on the
    /// shared database connection, as distinct from a structural failure.
    pub fn is_lock_contention(&self) -> bool {
        match self {
            Error::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            Error::LockContention { .. } => true,
            _ => false,
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        match self {
            Error::ConfigInvalid(_) | Error::StorageFailure(_) => ExitCode::Fatal,
            _ => ExitCode::Success,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
