use thiserror::Error;

/// Errors from talking to a local IPFS daemon. Kept separate from
/// `athenaeum_core::Error` so the HTTP-specific failure modes are visible to
/// callers that care (the availability probe in particular); ingest-facing
/// code folds this into `Error::ExternalUnavailable`.
#[derive(Debug, Error)]
pub enum IpfsError {
    #[error("IPFS daemon unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),

    #[error("IPFS daemon returned an error response: {0}")]
    DaemonError(String),

    #[error("unexpected response shape from IPFS daemon: {0}")]
    BadResponse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IpfsError>;
