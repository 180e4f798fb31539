use thiserror::Error;

use crate::file_system::FsError;

/// Errors surfaced by the engine's internal operations.
///
/// Workflows convert every `EngineError` to a `CanonicalExit` at their single
/// exit point (see `taxonomy::exit_code_from_engine_error`); nothing in this
/// crate panics on a fallible path outside of tests.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("file system error: {0}")]
    FileSystem(#[from] FsError),

    #[error("failed to spawn rsync: {0}")]
    Spawn(String),

    #[error("failed to wait for rsync: {0}")]
    Wait(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("path exists and is not a directory: {0}")]
    NotADirectory(String),

    #[error("source and destination refer to the same file: {0}")]
    SameFile(String),

    #[error("destination directory nests the source directory: {0}")]
    SelfNest(String),

    #[error("destination collision not covered by filter rules: {0}")]
    DestinationExists(String),

    #[error("checksum mismatch after retry for {0}")]
    ChecksumMismatch(String),

    #[error("unavailable filesystem type at {0}")]
    UnavailableFilesystem(String),

    #[error("malformed manifest line: {0}")]
    InvalidManifestLine(String),

    #[error("retry limit exhausted after {0} attempts, last code {1}")]
    RetryExhausted(u32, i32),
}
