use thiserror::Error;

/// Failures the engine can report.
///
/// `Io`, `CorruptContainer`, `Truncated` and `UnexpectedKeyFormat` are
/// fatal: the audio payload cannot be decoded without a valid container
/// and key. `Metadata` and `Tag` only ever reach the caller as warnings
/// on a successful [`Outcome`](crate::Outcome).
#[derive(Debug, Error)]
pub enum NcmError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not an NCM container (bad magic)")]
    CorruptContainer,
    #[error("container truncated while reading {0}")]
    Truncated(&'static str),
    #[error("decrypted key data does not carry the expected signature")]
    UnexpectedKeyFormat,
    #[error("metadata unavailable: {0}")]
    Metadata(String),
    #[error("tag write failed: {0}")]
    Tag(String),
}

pub type Result<T> = std::result::Result<T, NcmError>;
