use std::path::PathBuf;

/// All errors that can occur in ytmp3 outside of the conversion delegate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid quality: \"{0}\" — must be one of 128, 192, 320")]
    InvalidQuality(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid filename: \"{0}\"")]
    InvalidFilename(String),

    #[error("artifact not found: {path}")]
    ArtifactNotFound { path: PathBuf },

    #[error("yt-dlp not found — install with: pip install yt-dlp")]
    YtDlpNotFound,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by a conversion delegate.
///
/// `Download` is a failure classified by the external tool itself (source
/// unavailable, blocked, unsupported URL). `Unexpected` covers everything else.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DelegateError {
    #[error("Download failed: {0}")]
    Download(String),

    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl From<Error> for DelegateError {
    fn from(e: Error) -> Self {
        DelegateError::Unexpected(e.to_string())
    }
}
