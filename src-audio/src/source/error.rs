use symphonia::core::errors::Error as SymphoniaError;

/// Errors raised while opening or reading a track
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrackError {
    /// File not found or inaccessible
    #[error("Audio file not found: {0}")]
    FileNotFound(String),
    /// Unsupported audio format
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),
    /// File is corrupted or invalid
    #[error("Invalid audio file: {0}")]
    InvalidFile(String),
    /// Decoding failed while reading samples
    #[error("Audio decoding failed: {0}")]
    DecodingFailed(String),
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for TrackError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => TrackError::FileNotFound(err.to_string()),
            _ => TrackError::IoError(err.to_string()),
        }
    }
}

impl From<SymphoniaError> for TrackError {
    fn from(err: SymphoniaError) -> Self {
        match err {
            SymphoniaError::IoError(io_err) => TrackError::from(io_err),
            SymphoniaError::DecodeError(msg) => TrackError::DecodingFailed(msg.to_string()),
            SymphoniaError::Unsupported(msg) => TrackError::UnsupportedFormat(msg.to_string()),
            _ => TrackError::DecodingFailed(format!("Symphonia error: {:?}", err)),
        }
    }
}

impl From<hound::Error> for TrackError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(io_err) => TrackError::from(io_err),
            hound::Error::Unsupported => {
                TrackError::UnsupportedFormat("WAV encoding not supported".to_string())
            }
            other => TrackError::InvalidFile(other.to_string()),
        }
    }
}

/// Result type for track operations
pub type TrackResult<T> = Result<T, TrackError>;
