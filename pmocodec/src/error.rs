//! Types d'erreurs pour pmocodec

/// Erreurs de la frontière codec
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decoding failed: {0}")]
    Decode(#[from] symphonia::core::errors::Error),

    #[error("Encoding failed: {0}")]
    Encode(String),

    #[error("Resampling failed: {0}")]
    Resampler(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Stream already closed")]
    Closed,
}

impl From<hound::Error> for CodecError {
    fn from(e: hound::Error) -> Self {
        match e {
            hound::Error::IoError(io) => CodecError::Io(io),
            other => CodecError::Encode(other.to_string()),
        }
    }
}

/// Type Result spécialisé pour pmocodec
pub type Result<T> = std::result::Result<T, CodecError>;
