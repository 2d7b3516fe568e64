//! Types d'erreurs pour pmoplayback

use pmocodec::CodecError;
use pmolibrary::LibraryError;
use pmosource::SourceError;

pub use pmosource::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("No channel for conversation {0}")]
    NoChannel(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("Download not allowed for {0}")]
    DownloadNotAllowed(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Queue of channel {channel} is full ({capacity} entries)")]
    QueueFull { channel: String, capacity: usize },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("Player creation failed: {0}")]
    Player(String),

    #[error(transparent)]
    Library(#[from] LibraryError),

    #[error("Runtime error: {0}")]
    Runtime(String),

    /// L'échec principal, accompagné de l'échec de fermeture du flux
    #[error("{primary} (closing the stream also failed: {close_error})")]
    Closed {
        #[source]
        primary: Box<PlaybackError>,
        close_error: CodecError,
    },
}

impl PlaybackError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlaybackError::NoChannel(_) | PlaybackError::NotFound(_) => ErrorKind::NotFound,
            PlaybackError::Source(e) => e.kind(),
            PlaybackError::DownloadNotAllowed(_) | PlaybackError::Forbidden(_) => {
                ErrorKind::Forbidden
            }
            PlaybackError::Unsupported(_) => ErrorKind::Unsupported,
            PlaybackError::Library(LibraryError::NotFound(_)) => ErrorKind::NotFound,
            PlaybackError::Closed { primary, .. } => primary.kind(),
            PlaybackError::QueueFull { .. }
            | PlaybackError::Codec(_)
            | PlaybackError::Player(_)
            | PlaybackError::Library(_)
            | PlaybackError::Runtime(_) => ErrorKind::Transient,
        }
    }
}

/// Type Result spécialisé pour pmoplayback
pub type Result<T> = std::result::Result<T, PlaybackError>;
