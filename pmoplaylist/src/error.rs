//! Types d'erreurs pour pmoplaylist

use pmolibrary::LibraryError;
use pmoplayback::{ErrorKind, PlaybackError};

#[derive(Debug, thiserror::Error)]
pub enum PlaylistError {
    #[error("Playlist on channel {0} is not running")]
    NotRunning(String),

    #[error("Playlist on channel {0} has no more tracks")]
    Exhausted(String),

    #[error("A playlist is already running on channel {0}")]
    AlreadyRunning(String),

    #[error("No playlist on channel {0}")]
    NoPlaylist(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    #[error(transparent)]
    Library(#[from] LibraryError),

    /// Échec d'un passage à la piste suivante ; la playlist a été arrêtée
    #[error("Playlist on channel {channel} stopped: {source}")]
    Advance {
        channel: String,
        #[source]
        source: Box<PlaylistError>,
    },
}

impl PlaylistError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlaylistError::Exhausted(_) | PlaylistError::NoPlaylist(_) => ErrorKind::NotFound,
            PlaylistError::AlreadyRunning(_) | PlaylistError::Forbidden(_) => ErrorKind::Forbidden,
            PlaylistError::NotRunning(_) => ErrorKind::Unsupported,
            PlaylistError::Playback(e) => e.kind(),
            PlaylistError::Library(LibraryError::NotFound(_)) => ErrorKind::NotFound,
            PlaylistError::Library(_) => ErrorKind::Transient,
            PlaylistError::Advance { source, .. } => source.kind(),
        }
    }
}

/// Type Result spécialisé pour pmoplaylist
pub type Result<T> = std::result::Result<T, PlaylistError>;
