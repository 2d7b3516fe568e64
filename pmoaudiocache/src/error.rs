//! Types d'erreurs pour pmoaudiocache

use pmocache::StorageError;
use pmocodec::CodecError;
use pmolibrary::LibraryError;
use pmosource::SourceError;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Resource {0} is not writable")]
    ReadOnly(Uuid),

    #[error("Caching is disabled")]
    Disabled,

    #[error("Upstream ended without end of stream after {frames} frames")]
    UnexpectedEnd { frames: u64 },

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Library(#[from] LibraryError),

    #[error("Worker failure: {0}")]
    Worker(String),

    /// Échec du job, suivi d'un échec de suppression de la ressource partielle
    #[error("{error} (partial resource left behind: {cleanup})")]
    CleanupFailed {
        #[source]
        error: Box<CacheError>,
        cleanup: StorageError,
    },
}

impl CacheError {
    /// Erreur qui a fait échouer le job, sans l'éventuel échec de nettoyage
    pub fn primary(&self) -> &CacheError {
        match self {
            CacheError::CleanupFailed { error, .. } => error.primary(),
            other => other,
        }
    }
}

/// Type Result spécialisé pour pmoaudiocache
pub type Result<T> = std::result::Result<T, CacheError>;
