//! Types d'erreurs pour pmosource

use pmocache::StorageError;
use pmolibrary::LibraryError;

/// Catégorie d'une erreur, telle que présentée à l'appelant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Piste, communauté ou canal introuvable
    NotFound,
    /// Violation de propriété ou de permission
    Forbidden,
    /// Combinaison de paramètres invalide
    Unsupported,
    /// Échec réseau, codec ou stockage ; une nouvelle tentative peut réussir
    Transient,
    /// Un enregistrement référence une ressource absente
    Integrity,
}

/// Erreurs de résolution de pistes
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Track not found: {0}")]
    NotFound(String),

    #[error("Track has been deleted: {0}")]
    Deleted(String),

    #[error("Unsupported URL for source {source_id}: {url}")]
    UnsupportedUrl { source_id: String, url: String },

    #[error(transparent)]
    Library(#[from] LibraryError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Helper process failed: {0}")]
    Process(String),

    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),
}

impl SourceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SourceError::NotFound(_) | SourceError::Deleted(_) => ErrorKind::NotFound,
            SourceError::UnsupportedUrl { .. } => ErrorKind::Unsupported,
            SourceError::Storage(StorageError::Unsupported(_)) => ErrorKind::Unsupported,
            SourceError::Storage(StorageError::NotFound(_)) => ErrorKind::NotFound,
            SourceError::Storage(StorageError::Missing(_)) => ErrorKind::Integrity,
            SourceError::Library(LibraryError::NotFound(_)) => ErrorKind::NotFound,
            SourceError::Library(LibraryError::InvalidData(_)) => ErrorKind::Integrity,
            _ => ErrorKind::Transient,
        }
    }
}

/// Type Result spécialisé pour pmosource
pub type Result<T> = std::result::Result<T, SourceError>;
