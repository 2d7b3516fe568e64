//! Types d'erreurs pour pmocache

use pmolibrary::LibraryError;

/// Erreurs des dépôts et ressources
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Library(#[from] LibraryError),

    #[error("Unsupported repository kind: {0}")]
    Unsupported(String),

    #[error("Repository not found: {0}")]
    NotFound(String),

    #[error("Resource {0} is read-only")]
    ReadOnly(uuid::Uuid),

    #[error("Resource {0} does not exist")]
    Missing(uuid::Uuid),

    #[error("Repository registry lock poisoned")]
    Poisoned,
}

/// Type Result spécialisé pour pmocache
pub type Result<T> = std::result::Result<T, StorageError>;
