//! Types d'erreurs pour pmolibrary

/// Erreurs d'accès à la bibliothèque
#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    #[error("Database lock poisoned")]
    Poisoned,
}

/// Type Result spécialisé pour pmolibrary
pub type Result<T> = std::result::Result<T, LibraryError>;
