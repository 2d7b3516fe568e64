//! Liaison des configurations de dépôt à leurs backends

use crate::{FileRepository, NullRepository, Repository, Result, StorageError};
use pmolibrary::{Community, Library, RepositoryId, TrackRepository};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

pub const FILE_KIND: &str = "file";
pub const NULL_KIND: &str = "null";

/// Registre des dépôts instanciés
///
/// Chaque [`TrackRepository`] de la bibliothèque est lié une seule fois à son
/// backend, puis réutilisé.
pub struct RepositoryManager {
    library: Arc<dyn Library>,
    default_dir: PathBuf,
    bound: RwLock<HashMap<RepositoryId, Arc<dyn Repository>>>,
}

impl RepositoryManager {
    /// * `default_dir` - parent des dépôts `file` sans emplacement explicite
    pub fn new(library: Arc<dyn Library>, default_dir: impl Into<PathBuf>) -> Self {
        Self {
            library,
            default_dir: default_dir.into(),
            bound: RwLock::new(HashMap::new()),
        }
    }

    pub fn library(&self) -> &Arc<dyn Library> {
        &self.library
    }

    /// Instancie le backend d'une configuration, sans l'enregistrer
    pub fn bind(&self, config: &TrackRepository) -> Result<Arc<dyn Repository>> {
        match config.kind.as_str() {
            FILE_KIND => {
                let directory = config
                    .location
                    .as_ref()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| self.default_dir.join(&config.name));
                Ok(Arc::new(FileRepository::new(config.clone(), directory)?))
            }
            NULL_KIND => Ok(Arc::new(NullRepository::new(config.clone()))),
            other => Err(StorageError::Unsupported(other.to_string())),
        }
    }

    /// Dépôt lié à l'identifiant, chargé depuis la bibliothèque au premier accès
    pub fn repository(&self, id: RepositoryId) -> Result<Arc<dyn Repository>> {
        if let Some(repo) = self
            .bound
            .read()
            .map_err(|_| StorageError::Poisoned)?
            .get(&id)
        {
            return Ok(repo.clone());
        }

        let config = self
            .library
            .repository(id)?
            .ok_or_else(|| StorageError::NotFound(format!("repository {}", id)))?;
        let repo = self.bind(&config)?;

        let mut bound = self.bound.write().map_err(|_| StorageError::Poisoned)?;
        // Un autre appelant a pu lier le dépôt entre-temps
        let repo = bound.entry(id).or_insert(repo).clone();
        tracing::debug!(repository_id = id, name = %repo.name(), kind = %config.kind, "Bound repository");
        Ok(repo)
    }

    /// Dépôt par défaut d'une communauté
    pub fn for_community(&self, community: &Community) -> Result<Arc<dyn Repository>> {
        self.repository(community.repository_id)
    }

    /// Oublie un dépôt lié (la configuration a changé)
    pub fn invalidate(&self, id: RepositoryId) -> Result<()> {
        self.bound
            .write()
            .map_err(|_| StorageError::Poisoned)?
            .remove(&id);
        Ok(())
    }
}

impl std::fmt::Debug for RepositoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryManager")
            .field("default_dir", &self.default_dir)
            .finish_non_exhaustive()
    }
}
