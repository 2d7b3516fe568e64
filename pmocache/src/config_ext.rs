//! Extension pour construire le gestionnaire de dépôts depuis pmoconfig

use crate::RepositoryManager;
use anyhow::Result;
use pmoconfig::Config;
use pmolibrary::Library;
use std::sync::Arc;

/// Trait d'extension pour ajouter la gestion des dépôts à pmoconfig
///
/// ```rust,ignore
/// use pmoconfig::get_config;
/// use pmocache::RepositoryConfigExt;
///
/// let manager = get_config().create_repository_manager(library)?;
/// ```
pub trait RepositoryConfigExt {
    /// Gestionnaire dont les dépôts `file` sans emplacement vivent sous
    /// `host.repositories.directory`
    fn create_repository_manager(&self, library: Arc<dyn Library>) -> Result<RepositoryManager>;
}

impl RepositoryConfigExt for Config {
    fn create_repository_manager(&self, library: Arc<dyn Library>) -> Result<RepositoryManager> {
        let dir = self.get_repositories_dir()?;
        Ok(RepositoryManager::new(library, dir))
    }
}
