//! Pool de workers exécutant les transcodages hors du chemin des requêtes

use crate::{CacheError, Result};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Politique d'exécution des jobs de cache
#[derive(Debug, Clone)]
pub enum WorkerPool {
    /// Au plus N transcodages simultanés
    Fixed(Arc<Semaphore>),
    /// Aucune limite
    Cached,
    /// Le cache est désactivé
    Disabled,
}

impl WorkerPool {
    /// Pool borné ; une taille nulle désactive le cache
    pub fn fixed(size: usize) -> Self {
        if size == 0 {
            WorkerPool::Disabled
        } else {
            WorkerPool::Fixed(Arc::new(Semaphore::new(size)))
        }
    }

    /// Construit un pool à partir de son nom de configuration
    pub fn from_config(kind: &str, size: usize) -> Result<Self> {
        match kind.parse::<PoolKind>()? {
            PoolKind::Fixed => Ok(Self::fixed(size)),
            PoolKind::Cached => Ok(WorkerPool::Cached),
            PoolKind::Disabled => Ok(WorkerPool::Disabled),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, WorkerPool::Disabled)
    }

    /// Exécute un job bloquant dans le pool
    pub async fn run<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let _permit = match self {
            WorkerPool::Disabled => return Err(CacheError::Disabled),
            WorkerPool::Cached => None,
            WorkerPool::Fixed(semaphore) => Some(
                semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|e| CacheError::Worker(e.to_string()))?,
            ),
        };

        tokio::task::spawn_blocking(job)
            .await
            .map_err(|e| CacheError::Worker(e.to_string()))?
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolKind {
    Fixed,
    Cached,
    Disabled,
}

impl FromStr for PoolKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fixed" => Ok(PoolKind::Fixed),
            "cached" => Ok(PoolKind::Cached),
            "disabled" | "none" => Ok(PoolKind::Disabled),
            other => Err(CacheError::Worker(format!("unknown pool kind '{}'", other))),
        }
    }
}
