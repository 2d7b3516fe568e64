//! # pmocache - Dépôts et ressources audio de PMOMusic
//!
//! Un **dépôt** ([`Repository`]) est la réalisation concrète d'une
//! configuration [`pmolibrary::TrackRepository`] : il produit des
//! **ressources** ([`Resource`]) qui exposent les octets *encodés* d'une
//! piste.
//!
//! ## Backends
//!
//! - `file` : [`FileRepository`], un fichier `{uuid}.{conteneur}` par piste
//! - `null` : [`NullRepository`], rien n'existe et rien ne s'écrit
//!
//! Les ressources sont adressées par [`resource_uuid`], un UUID v5 dérivé de
//! l'URL de la piste.
//!
//! ```rust,no_run
//! use pmocache::{RepositoryManager, Repository};
//! use pmolibrary::{Library, SqliteLibrary};
//! use std::sync::Arc;
//!
//! let library = Arc::new(SqliteLibrary::open_in_memory()?);
//! let config = library.create_repository("local", "file", Some("/tmp/tracks"), None)?;
//! let manager = RepositoryManager::new(library.clone(), "/tmp/repositories");
//! let repo = manager.repository(config.id)?;
//! let resource = repo.resource_for_url("https://example.com/a.ogg");
//! assert!(!resource.exists());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;
mod file;
mod manager;
mod null;
mod resource;

#[cfg(feature = "pmoconfig")]
mod config_ext;

pub use error::{Result, StorageError};
pub use file::{FileRepository, FileResource};
pub use manager::{RepositoryManager, FILE_KIND, NULL_KIND};
pub use null::NullRepository;
pub use resource::{resource_uuid, Repository, Resource};

#[cfg(feature = "pmoconfig")]
pub use config_ext::RepositoryConfigExt;
