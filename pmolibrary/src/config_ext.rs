//! Extension pmoconfig pour ouvrir la bibliothèque
//!
//! ```rust,ignore
//! use pmoconfig::get_config;
//! use pmolibrary::LibraryConfigExt;
//!
//! let library = get_config().open_library()?;
//! ```

use crate::SqliteLibrary;
use anyhow::Result;
use pmoconfig::Config;
use std::path::Path;

pub trait LibraryConfigExt {
    /// Ouvre la base désignée par `host.library.path`
    ///
    /// Un chemin relatif est résolu par rapport au répertoire de configuration.
    fn open_library(&self) -> Result<SqliteLibrary>;
}

impl LibraryConfigExt for Config {
    fn open_library(&self) -> Result<SqliteLibrary> {
        let path = self.get_library_path()?;
        Ok(SqliteLibrary::open(Path::new(&path))?)
    }
}
