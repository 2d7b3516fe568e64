//! Dépôt de fichiers sur disque
//!
//! Chaque ressource est stockée sous `{répertoire}/{uuid}.{conteneur}`.

use crate::{Repository, Resource, Result, StorageError};
use pmolibrary::{DownloadFormat, TrackRepository};
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

const DEFAULT_EXTENSION: &str = "bin";

#[derive(Debug)]
pub struct FileRepository {
    config: TrackRepository,
    directory: PathBuf,
    read_only: bool,
}

impl FileRepository {
    /// Crée le dépôt et son répertoire s'il n'existe pas
    pub fn new(config: TrackRepository, directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        if !directory.exists() {
            fs::create_dir_all(&directory)?;
            tracing::info!(repository = %config.name, directory = %directory.display(), "Created repository directory");
        }
        Ok(Self {
            config,
            directory,
            read_only: false,
        })
    }

    /// Variante en lecture seule (les ressources ne sont jamais écrites)
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn extension(&self) -> &str {
        self.config
            .format
            .as_ref()
            .map(|f| f.container.as_str())
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_EXTENSION)
    }
}

impl Repository for FileRepository {
    fn config(&self) -> &TrackRepository {
        &self.config
    }

    fn resource(&self, uuid: Uuid) -> Arc<dyn Resource> {
        Arc::new(FileResource {
            uuid,
            path: self
                .directory
                .join(format!("{}.{}", uuid, self.extension())),
            format: self.config.format.clone(),
            writable: !self.read_only,
        })
    }
}

#[derive(Debug)]
pub struct FileResource {
    uuid: Uuid,
    path: PathBuf,
    format: Option<DownloadFormat>,
    writable: bool,
}

impl FileResource {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Resource for FileResource {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn can_write(&self) -> bool {
        self.writable
    }

    fn format(&self) -> Option<&DownloadFormat> {
        self.format.as_ref()
    }

    fn open_read(&self) -> Result<Box<dyn Read + Send>> {
        match File::open(&self.path) {
            Ok(f) => Ok(Box::new(f)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StorageError::Missing(self.uuid)),
            Err(e) => Err(e.into()),
        }
    }

    fn open_write(&self) -> Result<Box<dyn Write + Send>> {
        if !self.writable {
            return Err(StorageError::ReadOnly(self.uuid));
        }
        let file = File::create(&self.path)?;
        Ok(Box::new(BufWriter::new(file)))
    }

    fn delete(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(uuid = %self.uuid, "Deleted resource");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
