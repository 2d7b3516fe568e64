//! Dépôt qui ne stocke rien
//!
//! Utile pour une communauté qui ne veut aucun cache : les ressources
//! n'existent jamais et refusent l'écriture.

use crate::{Repository, Resource, Result, StorageError};
use pmolibrary::{DownloadFormat, TrackRepository};
use std::io::{Read, Write};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug)]
pub struct NullRepository {
    config: TrackRepository,
}

impl NullRepository {
    pub fn new(config: TrackRepository) -> Self {
        Self { config }
    }
}

impl Repository for NullRepository {
    fn config(&self) -> &TrackRepository {
        &self.config
    }

    fn resource(&self, uuid: Uuid) -> Arc<dyn Resource> {
        Arc::new(NullResource { uuid })
    }
}

#[derive(Debug)]
struct NullResource {
    uuid: Uuid,
}

impl Resource for NullResource {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn exists(&self) -> bool {
        false
    }

    fn can_write(&self) -> bool {
        false
    }

    fn format(&self) -> Option<&DownloadFormat> {
        None
    }

    fn open_read(&self) -> Result<Box<dyn Read + Send>> {
        Err(StorageError::Missing(self.uuid))
    }

    fn open_write(&self) -> Result<Box<dyn Write + Send>> {
        Err(StorageError::ReadOnly(self.uuid))
    }

    fn delete(&self) -> Result<()> {
        Ok(())
    }
}
