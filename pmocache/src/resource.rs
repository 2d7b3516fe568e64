//! Traits `Repository` et `Resource`

use crate::Result;
use pmolibrary::{DownloadFormat, TrackRepository};
use std::fmt::Debug;
use std::io::{Read, Write};
use std::sync::Arc;
use uuid::Uuid;

/// Identifiant déterministe de la ressource associée à une URL
///
/// UUID v5 dans l'espace de noms URL : une même URL donne toujours la même
/// ressource, quel que soit le processus.
pub fn resource_uuid(url: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, url.as_bytes())
}

/// Octets encodés d'une piste dans un dépôt
///
/// Une ressource est un handle éphémère : elle est recréée à chaque accès et
/// ne porte aucun état hormis son identité.
pub trait Resource: Send + Sync + Debug {
    fn uuid(&self) -> Uuid;

    /// Le contenu est physiquement présent
    fn exists(&self) -> bool;

    /// Le dépôt accepte l'écriture de cette ressource
    fn can_write(&self) -> bool;

    /// Format cible configuré sur le dépôt
    fn format(&self) -> Option<&DownloadFormat>;

    fn open_read(&self) -> Result<Box<dyn Read + Send>>;

    /// Ouvre la ressource en écriture, en écrasant un contenu éventuel
    fn open_write(&self) -> Result<Box<dyn Write + Send>>;

    /// Supprime le contenu ; sans effet si la ressource n'existe pas
    fn delete(&self) -> Result<()>;
}

/// Backend de stockage lié à une configuration [`TrackRepository`]
pub trait Repository: Send + Sync + Debug {
    fn config(&self) -> &TrackRepository;

    fn name(&self) -> &str {
        &self.config().name
    }

    fn resource(&self, uuid: Uuid) -> Arc<dyn Resource>;

    /// Ressource de la piste désignée par `url`
    fn resource_for_url(&self, url: &str) -> Arc<dyn Resource> {
        self.resource(resource_uuid(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_uuid_is_stable() {
        let a = resource_uuid("https://example.com/a.ogg");
        assert_eq!(a, resource_uuid("https://example.com/a.ogg"));
        assert_ne!(a, resource_uuid("https://example.com/b.ogg"));
        assert_eq!(a.get_version_num(), 5);
    }
}
