//! Résultat d'une résolution de piste

use crate::{Result, SourceError};
use once_cell::sync::OnceCell;
use pmocache::Resource;
use pmolibrary::{Community, Library, Track};
use std::io::Read;
use std::sync::Arc;
use uuid::Uuid;

/// Provenance d'un résultat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Ressource déjà présente dans un dépôt
    Local,
    /// Doit être récupérée depuis l'extérieur
    Remote,
}

/// Ouvre le flux d'octets encodés d'un résultat
///
/// Appel bloquant : à exécuter hors du runtime async.
pub trait StreamOpener: Send + Sync {
    fn open(&self) -> Result<Box<dyn Read + Send>>;
}

/// Ce qu'une source sait d'une URL qu'elle accepte
pub struct Candidate {
    pub origin: Origin,
    /// Nom proposé pour la piste si elle doit être créée
    pub name: String,
    pub length: Option<f64>,
    pub opener: Arc<dyn StreamOpener>,
}

impl Candidate {
    pub fn remote(name: impl Into<String>, length: Option<f64>, opener: Arc<dyn StreamOpener>) -> Self {
        Self {
            origin: Origin::Remote,
            name: name.into(),
            length,
            opener,
        }
    }
}

impl std::fmt::Debug for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Candidate")
            .field("origin", &self.origin)
            .field("name", &self.name)
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

/// Résultat de résolution : où lire la piste, et la piste elle-même à la demande
///
/// Pour un résultat distant, la ligne `Track` n'est créée qu'au premier appel
/// de [`TrackResult::track`].
pub struct TrackResult {
    community: Community,
    url: String,
    uuid: Uuid,
    priority: i32,
    origin: Origin,
    source_id: String,
    name: String,
    length: Option<f64>,
    resource: Arc<dyn Resource>,
    opener: Arc<dyn StreamOpener>,
    library: Arc<dyn Library>,
    track: OnceCell<Track>,
}

impl TrackResult {
    /// Résultat local : la piste et sa ressource existent déjà
    pub(crate) fn local(
        community: Community,
        track: Track,
        resource: Arc<dyn Resource>,
        library: Arc<dyn Library>,
    ) -> Self {
        let opener: Arc<dyn StreamOpener> = Arc::new(ResourceOpener(resource.clone()));
        Self {
            url: track.url.clone(),
            uuid: resource.uuid(),
            priority: i32::MAX,
            origin: Origin::Local,
            source_id: "local".to_string(),
            name: track.name.clone(),
            length: track.length,
            community,
            resource,
            opener,
            library,
            track: OnceCell::with_value(track),
        }
    }

    pub(crate) fn from_candidate(
        community: Community,
        url: &str,
        source_id: &str,
        priority: i32,
        candidate: Candidate,
        resource: Arc<dyn Resource>,
        library: Arc<dyn Library>,
    ) -> Self {
        Self {
            community,
            url: url.to_string(),
            uuid: resource.uuid(),
            priority,
            origin: candidate.origin,
            source_id: source_id.to_string(),
            name: candidate.name,
            length: candidate.length,
            resource,
            opener: candidate.opener,
            library,
            track: OnceCell::new(),
        }
    }

    pub fn community(&self) -> &Community {
        &self.community
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn is_local(&self) -> bool {
        self.origin == Origin::Local
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Ressource cible dans le dépôt de la communauté
    pub fn resource(&self) -> &Arc<dyn Resource> {
        &self.resource
    }

    /// Durée annoncée par la source (ou celle de la piste pour un résultat local)
    pub fn length(&self) -> Option<f64> {
        self.track.get().and_then(|t| t.length).or(self.length)
    }

    /// Retourne la piste, en la créant au premier accès si nécessaire
    pub fn track(&self) -> Result<&Track> {
        self.track.get_or_try_init(|| {
            let track = self
                .library
                .create_track(self.community.id, &self.url, &self.name, self.length)?;
            if track.deleted {
                return Err(SourceError::Deleted(self.url.clone()));
            }
            tracing::debug!(track_id = track.id, url = %self.url, source_id = %self.source_id, "Resolved track row");
            Ok(track)
        })
    }

    /// Ouvre le flux encodé (bloquant)
    pub fn open(&self) -> Result<Box<dyn Read + Send>> {
        self.opener.open()
    }
}

impl std::fmt::Debug for TrackResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackResult")
            .field("community", &self.community.name)
            .field("url", &self.url)
            .field("uuid", &self.uuid)
            .field("priority", &self.priority)
            .field("origin", &self.origin)
            .field("source_id", &self.source_id)
            .finish_non_exhaustive()
    }
}

struct ResourceOpener(Arc<dyn Resource>);

impl StreamOpener for ResourceOpener {
    fn open(&self) -> Result<Box<dyn Read + Send>> {
        Ok(self.0.open_read()?)
    }
}
