//! Registre des sources de pistes
//!
//! La résolution interroge d'abord la bibliothèque (piste déjà en cache dans
//! le dépôt de la communauté), puis l'ensemble des sources enregistrées.

use crate::{Candidate, Origin, Result, SourceError, TrackResult, TrackSource};
use futures::future::join_all;
use pmocache::RepositoryManager;
use pmolibrary::{Community, Library};
use std::cmp::Reverse;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct SourceRegistry {
    library: Arc<dyn Library>,
    repositories: Arc<RepositoryManager>,
    sources: Arc<RwLock<Vec<Arc<dyn TrackSource>>>>,
}

impl SourceRegistry {
    pub fn new(library: Arc<dyn Library>, repositories: Arc<RepositoryManager>) -> Self {
        Self {
            library,
            repositories,
            sources: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn library(&self) -> &Arc<dyn Library> {
        &self.library
    }

    pub fn repositories(&self) -> &Arc<RepositoryManager> {
        &self.repositories
    }

    /// Enregistre une source ; une source de même identifiant est remplacée
    pub async fn register(&self, source: Arc<dyn TrackSource>) {
        let mut sources = self.sources.write().await;
        tracing::info!(
            source_id = %source.id(),
            priority = source.priority(),
            "Registering track source"
        );
        sources.retain(|s| s.id() != source.id());
        sources.push(source);
    }

    pub async fn remove(&self, id: &str) -> bool {
        let mut sources = self.sources.write().await;
        let before = sources.len();
        sources.retain(|s| s.id() != id);
        if sources.len() != before {
            tracing::info!(source_id = %id, "Removed track source");
            true
        } else {
            false
        }
    }

    pub async fn count(&self) -> usize {
        self.sources.read().await.len()
    }

    /// Meilleur résultat pour l'URL ; [`SourceError::NotFound`] sinon
    pub async fn find(&self, community: &Community, url: &str) -> Result<TrackResult> {
        if let Some(result) = self.find_local(community, url)? {
            return Ok(result);
        }
        match self.find_remote(community, url).await? {
            Some(result) => Ok(result),
            None => {
                tracing::debug!(community = %community.name, url, "No source resolved track");
                Err(SourceError::NotFound(url.to_string()))
            }
        }
    }

    /// Résolution depuis le dépôt de la communauté
    ///
    /// Une piste supprimée échoue avec [`SourceError::Deleted`]. Un fichier
    /// enregistré dont la ressource a disparu est signalé et ignoré.
    pub fn find_local(&self, community: &Community, url: &str) -> Result<Option<TrackResult>> {
        let Some(track) = self.library.find_track(community.id, url)? else {
            tracing::debug!(community = %community.name, url, "Track not in library");
            return Ok(None);
        };
        if track.deleted {
            return Err(SourceError::Deleted(url.to_string()));
        }

        let repository = self.repositories.for_community(community)?;
        let Some(file) = self.library.track_file(track.id, repository.config().id)? else {
            tracing::debug!(track_id = track.id, repository = %repository.name(), "Track not cached");
            return Ok(None);
        };

        let resource = repository.resource(file.uuid);
        if !resource.exists() {
            tracing::warn!(
                track_id = track.id,
                uuid = %file.uuid,
                repository = %repository.name(),
                "Integrity: track file recorded but resource is missing"
            );
            return Ok(None);
        }

        Ok(Some(TrackResult::local(
            community.clone(),
            track,
            resource,
            self.library.clone(),
        )))
    }

    /// Interroge toutes les sources et retourne le mieux classé
    ///
    /// Les échecs d'une source sont traités comme des absences. Le classement
    /// se fait par priorité décroissante, les résultats locaux l'emportant à
    /// priorité égale.
    pub async fn find_remote(
        &self,
        community: &Community,
        url: &str,
    ) -> Result<Option<TrackResult>> {
        let sources = self.sources.read().await.clone();
        if sources.is_empty() {
            return Ok(None);
        }

        let outcomes = join_all(sources.iter().map(|source| async move {
            (source.clone(), source.find(community, url).await)
        }))
        .await;

        let mut found: Vec<(Arc<dyn TrackSource>, Candidate)> = Vec::new();
        for (source, outcome) in outcomes {
            match outcome {
                Ok(Some(candidate)) => found.push((source, candidate)),
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(source_id = %source.id(), url, error = %e, "Source failed, treated as not found");
                }
            }
        }
        if found.is_empty() {
            return Ok(None);
        }

        found.sort_by_key(|(source, candidate)| {
            (Reverse(source.priority()), candidate.origin != Origin::Local)
        });

        let (source, candidate) = found.swap_remove(0);
        let repository = self.repositories.for_community(community)?;
        let resource = repository.resource_for_url(url);
        tracing::debug!(source_id = %source.id(), url, "Resolved remote track");

        Ok(Some(TrackResult::from_candidate(
            community.clone(),
            url,
            source.id(),
            source.priority(),
            candidate,
            resource,
            self.library.clone(),
        )))
    }
}
