//! # pmolibrary - Enregistrements persistants de PMOMusic
//!
//! Cette crate porte le modèle de données manipulé par le cœur de lecture :
//!
//! - **Community** : espace de noms avec un dépôt par défaut
//! - **TrackRepository** : configuration nommée d'un backend de stockage
//! - **Track** : piste unique par couple (communauté, URL), jamais supprimée
//!   physiquement
//! - **TrackFile** : preuve durable qu'une piste est en cache dans un dépôt
//! - **PlayRecord** : historique des lectures
//!
//! Le trait [`Library`] est la frontière de stockage consommée par les autres
//! crates ; [`SqliteLibrary`] en est l'implémentation SQLite.
//!
//! ```rust
//! use pmolibrary::{Library, SqliteLibrary};
//!
//! let library = SqliteLibrary::open_in_memory().unwrap();
//! let repo = library.create_repository("local", "file", Some("/tmp/tracks"), None).unwrap();
//! let community = library.create_community("lobby", repo.id).unwrap();
//! let track = library
//!     .create_track(community.id, "https://example.com/a.ogg", "A", Some(180.0))
//!     .unwrap();
//! assert_eq!(library.find_track(community.id, &track.url).unwrap(), Some(track));
//! ```

mod db;
mod error;
mod model;

#[cfg(feature = "pmoconfig")]
mod config_ext;

pub use db::SqliteLibrary;
pub use error::{LibraryError, Result};
pub use model::{
    Community, CommunityId, DownloadFormat, PlayRecord, RepositoryId, Track, TrackFile, TrackId,
    TrackRepository, TrackUpdate, User,
};

#[cfg(feature = "pmoconfig")]
pub use config_ext::LibraryConfigExt;

use uuid::Uuid;

/// Frontière de stockage des entités
///
/// Les implémentations doivent être sûres entre threads ; chaque méthode est
/// atomique.
pub trait Library: Send + Sync {
    fn community(&self, id: CommunityId) -> Result<Option<Community>>;

    fn community_by_name(&self, name: &str) -> Result<Option<Community>>;

    fn create_community(&self, name: &str, repository_id: RepositoryId) -> Result<Community>;

    fn repository(&self, id: RepositoryId) -> Result<Option<TrackRepository>>;

    fn repositories(&self) -> Result<Vec<TrackRepository>>;

    fn create_repository(
        &self,
        name: &str,
        kind: &str,
        location: Option<&str>,
        format: Option<&DownloadFormat>,
    ) -> Result<TrackRepository>;

    fn track(&self, id: TrackId) -> Result<Option<Track>>;

    /// Recherche une piste par son identité (communauté, URL)
    fn find_track(&self, community_id: CommunityId, url: &str) -> Result<Option<Track>>;

    /// Crée la piste, ou retourne celle qui existe déjà pour (communauté, URL)
    fn create_track(
        &self,
        community_id: CommunityId,
        url: &str,
        name: &str,
        length: Option<f64>,
    ) -> Result<Track>;

    /// Applique une modification et retourne la piste à jour
    fn update_track(&self, id: TrackId, update: TrackUpdate) -> Result<Track>;

    fn set_name(&self, id: TrackId, name: &str) -> Result<Track> {
        self.update_track(id, TrackUpdate::Name(name.to_string()))
    }

    fn set_length(&self, id: TrackId, length: Option<f64>) -> Result<Track> {
        self.update_track(id, TrackUpdate::Length(length))
    }

    fn increment_plays(&self, id: TrackId) -> Result<Track> {
        self.update_track(id, TrackUpdate::IncrementPlays)
    }

    fn like(&self, id: TrackId) -> Result<Track> {
        self.update_track(id, TrackUpdate::Like)
    }

    fn dislike(&self, id: TrackId) -> Result<Track> {
        self.update_track(id, TrackUpdate::Dislike)
    }

    /// Suppression logique ; la piste n'est plus résolue
    fn set_deleted(&self, id: TrackId, deleted: bool) -> Result<Track> {
        self.update_track(id, TrackUpdate::Deleted(deleted))
    }

    fn track_file(&self, track_id: TrackId, repository_id: RepositoryId)
        -> Result<Option<TrackFile>>;

    /// Enregistre le fichier ; idempotent pour un même (piste, dépôt)
    fn create_track_file(
        &self,
        track_id: TrackId,
        repository_id: RepositoryId,
        uuid: Uuid,
    ) -> Result<TrackFile>;

    fn record_play(&self, record: &PlayRecord) -> Result<()>;

    fn plays(&self, track_id: TrackId) -> Result<Vec<PlayRecord>>;

    /// Page de pistes non supprimées dont le nom ou l'URL contient `query`,
    /// triées par identifiant, strictement après `after`
    fn search_tracks(
        &self,
        community_id: CommunityId,
        query: &str,
        after: Option<TrackId>,
        limit: usize,
    ) -> Result<Vec<Track>>;

    fn count_tracks(&self, community_id: CommunityId, query: &str) -> Result<u64>;
}
