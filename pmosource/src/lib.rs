//! # PMOSource
//!
//! Résolution d'une URL demandée en un flux audio lisible.
//!
//! Le [`SourceRegistry`] essaie dans l'ordre :
//!
//! 1. **local** : la piste existe dans la bibliothèque et son fichier est
//!    présent dans le dépôt de la communauté ;
//! 2. **distant** : toutes les [`TrackSource`] enregistrées sont interrogées
//!    en parallèle, et le résultat de plus haute priorité gagne (un résultat
//!    local l'emporte à priorité égale).
//!
//! Aucun résultat donne [`SourceError::NotFound`], qui porte l'URL demandée.
//!
//! ## Sources fournies
//!
//! - [`HttpSource`] : fichiers audio servis directement en HTTP
//! - [`DownloadSource`] : tout ce que sait extraire `yt-dlp`
//!
//! ```rust,ignore
//! let registry = SourceRegistry::new(library, repositories);
//! registry.register(Arc::new(HttpSource::new(10)?)).await;
//! let result = registry.find(&community, "https://example.com/a.ogg").await?;
//! let stream = result.open()?;
//! ```

mod download;
mod error;
mod http;
mod registry;
mod result;

#[cfg(feature = "pmoconfig")]
mod config_ext;

pub use download::DownloadSource;
pub use error::{ErrorKind, Result, SourceError};
pub use http::HttpSource;
pub use registry::SourceRegistry;
pub use result::{Candidate, Origin, StreamOpener, TrackResult};

#[cfg(feature = "pmoconfig")]
pub use config_ext::SourceConfigExt;

use async_trait::async_trait;
use pmolibrary::Community;

/// Résolveur enfichable
///
/// `find` retourne `Ok(None)` pour une URL que la source ne sait pas servir ;
/// une erreur est traitée par le registre comme une absence.
#[async_trait]
pub trait TrackSource: Send + Sync {
    /// Identifiant unique de la source
    fn id(&self) -> &str;

    /// Rang de la source ; la plus haute priorité gagne
    fn priority(&self) -> i32;

    async fn find(&self, community: &Community, url: &str) -> Result<Option<Candidate>>;
}
