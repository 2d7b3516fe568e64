//! Enregistrements persistants : communautés, dépôts, pistes, fichiers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type CommunityId = i64;
pub type RepositoryId = i64;
pub type TrackId = i64;

/// Format de téléchargement configuré sur un dépôt
///
/// Les champs absents laissent le choix au coordinateur de cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadFormat {
    pub container: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u16>,
}

/// Configuration nommée d'un backend de stockage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackRepository {
    pub id: RepositoryId,
    pub name: String,
    /// Type de backend (`"file"`, `"null"`...)
    pub kind: String,
    /// Emplacement propre au backend (répertoire pour `"file"`)
    pub location: Option<String>,
    pub format: Option<DownloadFormat>,
}

/// Espace de noms regroupant des pistes et un dépôt par défaut
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Community {
    pub id: CommunityId,
    pub name: String,
    pub repository_id: RepositoryId,
}

/// Piste identifiée par le couple (communauté, URL)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    pub id: TrackId,
    pub community_id: CommunityId,
    pub url: String,
    pub name: String,
    /// Durée en secondes, si connue
    pub length: Option<f64>,
    pub plays: i64,
    pub likes: i64,
    pub dislikes: i64,
    /// Suppression logique : la piste n'est plus résolue ni jouée
    pub deleted: bool,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Track {
    /// Durée connue et strictement positive
    pub fn known_length(&self) -> Option<f64> {
        self.length.filter(|l| l.is_finite() && *l > 0.0)
    }
}

/// Modification atomique d'une piste
///
/// Chaque variante est persistée seule et met à jour `updated`.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackUpdate {
    Name(String),
    Length(Option<f64>),
    IncrementPlays,
    Like,
    Dislike,
    Deleted(bool),
}

/// Fait durable « cette piste est en cache dans ce dépôt »
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackFile {
    pub id: i64,
    pub track_id: TrackId,
    pub repository_id: RepositoryId,
    pub uuid: Uuid,
    pub created: DateTime<Utc>,
}

/// Utilisateur à l'origine d'une demande de lecture
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct User {
    pub id: String,
    pub name: String,
}

impl User {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Utilisateur sans identité (ses lectures ne sont pas historisées)
    pub fn anonymous() -> Self {
        Self {
            id: String::new(),
            name: "anonymous".to_string(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.id.is_empty()
    }
}

/// Entrée d'historique de lecture
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayRecord {
    pub track_id: TrackId,
    pub user_id: String,
    pub started: DateTime<Utc>,
    pub ended: DateTime<Utc>,
}
