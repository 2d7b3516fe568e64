//! Files de pistes : ce qui joue ensuite
//!
//! Trois variantes partagent la même interface (`next`, `has_next`, `peek`,
//! `size`) :
//!
//! - **Default** : FIFO simple, chaque piste n'est jouée qu'une fois
//! - **Looped** : liste fixe parcourue en boucle, taille rapportée `-1`
//! - **Searched** : curseur paresseux sur une recherche dans la bibliothèque

use crate::Result;
use pmolibrary::{CommunityId, Library, Track, TrackId};
use std::collections::VecDeque;
use std::sync::Arc;

/// Nombre de pistes chargées par requête pour une file de recherche
pub const SEARCH_PAGE_SIZE: usize = 32;

/// Taille rapportée par une file sans fin
pub const UNBOUNDED: i64 = -1;

pub enum TrackQueue {
    Default(VecDeque<Track>),
    Looped { tracks: Vec<Track>, index: usize },
    Searched(SearchCursor),
}

impl TrackQueue {
    pub fn fifo(tracks: impl IntoIterator<Item = Track>) -> Self {
        TrackQueue::Default(tracks.into_iter().collect())
    }

    pub fn looped(tracks: impl IntoIterator<Item = Track>) -> Self {
        TrackQueue::Looped {
            tracks: tracks.into_iter().collect(),
            index: 0,
        }
    }

    /// File des pistes de la communauté dont le nom ou l'URL contient `query`
    pub fn searched(
        library: Arc<dyn Library>,
        community_id: CommunityId,
        query: impl Into<String>,
    ) -> Result<Self> {
        Ok(TrackQueue::Searched(SearchCursor::new(
            library,
            community_id,
            query.into(),
        )?))
    }

    /// Retire et retourne la prochaine piste
    pub fn next(&mut self) -> Result<Option<Track>> {
        match self {
            TrackQueue::Default(tracks) => Ok(tracks.pop_front()),
            TrackQueue::Looped { tracks, index } => {
                if tracks.is_empty() {
                    return Ok(None);
                }
                let track = tracks[*index].clone();
                *index = (*index + 1) % tracks.len();
                Ok(Some(track))
            }
            TrackQueue::Searched(cursor) => cursor.next(),
        }
    }

    pub fn has_next(&mut self) -> Result<bool> {
        match self {
            TrackQueue::Default(tracks) => Ok(!tracks.is_empty()),
            TrackQueue::Looped { tracks, .. } => Ok(!tracks.is_empty()),
            TrackQueue::Searched(cursor) => Ok(cursor.peek()?.is_some()),
        }
    }

    /// Prochaine piste, sans la retirer
    pub fn peek(&mut self) -> Result<Option<Track>> {
        match self {
            TrackQueue::Default(tracks) => Ok(tracks.front().cloned()),
            TrackQueue::Looped { tracks, index } => Ok(tracks.get(*index).cloned()),
            TrackQueue::Searched(cursor) => Ok(cursor.peek()?.cloned()),
        }
    }

    /// Pistes restantes, ou [`UNBOUNDED`] pour une file en boucle
    pub fn size(&self) -> i64 {
        match self {
            TrackQueue::Default(tracks) => tracks.len() as i64,
            TrackQueue::Looped { .. } => UNBOUNDED,
            TrackQueue::Searched(cursor) => cursor.remaining as i64,
        }
    }
}

impl std::fmt::Debug for TrackQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackQueue::Default(tracks) => f.debug_tuple("Default").field(&tracks.len()).finish(),
            TrackQueue::Looped { tracks, index } => f
                .debug_struct("Looped")
                .field("tracks", &tracks.len())
                .field("index", index)
                .finish(),
            TrackQueue::Searched(cursor) => f
                .debug_struct("Searched")
                .field("query", &cursor.query)
                .field("remaining", &cursor.remaining)
                .finish(),
        }
    }
}

/// Curseur par clé sur `search_tracks`, en avant seulement
///
/// Les pistes sont chargées page par page au fil de la consommation. Le
/// nombre restant est compté une fois à la création ; une piste ajoutée
/// ensuite avec un identifiant plus grand sera tout de même servie.
pub struct SearchCursor {
    library: Arc<dyn Library>,
    community_id: CommunityId,
    query: String,
    after: Option<TrackId>,
    page: VecDeque<Track>,
    exhausted: bool,
    remaining: u64,
}

impl SearchCursor {
    fn new(library: Arc<dyn Library>, community_id: CommunityId, query: String) -> Result<Self> {
        let remaining = library.count_tracks(community_id, &query)?;
        tracing::debug!(community_id, query = %query, remaining, "Opened search queue");
        Ok(Self {
            library,
            community_id,
            query,
            after: None,
            page: VecDeque::new(),
            exhausted: false,
            remaining,
        })
    }

    fn fill(&mut self) -> Result<()> {
        if !self.page.is_empty() || self.exhausted {
            return Ok(());
        }
        let rows = self.library.search_tracks(
            self.community_id,
            &self.query,
            self.after,
            SEARCH_PAGE_SIZE,
        )?;
        if rows.len() < SEARCH_PAGE_SIZE {
            self.exhausted = true;
        }
        if let Some(last) = rows.last() {
            self.after = Some(last.id);
        }
        tracing::trace!(query = %self.query, fetched = rows.len(), "Loaded search page");
        self.page.extend(rows);
        Ok(())
    }

    fn peek(&mut self) -> Result<Option<&Track>> {
        self.fill()?;
        Ok(self.page.front())
    }

    fn next(&mut self) -> Result<Option<Track>> {
        self.fill()?;
        let track = self.page.pop_front();
        if track.is_some() {
            self.remaining = self.remaining.saturating_sub(1);
        }
        Ok(track)
    }
}
