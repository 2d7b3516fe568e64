//! Demandes de lecture et leur issue

use crate::{Player, PlaybackError};
use pmolibrary::{Community, Track, User};
use pmosource::TrackResult;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Politique vis-à-vis de ce qui joue déjà sur le canal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Behavior {
    /// Arrête tout ce que l'appelant a le droit d'arrêter, puis joue
    Exclusive,
    /// Joue si le canal est libre, sinon met en file d'attente
    Queued,
    /// Joue sans rien interrompre
    Passive,
}

impl FromStr for Behavior {
    type Err = PlaybackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exclusive" => Ok(Behavior::Exclusive),
            "queued" => Ok(Behavior::Queued),
            "passive" => Ok(Behavior::Passive),
            other => Err(PlaybackError::Unsupported(format!("behavior '{}'", other))),
        }
    }
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Behavior::Exclusive => "exclusive",
            Behavior::Queued => "queued",
            Behavior::Passive => "passive",
        })
    }
}

/// Ce qui doit être joué
#[derive(Debug, Clone)]
pub enum TrackSelector {
    Url(String),
    /// Résultat d'une résolution déjà faite (recherche...)
    Result(Arc<TrackResult>),
    Track(Track),
}

impl TrackSelector {
    pub fn url(&self) -> &str {
        match self {
            TrackSelector::Url(url) => url,
            TrackSelector::Result(result) => result.url(),
            TrackSelector::Track(track) => &track.url,
        }
    }
}

/// Appelé une seule fois au fade-out avec (piste finissante, piste suivante)
pub type FadeOutCallback = Arc<dyn Fn(Track, Option<Track>) + Send + Sync>;

#[derive(Clone)]
pub struct PlayRequest {
    pub user: User,
    pub community: Community,
    pub conversation: String,
    pub selector: TrackSelector,
    pub allow_download: bool,
    pub allow_cache: bool,
    pub behavior: Behavior,
    pub on_fade_out: Option<FadeOutCallback>,
}

impl PlayRequest {
    /// Demande en file d'attente, téléchargement et cache autorisés
    pub fn new(
        user: User,
        community: Community,
        conversation: impl Into<String>,
        selector: TrackSelector,
    ) -> Self {
        Self {
            user,
            community,
            conversation: conversation.into(),
            selector,
            allow_download: true,
            allow_cache: true,
            behavior: Behavior::Queued,
            on_fade_out: None,
        }
    }

    pub fn behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn allow_download(mut self, allow: bool) -> Self {
        self.allow_download = allow;
        self
    }

    pub fn allow_cache(mut self, allow: bool) -> Self {
        self.allow_cache = allow;
        self
    }

    pub fn on_fade_out(mut self, callback: FadeOutCallback) -> Self {
        self.on_fade_out = Some(callback);
        self
    }
}

impl fmt::Debug for PlayRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayRequest")
            .field("user", &self.user.id)
            .field("community", &self.community.name)
            .field("conversation", &self.conversation)
            .field("url", &self.selector.url())
            .field("behavior", &self.behavior)
            .field("allow_download", &self.allow_download)
            .field("allow_cache", &self.allow_cache)
            .finish()
    }
}

/// Tentative de lecture : démarrée, ou mise en file d'attente
#[derive(Clone)]
pub struct Play {
    track: Track,
    channel: String,
    conversation: String,
    player: Option<Arc<dyn Player>>,
}

impl Play {
    pub(crate) fn started(
        track: Track,
        channel: String,
        conversation: String,
        player: Arc<dyn Player>,
    ) -> Self {
        Self {
            track,
            channel,
            conversation,
            player: Some(player),
        }
    }

    pub(crate) fn queued(track: Track, channel: String, conversation: String) -> Self {
        Self {
            track,
            channel,
            conversation,
            player: None,
        }
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn conversation(&self) -> &str {
        &self.conversation
    }

    /// Player vivant ; absent pour une lecture mise en file
    pub fn player(&self) -> Option<&Arc<dyn Player>> {
        self.player.as_ref()
    }

    pub fn was_queued(&self) -> bool {
        self.player.is_none()
    }
}

impl fmt::Debug for Play {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Play")
            .field("track_id", &self.track.id)
            .field("channel", &self.channel)
            .field("conversation", &self.conversation)
            .field("queued", &self.was_queued())
            .finish()
    }
}
