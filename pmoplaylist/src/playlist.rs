//! Playlist auto-entretenue sur un canal
//!
//! Chaque piste est jouée en mode passif avec un callback de fade-out qui
//! relance [`Playlist::next`] : la fin d'une piste enchaîne la suivante.
//! Si la file du canal fournit déjà une piste au fade-out, la playlist
//! attend le fade-out suivant.

use crate::{PlaylistError, Result, TrackQueue};
use pmolibrary::{Community, Track, User};
use pmoplayback::{
    Behavior, FadeOutCallback, MusicEvent, Playback, PlayRequest, Player, TrackSelector,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

pub type PlaylistListener = Box<dyn Fn(&Playlist) + Send + Sync>;
pub type TrackChangedListener = Box<dyn Fn(&Playlist, &Track) + Send + Sync>;
pub type TransferListener = Box<dyn Fn(&Playlist, &User, &User) + Send + Sync>;

/// Listeners appelés dans l'ordre d'enregistrement
#[derive(Default)]
struct Listeners {
    started: Vec<PlaylistListener>,
    track_changed: Vec<TrackChangedListener>,
    transferred: Vec<TransferListener>,
    stopped: Vec<PlaylistListener>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct PlaylistBuilder {
    playback: Playback,
    community: Community,
    conversation: String,
    owner: User,
    queue: TrackQueue,
    allow_download: bool,
    allow_cache: bool,
    listeners: Listeners,
}

impl PlaylistBuilder {
    pub fn allow_download(mut self, allow: bool) -> Self {
        self.allow_download = allow;
        self
    }

    pub fn allow_cache(mut self, allow: bool) -> Self {
        self.allow_cache = allow;
        self
    }

    pub fn on_started(mut self, listener: impl Fn(&Playlist) + Send + Sync + 'static) -> Self {
        self.listeners.started.push(Box::new(listener));
        self
    }

    pub fn on_track_changed(
        mut self,
        listener: impl Fn(&Playlist, &Track) + Send + Sync + 'static,
    ) -> Self {
        self.listeners.track_changed.push(Box::new(listener));
        self
    }

    /// Appelé avec (playlist, ancien propriétaire, nouveau propriétaire)
    pub fn on_transferred(
        mut self,
        listener: impl Fn(&Playlist, &User, &User) + Send + Sync + 'static,
    ) -> Self {
        self.listeners.transferred.push(Box::new(listener));
        self
    }

    pub fn on_stopped(mut self, listener: impl Fn(&Playlist) + Send + Sync + 'static) -> Self {
        self.listeners.stopped.push(Box::new(listener));
        self
    }

    pub fn conversation(&self) -> &str {
        &self.conversation
    }

    pub fn owner(&self) -> &User {
        &self.owner
    }

    /// Lie la playlist au canal de la conversation ; elle n'est pas démarrée
    pub fn build(self) -> Result<Playlist> {
        let channel = self.playback.channel(&self.conversation)?;
        Ok(Playlist {
            inner: Arc::new(PlaylistInner {
                channel: channel.id().to_string(),
                conversation: self.conversation,
                community: self.community,
                playback: self.playback,
                queue: Mutex::new(self.queue),
                allow_download: self.allow_download,
                allow_cache: self.allow_cache,
                running: AtomicBool::new(false),
                current: Mutex::new(None),
                owner: Mutex::new(self.owner),
                players: Mutex::new(Vec::new()),
                listeners: self.listeners,
            }),
        })
    }
}

struct PlaylistInner {
    channel: String,
    conversation: String,
    community: Community,
    playback: Playback,
    queue: Mutex<TrackQueue>,
    allow_download: bool,
    allow_cache: bool,
    running: AtomicBool,
    current: Mutex<Option<Track>>,
    owner: Mutex<User>,
    players: Mutex<Vec<Arc<dyn Player>>>,
    listeners: Listeners,
}

/// Séquence de lectures liée à un canal
///
/// Clonable ; les clones désignent la même playlist.
#[derive(Clone)]
pub struct Playlist {
    inner: Arc<PlaylistInner>,
}

impl Playlist {
    pub fn builder(
        playback: Playback,
        community: Community,
        conversation: impl Into<String>,
        owner: User,
        queue: TrackQueue,
    ) -> PlaylistBuilder {
        PlaylistBuilder {
            playback,
            community,
            conversation: conversation.into(),
            owner,
            queue,
            allow_download: true,
            allow_cache: true,
            listeners: Listeners::default(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.inner.channel
    }

    pub fn conversation(&self) -> &str {
        &self.inner.conversation
    }

    pub fn community(&self) -> &Community {
        &self.inner.community
    }

    pub fn owner(&self) -> User {
        lock(&self.inner.owner).clone()
    }

    pub fn current(&self) -> Option<Track> {
        lock(&self.inner.current).clone()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Pistes restantes dans la file (voir [`TrackQueue::size`])
    pub fn remaining(&self) -> i64 {
        lock(&self.inner.queue).size()
    }

    /// Players encore vivants lancés par la playlist
    pub fn players(&self) -> Vec<Arc<dyn Player>> {
        lock(&self.inner.players).clone()
    }

    pub fn ptr_eq(&self, other: &Playlist) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn set_running(&self, running: bool) {
        let was_running = self.inner.running.swap(running, Ordering::SeqCst);
        if running == was_running {
            return;
        }
        let events = self.inner.playback.events();
        if running {
            tracing::info!(channel = %self.inner.channel, owner = %self.owner().id, "Playlist started");
            events.publish(MusicEvent::PlaylistStarted {
                channel: self.inner.channel.clone(),
                conversation: self.inner.conversation.clone(),
            });
            for listener in &self.inner.listeners.started {
                listener(self);
            }
        } else {
            tracing::info!(channel = %self.inner.channel, "Playlist stopped");
            events.publish(MusicEvent::PlaylistEnded {
                channel: self.inner.channel.clone(),
                conversation: self.inner.conversation.clone(),
            });
            for listener in &self.inner.listeners.stopped {
                listener(self);
            }
        }
    }

    /// Démarre la playlist et joue sa première piste
    pub async fn start(&self) -> Result<Track> {
        self.set_running(true);
        self.next().await
    }

    /// Arrête la playlist et coupe ses lectures en cours
    pub fn stop(&self) {
        let players: Vec<_> = lock(&self.inner.players).drain(..).collect();
        for player in players {
            player.kill();
        }
        self.set_running(false);
    }

    /// Passe à la piste suivante
    ///
    /// Une file épuisée arrête la playlist ([`PlaylistError::Exhausted`]) ;
    /// tout autre échec l'arrête aussi et est retourné enveloppé.
    pub async fn next(&self) -> Result<Track> {
        if !self.is_running() {
            return Err(PlaylistError::NotRunning(self.inner.channel.clone()));
        }
        match self.advance().await {
            Ok(track) => Ok(track),
            Err(e @ PlaylistError::Exhausted(_)) => {
                tracing::info!(channel = %self.inner.channel, "Playlist exhausted");
                self.set_running(false);
                Err(e)
            }
            Err(e) => {
                tracing::warn!(channel = %self.inner.channel, error = %e, "Playlist could not advance");
                self.set_running(false);
                Err(PlaylistError::Advance {
                    channel: self.inner.channel.clone(),
                    source: Box::new(e),
                })
            }
        }
    }

    async fn advance(&self) -> Result<Track> {
        let next = lock(&self.inner.queue).next()?;
        let Some(track) = next else {
            return Err(PlaylistError::Exhausted(self.inner.channel.clone()));
        };

        let request = PlayRequest::new(
            self.owner(),
            self.inner.community.clone(),
            self.inner.conversation.clone(),
            TrackSelector::Track(track),
        )
        .behavior(Behavior::Passive)
        .allow_download(self.inner.allow_download)
        .allow_cache(self.inner.allow_cache)
        .on_fade_out(advance_on_fade(Arc::downgrade(&self.inner)));

        let play = self.inner.playback.play(request).await?;
        if let Some(player) = play.player() {
            self.watch(player.clone());
        }

        let track = play.track().clone();
        *lock(&self.inner.current) = Some(track.clone());
        tracing::info!(channel = %self.inner.channel, track_id = track.id, "Playlist track changed");
        self.inner
            .playback
            .events()
            .publish(MusicEvent::PlaylistTrackChanged {
                channel: self.inner.channel.clone(),
                conversation: self.inner.conversation.clone(),
                track: track.clone(),
            });
        for listener in &self.inner.listeners.track_changed {
            listener(self, &track);
        }
        Ok(track)
    }

    /// Garde le player dans l'ensemble actif jusqu'à sa fin
    fn watch(&self, player: Arc<dyn Player>) {
        let id = player.id();
        let completion = player.completion();
        lock(&self.inner.players).push(player);
        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            completion.await;
            if let Some(inner) = inner.upgrade() {
                lock(&inner.players).retain(|p| p.id() != id);
            }
        });
    }

    /// Change le propriétaire ; retourne `false` si c'est déjà lui
    ///
    /// L'autorisation du transfert relève de l'appelant.
    pub fn transfer(&self, to: User) -> bool {
        let from = {
            let mut owner = lock(&self.inner.owner);
            if owner.id == to.id {
                return false;
            }
            std::mem::replace(&mut *owner, to.clone())
        };
        tracing::info!(channel = %self.inner.channel, from = %from.id, to = %to.id, "Playlist transferred");
        self.inner
            .playback
            .events()
            .publish(MusicEvent::PlaylistTransferred {
                channel: self.inner.channel.clone(),
                from: Some(from.clone()),
                to: to.clone(),
            });
        for listener in &self.inner.listeners.transferred {
            listener(self, &from, &to);
        }
        true
    }
}

impl std::fmt::Debug for Playlist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Playlist")
            .field("channel", &self.inner.channel)
            .field("conversation", &self.inner.conversation)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// Callback de fade-out qui relance la playlist
///
/// Sans effet quand la file du canal a déjà fourni une piste, ou quand la
/// playlist n'existe plus ou est arrêtée.
fn advance_on_fade(playlist: Weak<PlaylistInner>) -> FadeOutCallback {
    Arc::new(move |_ending: Track, next: Option<Track>| {
        if next.is_some() {
            return;
        }
        let Some(inner) = playlist.upgrade() else {
            return;
        };
        let playlist = Playlist { inner };
        if !playlist.is_running() {
            return;
        }
        spawn_next(playlist);
    })
}

fn spawn_next(playlist: Playlist) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        tracing::warn!(channel = %playlist.channel(), "No runtime to advance playlist");
        return;
    };
    runtime.spawn(async move {
        if let Err(e) = playlist.next().await {
            tracing::debug!(channel = %playlist.channel(), error = %e, "Playlist did not advance");
        }
    });
}
