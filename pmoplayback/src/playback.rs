//! Orchestration des lectures sur les canaux

use crate::listener::{PlayContext, PlayListener};
use crate::state::{ActivePlay, ChannelOwnership, ChannelState, PendingPlay};
use crate::{
    Authorizer, Behavior, Channel, ChannelProvider, EventBus, FadeOutCallback, OwnerOnly, Play,
    PlayRequest, PlaybackError, PlayerError, Result, TrackSelector,
};
use pmoaudiocache::CacheCoordinator;
use pmocodec::{AdapterError, Codec, FrameProvider, ResampledProvider};
use pmolibrary::{Track, User};
use pmosource::{SourceError, SourceRegistry, TrackResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;

/// Réglages du comportement des lectures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackOptions {
    /// Une lecture exclusive vide aussi la file d'attente (entrées autorisées)
    pub exclusive_clears_queue: bool,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            exclusive_clears_queue: true,
        }
    }
}

/// Résultat d'une préemption
struct Preempted {
    stopped: usize,
    /// Callback de la dernière lecture tuée
    on_fade_out: Option<FadeOutCallback>,
}

/// Ferme le provider ; un échec de fermeture est rattaché à l'erreur principale
fn close_with(mut provider: Box<dyn FrameProvider>, primary: PlaybackError) -> PlaybackError {
    match provider.close() {
        Ok(()) => primary,
        Err(close_error) => PlaybackError::Closed {
            primary: Box::new(primary),
            close_error,
        },
    }
}

pub struct PlaybackBuilder {
    registry: SourceRegistry,
    codec: Arc<dyn Codec>,
    channels: Arc<dyn ChannelProvider>,
    cache: Option<Arc<CacheCoordinator>>,
    authorizer: Arc<dyn Authorizer>,
    events: EventBus,
    options: PlaybackOptions,
}

impl PlaybackBuilder {
    pub fn cache(mut self, cache: Arc<CacheCoordinator>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    pub fn events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn options(mut self, options: PlaybackOptions) -> Self {
        self.options = options;
        self
    }

    /// Doit être appelé depuis un runtime tokio : les callbacks des players
    /// y planifient leur travail.
    pub fn build(self) -> Result<Playback> {
        let runtime = Handle::try_current().map_err(|e| PlaybackError::Runtime(e.to_string()))?;
        Ok(Playback {
            inner: Arc::new(Inner {
                registry: self.registry,
                codec: self.codec,
                channels: self.channels,
                cache: self.cache,
                authorizer: self.authorizer,
                events: self.events,
                options: self.options,
                states: Mutex::new(HashMap::new()),
                runtime,
            }),
        })
    }
}

/// Point d'entrée des lectures
///
/// Clonable à faible coût ; tous les clones partagent les mêmes canaux.
#[derive(Clone)]
pub struct Playback {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub registry: SourceRegistry,
    codec: Arc<dyn Codec>,
    channels: Arc<dyn ChannelProvider>,
    cache: Option<Arc<CacheCoordinator>>,
    authorizer: Arc<dyn Authorizer>,
    pub events: EventBus,
    options: PlaybackOptions,
    states: Mutex<HashMap<String, Arc<ChannelState>>>,
    pub runtime: Handle,
}

impl Playback {
    pub fn builder(
        registry: SourceRegistry,
        codec: Arc<dyn Codec>,
        channels: Arc<dyn ChannelProvider>,
    ) -> PlaybackBuilder {
        PlaybackBuilder {
            registry,
            codec,
            channels,
            cache: None,
            authorizer: Arc::new(OwnerOnly),
            events: EventBus::default(),
            options: PlaybackOptions::default(),
        }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.inner.registry
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn options(&self) -> PlaybackOptions {
        self.inner.options
    }

    pub fn channel(&self, conversation: &str) -> Result<Arc<dyn Channel>> {
        self.inner.channel(conversation)
    }

    /// `user` peut-il agir sur ce qui appartient à `owner` sur ce canal ?
    pub fn has_authority(&self, user: &User, owner: &User, channel: &str) -> bool {
        self.inner.has_authority(user, owner, channel)
    }

    /// Joue ou met en file la piste demandée
    ///
    /// Le résultat indique si la lecture a démarré ([`Play::player`]) ou a
    /// été mise en attente ([`Play::was_queued`]).
    pub async fn play(&self, request: PlayRequest) -> Result<Play> {
        self.inner.play(request).await
    }

    /// Prend la propriété exclusive du canal de la conversation
    ///
    /// Les opérations de lecture sur ce canal attendent sa libération.
    pub async fn obtain_channel(&self, conversation: &str, user: &User) -> Result<ChannelOwnership> {
        let channel = self.inner.channel(conversation)?;
        let state = self.inner.state(channel.as_ref());
        Ok(state.obtain(user).await)
    }

    /// Arrête tout ce que `user` a le droit d'arrêter sur le canal
    ///
    /// Retourne le nombre de lectures et d'entrées en attente supprimées.
    /// Si le canal devient muet, la tête de file restante démarre.
    pub async fn stop_channel(&self, user: &User, conversation: &str) -> Result<usize> {
        let channel = self.inner.channel(conversation)?;
        let state = self.inner.state(channel.as_ref());
        let ownership = state.obtain(user).await;
        let preempted = self.inner.preempt(&state, user, true);
        drop(ownership);
        tracing::info!(
            channel = %state.id,
            user = %user.id,
            stopped = preempted.stopped,
            "Channel stopped"
        );

        // Un player tué ne passe pas par le fade-out : la file repart d'ici
        if channel.is_idle() && !state.pending.is_empty() {
            let next = self.inner.drain_queue(&state, preempted.on_fade_out).await;
            tracing::debug!(channel = %state.id, next = ?next.map(|t| t.id), "Queue resumed after stop");
        }
        Ok(preempted.stopped)
    }

    /// Passe à la suite : arrêt progressif de la plus ancienne lecture
    ///
    /// Le fade-out déclenche la lecture suivante de la file. Retourne
    /// `false` si rien ne joue.
    pub async fn skip(&self, user: &User, conversation: &str) -> Result<bool> {
        let channel = self.inner.channel(conversation)?;
        let state = self.inner.state(channel.as_ref());
        let _ownership = state.obtain(user).await;
        let Some(current) = state.active().into_iter().next() else {
            return Ok(false);
        };
        if !self.inner.has_authority(user, &current.user, &state.id) {
            return Err(PlaybackError::Forbidden(format!(
                "{} cannot skip a track requested by {}",
                user.name, current.user.name
            )));
        }
        tracing::info!(channel = %state.id, user = %user.id, track_id = current.track.id, "Skipping track");
        current.player.stop();
        Ok(true)
    }

    /// Contenu de la file d'attente du canal
    pub fn queued(&self, conversation: &str) -> Result<Vec<PendingPlay>> {
        let channel = self.inner.channel(conversation)?;
        Ok(self.inner.state(channel.as_ref()).pending.snapshot())
    }

    /// Pistes en cours de lecture, de la plus ancienne à la plus récente
    pub fn active_tracks(&self, conversation: &str) -> Result<Vec<Track>> {
        let channel = self.inner.channel(conversation)?;
        Ok(self
            .inner
            .state(channel.as_ref())
            .active()
            .into_iter()
            .map(|play| play.track)
            .collect())
    }

    /// Arrêt immédiat de toutes les lectures, files vidées (extinction)
    pub fn kill_all(&self) -> usize {
        let states: Vec<Arc<ChannelState>> = self
            .inner
            .states
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .values()
            .cloned()
            .collect();

        let mut killed = 0;
        for state in states {
            state.pending.remove_where(|_| true);
            for play in state.active() {
                play.player.kill();
                state.remove_active(play.player.id());
                killed += 1;
            }
        }
        tracing::info!(killed, "All plays killed");
        killed
    }
}

impl Inner {
    fn channel(&self, conversation: &str) -> Result<Arc<dyn Channel>> {
        self.channels
            .channel(conversation)
            .ok_or_else(|| PlaybackError::NoChannel(conversation.to_string()))
    }

    fn state(&self, channel: &dyn Channel) -> Arc<ChannelState> {
        let mut states = self.states.lock().unwrap_or_else(|p| p.into_inner());
        states
            .entry(channel.id().to_string())
            .or_insert_with(|| Arc::new(ChannelState::new(channel.id(), channel.max_queue_size())))
            .clone()
    }

    /// `user` agit sur ses propres lectures, ou sur toutes s'il y est autorisé
    fn has_authority(&self, user: &User, owner: &User, channel: &str) -> bool {
        user.id == owner.id || self.authorizer.can_override(user, channel)
    }

    /// Arrête les lectures et entrées en attente sur lesquelles `user` a autorité
    fn preempt(&self, state: &ChannelState, user: &User, clear_queue: bool) -> Preempted {
        let mut preempted = Preempted {
            stopped: 0,
            on_fade_out: None,
        };
        if clear_queue {
            preempted.stopped += state
                .pending
                .remove_where(|pending| self.has_authority(user, &pending.user, &state.id));
        }
        for play in state.active() {
            if self.has_authority(user, &play.user, &state.id) {
                play.player.kill();
                state.remove_active(play.player.id());
                preempted.stopped += 1;
                if play.on_fade_out.is_some() {
                    preempted.on_fade_out = play.on_fade_out;
                }
            } else {
                tracing::debug!(
                    channel = %state.id,
                    track_id = play.track.id,
                    owner = %play.user.id,
                    "Leaving track of another user playing"
                );
            }
        }
        preempted
    }

    async fn resolve(&self, request: &PlayRequest) -> Result<Arc<TrackResult>> {
        match &request.selector {
            TrackSelector::Result(result) => Ok(result.clone()),
            TrackSelector::Url(url) => Ok(Arc::new(
                self.registry.find(&request.community, url).await?,
            )),
            TrackSelector::Track(track) => {
                if track.deleted {
                    return Err(PlaybackError::NotFound(track.url.clone()));
                }
                Ok(Arc::new(
                    self.registry.find(&request.community, &track.url).await?,
                ))
            }
        }
    }

    /// Lance la mise en cache si rien ne s'y oppose ; les échecs sont silencieux
    fn start_caching(&self, result: &Arc<TrackResult>, track: &Track) {
        let Some(cache) = &self.cache else {
            return;
        };
        if !cache.is_enabled() || !result.resource().can_write() || track.known_length().is_none()
        {
            tracing::debug!(track_id = track.id, "Track not eligible for caching");
            return;
        }
        match cache.cache_async(result.clone()) {
            Ok(handle) => {
                tracing::debug!(track_id = handle.track_id(), "Caching started alongside playback");
            }
            Err(e) => {
                tracing::debug!(track_id = track.id, error = %e, "Caching not started");
            }
        }
    }

    async fn open_provider(
        &self,
        request: &PlayRequest,
        result: &Arc<TrackResult>,
        track: &Track,
    ) -> Result<Box<dyn FrameProvider>> {
        let local = result.is_local() && result.resource().exists();
        if !local && !request.allow_download {
            return Err(PlaybackError::DownloadNotAllowed(result.url().to_string()));
        }

        let codec = self.codec.clone();
        let opened = result.clone();
        let provider = tokio::task::spawn_blocking(move || -> Result<Box<dyn FrameProvider>> {
            let input = opened.open()?;
            Ok(codec.open_provider(input)?)
        })
        .await
        .map_err(|e| PlaybackError::Runtime(e.to_string()))??;

        if !local && request.allow_cache {
            self.start_caching(result, track);
        }
        Ok(provider)
    }

    /// Adapte le provider au format du canal
    fn adapt(
        &self,
        provider: Box<dyn FrameProvider>,
        channel: &dyn Channel,
    ) -> Result<Box<dyn FrameProvider>> {
        let input = provider.format();
        let output = channel.format();
        if input == output {
            return Ok(provider);
        }
        tracing::debug!(from = %input, to = %output, channel = %channel.id(), "Resampling provider");
        let resampler = match self.codec.open_resampler(input, output, channel.buffer_size()) {
            Ok(resampler) => resampler,
            Err(e) => return Err(close_with(provider, e.into())),
        };
        match ResampledProvider::new(provider, resampler, channel.buffer_size()) {
            Ok(adapted) => Ok(Box::new(adapted)),
            Err(AdapterError { error, provider }) => Err(close_with(provider, error.into())),
        }
    }

    pub(crate) async fn play(self: &Arc<Self>, request: PlayRequest) -> Result<Play> {
        let channel = self.channel(&request.conversation)?;
        let state = self.state(channel.as_ref());

        let result = self.resolve(&request).await?;
        let track = match result.track() {
            Ok(track) => track.clone(),
            Err(SourceError::Deleted(url)) => return Err(PlaybackError::NotFound(url)),
            Err(e) => return Err(e.into()),
        };

        let provider = self.open_provider(&request, &result, &track).await?;
        let provider = self.adapt(provider, channel.as_ref())?;

        let ownership = state.obtain(&request.user).await;
        let outcome = match request.behavior {
            Behavior::Exclusive => {
                let preempted =
                    self.preempt(&state, &request.user, self.options.exclusive_clears_queue);
                tracing::debug!(
                    channel = %state.id,
                    stopped = preempted.stopped,
                    "Exclusive play preempted channel"
                );
                self.start(&state, &channel, &request, track, provider)
            }
            // Les entrées déjà en attente passent avant le nouveau venu
            Behavior::Queued if !channel.is_idle() || !state.pending.is_empty() => {
                self.enqueue(&state, &request, track, provider)
            }
            Behavior::Queued | Behavior::Passive => {
                self.start(&state, &channel, &request, track, provider)
            }
        };
        drop(ownership);

        // drain_queue enchaîne lui-même les lectures passives
        if request.behavior != Behavior::Passive
            && channel.is_idle()
            && !state.pending.is_empty()
        {
            self.schedule_drain(state);
        }
        outcome
    }

    /// Relance la file d'un canal resté muet, hors du verrou de propriété
    fn schedule_drain(self: &Arc<Self>, state: Arc<ChannelState>) {
        tracing::debug!(channel = %state.id, queued = state.pending.len(), "Resuming idle channel queue");
        let inner = self.clone();
        self.runtime.spawn(async move {
            inner.drain_queue(&state, None).await;
        });
    }

    fn enqueue(
        &self,
        state: &ChannelState,
        request: &PlayRequest,
        track: Track,
        mut provider: Box<dyn FrameProvider>,
    ) -> Result<Play> {
        let pending = PendingPlay {
            user: request.user.clone(),
            community: request.community.clone(),
            conversation: request.conversation.clone(),
            track: track.clone(),
            allow_download: request.allow_download,
            allow_cache: request.allow_cache,
        };
        let position = match state.pending.push(pending) {
            Ok(position) => position,
            Err(e) => return Err(close_with(provider, e)),
        };
        // Le flux sera rouvert au moment de jouer
        if let Err(e) = provider.close() {
            tracing::debug!(track_id = track.id, error = %e, "Failed to close queued stream");
        }
        tracing::info!(channel = %state.id, track_id = track.id, position, "Track queued");
        Ok(Play::queued(
            track,
            state.id.clone(),
            request.conversation.clone(),
        ))
    }

    fn start(
        self: &Arc<Self>,
        state: &Arc<ChannelState>,
        channel: &Arc<dyn Channel>,
        request: &PlayRequest,
        track: Track,
        provider: Box<dyn FrameProvider>,
    ) -> Result<Play> {
        let listener = Arc::new(PlayListener::new(
            Arc::downgrade(self),
            state.clone(),
            PlayContext {
                user: request.user.clone(),
                conversation: request.conversation.clone(),
                channel: state.id.clone(),
                track: track.clone(),
            },
            request.on_fade_out.clone(),
        ));

        let player = match channel.create_player(provider, listener) {
            Ok(player) => player,
            Err(PlayerError { reason, provider }) => {
                let error = PlaybackError::Player(reason);
                return Err(match provider {
                    Some(provider) => close_with(provider, error),
                    None => error,
                });
            }
        };

        state.add_active(ActivePlay {
            player: player.clone(),
            user: request.user.clone(),
            track: track.clone(),
            on_fade_out: request.on_fade_out.clone(),
        });
        let completion = player.completion();
        let player_id = player.id();
        let watched = state.clone();
        self.runtime.spawn(async move {
            completion.await;
            watched.remove_active(player_id);
        });

        tracing::info!(
            channel = %state.id,
            track_id = track.id,
            user = %request.user.id,
            behavior = %request.behavior,
            "Track playing"
        );
        Ok(Play::started(
            track,
            state.id.clone(),
            request.conversation.clone(),
            player,
        ))
    }

    /// Démarre la première entrée jouable de la file, en lecture passive
    ///
    /// Les entrées qui échouent sont signalées à leur conversation puis
    /// sautées. Retourne la piste démarrée.
    pub(crate) async fn drain_queue(
        self: &Arc<Self>,
        state: &ChannelState,
        on_fade_out: Option<FadeOutCallback>,
    ) -> Option<Track> {
        while let Some(pending) = state.pending.pop() {
            let mut request = PlayRequest::new(
                pending.user.clone(),
                pending.community.clone(),
                pending.conversation.clone(),
                TrackSelector::Track(pending.track.clone()),
            )
            .behavior(Behavior::Passive)
            .allow_download(pending.allow_download)
            .allow_cache(pending.allow_cache);
            request.on_fade_out = on_fade_out.clone();

            match self.play(request).await {
                Ok(play) => return Some(play.track().clone()),
                Err(e) => {
                    tracing::warn!(
                        channel = %state.id,
                        track_id = pending.track.id,
                        error = %e,
                        "Queued track could not be played"
                    );
                    self.events.notice(
                        &pending.conversation,
                        format!("Could not play {}: {}", pending.track.name, e),
                    );
                }
            }
        }
        None
    }
}
