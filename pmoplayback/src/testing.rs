//! Canal et player simulés
//!
//! Le player ne lit rien : les tests pilotent son cycle de vie avec
//! [`MockPlayer::fade_in`], [`MockPlayer::fade_out`] et
//! [`MockPlayer::finish`].

use crate::{Channel, ChannelProvider, Player, PlayerError, PlayerListener};
use futures::future::BoxFuture;
use futures::FutureExt;
use pmocodec::{AudioFormat, FrameProvider};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

static NEXT_PLAYER_ID: AtomicU64 = AtomicU64::new(1);

pub struct MockPlayer {
    id: u64,
    listener: Arc<dyn PlayerListener>,
    provider: Mutex<Option<Box<dyn FrameProvider>>>,
    format: AudioFormat,
    done: watch::Sender<bool>,
    finished: AtomicBool,
    faded: AtomicBool,
}

impl MockPlayer {
    fn new(provider: Box<dyn FrameProvider>, listener: Arc<dyn PlayerListener>) -> Self {
        let (done, _) = watch::channel(false);
        Self {
            id: NEXT_PLAYER_ID.fetch_add(1, Ordering::Relaxed),
            listener,
            format: provider.format(),
            provider: Mutex::new(Some(provider)),
            done,
            finished: AtomicBool::new(false),
            faded: AtomicBool::new(false),
        }
    }

    /// Format du provider reçu
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Lit jusqu'à `frames` frames du provider
    pub fn pull(&self, frames: usize) -> pmocodec::Result<Option<usize>> {
        let mut guard = self.provider.lock().unwrap_or_else(|p| p.into_inner());
        let provider = guard.as_mut().ok_or(pmocodec::CodecError::Closed)?;
        let mut buffer = vec![0.0; frames * self.format.channels as usize];
        provider.read(&mut buffer)
    }

    pub fn fade_in(&self) {
        self.listener.on_fade_in();
    }

    pub fn fade_out(&self) {
        if !self.faded.swap(true, Ordering::SeqCst) {
            self.listener.on_fade_out();
        }
    }

    /// Termine la lecture (une seule fois) et ferme le provider
    pub fn finish(&self, seconds_played: f64) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(mut provider) = self
            .provider
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
        {
            let _ = provider.close();
        }
        self.listener.on_finished(seconds_played);
        self.done.send_replace(true);
    }
}

impl Player for MockPlayer {
    fn id(&self) -> u64 {
        self.id
    }

    fn stop(&self) {
        self.fade_out();
        self.finish(0.0);
    }

    fn kill(&self) {
        self.finish(0.0);
    }

    fn completion(&self) -> BoxFuture<'static, ()> {
        let mut done = self.done.subscribe();
        async move {
            // Une erreur signifie que le player a été détruit
            let _ = done.wait_for(|finished| *finished).await;
        }
        .boxed()
    }
}

pub struct MockChannel {
    id: String,
    format: AudioFormat,
    buffer_size: usize,
    max_queue_size: usize,
    players: Mutex<Vec<Arc<MockPlayer>>>,
    fail_next: AtomicBool,
}

impl MockChannel {
    pub fn new(id: impl Into<String>, format: AudioFormat, max_queue_size: usize) -> Self {
        Self {
            id: id.into(),
            format,
            buffer_size: 1024,
            max_queue_size,
            players: Mutex::new(Vec::new()),
            fail_next: AtomicBool::new(false),
        }
    }

    /// La prochaine création de player échoue en rendant le provider
    pub fn fail_next_player(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Tous les players créés, y compris terminés
    pub fn mock_players(&self) -> Vec<Arc<MockPlayer>> {
        self.players
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Players encore en lecture
    pub fn playing(&self) -> Vec<Arc<MockPlayer>> {
        self.mock_players()
            .into_iter()
            .filter(|p| !p.is_finished())
            .collect()
    }
}

impl Channel for MockChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn format(&self) -> AudioFormat {
        self.format
    }

    fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn max_queue_size(&self) -> usize {
        self.max_queue_size
    }

    fn is_idle(&self) -> bool {
        self.playing().is_empty()
    }

    fn players(&self) -> Vec<Arc<dyn Player>> {
        self.playing()
            .into_iter()
            .map(|p| p as Arc<dyn Player>)
            .collect()
    }

    fn create_player(
        &self,
        provider: Box<dyn FrameProvider>,
        listener: Arc<dyn PlayerListener>,
    ) -> Result<Arc<dyn Player>, PlayerError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(PlayerError::new("mixer refused the player", Some(provider)));
        }
        let player = Arc::new(MockPlayer::new(provider, listener));
        self.players
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(player.clone());
        Ok(player)
    }
}

/// Associe des conversations à des canaux simulés
#[derive(Default)]
pub struct MockChannelProvider {
    channels: Mutex<HashMap<String, Arc<MockChannel>>>,
}

impl MockChannelProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, conversation: impl Into<String>, channel: Arc<MockChannel>) {
        self.channels
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(conversation.into(), channel);
    }
}

impl ChannelProvider for MockChannelProvider {
    fn channel(&self, conversation: &str) -> Option<Arc<dyn Channel>> {
        self.channels
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(conversation)
            .map(|c| c.clone() as Arc<dyn Channel>)
    }
}
