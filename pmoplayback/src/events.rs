//! Bus d'événements de lecture
//!
//! La publication ne bloque jamais : sans abonné, l'événement est perdu ; un
//! abonné trop lent perd les plus anciens.

use pmoaudiocache::{CacheCoordinator, CacheEvent};
use pmolibrary::{Track, TrackId, User};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum MusicEvent {
    TrackStarted {
        channel: String,
        conversation: String,
        track: Track,
    },
    TrackFade {
        channel: String,
        conversation: String,
        ending: Track,
        next: Option<Track>,
    },
    TrackFinished {
        channel: String,
        conversation: String,
        track: Track,
        seconds: f64,
    },
    TrackDownloaded {
        track_id: TrackId,
        uuid: Uuid,
    },
    PlaylistStarted {
        channel: String,
        conversation: String,
    },
    PlaylistTrackChanged {
        channel: String,
        conversation: String,
        track: Track,
    },
    PlaylistTransferred {
        channel: String,
        from: Option<User>,
        to: User,
    },
    PlaylistEnded {
        channel: String,
        conversation: String,
    },
    /// Message à afficher dans la conversation
    ConversationNotice {
        conversation: String,
        message: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<MusicEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: MusicEvent) {
        tracing::trace!(?event, "Publishing music event");
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MusicEvent> {
        self.sender.subscribe()
    }

    pub fn notice(&self, conversation: &str, message: impl Into<String>) {
        self.publish(MusicEvent::ConversationNotice {
            conversation: conversation.to_string(),
            message: message.into(),
        });
    }

    /// Republie les fins de cache sous forme de `TrackDownloaded`
    ///
    /// La tâche se termine quand le coordinateur est détruit.
    pub fn forward_cache_events(&self, cache: &CacheCoordinator) -> tokio::task::JoinHandle<()> {
        let mut events = cache.subscribe();
        let bus = self.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(CacheEvent::Finished { track_id, uuid, .. }) => {
                        bus.publish(MusicEvent::TrackDownloaded { track_id, uuid });
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Cache event forwarder lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
