//! État par canal : propriété exclusive, lectures actives, file d'attente

use crate::{FadeOutCallback, PlaybackError, Player, Result};
use pmolibrary::{Community, Track, User};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OwnedMutexGuard;

/// Entrée de la file d'attente d'un canal
#[derive(Debug, Clone)]
pub struct PendingPlay {
    pub user: User,
    pub community: Community,
    pub conversation: String,
    pub track: Track,
    pub allow_download: bool,
    pub allow_cache: bool,
}

/// File FIFO bornée ; un ajout sur une file pleine échoue immédiatement
#[derive(Debug)]
pub struct PendingQueue {
    channel: String,
    capacity: usize,
    entries: Mutex<VecDeque<PendingPlay>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Les sections critiques ne paniquent pas ; un verrou empoisonné reste cohérent
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl PendingQueue {
    pub fn new(channel: impl Into<String>, capacity: usize) -> Self {
        Self {
            channel: channel.into(),
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn push(&self, entry: PendingPlay) -> Result<usize> {
        let mut entries = lock(&self.entries);
        if entries.len() >= self.capacity {
            return Err(PlaybackError::QueueFull {
                channel: self.channel.clone(),
                capacity: self.capacity,
            });
        }
        entries.push_back(entry);
        Ok(entries.len())
    }

    pub fn pop(&self) -> Option<PendingPlay> {
        lock(&self.entries).pop_front()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retire les entrées qui satisfont `pred` ; retourne le nombre retiré
    pub fn remove_where(&self, pred: impl Fn(&PendingPlay) -> bool) -> usize {
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|e| !pred(e));
        before - entries.len()
    }

    pub fn snapshot(&self) -> Vec<PendingPlay> {
        lock(&self.entries).iter().cloned().collect()
    }
}

/// Lecture démarrée et encore vivante sur un canal
#[derive(Clone)]
pub(crate) struct ActivePlay {
    pub player: Arc<dyn Player>,
    pub user: User,
    pub track: Track,
    /// Transmis à l'entrée de file qui prend la suite
    pub on_fade_out: Option<FadeOutCallback>,
}

pub(crate) struct ChannelState {
    pub id: String,
    owner: Arc<tokio::sync::Mutex<Option<User>>>,
    active: Mutex<Vec<ActivePlay>>,
    pub pending: PendingQueue,
}

impl ChannelState {
    pub fn new(id: &str, max_queue_size: usize) -> Self {
        Self {
            id: id.to_string(),
            owner: Arc::new(tokio::sync::Mutex::new(None)),
            active: Mutex::new(Vec::new()),
            pending: PendingQueue::new(id, max_queue_size),
        }
    }

    /// Attend que le canal soit libre puis en prend la propriété
    pub async fn obtain(&self, user: &User) -> ChannelOwnership {
        let mut guard = self.owner.clone().lock_owned().await;
        *guard = Some(user.clone());
        tracing::trace!(channel = %self.id, user = %user.id, "Channel ownership acquired");
        ChannelOwnership {
            channel: self.id.clone(),
            guard,
        }
    }

    pub fn add_active(&self, play: ActivePlay) {
        lock(&self.active).push(play);
    }

    pub fn remove_active(&self, player_id: u64) -> Option<ActivePlay> {
        let mut active = lock(&self.active);
        let index = active.iter().position(|p| p.player.id() == player_id)?;
        Some(active.remove(index))
    }

    pub fn active(&self) -> Vec<ActivePlay> {
        lock(&self.active).clone()
    }
}

/// Propriété exclusive d'un canal, relâchée à la destruction
pub struct ChannelOwnership {
    channel: String,
    guard: OwnedMutexGuard<Option<User>>,
}

impl ChannelOwnership {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn owner(&self) -> Option<&User> {
        self.guard.as_ref()
    }
}

impl Drop for ChannelOwnership {
    fn drop(&mut self) {
        *self.guard = None;
        tracing::trace!(channel = %self.channel, "Channel ownership released");
    }
}
