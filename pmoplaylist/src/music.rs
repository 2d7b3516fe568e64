//! Registre des playlists du processus
//!
//! Construit au démarrage, démonté explicitement par [`Music::shutdown`].
//! Un canal porte au plus une playlist en cours.

use crate::{Playlist, PlaylistBuilder, PlaylistError, Result};
use pmolibrary::User;
use pmoplayback::{Behavior, Play, PlayRequest, Playback};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

struct MusicInner {
    playback: Playback,
    playlists: Mutex<HashMap<String, Playlist>>,
}

impl MusicInner {
    fn playlists(&self) -> MutexGuard<'_, HashMap<String, Playlist>> {
        self.playlists
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Retire la playlist de son canal si c'est bien elle qui y est inscrite
    fn deregister(&self, playlist: &Playlist) {
        let mut playlists = self.playlists();
        if playlists
            .get(playlist.channel())
            .is_some_and(|registered| registered.ptr_eq(playlist))
        {
            playlists.remove(playlist.channel());
            tracing::debug!(channel = %playlist.channel(), "Playlist deregistered");
        }
    }
}

#[derive(Clone)]
pub struct Music {
    inner: Arc<MusicInner>,
}

impl Music {
    pub fn new(playback: Playback) -> Self {
        Self {
            inner: Arc::new(MusicInner {
                playback,
                playlists: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn playback(&self) -> &Playback {
        &self.inner.playback
    }

    fn channel_id(&self, conversation: &str) -> Result<String> {
        Ok(self.inner.playback.channel(conversation)?.id().to_string())
    }

    /// Playlist en cours sur le canal de la conversation
    pub fn playlist(&self, conversation: &str) -> Result<Option<Playlist>> {
        let channel = self.channel_id(conversation)?;
        Ok(self.inner.playlists().get(&channel).cloned())
    }

    pub fn playlist_count(&self) -> usize {
        self.inner.playlists().len()
    }

    /// Démarre une playlist sur le canal de la conversation
    ///
    /// Refusé si une playlist y tourne déjà. Les lectures simples que le
    /// propriétaire a le droit d'arrêter sont coupées avant la première piste.
    pub async fn start_playlist(&self, builder: PlaylistBuilder) -> Result<Playlist> {
        let owner = builder.owner().clone();
        let conversation = builder.conversation().to_string();

        let registry: Weak<MusicInner> = Arc::downgrade(&self.inner);
        let playlist = builder
            .on_stopped(move |playlist| {
                if let Some(inner) = registry.upgrade() {
                    inner.deregister(playlist);
                }
            })
            .build()?;

        {
            let mut playlists = self.inner.playlists();
            if playlists.contains_key(playlist.channel()) {
                return Err(PlaylistError::AlreadyRunning(playlist.channel().to_string()));
            }
            playlists.insert(playlist.channel().to_string(), playlist.clone());
        }

        if let Err(e) = self.inner.playback.stop_channel(&owner, &conversation).await {
            self.inner.deregister(&playlist);
            return Err(e.into());
        }

        // En cas d'échec, l'arrêt de la playlist la désinscrit
        playlist.start().await?;
        Ok(playlist)
    }

    /// Arrête la playlist du canal ; `false` s'il n'y en avait pas
    pub fn stop_playlist(&self, user: &User, conversation: &str) -> Result<bool> {
        let Some(playlist) = self.playlist(conversation)? else {
            return Ok(false);
        };
        self.authorize(user, &playlist)?;
        playlist.stop();
        Ok(true)
    }

    /// Confie la playlist du canal à `to`
    ///
    /// Seul le propriétaire actuel, ou un utilisateur autorisé, peut
    /// transférer. Retourne `false` si `to` est déjà propriétaire.
    pub fn transfer_playlist(&self, conversation: &str, by: &User, to: User) -> Result<bool> {
        let playlist = self
            .playlist(conversation)?
            .ok_or_else(|| PlaylistError::NoPlaylist(conversation.to_string()))?;
        self.authorize(by, &playlist)?;
        Ok(playlist.transfer(to))
    }

    fn authorize(&self, user: &User, playlist: &Playlist) -> Result<()> {
        let owner = playlist.owner();
        if self
            .inner
            .playback
            .has_authority(user, &owner, playlist.channel())
        {
            Ok(())
        } else {
            Err(PlaylistError::Forbidden(format!(
                "playlist on {} belongs to {}",
                playlist.channel(),
                owner.name
            )))
        }
    }

    /// Lecture simple ; une lecture exclusive arrête d'abord la playlist
    /// du canal si l'utilisateur en a le droit
    pub async fn play(&self, request: PlayRequest) -> Result<Play> {
        if request.behavior == Behavior::Exclusive {
            if let Some(playlist) = self.playlist(&request.conversation)? {
                if self.authorize(&request.user, &playlist).is_ok() {
                    playlist.stop();
                }
            }
        }
        Ok(self.inner.playback.play(request).await?)
    }

    /// Arrête toutes les playlists et coupe toutes les lectures
    pub fn shutdown(&self) {
        let playlists: Vec<Playlist> = self.inner.playlists().values().cloned().collect();
        for playlist in &playlists {
            playlist.stop();
        }
        let killed = self.inner.playback.kill_all();
        tracing::info!(playlists = playlists.len(), killed, "Music shut down");
    }
}
