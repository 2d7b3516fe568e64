//! Réaction aux callbacks d'un player

use crate::history;
use crate::playback::Inner;
use crate::state::ChannelState;
use crate::{FadeOutCallback, MusicEvent, PlayerListener};
use pmolibrary::{Track, User};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

#[derive(Debug, Clone)]
pub(crate) struct PlayContext {
    pub user: User,
    pub conversation: String,
    pub channel: String,
    pub track: Track,
}

pub(crate) struct PlayListener {
    playback: Weak<Inner>,
    state: Arc<ChannelState>,
    context: PlayContext,
    on_fade_out: Option<FadeOutCallback>,
    faded: AtomicBool,
    finished: AtomicBool,
}

impl PlayListener {
    pub fn new(
        playback: Weak<Inner>,
        state: Arc<ChannelState>,
        context: PlayContext,
        on_fade_out: Option<FadeOutCallback>,
    ) -> Self {
        Self {
            playback,
            state,
            context,
            on_fade_out,
            faded: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        }
    }
}

impl PlayerListener for PlayListener {
    fn on_fade_in(&self) {
        let Some(inner) = self.playback.upgrade() else {
            return;
        };
        tracing::info!(channel = %self.context.channel, track_id = self.context.track.id, "Track started");
        inner.events.publish(MusicEvent::TrackStarted {
            channel: self.context.channel.clone(),
            conversation: self.context.conversation.clone(),
            track: self.context.track.clone(),
        });
    }

    fn on_fade_out(&self) {
        if self.faded.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(inner) = self.playback.upgrade() else {
            return;
        };

        let state = self.state.clone();
        let context = self.context.clone();
        let callback = self.on_fade_out.clone();
        let runtime = inner.runtime.clone();
        runtime.spawn(async move {
            let next = inner.drain_queue(&state, callback.clone()).await;
            tracing::debug!(
                channel = %context.channel,
                ending = context.track.id,
                next = ?next.as_ref().map(|t| t.id),
                "Track fading out"
            );
            inner.events.publish(MusicEvent::TrackFade {
                channel: context.channel.clone(),
                conversation: context.conversation.clone(),
                ending: context.track.clone(),
                next: next.clone(),
            });
            if let Some(callback) = callback {
                callback(context.track, next);
            }
        });
    }

    fn on_finished(&self, seconds_played: f64) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(inner) = self.playback.upgrade() else {
            return;
        };
        let seconds = history::clamp_played(seconds_played, self.context.track.known_length());
        tracing::debug!(channel = %self.context.channel, track_id = self.context.track.id, seconds, "Track finished");
        inner.events.publish(MusicEvent::TrackFinished {
            channel: self.context.channel.clone(),
            conversation: self.context.conversation.clone(),
            track: self.context.track.clone(),
            seconds,
        });
        history::record_async(
            &inner.runtime,
            inner.registry.library().clone(),
            &self.context.user,
            &self.context.track,
            seconds_played,
        );
    }
}
