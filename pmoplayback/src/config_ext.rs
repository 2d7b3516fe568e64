//! Extension pour lire les réglages de lecture depuis pmoconfig
//!
//! Clé lue : `music.exclusive_clears_queue` (booléen, vrai par défaut).

use crate::PlaybackOptions;
use pmoconfig::Config;

pub trait PlaybackConfigExt {
    fn playback_options(&self) -> PlaybackOptions;
}

impl PlaybackConfigExt for Config {
    fn playback_options(&self) -> PlaybackOptions {
        let defaults = PlaybackOptions::default();
        PlaybackOptions {
            exclusive_clears_queue: self
                .get_exclusive_clears_queue()
                .unwrap_or(defaults.exclusive_clears_queue),
        }
    }
}
