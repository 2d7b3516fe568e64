//! # pmoplayback - Cœur de lecture de PMOMusic
//!
//! Cette crate transforme une demande « joue cette URL dans cette
//! conversation » en un player vivant sur le canal audio de la conversation.
//!
//! ## Déroulement d'une lecture
//!
//! 1. le canal de la conversation est obtenu auprès du [`ChannelProvider`] ;
//! 2. l'URL est résolue par le [`SourceRegistry`](pmosource::SourceRegistry)
//!    (local d'abord, puis sources distantes) ;
//! 3. le flux est décodé, et mis en cache en parallèle si c'est permis ;
//! 4. le provider est rééchantillonné si son format diffère de celui du canal ;
//! 5. sous propriété exclusive du canal, le [`Behavior`] décide : démarrer,
//!    mettre en file, ou arrêter d'abord ce qui joue.
//!
//! Au fade-out d'une piste, la première entrée jouable de la file démarre,
//! puis le callback de la demande est appelé une seule fois avec la piste
//! finissante et la suivante.
//!
//! ```rust,ignore
//! let playback = Playback::builder(registry, codec, channels)
//!     .cache(coordinator)
//!     .build()?;
//! let play = playback
//!     .play(PlayRequest::new(user, community, "lobby", TrackSelector::Url(url)))
//!     .await?;
//! ```

mod channel;
mod error;
mod events;
mod history;
mod listener;
mod playback;
mod request;
mod state;

#[cfg(feature = "pmoconfig")]
mod config_ext;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

#[cfg(test)]
mod tests;

pub use channel::{
    AllowAll, Authorizer, Channel, ChannelProvider, OwnerOnly, Player, PlayerError,
    PlayerListener,
};
pub use error::{ErrorKind, PlaybackError, Result};
pub use events::{EventBus, MusicEvent};
pub use history::{clamp_played, play_record};
pub use playback::{Playback, PlaybackBuilder, PlaybackOptions};
pub use request::{Behavior, FadeOutCallback, Play, PlayRequest, TrackSelector};
pub use state::{ChannelOwnership, PendingPlay, PendingQueue};

#[cfg(feature = "pmoconfig")]
pub use config_ext::PlaybackConfigExt;
