//! # pmoplaylist - Playlists de PMOMusic
//!
//! - [`TrackQueue`] : ce qui joue ensuite (FIFO, boucle, recherche)
//! - [`Playlist`] : séquence de lectures qui s'enchaînent d'elles-mêmes au
//!   fade-out de chaque piste
//! - [`Music`] : registre du processus, une playlist au plus par canal
//!
//! ```rust,ignore
//! let music = Music::new(playback.clone());
//! let playlist = music
//!     .start_playlist(
//!         Playlist::builder(playback, community, "lobby", owner, TrackQueue::fifo(tracks))
//!             .on_track_changed(|_, track| println!("Now playing {}", track.name)),
//!     )
//!     .await?;
//! ```

mod error;
mod music;
mod playlist;
mod queue;

pub use error::{PlaylistError, Result};
pub use music::Music;
pub use playlist::{
    Playlist, PlaylistBuilder, PlaylistListener, TrackChangedListener, TransferListener,
};
pub use queue::{SearchCursor, TrackQueue, SEARCH_PAGE_SIZE, UNBOUNDED};
