//! # pmoaudiocache - Mise en cache transcodée des pistes
//!
//! Le [`CacheCoordinator`] garantit qu'une piste n'est transcodée qu'une
//! seule fois à la fois : une demande pour une piste déjà en cours rejoint
//! le job existant via un [`CacheHandle`] partagé.
//!
//! Le job :
//!
//! 1. ouvre un provider depuis le résultat de résolution ;
//! 2. négocie le format cible à partir du format du dépôt ;
//! 3. rééchantillonne puis encode vers la ressource, avec vidage explicite du
//!    resampler en fin de flux ;
//! 4. enregistre le `TrackFile` s'il n'existe pas.
//!
//! En cas d'échec, la ressource partielle est supprimée, l'erreur est
//! journalisée et transmise au seul handle. La lecture qui a déclenché le
//! cache n'est jamais affectée.

mod coordinator;
mod error;
mod pool;
mod transcode;

#[cfg(feature = "pmoconfig")]
mod config_ext;

pub use coordinator::{CacheCoordinator, CacheEvent, CacheHandle, CacheOutcome};
pub use error::{CacheError, Result};
pub use pool::WorkerPool;
pub use transcode::{negotiate_format, Transcoder, MAX_IDLE_READS};

#[cfg(feature = "pmoconfig")]
pub use config_ext::AudioCacheConfigExt;
