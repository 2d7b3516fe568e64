//! Coordinateur de cache : au plus un transcodage en cours par piste

use crate::transcode::{negotiate_format, Transcoder};
use crate::{CacheError, Result, WorkerPool};
use futures::future::{BoxFuture, FutureExt, Shared};
use pmocache::Resource;
use pmocodec::{Codec, EncodeFormat};
use pmolibrary::{Library, TrackId};
use pmosource::TrackResult;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use uuid::Uuid;

const EVENT_CAPACITY: usize = 64;

/// Issue partagée d'un job de cache
pub type CacheOutcome = std::result::Result<Arc<dyn Resource>, Arc<CacheError>>;

/// Événements émis par le coordinateur
#[derive(Debug, Clone)]
pub enum CacheEvent {
    Started { track_id: TrackId, uuid: Uuid },
    Finished { track_id: TrackId, uuid: Uuid, frames: u64 },
    Failed { track_id: TrackId, uuid: Uuid, error: String },
}

/// Handle vers un job de cache en cours
///
/// Tous les appelants qui demandent la même piste pendant le job reçoivent
/// un clone du même handle.
#[derive(Clone)]
pub struct CacheHandle {
    track_id: TrackId,
    inner: Shared<BoxFuture<'static, CacheOutcome>>,
}

impl CacheHandle {
    pub fn track_id(&self) -> TrackId {
        self.track_id
    }

    /// Attend la fin du job
    pub async fn wait(self) -> CacheOutcome {
        self.inner.await
    }
}

impl std::fmt::Debug for CacheHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheHandle")
            .field("track_id", &self.track_id)
            .finish_non_exhaustive()
    }
}

type InFlight = Arc<Mutex<HashMap<TrackId, CacheHandle>>>;

/// Retire l'entrée de la map à la fin du job, quelle qu'en soit l'issue
struct InFlightGuard {
    in_flight: InFlight,
    track_id: TrackId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        match self.in_flight.lock() {
            Ok(mut map) => {
                map.remove(&self.track_id);
            }
            Err(poisoned) => {
                poisoned.into_inner().remove(&self.track_id);
            }
        }
    }
}

pub struct CacheCoordinator {
    library: Arc<dyn Library>,
    transcoder: Transcoder,
    pool: WorkerPool,
    default_format: EncodeFormat,
    in_flight: InFlight,
    events: broadcast::Sender<CacheEvent>,
}

impl CacheCoordinator {
    /// * `transcode_buffer` - frames lues par itération du pipeline
    /// * `default_format` - format utilisé quand le dépôt n'en impose pas
    pub fn new(
        library: Arc<dyn Library>,
        codec: Arc<dyn Codec>,
        pool: WorkerPool,
        transcode_buffer: usize,
        default_format: EncodeFormat,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            library,
            transcoder: Transcoder::new(codec, transcode_buffer),
            pool,
            default_format,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    /// Remplace le transcodeur (limites de lecture, codec de test...)
    pub fn with_transcoder(mut self, transcoder: Transcoder) -> Self {
        self.transcoder = transcoder;
        self
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Le cache peut-il accepter des jobs
    pub fn is_enabled(&self) -> bool {
        self.pool.is_enabled()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_caching(&self, track_id: TrackId) -> bool {
        self.in_flight
            .lock()
            .map(|m| m.contains_key(&track_id))
            .unwrap_or(false)
    }

    /// Lance (ou rejoint) la mise en cache du résultat dans sa ressource
    ///
    /// Doit être appelé depuis un runtime tokio. Une ressource non inscriptible
    /// échoue sans créer de job. Le job s'exécute jusqu'au bout même si le
    /// handle est abandonné.
    pub fn cache_async(&self, result: Arc<TrackResult>) -> Result<CacheHandle> {
        let resource = result.resource().clone();
        if !resource.can_write() {
            return Err(CacheError::ReadOnly(resource.uuid()));
        }
        if !self.pool.is_enabled() {
            return Err(CacheError::Disabled);
        }
        let track_id = result.track()?.id;

        let mut in_flight = self
            .in_flight
            .lock()
            .map_err(|_| CacheError::Worker("in-flight map poisoned".to_string()))?;
        if let Some(handle) = in_flight.get(&track_id) {
            tracing::debug!(track_id, "Joining in-flight cache job");
            return Ok(handle.clone());
        }

        let guard = InFlightGuard {
            in_flight: self.in_flight.clone(),
            track_id,
        };
        let job = CacheJob {
            library: self.library.clone(),
            transcoder: self.transcoder.clone(),
            pool: self.pool.clone(),
            format: negotiate_format(resource.format(), &self.default_format),
            events: self.events.clone(),
            result,
            resource,
            track_id,
        };
        let future: BoxFuture<'static, CacheOutcome> = async move {
            let _guard = guard;
            job.run().await
        }
        .boxed();

        let handle = CacheHandle {
            track_id,
            inner: future.shared(),
        };
        in_flight.insert(track_id, handle.clone());
        drop(in_flight);

        tokio::spawn(handle.clone().wait());
        Ok(handle)
    }
}

impl std::fmt::Debug for CacheCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheCoordinator")
            .field("pool", &self.pool)
            .field("transcoder", &self.transcoder)
            .field("default_format", &self.default_format)
            .finish_non_exhaustive()
    }
}

struct CacheJob {
    library: Arc<dyn Library>,
    transcoder: Transcoder,
    pool: WorkerPool,
    format: EncodeFormat,
    events: broadcast::Sender<CacheEvent>,
    result: Arc<TrackResult>,
    resource: Arc<dyn Resource>,
    track_id: TrackId,
}

impl CacheJob {
    async fn run(self) -> CacheOutcome {
        let uuid = self.resource.uuid();
        let track_id = self.track_id;
        tracing::info!(track_id, %uuid, container = %self.format.container, "Caching track");
        let _ = self.events.send(CacheEvent::Started { track_id, uuid });

        let library = self.library.clone();
        let transcoder = self.transcoder.clone();
        let result = self.result.clone();
        let resource = self.resource.clone();
        let format = self.format.clone();
        let repository_id = self.result.community().repository_id;

        let outcome = self
            .pool
            .run(move || {
                let frames = transcoder.run(&result, resource.as_ref(), &format)?;
                if library.track_file(track_id, repository_id)?.is_none() {
                    library.create_track_file(track_id, repository_id, resource.uuid())?;
                }
                Ok(frames)
            })
            .await;

        match outcome {
            Ok(frames) => {
                tracing::info!(track_id, %uuid, frames, "Track cached");
                let _ = self.events.send(CacheEvent::Finished {
                    track_id,
                    uuid,
                    frames,
                });
                Ok(self.resource)
            }
            Err(error) => {
                let error = match self.resource.delete() {
                    Ok(()) => {
                        tracing::warn!(track_id, %uuid, error = %error, "Caching failed");
                        error
                    }
                    Err(cleanup) => {
                        tracing::warn!(
                            track_id,
                            %uuid,
                            error = %error,
                            cleanup_error = %cleanup,
                            "Caching failed and partial resource could not be deleted"
                        );
                        CacheError::CleanupFailed {
                            error: Box::new(error),
                            cleanup,
                        }
                    }
                };
                let _ = self.events.send(CacheEvent::Failed {
                    track_id,
                    uuid,
                    error: error.to_string(),
                });
                Err(Arc::new(error))
            }
        }
    }
}
