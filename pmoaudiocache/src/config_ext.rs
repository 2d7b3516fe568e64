//! Extension pour intégrer le coordinateur de cache dans pmoconfig
//!
//! Clés lues :
//!
//! - `music.cache.pool` : `fixed`, `cached` ou `disabled`
//! - `music.cache.pool_size` : nombre de workers pour `fixed`
//! - `music.cache.transcode_buffer` : frames lues par itération
//! - `music.default_format.*` : format d'encodage par défaut

use crate::{CacheCoordinator, WorkerPool};
use anyhow::Result;
use pmocodec::{AudioFormat, Codec, EncodeFormat};
use pmoconfig::Config;
use pmolibrary::Library;
use std::sync::Arc;

const DEFAULT_POOL: &str = "fixed";
const DEFAULT_POOL_SIZE: i64 = 2;
const DEFAULT_TRANSCODE_BUFFER: i64 = 4096;
const DEFAULT_CONTAINER: &str = "flac";
const DEFAULT_SAMPLE_RATE: i64 = 48_000;
const DEFAULT_CHANNELS: i64 = 2;

/// Trait d'extension pour gérer le cache audio dans pmoconfig
///
/// ```rust,ignore
/// use pmoconfig::get_config;
/// use pmoaudiocache::AudioCacheConfigExt;
///
/// let coordinator = get_config().create_cache_coordinator(library, codec)?;
/// ```
pub trait AudioCacheConfigExt {
    fn get_cache_pool(&self) -> String;

    fn get_cache_pool_size(&self) -> usize;

    fn get_transcode_buffer(&self) -> usize;

    /// Format d'encodage utilisé quand un dépôt n'en configure pas
    fn get_default_format(&self) -> EncodeFormat;

    fn create_worker_pool(&self) -> Result<WorkerPool>;

    fn create_cache_coordinator(
        &self,
        library: Arc<dyn Library>,
        codec: Arc<dyn Codec>,
    ) -> Result<CacheCoordinator>;
}

fn non_negative(value: i64) -> usize {
    usize::try_from(value).unwrap_or(0)
}

impl AudioCacheConfigExt for Config {
    fn get_cache_pool(&self) -> String {
        self.get_string_or(&["music", "cache", "pool"], DEFAULT_POOL)
    }

    fn get_cache_pool_size(&self) -> usize {
        non_negative(self.get_i64_or(&["music", "cache", "pool_size"], DEFAULT_POOL_SIZE))
    }

    fn get_transcode_buffer(&self) -> usize {
        non_negative(self.get_i64_or(
            &["music", "cache", "transcode_buffer"],
            DEFAULT_TRANSCODE_BUFFER,
        ))
        .max(1)
    }

    fn get_default_format(&self) -> EncodeFormat {
        let optional_string = |key: &str| {
            let value = self.get_string_or(&["music", "default_format", key], "");
            (!value.is_empty()).then_some(value)
        };
        let rate = self.get_i64_or(&["music", "default_format", "sample_rate"], DEFAULT_SAMPLE_RATE);
        let channels = self.get_i64_or(&["music", "default_format", "channels"], DEFAULT_CHANNELS);
        let bitrate = self.get_i64_or(&["music", "default_format", "bitrate"], 0);

        EncodeFormat {
            container: self.get_string_or(&["music", "default_format", "container"], DEFAULT_CONTAINER),
            codec: optional_string("codec"),
            bitrate: u32::try_from(bitrate).ok().filter(|b| *b > 0),
            sample_format: optional_string("sample_format"),
            audio: AudioFormat::new(
                u32::try_from(rate).unwrap_or(DEFAULT_SAMPLE_RATE as u32),
                u16::try_from(channels).unwrap_or(DEFAULT_CHANNELS as u16),
            ),
        }
    }

    fn create_worker_pool(&self) -> Result<WorkerPool> {
        Ok(WorkerPool::from_config(
            &self.get_cache_pool(),
            self.get_cache_pool_size(),
        )?)
    }

    fn create_cache_coordinator(
        &self,
        library: Arc<dyn Library>,
        codec: Arc<dyn Codec>,
    ) -> Result<CacheCoordinator> {
        let pool = self.create_worker_pool()?;
        tracing::info!(pool = ?pool, "Cache worker pool configured");
        Ok(CacheCoordinator::new(
            library,
            codec,
            pool,
            self.get_transcode_buffer(),
            self.get_default_format(),
        ))
    }
}
