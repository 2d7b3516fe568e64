//! Pipeline décodage → rééchantillonnage → encodage
//!
//! La fin du flux doit être signalée explicitement par le provider : un
//! amont qui cesse de produire sans fin de flux fait échouer le job, pour ne
//! jamais enregistrer un fichier tronqué.

use crate::{CacheError, Result};
use pmocache::Resource;
use pmocodec::{AudioFormat, Codec, EncodeFormat, FrameProvider};
use pmolibrary::DownloadFormat;
use pmosource::TrackResult;
use std::sync::Arc;
use std::time::Duration;

/// Lectures vides consécutives tolérées avant d'abandonner
pub const MAX_IDLE_READS: usize = 500;
const IDLE_WAIT: Duration = Duration::from_millis(10);

/// Format cible : celui du dépôt, complété par le format par défaut
pub fn negotiate_format(repository: Option<&DownloadFormat>, default: &EncodeFormat) -> EncodeFormat {
    let Some(format) = repository else {
        return default.clone();
    };
    let container = if format.container.is_empty() {
        default.container.clone()
    } else {
        format.container.clone()
    };
    // Un autre conteneur n'hérite pas des réglages du codec par défaut
    let inherit = container == default.container;
    EncodeFormat {
        codec: format
            .codec
            .clone()
            .or_else(|| inherit.then(|| default.codec.clone()).flatten()),
        bitrate: format.bitrate.or(if inherit { default.bitrate } else { None }),
        sample_format: format
            .sample_format
            .clone()
            .or_else(|| inherit.then(|| default.sample_format.clone()).flatten()),
        audio: AudioFormat::new(
            format.sample_rate.unwrap_or(default.audio.sample_rate),
            format.channels.unwrap_or(default.audio.channels),
        ),
        container,
    }
}

#[derive(Clone)]
pub struct Transcoder {
    codec: Arc<dyn Codec>,
    buffer_frames: usize,
    max_idle_reads: usize,
}

impl Transcoder {
    pub fn new(codec: Arc<dyn Codec>, buffer_frames: usize) -> Self {
        Self {
            codec,
            buffer_frames: buffer_frames.max(1),
            max_idle_reads: MAX_IDLE_READS,
        }
    }

    pub fn with_max_idle_reads(mut self, reads: usize) -> Self {
        self.max_idle_reads = reads;
        self
    }

    /// Transcode le résultat vers la ressource ; retourne le nombre de frames écrites
    ///
    /// Appel bloquant.
    pub fn run(
        &self,
        result: &TrackResult,
        resource: &dyn Resource,
        format: &EncodeFormat,
    ) -> Result<u64> {
        let input = result.open()?;
        let mut provider = self.codec.open_provider(input)?;
        let outcome = self.pump(provider.as_mut(), resource, format);
        let closed = provider.close();
        let frames = outcome?;
        closed?;
        Ok(frames)
    }

    fn pump(
        &self,
        provider: &mut dyn FrameProvider,
        resource: &dyn Resource,
        format: &EncodeFormat,
    ) -> Result<u64> {
        let input_format = provider.format();
        let mut resampler =
            self.codec
                .open_resampler(input_format, format.audio, self.buffer_frames)?;
        let mut consumer = self.codec.open_consumer(resource.open_write()?, format)?;

        let mut buffer = vec![0f32; self.buffer_frames * input_format.channels as usize];
        let mut output = Vec::with_capacity(
            (buffer.len() as f64 * resampler.scale()).ceil() as usize + 64,
        );
        let out_channels = format.audio.channels as u64;
        let mut written = 0u64;
        let mut read_frames = 0u64;
        let mut idle = 0usize;

        loop {
            output.clear();
            match provider.read(&mut buffer)? {
                None => {
                    resampler.flush(&mut output)?;
                    consumer.write(&output)?;
                    written += output.len() as u64 / out_channels;
                    break;
                }
                Some(0) => {
                    idle += 1;
                    if idle > self.max_idle_reads {
                        return Err(CacheError::UnexpectedEnd { frames: read_frames });
                    }
                    std::thread::sleep(IDLE_WAIT);
                }
                Some(n) => {
                    idle = 0;
                    read_frames += n as u64 / input_format.channels as u64;
                    resampler.resample(&buffer[..n], &mut output)?;
                    consumer.write(&output)?;
                    written += output.len() as u64 / out_channels;
                }
            }
        }

        consumer.finish()?;
        tracing::debug!(
            uuid = %resource.uuid(),
            input = %input_format,
            output = %format.audio,
            frames = written,
            "Transcode complete"
        );
        Ok(written)
    }
}

impl std::fmt::Debug for Transcoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transcoder")
            .field("codec", &self.codec.name())
            .field("buffer_frames", &self.buffer_frames)
            .finish()
    }
}
