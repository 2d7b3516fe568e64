//! # pmocodec - Frontière codec de PMOMusic
//!
//! Cette crate définit les primitives opaques utilisées par le reste du
//! système pour manipuler de l'audio :
//!
//! - [`FrameProvider`] : décode un flux d'octets encodés en frames flottantes
//! - [`FrameConsumer`] : encode des frames flottantes vers un flux d'octets
//! - [`Resampler`] : convertit fréquence d'échantillonnage et nombre de canaux
//! - [`Codec`] : fabrique les trois objets précédents
//!
//! Les échantillons sont toujours des `f32` entrelacés (`L R L R ...`).
//!
//! ## Implémentations fournies
//!
//! - [`SymphoniaCodec`] : décode via symphonia, encode en WAV (hound) ou FLAC (flacenc)
//! - [`SoxrResampler`] : resampling libsoxr, utilisé par défaut
//! - [`ResampledProvider`] : adaptateur qui présente un provider au format d'un mixeur
//!
//! ```rust
//! use pmocodec::{AudioFormat, Codec, SymphoniaCodec};
//!
//! let codec = SymphoniaCodec::new();
//! let resampler = codec
//!     .open_resampler(AudioFormat::new(44_100, 2), AudioFormat::new(48_000, 2), 1024)
//!     .unwrap();
//! assert!(resampler.scale() > 1.0);
//! ```

mod adapter;
mod codec;
mod decode;
mod encode;
mod error;
mod resampler;

pub use adapter::{AdapterError, ResampledProvider};
pub use codec::{SymphoniaCodec, FLAC_CONTAINER, WAV_CONTAINER};
pub use encode::encode_wav;
pub use error::{CodecError, Result};
pub use resampler::SoxrResampler;

use std::fmt;
use std::io::{Read, Write};

/// Format brut d'un flux de frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    /// Fréquence d'échantillonnage en Hz
    pub sample_rate: u32,
    /// Nombre de canaux entrelacés
    pub channels: u16,
}

impl AudioFormat {
    pub const fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Durée en secondes d'un nombre de frames
    pub fn frames_to_seconds(&self, frames: u64) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        frames as f64 / self.sample_rate as f64
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 || self.channels == 0 {
            return Err(CodecError::InvalidFormat(format!(
                "invalid audio format {}",
                self
            )));
        }
        Ok(())
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Hz/{}ch", self.sample_rate, self.channels)
    }
}

/// Format d'encodage demandé à un [`FrameConsumer`]
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeFormat {
    /// Conteneur (ex: `"flac"`, `"wav"`)
    pub container: String,
    /// Codec à l'intérieur du conteneur, si différent du défaut
    pub codec: Option<String>,
    /// Débit en bits/s pour les codecs avec perte
    pub bitrate: Option<u32>,
    /// Format d'échantillon (ex: `"s16"`, `"flt"`)
    pub sample_format: Option<String>,
    /// Fréquence et canaux de sortie
    pub audio: AudioFormat,
}

impl EncodeFormat {
    pub fn new(container: impl Into<String>, audio: AudioFormat) -> Self {
        Self {
            container: container.into(),
            codec: None,
            bitrate: None,
            sample_format: None,
            audio,
        }
    }
}

/// Source de frames flottantes décodées
pub trait FrameProvider: Send {
    /// Format des frames produites
    fn format(&self) -> AudioFormat;

    /// Remplit `buffer` avec des échantillons entrelacés.
    ///
    /// Retourne le nombre d'échantillons écrits (toujours un multiple du
    /// nombre de canaux), `Ok(Some(0))` si aucune donnée n'est disponible
    /// pour l'instant, et `Ok(None)` à la fin attendue du flux.
    fn read(&mut self, buffer: &mut [f32]) -> Result<Option<usize>>;

    /// Libère le flux sous-jacent
    fn close(&mut self) -> Result<()>;
}

/// Puits de frames flottantes à encoder
pub trait FrameConsumer: Send {
    fn format(&self) -> AudioFormat;

    /// Encode des échantillons entrelacés
    fn write(&mut self, samples: &[f32]) -> Result<()>;

    /// Vide les tampons de l'encodeur et ferme le flux de sortie
    fn finish(&mut self) -> Result<()>;
}

/// Convertisseur de fréquence et de canaux
pub trait Resampler: Send {
    fn input_format(&self) -> AudioFormat;
    fn output_format(&self) -> AudioFormat;

    /// Rapport entre fréquence de sortie et fréquence d'entrée
    fn scale(&self) -> f64 {
        self.output_format().sample_rate as f64 / self.input_format().sample_rate as f64
    }

    /// Convertit `input` et ajoute le résultat à la fin de `output`
    fn resample(&mut self, input: &[f32], output: &mut Vec<f32>) -> Result<()>;

    /// Émet les échantillons encore retenus après la fin de l'entrée
    fn flush(&mut self, output: &mut Vec<f32>) -> Result<()>;
}

/// Fabrique de providers, consumers et resamplers
pub trait Codec: Send + Sync {
    fn name(&self) -> &str;

    fn open_provider(&self, input: Box<dyn Read + Send>) -> Result<Box<dyn FrameProvider>>;

    fn open_consumer(
        &self,
        output: Box<dyn Write + Send>,
        format: &EncodeFormat,
    ) -> Result<Box<dyn FrameConsumer>>;

    fn open_resampler(
        &self,
        input: AudioFormat,
        output: AudioFormat,
        buffer_size: usize,
    ) -> Result<Box<dyn Resampler>> {
        Ok(Box::new(SoxrResampler::new(input, output, buffer_size)?))
    }
}
