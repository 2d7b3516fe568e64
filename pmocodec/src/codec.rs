//! Codec par défaut : décodage symphonia, encodage WAV ou FLAC

use crate::decode::SymphoniaProvider;
use crate::encode::{FlacConsumer, SampleDepth, WavConsumer};
use crate::{Codec, CodecError, EncodeFormat, FrameConsumer, FrameProvider, Result};
use std::io::{Read, Write};

/// Conteneur WAV (hound)
pub const WAV_CONTAINER: &str = "wav";
/// Conteneur FLAC (flacenc)
pub const FLAC_CONTAINER: &str = "flac";

/// Codec en processus
///
/// Le décodage détecte le conteneur sur le contenu du flux (WAV, FLAC,
/// MP3, OGG/Vorbis, AAC...). L'encodage ne produit que [`WAV_CONTAINER`]
/// et [`FLAC_CONTAINER`].
#[derive(Debug, Default, Clone)]
pub struct SymphoniaCodec;

impl SymphoniaCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Codec for SymphoniaCodec {
    fn name(&self) -> &str {
        "symphonia"
    }

    fn open_provider(&self, input: Box<dyn Read + Send>) -> Result<Box<dyn FrameProvider>> {
        Ok(Box::new(SymphoniaProvider::open(input)?))
    }

    fn open_consumer(
        &self,
        output: Box<dyn Write + Send>,
        format: &EncodeFormat,
    ) -> Result<Box<dyn FrameConsumer>> {
        format.audio.validate()?;
        let sample_format = format.sample_format.as_deref();

        match format.container.as_str() {
            WAV_CONTAINER => {
                let depth = SampleDepth::parse(sample_format, SampleDepth::Float32)?;
                Ok(Box::new(WavConsumer::new(output, format.audio, depth)?))
            }
            FLAC_CONTAINER => {
                let depth = SampleDepth::parse(sample_format, SampleDepth::Int(16))?;
                Ok(Box::new(FlacConsumer::new(output, format.audio, depth)?))
            }
            other => Err(CodecError::Unsupported(format!(
                "no encoder for container '{}'",
                other
            ))),
        }
    }
}
