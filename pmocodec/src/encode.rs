//! Encodeurs WAV (hound) et FLAC (flacenc)

use crate::{AudioFormat, CodecError, FrameConsumer, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::fs::File;
use std::io::{self, BufWriter, Cursor, Seek, SeekFrom, Write};

/// Représentation des échantillons dans le fichier produit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SampleDepth {
    Float32,
    Int(u16),
}

impl SampleDepth {
    /// Interprète `EncodeFormat::sample_format` (`"flt"`, `"s16"`, `"s24"`, `"s32"`)
    pub(crate) fn parse(sample_format: Option<&str>, default: SampleDepth) -> Result<Self> {
        match sample_format {
            None => Ok(default),
            Some("flt") | Some("f32") => Ok(SampleDepth::Float32),
            Some("s16") => Ok(SampleDepth::Int(16)),
            Some("s24") => Ok(SampleDepth::Int(24)),
            Some("s32") => Ok(SampleDepth::Int(32)),
            Some(other) => Err(CodecError::Unsupported(format!(
                "sample format '{}'",
                other
            ))),
        }
    }

    fn wav_spec(self, format: AudioFormat) -> WavSpec {
        let (bits_per_sample, sample_format) = match self {
            SampleDepth::Float32 => (32, SampleFormat::Float),
            SampleDepth::Int(bits) => (bits, SampleFormat::Int),
        };
        WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample,
            sample_format,
        }
    }
}

/// Convertit un échantillon flottant en entier signé sur `bits` bits
fn to_int(sample: f32, bits: u16) -> i32 {
    let max = ((1i64 << (bits - 1)) - 1) as f64;
    (sample.clamp(-1.0, 1.0) as f64 * max).round() as i32
}

/// Encode un buffer complet en WAV flottant, en mémoire
pub fn encode_wav(format: AudioFormat, samples: &[f32]) -> Result<Vec<u8>> {
    format.validate()?;
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, SampleDepth::Float32.wav_spec(format))?;
        for s in samples {
            writer.write_sample(*s)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Consumer WAV
///
/// L'en-tête WAV n'est complet qu'à la fin : les échantillons sont
/// écrits dans un fichier temporaire, recopié vers la sortie par
/// [`FrameConsumer::finish`].
pub(crate) struct WavConsumer {
    writer: Option<WavWriter<BufWriter<File>>>,
    spool: File,
    output: Option<Box<dyn Write + Send>>,
    format: AudioFormat,
    depth: SampleDepth,
}

impl WavConsumer {
    pub(crate) fn new(
        output: Box<dyn Write + Send>,
        format: AudioFormat,
        depth: SampleDepth,
    ) -> Result<Self> {
        let spool = tempfile::tempfile()?;
        let writer = WavWriter::new(BufWriter::new(spool.try_clone()?), depth.wav_spec(format))?;
        Ok(Self {
            writer: Some(writer),
            spool,
            output: Some(output),
            format,
            depth,
        })
    }
}

impl FrameConsumer for WavConsumer {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn write(&mut self, samples: &[f32]) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(CodecError::Closed)?;
        match self.depth {
            SampleDepth::Float32 => {
                for s in samples {
                    writer.write_sample(*s)?;
                }
            }
            SampleDepth::Int(16) => {
                for s in samples {
                    writer.write_sample(to_int(*s, 16) as i16)?;
                }
            }
            SampleDepth::Int(bits) => {
                for s in samples {
                    writer.write_sample(to_int(*s, bits))?;
                }
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let writer = self.writer.take().ok_or(CodecError::Closed)?;
        let mut output = self.output.take().ok_or(CodecError::Closed)?;
        writer.finalize()?;

        self.spool.seek(SeekFrom::Start(0))?;
        io::copy(&mut self.spool, &mut output)?;
        output.flush()?;
        Ok(())
    }
}

/// Consumer FLAC
///
/// flacenc encode un flux complet : les échantillons entiers sont
/// accumulés puis encodés par [`FrameConsumer::finish`].
pub(crate) struct FlacConsumer {
    samples: Vec<i32>,
    output: Option<Box<dyn Write + Send>>,
    format: AudioFormat,
    bits_per_sample: u16,
}

impl FlacConsumer {
    pub(crate) fn new(
        output: Box<dyn Write + Send>,
        format: AudioFormat,
        depth: SampleDepth,
    ) -> Result<Self> {
        let bits_per_sample = match depth {
            SampleDepth::Int(bits) if bits <= 24 => bits,
            // FLAC plafonne à 24 bits utiles
            SampleDepth::Int(_) | SampleDepth::Float32 => 24,
        };
        Ok(Self {
            samples: Vec::new(),
            output: Some(output),
            format,
            bits_per_sample,
        })
    }

    fn encode(&self) -> Result<Vec<u8>> {
        use flacenc::bitsink::ByteSink;
        use flacenc::component::BitRepr;
        use flacenc::error::Verify;

        let config = flacenc::config::Encoder::default()
            .into_verified()
            .map_err(|e| CodecError::Encode(format!("FLAC config error: {e:?}")))?;

        let source = flacenc::source::MemSource::from_samples(
            &self.samples,
            self.format.channels as usize,
            self.bits_per_sample as usize,
            self.format.sample_rate as usize,
        );

        let flac_stream = flacenc::encode_with_fixed_block_size(&config, source, config.block_size)
            .map_err(|e| CodecError::Encode(format!("FLAC encode error: {e:?}")))?;

        let mut sink = ByteSink::new();
        flac_stream
            .write(&mut sink)
            .map_err(|e| CodecError::Encode(format!("FLAC write error: {e:?}")))?;

        Ok(sink.into_inner())
    }
}

impl FrameConsumer for FlacConsumer {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn write(&mut self, samples: &[f32]) -> Result<()> {
        if self.output.is_none() {
            return Err(CodecError::Closed);
        }
        let bits = self.bits_per_sample;
        self.samples.extend(samples.iter().map(|s| to_int(*s, bits)));
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let mut output = self.output.take().ok_or(CodecError::Closed)?;
        let bytes = self.encode()?;
        self.samples = Vec::new();

        tracing::debug!(
            format = %self.format,
            bytes = bytes.len(),
            "FLAC stream encoded"
        );

        output.write_all(&bytes)?;
        output.flush()?;
        Ok(())
    }
}
