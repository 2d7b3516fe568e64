//! Décodage via symphonia
//!
//! Le flux d'entrée n'est pas seekable : il est enveloppé dans un
//! [`ReadOnlySource`] et le format est détecté sur son contenu.

use crate::{AudioFormat, CodecError, FrameProvider, Result};
use std::io::{self, Read};
use std::sync::{Mutex, PoisonError};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSourceStream, ReadOnlySource};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Rend un `Read + Send` utilisable par symphonia, qui exige `Sync`
struct SyncReader(Mutex<Box<dyn Read + Send>>);

impl Read for SyncReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .read(buf)
    }
}

struct Decoding {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    samples: Option<SampleBuffer<f32>>,
}

/// Provider qui décode n'importe quel conteneur connu de symphonia
pub(crate) struct SymphoniaProvider {
    /// `None` une fois fermé
    decoding: Option<Decoding>,
    format: AudioFormat,
    /// Échantillons décodés pas encore rendus
    pending: Vec<f32>,
    cursor: usize,
    eof: bool,
}

impl SymphoniaProvider {
    pub(crate) fn open(input: Box<dyn Read + Send>) -> Result<Self> {
        let source = ReadOnlySource::new(SyncReader(Mutex::new(input)));
        let mss = MediaSourceStream::new(Box::new(source), Default::default());

        let detected = symphonia::default::get_probe().format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let reader = detected.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| CodecError::Unsupported("no decodable audio track".to_string()))?;

        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| CodecError::InvalidFormat("unknown sample rate".to_string()))?;
        let channels = track
            .codec_params
            .channels
            .map(|c| c.count() as u16)
            .ok_or_else(|| CodecError::InvalidFormat("unknown channel layout".to_string()))?;
        let format = AudioFormat::new(sample_rate, channels);
        format.validate()?;

        let track_id = track.id;
        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())?;

        debug!(%format, codec = ?track.codec_params.codec, "Opened decoder");

        Ok(Self {
            decoding: Some(Decoding {
                reader,
                decoder,
                track_id,
                samples: None,
            }),
            format,
            pending: Vec::new(),
            cursor: 0,
            eof: false,
        })
    }

    /// Décode le paquet suivant dans `pending` ; `false` en fin de flux
    fn decode_next(&mut self) -> Result<bool> {
        let decoding = self.decoding.as_mut().ok_or(CodecError::Closed)?;
        self.pending.clear();
        self.cursor = 0;

        loop {
            let packet = match decoding.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::ResetRequired) => {
                    decoding.decoder.reset();
                    continue;
                }
                Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Ok(false);
                }
                Err(e) => return Err(e.into()),
            };

            if packet.track_id() != decoding.track_id {
                continue;
            }

            let decoded = match decoding.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!(error = e, "Skipping undecodable packet");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let spec = *decoded.spec();
            if spec.channels.count() != self.format.channels as usize {
                return Err(CodecError::InvalidFormat(format!(
                    "channel count changed mid-stream: {} -> {}",
                    self.format.channels,
                    spec.channels.count()
                )));
            }

            let frames = decoded.capacity() as u64;
            let needed = decoded.capacity() * spec.channels.count();
            if decoding
                .samples
                .as_ref()
                .map_or(true, |buf| buf.capacity() < needed)
            {
                decoding.samples = Some(SampleBuffer::<f32>::new(frames, spec));
            }
            if let Some(samples) = decoding.samples.as_mut() {
                samples.copy_interleaved_ref(decoded);
                self.pending.extend_from_slice(samples.samples());
            }

            if !self.pending.is_empty() {
                return Ok(true);
            }
        }
    }
}

impl FrameProvider for SymphoniaProvider {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn read(&mut self, buffer: &mut [f32]) -> Result<Option<usize>> {
        if self.decoding.is_none() {
            return Err(CodecError::Closed);
        }
        let channels = self.format.channels as usize;
        let capacity = buffer.len() / channels * channels;
        if capacity == 0 {
            return Ok(Some(0));
        }

        while self.cursor >= self.pending.len() {
            if self.eof || !self.decode_next()? {
                self.eof = true;
                return Ok(None);
            }
        }

        let n = (self.pending.len() - self.cursor).min(capacity);
        buffer[..n].copy_from_slice(&self.pending[self.cursor..self.cursor + n]);
        self.cursor += n;
        Ok(Some(n))
    }

    fn close(&mut self) -> Result<()> {
        self.decoding.take();
        self.pending.clear();
        Ok(())
    }
}
