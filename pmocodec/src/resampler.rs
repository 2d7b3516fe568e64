//! Resampler libsoxr
//!
//! La conversion de fréquence passe par [`soxr`] en stéréo `f32` ; le
//! nombre de canaux est ramené à deux avant, puis au nombre de sortie
//! après. Quand les fréquences sont identiques, seul le mappage des
//! canaux est appliqué.

use crate::{AudioFormat, CodecError, Resampler, Result};
use soxr::format::Stereo;
use soxr::params::{QualityRecipe, QualitySpec, RuntimeSpec};
use soxr::Soxr;

/// Marge de frames ajoutée au buffer de sortie de soxr
const OUTPUT_SLACK: usize = 64;

/// Frames récupérés par appel à `drain`
const DRAIN_CHUNK: usize = 1024;

/// Resampler en flux continu basé sur libsoxr
pub struct SoxrResampler {
    input: AudioFormat,
    output: AudioFormat,
    /// `None` quand les fréquences sont identiques
    soxr: Option<Soxr<Stereo<f32>>>,
    frames_in: Vec<[f32; 2]>,
    frames_out: Vec<[f32; 2]>,
}

impl SoxrResampler {
    pub fn new(input: AudioFormat, output: AudioFormat, buffer_size: usize) -> Result<Self> {
        input.validate()?;
        output.validate()?;
        if buffer_size == 0 {
            return Err(CodecError::InvalidFormat(
                "resampler buffer size must be positive".to_string(),
            ));
        }

        let soxr = if input.sample_rate == output.sample_rate {
            None
        } else {
            // Échantillons flottants : qualité des profondeurs 24/32 bits
            let quality = QualitySpec::new(QualityRecipe::very_high());
            let rt = RuntimeSpec::default();
            let soxr = Soxr::<Stereo<f32>>::new_with_params(
                input.sample_rate as f64,
                output.sample_rate as f64,
                quality,
                rt,
            )
            .map_err(|e| CodecError::Resampler(e.to_string()))?;
            Some(soxr)
        };

        tracing::trace!(%input, %output, buffer_size, "Creating soxr resampler");

        Ok(Self {
            input,
            output,
            soxr,
            frames_in: Vec::with_capacity(buffer_size),
            frames_out: Vec::new(),
        })
    }

    /// Capacité de sortie suffisante pour `frames` frames d'entrée
    fn output_capacity(&self, frames: usize) -> usize {
        let ratio = self.output.sample_rate as f64 / self.input.sample_rate as f64;
        (frames as f64 * ratio).ceil() as usize + OUTPUT_SLACK
    }

    fn push_output(&self, frames: &[[f32; 2]], output: &mut Vec<f32>) {
        for frame in frames {
            push_frame(frame, self.output.channels as usize, output);
        }
    }
}

/// Ramène un frame d'entrée en stéréo
fn to_stereo(frame: &[f32]) -> [f32; 2] {
    match frame {
        [mono] => [*mono, *mono],
        [left, right, ..] => [*left, *right],
        [] => [0.0, 0.0],
    }
}

/// Écrit un frame stéréo avec `channels` canaux
fn push_frame(frame: &[f32; 2], channels: usize, output: &mut Vec<f32>) {
    match channels {
        1 => output.push((frame[0] + frame[1]) / 2.0),
        2 => output.extend_from_slice(frame),
        n => {
            output.extend_from_slice(frame);
            // Canaux supplémentaires : copie du dernier canal stéréo
            output.extend(std::iter::repeat(frame[1]).take(n - 2));
        }
    }
}

impl Resampler for SoxrResampler {
    fn input_format(&self) -> AudioFormat {
        self.input
    }

    fn output_format(&self) -> AudioFormat {
        self.output
    }

    fn resample(&mut self, input: &[f32], output: &mut Vec<f32>) -> Result<()> {
        let in_ch = self.input.channels as usize;
        if input.len() % in_ch != 0 {
            return Err(CodecError::InvalidFormat(format!(
                "{} samples is not a whole number of {}-channel frames",
                input.len(),
                in_ch
            )));
        }

        // Fréquences identiques : mappage des canaux seulement
        if self.soxr.is_none() {
            if in_ch == self.output.channels as usize {
                output.extend_from_slice(input);
            } else {
                for frame in input.chunks_exact(in_ch) {
                    push_frame(&to_stereo(frame), self.output.channels as usize, output);
                }
            }
            return Ok(());
        }

        self.frames_in.clear();
        self.frames_in.extend(input.chunks_exact(in_ch).map(to_stereo));

        let capacity = self.output_capacity(self.frames_in.len());
        let mut frames_out = std::mem::take(&mut self.frames_out);
        frames_out.resize(capacity, [0.0; 2]);

        let mut consumed = 0;
        let outcome = loop {
            let Some(soxr) = self.soxr.as_mut() else {
                break Ok(());
            };
            let processed = match soxr.process(&self.frames_in[consumed..], &mut frames_out) {
                Ok(processed) => processed,
                Err(e) => break Err(CodecError::Resampler(e.to_string())),
            };
            consumed += processed.input_frames;
            self.push_output(&frames_out[..processed.output_frames], output);

            if consumed >= self.frames_in.len()
                || (processed.input_frames == 0 && processed.output_frames == 0)
            {
                break Ok(());
            }
        };

        self.frames_out = frames_out;
        outcome
    }

    fn flush(&mut self, output: &mut Vec<f32>) -> Result<()> {
        let mut frames_out = std::mem::take(&mut self.frames_out);
        frames_out.resize(DRAIN_CHUNK, [0.0; 2]);

        let outcome = loop {
            let Some(soxr) = self.soxr.as_mut() else {
                break Ok(());
            };
            match soxr.drain(&mut frames_out) {
                Ok(0) => break Ok(()),
                Ok(n) => self.push_output(&frames_out[..n], output),
                Err(e) => break Err(CodecError::Resampler(e.to_string())),
            }
        };

        self.frames_out = frames_out;
        outcome
    }
}
