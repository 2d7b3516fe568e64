//! Adaptateur de format pour les providers
//!
//! Un mixeur impose sa fréquence et son nombre de canaux ; quand un
//! provider ne correspond pas, il est enveloppé dans un [`ResampledProvider`].

use crate::{AudioFormat, CodecError, FrameProvider, Resampler, Result};

/// Échec de [`ResampledProvider::new`]
///
/// Le provider est rendu à l'appelant, qui reste chargé de le fermer.
pub struct AdapterError {
    pub error: CodecError,
    pub provider: Box<dyn FrameProvider>,
}

impl std::fmt::Debug for AdapterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterError")
            .field("error", &self.error)
            .field("provider", &self.provider.format())
            .finish()
    }
}

impl From<AdapterError> for CodecError {
    fn from(e: AdapterError) -> Self {
        e.error
    }
}

/// Provider qui convertit à la volée un autre provider
pub struct ResampledProvider {
    inner: Box<dyn FrameProvider>,
    resampler: Box<dyn Resampler>,
    input: Vec<f32>,
    ready: Vec<f32>,
    cursor: usize,
    eof: bool,
}

impl ResampledProvider {
    /// Enveloppe `inner` ; `buffer_size` est le nombre de frames lus par
    /// appel au provider source.
    pub fn new(
        inner: Box<dyn FrameProvider>,
        resampler: Box<dyn Resampler>,
        buffer_size: usize,
    ) -> std::result::Result<Self, AdapterError> {
        if resampler.input_format() != inner.format() {
            return Err(AdapterError {
                error: CodecError::InvalidFormat(format!(
                    "resampler expects {}, provider produces {}",
                    resampler.input_format(),
                    inner.format()
                )),
                provider: inner,
            });
        }
        let samples = buffer_size.max(1) * inner.format().channels as usize;
        Ok(Self {
            inner,
            resampler,
            input: vec![0.0; samples],
            ready: Vec::with_capacity(samples * 2),
            cursor: 0,
            eof: false,
        })
    }

    /// Remplit `ready` ; retourne `false` si rien ne peut plus être produit
    fn refill(&mut self) -> Result<Option<bool>> {
        self.ready.clear();
        self.cursor = 0;

        if self.eof {
            return Ok(Some(false));
        }

        match self.inner.read(&mut self.input)? {
            Some(0) => Ok(None),
            Some(n) => {
                self.resampler.resample(&self.input[..n], &mut self.ready)?;
                Ok(Some(true))
            }
            None => {
                self.eof = true;
                self.resampler.flush(&mut self.ready)?;
                Ok(Some(!self.ready.is_empty()))
            }
        }
    }
}

impl FrameProvider for ResampledProvider {
    fn format(&self) -> AudioFormat {
        self.resampler.output_format()
    }

    fn read(&mut self, buffer: &mut [f32]) -> Result<Option<usize>> {
        let channels = self.format().channels as usize;
        let capacity = buffer.len() / channels * channels;
        if capacity == 0 {
            return Ok(Some(0));
        }

        while self.cursor >= self.ready.len() {
            match self.refill()? {
                // Pas de données disponibles pour le moment
                None => return Ok(Some(0)),
                Some(false) => return Ok(None),
                Some(true) => {}
            }
        }

        let available = self.ready.len() - self.cursor;
        let n = available.min(capacity);
        buffer[..n].copy_from_slice(&self.ready[self.cursor..self.cursor + n]);
        self.cursor += n;
        Ok(Some(n))
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{encode_wav, Codec, SoxrResampler, SymphoniaCodec};
    use std::io::Cursor;

    fn open(format: AudioFormat, samples: &[f32]) -> Box<dyn FrameProvider> {
        SymphoniaCodec::new()
            .open_provider(Box::new(Cursor::new(encode_wav(format, samples).unwrap())))
            .unwrap()
    }

    #[test]
    fn test_adapts_rate_and_channels() {
        let source = AudioFormat::new(24_000, 1);
        let target = AudioFormat::new(48_000, 2);
        let provider = open(source, &vec![0.5; 2_400]);
        let resampler = SoxrResampler::new(source, target, 256).unwrap();

        let mut adapted = ResampledProvider::new(provider, Box::new(resampler), 256).unwrap();
        assert_eq!(adapted.format(), target);

        let mut out = Vec::new();
        let mut buf = [0f32; 333];
        while let Some(n) = adapted.read(&mut buf).unwrap() {
            assert_eq!(n % 2, 0);
            out.extend_from_slice(&buf[..n]);
        }

        // 2400 frames mono à 24kHz -> ~4800 frames stéréo à 48kHz
        assert!((out.len() / 2).abs_diff(4_800) <= 2);
        assert!(out[2_000..7_000].iter().all(|s| (*s - 0.5).abs() < 1e-2));
        adapted.close().unwrap();
    }

    #[test]
    fn test_same_rate_only_maps_channels() {
        let source = AudioFormat::new(48_000, 1);
        let target = AudioFormat::new(48_000, 2);
        let provider = open(source, &[0.25, -0.25, 0.5]);
        let resampler = SoxrResampler::new(source, target, 16).unwrap();

        let mut adapted = ResampledProvider::new(provider, Box::new(resampler), 16).unwrap();
        let mut buf = [0f32; 16];
        assert_eq!(adapted.read(&mut buf).unwrap(), Some(6));
        assert_eq!(&buf[..6], &[0.25, 0.25, -0.25, -0.25, 0.5, 0.5]);
        assert_eq!(adapted.read(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_rejects_mismatched_resampler() {
        let provider = open(AudioFormat::new(44_100, 2), &[0.0; 8]);
        let resampler =
            SoxrResampler::new(AudioFormat::new(48_000, 2), AudioFormat::new(44_100, 2), 8)
                .unwrap();

        let Err(rejected) = ResampledProvider::new(provider, Box::new(resampler), 8) else {
            panic!("mismatched resampler accepted");
        };
        assert!(matches!(rejected.error, CodecError::InvalidFormat(_)));
        // Le provider rendu est encore utilisable
        let mut provider = rejected.provider;
        let mut buf = [0f32; 8];
        assert_eq!(provider.read(&mut buf).unwrap(), Some(8));
        provider.close().unwrap();
    }
}
