mod spectral;

use crate::config::ExtractorConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

pub use spectral::{SpectralAnalyzer, SpectralSummary};

const LOG_TARGET: &str = "features";

pub const MFCC_LEN: usize = 40;
pub const CHROMA_LEN: usize = 12;
pub const MEL_BAND_LEN: usize = 128;
pub const CONTRAST_LEN: usize = 7;
pub const TONNETZ_LEN: usize = 6;
pub const SPECTRAL_BLOCK_LEN: usize = MEL_BAND_LEN + CONTRAST_LEN + TONNETZ_LEN;

/// Canonical feature vector length:
/// MFCC(40) + chroma(12) + spectral block(141) + energy + ZCR + spectral centroid.
pub const FEATURE_VECTOR_LEN: usize = MFCC_LEN + CHROMA_LEN + SPECTRAL_BLOCK_LEN + 3;

/// Upper bound (exclusive) of placeholder feature values.
pub const PLACEHOLDER_MAX: f32 = 0.1;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FeatureError {
    #[error("audio buffer has no channels")]
    NoChannels,

    #[error("audio buffer is empty")]
    EmptySignal,

    #[error("invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    #[error("invalid framing: frame {frame}, hop {hop}")]
    InvalidFraming { frame: usize, hop: usize },

    #[error("fft failed: {0}")]
    Fft(String),

    #[error("{block} has {got} values, expected {expected}")]
    WrongWidth {
        block: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{0} produced a non-finite value")]
    NonFinite(&'static str),

    #[error("feature vector must have 196 values, got {0}")]
    WrongLength(usize),
}

/// Raw multi-channel PCM, one `Vec` per channel.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AudioBuffer {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    pub fn mono(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self::new(sample_rate, vec![samples])
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Frames per channel; the shortest channel wins when they differ.
    pub fn len(&self) -> usize {
        self.channels.iter().map(Vec::len).min().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element-wise average of all channels.
    pub fn downmix(&self) -> Result<Vec<f32>, FeatureError> {
        if self.sample_rate == 0 {
            return Err(FeatureError::InvalidSampleRate(self.sample_rate));
        }
        let Some(first) = self.channels.first() else {
            return Err(FeatureError::NoChannels);
        };
        let len = self.len();
        if len == 0 {
            return Err(FeatureError::EmptySignal);
        }
        if self.channels.len() == 1 {
            return Ok(first[..len].to_vec());
        }

        let scale = 1.0 / self.channels.len() as f32;
        let mut mono = vec![0.0f32; len];
        for channel in &self.channels {
            for (m, s) in mono.iter_mut().zip(channel) {
                *m += s;
            }
        }
        mono.iter_mut().for_each(|m| *m *= scale);
        Ok(mono)
    }
}

/// Fixed-length, all-finite acoustic summary of one audio buffer.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    pub fn new(values: Vec<f32>) -> Result<Self, FeatureError> {
        if values.len() != FEATURE_VECTOR_LEN {
            return Err(FeatureError::WrongLength(values.len()));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(FeatureError::NonFinite("feature vector"));
        }
        Ok(Self(values))
    }

    pub fn zeros() -> Self {
        Self(vec![0.0; FEATURE_VECTOR_LEN])
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

fn placeholder_values<R: Rng + ?Sized>(width: usize, rng: &mut R) -> Vec<f32> {
    (0..width).map(|_| rng.random_range(0.0..PLACEHOLDER_MAX)).collect()
}

/// Sum of squared samples.
pub fn energy(signal: &[f32]) -> f32 {
    signal.iter().map(|s| s * s).sum()
}

/// Fraction of adjacent sample pairs whose sign differs.
pub fn zero_crossing_rate(signal: &[f32]) -> f32 {
    if signal.len() < 2 {
        return 0.0;
    }
    let crossings = signal
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count();
    crossings as f32 / (signal.len() - 1) as f32
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExtractorBackend {
    /// Frame-based spectral analysis.
    Spectral,
    /// No analysis; every vector is low-magnitude noise.
    Placeholder,
}

/// Maps audio buffers of any duration to a [`FeatureVector`].
///
/// Extraction never fails. A sub-block that cannot be computed is replaced by
/// placeholder values of the same width, and a buffer that cannot be analysed
/// at all yields a fully random vector.
pub struct FeatureExtractor {
    config: ExtractorConfig,
    backend: ExtractorBackend,
    analyzer: Option<SpectralAnalyzer>,
    rng: StdRng,
}

type Block = Result<Vec<f32>, FeatureError>;

impl FeatureExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self::with_rng(config, ExtractorBackend::Spectral, StdRng::from_os_rng())
    }

    pub fn with_seed(config: ExtractorConfig, backend: ExtractorBackend, seed: u64) -> Self {
        Self::with_rng(config, backend, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: ExtractorConfig, backend: ExtractorBackend, rng: StdRng) -> Self {
        Self {
            config,
            backend,
            analyzer: None,
            rng,
        }
    }

    pub fn backend(&self) -> ExtractorBackend {
        self.backend
    }

    pub fn extract(&mut self, buffer: &AudioBuffer) -> FeatureVector {
        if self.backend == ExtractorBackend::Placeholder {
            return self.placeholder_vector();
        }

        let mono = match buffer.downmix() {
            Ok(mono) => mono,
            Err(e) => {
                tracing::warn!(target: LOG_TARGET, error = %e, "cannot analyse buffer, using placeholder features");
                return self.placeholder_vector();
            }
        };

        let (mfcc, chroma, spectral_block, centroid) = match self.spectral(buffer.sample_rate, &mono) {
            Ok(summary) => {
                let tonnetz = spectral::tonnetz(&summary.chroma);
                let mut block = summary.mel_bands;
                block.extend_from_slice(&summary.contrast);
                block.extend(tonnetz);
                (
                    Ok(summary.mfcc),
                    Ok(summary.chroma),
                    Ok(block),
                    Ok(vec![summary.centroid]),
                )
            }
            Err(e) => (Err(e.clone()), Err(e.clone()), Err(e.clone()), Err(e)),
        };

        let blocks: [(&'static str, usize, Block); 6] = [
            ("mfcc", MFCC_LEN, mfcc),
            ("chroma", CHROMA_LEN, chroma),
            ("spectral block", SPECTRAL_BLOCK_LEN, spectral_block),
            ("energy", 1, Ok(vec![energy(&mono)])),
            ("zero-crossing rate", 1, Ok(vec![zero_crossing_rate(&mono)])),
            ("spectral centroid", 1, centroid),
        ];

        let mut values = Vec::with_capacity(FEATURE_VECTOR_LEN);
        for (name, width, block) in blocks {
            match check_block(name, width, block) {
                Ok(v) => values.extend(v),
                Err(e) => {
                    tracing::warn!(target: LOG_TARGET, block = name, error = %e, "feature block replaced by placeholder");
                    values.extend(placeholder_values(width, &mut self.rng));
                }
            }
        }

        match FeatureVector::new(values) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(target: LOG_TARGET, error = %e, "assembled feature vector rejected");
                self.placeholder_vector()
            }
        }
    }

    fn spectral(&mut self, sample_rate: u32, mono: &[f32]) -> Result<SpectralSummary, FeatureError> {
        let stale = self
            .analyzer
            .as_ref()
            .map_or(true, |a| a.sample_rate() != sample_rate);
        if stale {
            self.analyzer = Some(SpectralAnalyzer::new(
                sample_rate,
                self.config.frame_size(),
                self.config.hop_size(),
            )?);
        }
        match &self.analyzer {
            Some(analyzer) => analyzer.analyze(mono),
            None => Err(FeatureError::InvalidSampleRate(sample_rate)),
        }
    }

    fn placeholder_vector(&mut self) -> FeatureVector {
        FeatureVector(placeholder_values(FEATURE_VECTOR_LEN, &mut self.rng))
    }
}

fn check_block(name: &'static str, width: usize, block: Block) -> Block {
    let values = block?;
    if values.len() != width {
        return Err(FeatureError::WrongWidth {
            block: name,
            expected: width,
            got: values.len(),
        });
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(FeatureError::NonFinite(name));
    }
    Ok(values)
}
