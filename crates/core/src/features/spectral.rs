//! Frame-based spectral analysis.
//!
//! Frames the mono signal, applies a Hann window, takes the magnitude
//! spectrum with `realfft`, and accumulates per-frame MFCC, chroma, mel band,
//! spectral contrast and centroid values. Each group is averaged over all
//! frames when the analysis finishes.

use crate::features::{
    FeatureError, CHROMA_LEN, CONTRAST_LEN, MEL_BAND_LEN, MFCC_LEN, TONNETZ_LEN,
};
use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};
use std::f32::consts::PI;
use std::sync::Arc;

const LOG_FLOOR: f32 = 1e-10;
const CHROMA_MIN_HZ: f32 = 40.0;
const CHROMA_MAX_HZ: f32 = 5000.0;
const CONTRAST_BASE_HZ: f32 = 200.0;
const CONTRAST_QUANTILE: f32 = 0.02;

/// Triangular mel filter stored as its non-zero span.
#[derive(Clone, Debug)]
struct MelFilter {
    start_bin: usize,
    weights: Vec<f32>,
}

impl MelFilter {
    fn apply(&self, power: &[f32]) -> f32 {
        self.weights
            .iter()
            .zip(&power[self.start_bin..])
            .map(|(w, p)| w * p)
            .sum()
    }
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0_f32.powf(mel / 2595.0) - 1.0)
}

fn mel_filterbank(n_bands: usize, frame_size: usize, sample_rate: f32) -> Vec<MelFilter> {
    let n_bins = frame_size / 2 + 1;
    let mel_max = hz_to_mel(sample_rate / 2.0);
    let n_points = n_bands + 2;
    let bin_points: Vec<f32> = (0..n_points)
        .map(|i| {
            let mel = mel_max * i as f32 / (n_points - 1) as f32;
            mel_to_hz(mel) * frame_size as f32 / sample_rate
        })
        .collect();

    (0..n_bands)
        .map(|band| {
            let (left, center, right) = (bin_points[band], bin_points[band + 1], bin_points[band + 2]);
            let start_bin = (left.ceil() as usize).min(n_bins - 1);
            let end_bin = (right.floor() as usize).min(n_bins - 1);
            let weights = (start_bin..=end_bin)
                .map(|bin| {
                    let b = bin as f32;
                    if b <= center && center > left {
                        (b - left) / (center - left)
                    } else if b > center && right > center {
                        (right - b) / (right - center)
                    } else {
                        0.0
                    }
                })
                .map(|w| w.max(0.0))
                .collect();
            MelFilter { start_bin, weights }
        })
        .collect()
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / (size - 1) as f32).cos()))
        .collect()
}

/// Orthonormal DCT-II basis, `n_out` rows of `n_in` columns.
fn dct_basis(n_out: usize, n_in: usize) -> Vec<Vec<f32>> {
    let n = n_in as f32;
    (0..n_out)
        .map(|k| {
            let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            (0..n_in)
                .map(|i| scale * (PI * k as f32 * (i as f32 + 0.5) / n).cos())
                .collect()
        })
        .collect()
}

/// Pitch class (C = 0) of each spectrum bin, or `None` outside the chroma range.
fn chroma_map(n_bins: usize, frame_size: usize, sample_rate: f32) -> Vec<Option<usize>> {
    (0..n_bins)
        .map(|bin| {
            let hz = bin as f32 * sample_rate / frame_size as f32;
            if !(CHROMA_MIN_HZ..=CHROMA_MAX_HZ).contains(&hz) {
                return None;
            }
            let midi = 69.0 + 12.0 * (hz / 440.0).log2();
            Some((midi.round() as i64).rem_euclid(12) as usize)
        })
        .collect()
}

/// Bin ranges of the octave sub-bands used for spectral contrast.
fn contrast_bands(n_bins: usize, frame_size: usize, sample_rate: f32) -> Vec<std::ops::Range<usize>> {
    let hz_to_bin = |hz: f32| ((hz * frame_size as f32 / sample_rate).round() as usize).min(n_bins);
    (0..CONTRAST_LEN)
        .map(|band| {
            let low = if band == 0 {
                0
            } else {
                hz_to_bin(CONTRAST_BASE_HZ * 2f32.powi(band as i32 - 1))
            };
            let high = if band + 1 == CONTRAST_LEN {
                n_bins
            } else {
                hz_to_bin(CONTRAST_BASE_HZ * 2f32.powi(band as i32))
            };
            low..high.max(low)
        })
        .collect()
}

/// Log ratio between the loudest and quietest 2% of a band.
fn band_contrast(magnitudes: &[f32], scratch: &mut Vec<f32>) -> f32 {
    if magnitudes.is_empty() {
        return 0.0;
    }
    scratch.clear();
    scratch.extend_from_slice(magnitudes);
    scratch.sort_by(|a, b| a.total_cmp(b));
    let k = ((CONTRAST_QUANTILE * scratch.len() as f32).round() as usize).max(1);
    let valley = scratch[..k].iter().sum::<f32>() / k as f32;
    let peak = scratch[scratch.len() - k..].iter().sum::<f32>() / k as f32;
    (peak + LOG_FLOOR).log10() - (valley + LOG_FLOOR).log10()
}

/// Tonal centroid of a chroma vector on the circles of fifths, minor thirds
/// and major thirds.
pub(crate) fn tonnetz(chroma: &[f32]) -> Vec<f32> {
    let total: f32 = chroma.iter().map(|c| c.abs()).sum();
    let mut out = vec![0.0; TONNETZ_LEN];
    if total <= 0.0 || !total.is_finite() {
        return out;
    }
    let circles = [(7.0 * PI / 6.0, 1.0), (3.0 * PI / 2.0, 1.0), (2.0 * PI / 3.0, 0.5)];
    for (pc, &c) in chroma.iter().enumerate() {
        let weight = c / total;
        for (i, &(step, radius)) in circles.iter().enumerate() {
            let angle = pc as f32 * step;
            out[2 * i] += weight * radius * angle.sin();
            out[2 * i + 1] += weight * radius * angle.cos();
        }
    }
    out
}

/// Frame-averaged spectral feature groups.
#[derive(Clone, Debug, PartialEq)]
pub struct SpectralSummary {
    pub mfcc: Vec<f32>,
    pub chroma: Vec<f32>,
    pub mel_bands: Vec<f32>,
    pub contrast: Vec<f32>,
    pub centroid: f32,
}

/// Precomputed analysis plan for one sample rate and frame size.
pub struct SpectralAnalyzer {
    sample_rate: u32,
    frame_size: usize,
    hop_size: usize,
    fft: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    mfcc_filters: Vec<MelFilter>,
    mel_filters: Vec<MelFilter>,
    dct: Vec<Vec<f32>>,
    chroma_bins: Vec<Option<usize>>,
    contrast_bands: Vec<std::ops::Range<usize>>,
}

impl SpectralAnalyzer {
    pub fn new(sample_rate: u32, frame_size: usize, hop_size: usize) -> Result<Self, FeatureError> {
        if sample_rate == 0 {
            return Err(FeatureError::InvalidSampleRate(sample_rate));
        }
        if frame_size < 2 || hop_size == 0 || hop_size > frame_size {
            return Err(FeatureError::InvalidFraming {
                frame: frame_size,
                hop: hop_size,
            });
        }
        let sr = sample_rate as f32;
        let n_bins = frame_size / 2 + 1;
        let mut planner = RealFftPlanner::<f32>::new();
        Ok(Self {
            sample_rate,
            frame_size,
            hop_size,
            fft: planner.plan_fft_forward(frame_size),
            window: hann_window(frame_size),
            mfcc_filters: mel_filterbank(MFCC_LEN, frame_size, sr),
            mel_filters: mel_filterbank(MEL_BAND_LEN, frame_size, sr),
            dct: dct_basis(MFCC_LEN, MFCC_LEN),
            chroma_bins: chroma_map(n_bins, frame_size, sr),
            contrast_bands: contrast_bands(n_bins, frame_size, sr),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames for a signal; a signal shorter than one frame is
    /// zero-padded to a single frame.
    pub fn frame_count(&self, len: usize) -> usize {
        if len <= self.frame_size {
            1
        } else {
            (len - self.frame_size) / self.hop_size + 1
        }
    }

    pub fn analyze(&self, signal: &[f32]) -> Result<SpectralSummary, FeatureError> {
        if signal.is_empty() {
            return Err(FeatureError::EmptySignal);
        }
        let n_bins = self.frame_size / 2 + 1;
        let nyquist = self.sample_rate as f32 / 2.0;
        let frames = self.frame_count(signal.len());

        let mut frame_buf = self.fft.make_input_vec();
        let mut spectrum: Vec<Complex<f32>> = self.fft.make_output_vec();
        let mut scratch = self.fft.make_scratch_vec();
        let mut magnitude = vec![0.0f32; n_bins];
        let mut power = vec![0.0f32; n_bins];
        let mut log_mel = vec![0.0f32; MFCC_LEN];
        let mut frame_chroma = [0.0f32; CHROMA_LEN];
        let mut sort_buf = Vec::with_capacity(n_bins);

        let mut mfcc_sum = vec![0.0f32; MFCC_LEN];
        let mut chroma_sum = vec![0.0f32; CHROMA_LEN];
        let mut mel_sum = vec![0.0f32; MEL_BAND_LEN];
        let mut contrast_sum = vec![0.0f32; CONTRAST_LEN];
        let mut centroid_sum = 0.0f32;

        for frame in 0..frames {
            let start = frame * self.hop_size;
            for (i, slot) in frame_buf.iter_mut().enumerate() {
                let sample = signal.get(start + i).copied().unwrap_or(0.0);
                *slot = sample * self.window[i];
            }
            self.fft
                .process_with_scratch(&mut frame_buf, &mut spectrum, &mut scratch)
                .map_err(|e| FeatureError::Fft(format!("{e:?}")))?;

            for ((m, p), c) in magnitude.iter_mut().zip(power.iter_mut()).zip(&spectrum) {
                *m = c.norm();
                *p = *m * *m / self.frame_size as f32;
            }

            // MFCC: log mel energies through a DCT-II.
            for (l, filter) in log_mel.iter_mut().zip(&self.mfcc_filters) {
                *l = (filter.apply(&power) + LOG_FLOOR).ln();
            }
            for (acc, row) in mfcc_sum.iter_mut().zip(&self.dct) {
                *acc += row.iter().zip(&log_mel).map(|(d, l)| d * l).sum::<f32>();
            }

            for (acc, filter) in mel_sum.iter_mut().zip(&self.mel_filters) {
                *acc += (1.0 + 10000.0 * filter.apply(&power)).log10();
            }

            // Chroma, normalized so the strongest pitch class is 1.
            frame_chroma.fill(0.0);
            for (p, pc) in power.iter().zip(&self.chroma_bins) {
                if let Some(pc) = pc {
                    frame_chroma[*pc] += p;
                }
            }
            let peak = frame_chroma.iter().copied().fold(0.0f32, f32::max);
            if peak > 0.0 {
                for (acc, c) in chroma_sum.iter_mut().zip(&frame_chroma) {
                    *acc += c / peak;
                }
            }

            for (acc, band) in contrast_sum.iter_mut().zip(&self.contrast_bands) {
                *acc += band_contrast(&magnitude[band.clone()], &mut sort_buf);
            }

            let mag_total: f32 = magnitude.iter().sum();
            if mag_total > 0.0 {
                let weighted: f32 = magnitude
                    .iter()
                    .enumerate()
                    .map(|(bin, m)| bin as f32 * self.sample_rate as f32 / self.frame_size as f32 * m)
                    .sum();
                centroid_sum += weighted / mag_total / nyquist;
            }
        }

        let n = frames as f32;
        let mean = |v: Vec<f32>| v.into_iter().map(|x| x / n).collect::<Vec<f32>>();
        Ok(SpectralSummary {
            mfcc: mean(mfcc_sum),
            chroma: mean(chroma_sum),
            mel_bands: mean(mel_sum),
            contrast: mean(contrast_sum),
            centroid: centroid_sum / n,
        })
    }
}
