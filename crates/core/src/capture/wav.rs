use crate::capture::{window_frames, AudioSource, CaptureError};
use crate::config::DEFAULT_CAPTURE_WINDOW_MS;
use crate::features::AudioBuffer;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const LOG_TARGET: &str = "capture::wav";

/// Replays a WAV file as consecutive fixed-length windows, one per capture.
/// Once the file is consumed every further capture fails with
/// [`CaptureError::Exhausted`].
#[derive(Debug)]
pub struct WavFileSource {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
    window_frames: usize,
    cursor: AtomicUsize,
}

impl WavFileSource {
    pub fn open(path: &Path) -> Result<Self, CaptureError> {
        let reader = hound::WavReader::open(path).map_err(|e| CaptureError::Unavailable {
            details: format!("{}: {e}", path.display()),
        })?;
        let source = Self::from_wav(reader)?;
        tracing::info!(
            target: LOG_TARGET,
            path = %path.display(),
            sample_rate = source.sample_rate,
            channels = source.channels.len(),
            frames = source.total_frames(),
            "wav input loaded"
        );
        Ok(source)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, CaptureError> {
        Self::from_wav(hound::WavReader::new(reader)?)
    }

    fn from_wav<R: Read>(reader: hound::WavReader<R>) -> Result<Self, CaptureError> {
        let spec = reader.spec();
        if spec.channels == 0 || spec.sample_rate == 0 {
            return Err(CaptureError::UnsupportedFormat(format!(
                "{} channels at {} Hz",
                spec.channels, spec.sample_rate
            )));
        }

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()?,
            hound::SampleFormat::Int => {
                if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                    return Err(CaptureError::UnsupportedFormat(format!(
                        "{}-bit integer samples",
                        spec.bits_per_sample
                    )));
                }
                let full_scale = (1u64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / full_scale))
                    .collect::<Result<Vec<_>, _>>()?
            }
        };

        let n_channels = usize::from(spec.channels);
        let mut channels = vec![Vec::with_capacity(interleaved.len() / n_channels); n_channels];
        for frame in interleaved.chunks_exact(n_channels) {
            for (channel, &sample) in channels.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }

        Ok(Self {
            sample_rate: spec.sample_rate,
            window_frames: window_frames(
                spec.sample_rate,
                Duration::from_millis(DEFAULT_CAPTURE_WINDOW_MS),
            ),
            channels,
            cursor: AtomicUsize::new(0),
        })
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window_frames = window_frames(self.sample_rate, window);
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn total_frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn rewind(&self) {
        self.cursor.store(0, Ordering::Relaxed);
    }

    fn next_window(&self) -> Result<AudioBuffer, CaptureError> {
        let total = self.total_frames();
        let start = self.cursor.fetch_add(self.window_frames, Ordering::Relaxed);
        if start >= total {
            return Err(CaptureError::Exhausted);
        }
        let end = (start + self.window_frames).min(total);
        let channels = self
            .channels
            .iter()
            .map(|c| c[start..end].to_vec())
            .collect();
        Ok(AudioBuffer::new(self.sample_rate, channels))
    }
}

impl AudioSource for WavFileSource {
    fn capture(&self) -> BoxFuture<'_, Result<AudioBuffer, CaptureError>> {
        async move { self.next_window() }.boxed()
    }
}
