use crate::capture::{window_frames, AudioSource, CaptureError};
use crate::config::DEFAULT_CAPTURE_WINDOW_MS;
use crate::features::AudioBuffer;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::time::Duration;

/// Yields a silent mono window on every capture.
#[derive(Clone, Debug)]
pub struct SilenceSource {
    sample_rate: u32,
    window: Duration,
}

impl SilenceSource {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            window: Duration::from_millis(DEFAULT_CAPTURE_WINDOW_MS),
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }
}

impl AudioSource for SilenceSource {
    fn capture(&self) -> BoxFuture<'_, Result<AudioBuffer, CaptureError>> {
        async move {
            if self.sample_rate == 0 {
                return Err(CaptureError::UnsupportedFormat("sample rate 0".into()));
            }
            let frames = window_frames(self.sample_rate, self.window);
            Ok(AudioBuffer::mono(self.sample_rate, vec![0.0; frames]))
        }
        .boxed()
    }
}
