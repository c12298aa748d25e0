mod silence;
mod wav;

use crate::features::AudioBuffer;
use futures::future::BoxFuture;
use std::time::Duration;

pub use silence::SilenceSource;
pub use wav::WavFileSource;

#[derive(thiserror::Error, Debug)]
pub enum CaptureError {
    #[error("audio input unavailable: {details}")]
    Unavailable { details: String },

    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("audio input exhausted")]
    Exhausted,

    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),
}

/// Provides the most recent audio window on each tick.
pub trait AudioSource: Send + Sync {
    fn capture(&self) -> BoxFuture<'_, Result<AudioBuffer, CaptureError>>;
}

pub(crate) fn window_frames(sample_rate: u32, window: Duration) -> usize {
    let frames = u128::from(sample_rate) * window.as_millis() / 1000;
    usize::try_from(frames).unwrap_or(usize::MAX).max(1)
}
