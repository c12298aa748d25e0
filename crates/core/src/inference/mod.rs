//! Per-tick emotion inference with a one-way fallback to the simulator.

use crate::capture::{AudioSource, CaptureError};
use crate::emotion::{
    scores_to_probabilities, ClassifierError, EmotionClassifier, EmotionSimulator, ProbabilityVector,
};
use crate::features::FeatureExtractor;
use serde::{Deserialize, Serialize};

const LOG_TARGET: &str = "inference";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InferenceMode {
    /// Capture → features → classifier.
    Live,
    /// Simulated trajectory, no audio analysis.
    Simulated,
}

#[derive(thiserror::Error, Debug)]
pub enum InferenceError {
    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("classification failed: {0}")]
    Classifier(#[from] ClassifierError),
}

/// Audio source and classifier used on the live path.
pub struct LivePipeline {
    pub source: Box<dyn AudioSource>,
    pub classifier: Box<dyn EmotionClassifier>,
    pub extractor: FeatureExtractor,
}

/// State that lives for exactly one session.
#[derive(Debug)]
struct SessionContext {
    mode: InferenceMode,
    last_simulated: Option<ProbabilityVector>,
    degraded_by: Option<String>,
}

/// Produces one [`ProbabilityVector`] per tick of an active session.
///
/// A session starts in [`InferenceMode::Live`] when a live pipeline is
/// configured. The first capture, extraction or classification error switches
/// it to [`InferenceMode::Simulated`] until the session ends.
pub struct InferenceCoordinator {
    live: Option<LivePipeline>,
    simulator: EmotionSimulator,
    session: Option<SessionContext>,
}

impl InferenceCoordinator {
    pub fn new(live: LivePipeline, simulator: EmotionSimulator) -> Self {
        Self {
            live: Some(live),
            simulator,
            session: None,
        }
    }

    /// A coordinator with no audio pipeline; every session is simulated.
    pub fn simulated(simulator: EmotionSimulator) -> Self {
        Self {
            live: None,
            simulator,
            session: None,
        }
    }

    pub fn begin_session(&mut self) {
        let mode = if self.live.is_some() {
            InferenceMode::Live
        } else {
            InferenceMode::Simulated
        };
        tracing::info!(target: LOG_TARGET, ?mode, "inference session started");
        self.session = Some(SessionContext {
            mode,
            last_simulated: None,
            degraded_by: None,
        });
    }

    pub fn end_session(&mut self) {
        if self.session.take().is_some() {
            tracing::info!(target: LOG_TARGET, "inference session ended");
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Current mode, or `None` outside a session.
    pub fn mode(&self) -> Option<InferenceMode> {
        self.session.as_ref().map(|s| s.mode)
    }

    /// Error that forced the current session into simulated mode.
    pub fn degraded_by(&self) -> Option<&str> {
        self.session.as_ref().and_then(|s| s.degraded_by.as_deref())
    }

    /// Runs one inference step. Returns `None` when no session is active.
    pub async fn tick(&mut self) -> Option<ProbabilityVector> {
        let mode = self.session.as_ref()?.mode;

        if mode == InferenceMode::Live {
            if let Some(live) = self.live.as_mut() {
                match infer_live(live).await {
                    Ok(probabilities) => {
                        tracing::debug!(target: LOG_TARGET, dominant = %probabilities.dominant(), "live inference");
                        return Some(probabilities);
                    }
                    Err(e) => self.degrade(&e),
                }
            }
        }

        Some(self.simulate())
    }

    fn degrade(&mut self, error: &InferenceError) {
        if let Some(session) = self.session.as_mut() {
            tracing::warn!(
                target: LOG_TARGET,
                error = %error,
                "live inference failed, switching to simulated mode for the rest of the session"
            );
            session.mode = InferenceMode::Simulated;
            session.degraded_by = Some(error.to_string());
        }
    }

    fn simulate(&mut self) -> ProbabilityVector {
        let previous = self.session.as_ref().and_then(|s| s.last_simulated);
        let next = self.simulator.step(previous.as_ref());
        if let Some(session) = self.session.as_mut() {
            session.last_simulated = Some(next);
        }
        next
    }
}

async fn infer_live(live: &mut LivePipeline) -> Result<ProbabilityVector, InferenceError> {
    let buffer = live.source.capture().await?;
    let features = live.extractor.extract(&buffer);
    let scores = live.classifier.classify(features).await?;
    Ok(scores_to_probabilities(&scores, live.classifier.scale())?)
}
