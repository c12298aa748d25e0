//! Session recording and the periodic tick scheduler.

mod recorder;

pub use recorder::{RecordError, SessionRecord, SessionRecorder};

use crate::config::TickInterval;
use crate::emotion::{EmotionCategory, ProbabilityVector};
use crate::inference::{InferenceCoordinator, InferenceMode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};

const LOG_TARGET: &str = "session";

/// One accepted tick, as handed to presentation consumers.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct TickOutput {
    /// Seconds since the session started.
    pub timestamp: f64,
    pub probabilities: ProbabilityVector,
    pub dominant: EmotionCategory,
    pub mode: InferenceMode,
}

/// Requests the end of a running session. Cloneable and usable from any task.
#[derive(Clone, Debug)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Drives an [`InferenceCoordinator`] at a fixed period and records every
/// accepted tick.
///
/// Ticks never overlap: the next period is not awaited until the current
/// inference has finished, and late periods are delayed rather than bunched.
/// A tick still in flight when the session is stopped is dropped.
pub struct SessionRunner {
    coordinator: InferenceCoordinator,
    interval: TickInterval,
    max_duration: Option<Duration>,
    stop_tx: Arc<watch::Sender<bool>>,
    stop_rx: watch::Receiver<bool>,
}

impl SessionRunner {
    pub fn new(coordinator: InferenceCoordinator, interval: TickInterval) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            coordinator,
            interval,
            max_duration: None,
            stop_tx: Arc::new(stop_tx),
            stop_rx,
        }
    }

    /// Ends the session on its own after `duration`.
    pub fn with_max_duration(mut self, duration: Duration) -> Self {
        self.max_duration = Some(duration);
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            tx: self.stop_tx.clone(),
        }
    }

    pub fn coordinator(&self) -> &InferenceCoordinator {
        &self.coordinator
    }

    /// Runs one session until stopped or until the maximum duration elapses.
    ///
    /// A stop requested before `run` ends the session at once. The stop flag
    /// is cleared when the session ends, so the runner can be run again.
    /// Each accepted tick is forwarded to `ticks` when given; a closed
    /// receiver only stops the forwarding.
    pub async fn run(&mut self, mut ticks: Option<mpsc::Sender<TickOutput>>) -> SessionRecord {
        let mut stop = self.stop_rx.clone();

        let period = self.interval.duration();
        let start = Instant::now();
        let mut interval = tokio::time::interval_at(start + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let max_duration = self.max_duration;
        let deadline = async move {
            match max_duration {
                Some(d) => tokio::time::sleep_until(start + d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        let mut recorder = SessionRecorder::new();
        recorder.start();
        self.coordinator.begin_session();
        tracing::info!(target: LOG_TARGET, period_ms = self.interval.period_ms(), "session started");

        loop {
            tokio::select! {
                biased;
                _ = stopped(&mut stop) => break,
                _ = &mut deadline => break,
                _ = interval.tick() => {}
            }

            let probabilities = tokio::select! {
                biased;
                _ = stopped(&mut stop) => None,
                _ = &mut deadline => None,
                p = self.coordinator.tick() => p,
            };
            let Some(probabilities) = probabilities else {
                tracing::debug!(target: LOG_TARGET, "tick interrupted by stop, result discarded");
                break;
            };
            if *stop.borrow() {
                tracing::debug!(target: LOG_TARGET, "tick completed after stop, result discarded");
                break;
            }

            let timestamp = start.elapsed().as_secs_f64();
            let dominant = match recorder.record(timestamp, probabilities) {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!(target: LOG_TARGET, error = %e, "tick rejected");
                    continue;
                }
            };
            let mode = self.coordinator.mode().unwrap_or(InferenceMode::Simulated);
            tracing::debug!(target: LOG_TARGET, timestamp, %dominant, ?mode, "tick recorded");

            if let Some(tx) = ticks.as_ref() {
                let output = TickOutput {
                    timestamp,
                    probabilities,
                    dominant,
                    mode,
                };
                if tx.send(output).await.is_err() {
                    tracing::debug!(target: LOG_TARGET, "tick receiver closed");
                    ticks = None;
                }
            }
        }

        let elapsed = start.elapsed().as_secs_f64();
        recorder.close(elapsed);
        self.coordinator.end_session();
        self.stop_tx.send_replace(false);
        tracing::info!(
            target: LOG_TARGET,
            ticks = recorder.history().len(),
            elapsed_secs = elapsed,
            "session stopped"
        );
        recorder.into_record()
    }
}

/// Resolves once the stop flag is set.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    while !*stop.borrow_and_update() {
        if stop.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::SilenceSource;
    use crate::config::ExtractorConfig;
    use crate::emotion::{ClassifierError, EmotionClassifier, EmotionSimulator, ScoreScale};
    use crate::features::{ExtractorBackend, FeatureExtractor, FeatureVector};
    use crate::inference::LivePipeline;
    use futures::future::BoxFuture;
    use futures::FutureExt;

    struct SlowClassifier {
        delay: Duration,
    }

    impl EmotionClassifier for SlowClassifier {
        fn scale(&self) -> ScoreScale {
            ScoreScale::Percent
        }

        fn classify(&self, _features: FeatureVector) -> BoxFuture<'_, Result<Vec<f32>, ClassifierError>> {
            async move {
                tokio::time::sleep(self.delay).await;
                Ok(vec![0.0, 0.0, 100.0, 0.0, 0.0, 0.0, 0.0])
            }
            .boxed()
        }
    }

    fn simulated_runner(period_ms: u64) -> SessionRunner {
        let coordinator = InferenceCoordinator::simulated(EmotionSimulator::with_seed(11));
        SessionRunner::new(coordinator, TickInterval::new(period_ms).unwrap())
    }

    #[tokio::test]
    async fn max_duration_ends_the_session() {
        let mut runner = simulated_runner(10).with_max_duration(Duration::from_millis(55));
        let record = runner.run(None).await;

        assert!(!record.is_empty());
        assert!(record.len() <= 5, "too many ticks: {}", record.len());
        assert!(record.elapsed_secs() >= 0.055);
        assert!(record.timestamps().windows(2).all(|w| w[0] <= w[1]));
        assert!(!runner.coordinator().is_active());
    }

    #[tokio::test]
    async fn stop_handle_ends_the_session_and_ticks_are_forwarded() {
        let mut runner = simulated_runner(5);
        let stop = runner.stop_handle();
        let (tx, mut rx) = mpsc::channel(16);

        let task = tokio::spawn(async move {
            let record = runner.run(Some(tx)).await;
            (runner, record)
        });

        let first = rx.recv().await.expect("first tick");
        let second = rx.recv().await.expect("second tick");
        stop.stop();
        assert!(stop.is_stopped());

        let (runner, record) = task.await.unwrap();
        assert!(record.len() >= 2);
        assert_eq!(record.timestamps()[0], first.timestamp);
        assert_eq!(record.timestamps()[1], second.timestamp);
        assert_eq!(record.dominant_labels()[0], first.dominant);
        assert_eq!(first.mode, InferenceMode::Simulated);
        assert!((first.probabilities.sum() - 100.0).abs() < 1e-6);
        assert!(!runner.coordinator().is_active());
    }

    #[tokio::test]
    async fn in_flight_tick_is_discarded_after_stop() {
        let live = LivePipeline {
            source: Box::new(SilenceSource::new(8_000)),
            classifier: Box::new(SlowClassifier {
                delay: Duration::from_millis(500),
            }),
            extractor: FeatureExtractor::with_seed(
                ExtractorConfig::default(),
                ExtractorBackend::Placeholder,
                3,
            ),
        };
        let coordinator = InferenceCoordinator::new(live, EmotionSimulator::with_seed(1));
        let mut runner = SessionRunner::new(coordinator, TickInterval::new(10).unwrap());
        let stop = runner.stop_handle();

        let task = tokio::spawn(async move { runner.run(None).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        stop.stop();

        let record = task.await.unwrap();
        assert!(record.is_empty());
    }

    #[tokio::test]
    async fn closed_receiver_does_not_end_the_session() {
        let mut runner = simulated_runner(5).with_max_duration(Duration::from_millis(40));
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let record = runner.run(Some(tx)).await;
        assert!(!record.is_empty());
    }

    #[tokio::test]
    async fn stop_before_run_ends_the_session_at_once() {
        let mut runner = simulated_runner(5).with_max_duration(Duration::from_millis(30));
        let stop = runner.stop_handle();
        stop.stop();
        let record = runner.run(None).await;
        assert!(record.is_empty());
        assert!(!stop.is_stopped());
    }

    #[tokio::test]
    async fn runner_can_be_reused_after_stop() {
        let mut runner = simulated_runner(5).with_max_duration(Duration::from_millis(30));
        runner.stop_handle().stop();
        assert!(runner.run(None).await.is_empty());
        let record = runner.run(None).await;
        assert!(!record.is_empty());
    }
}
