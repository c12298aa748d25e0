use crate::emotion::{EmotionCategory, ProbabilityVector};
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("timestamp {got}s is earlier than the previous tick at {previous}s")]
    NonMonotonicTimestamp { previous: f64, got: f64 },

    #[error("timestamp must be a finite, non-negative number of seconds, got {0}")]
    InvalidTimestamp(f64),
}

/// Index-aligned history of one session.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    timestamps: Vec<f64>,
    dominant_labels: Vec<EmotionCategory>,
    probability_vectors: Vec<ProbabilityVector>,
    elapsed_secs: f64,
}

impl SessionRecord {
    /// Seconds since session start, one per tick, non-decreasing.
    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    pub fn dominant_labels(&self) -> &[EmotionCategory] {
        &self.dominant_labels
    }

    pub fn probability_vectors(&self) -> &[ProbabilityVector] {
        &self.probability_vectors
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Session length in seconds: the stop time when the session was closed,
    /// otherwise the latest tick.
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed_secs
    }

    /// Builds a record from dominant labels alone, one second apart.
    #[cfg(test)]
    pub(crate) fn from_labels(labels: &[EmotionCategory]) -> Self {
        let mut recorder = SessionRecorder::new();
        for (i, &label) in labels.iter().enumerate() {
            let mut values = [0.0; crate::emotion::EMOTION_COUNT];
            values[label.index()] = 100.0;
            recorder
                .record(i as f64, ProbabilityVector::from_values(values))
                .expect("timestamps are generated in order");
        }
        recorder.into_record()
    }
}

/// Sole writer of the current [`SessionRecord`].
#[derive(Debug, Default)]
pub struct SessionRecorder {
    record: SessionRecord,
}

impl SessionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discards any previous history.
    pub fn start(&mut self) {
        self.record = SessionRecord::default();
    }

    /// Appends one tick and returns its dominant label.
    pub fn record(
        &mut self,
        timestamp: f64,
        probabilities: ProbabilityVector,
    ) -> Result<EmotionCategory, RecordError> {
        if !timestamp.is_finite() || timestamp < 0.0 {
            return Err(RecordError::InvalidTimestamp(timestamp));
        }
        if let Some(&previous) = self.record.timestamps.last() {
            if timestamp < previous {
                return Err(RecordError::NonMonotonicTimestamp {
                    previous,
                    got: timestamp,
                });
            }
        }

        let dominant = probabilities.dominant();
        self.record.timestamps.push(timestamp);
        self.record.dominant_labels.push(dominant);
        self.record.probability_vectors.push(probabilities);
        self.record.elapsed_secs = self.record.elapsed_secs.max(timestamp);
        Ok(dominant)
    }

    /// Stamps the final session length; never shorter than the last tick.
    pub fn close(&mut self, elapsed_secs: f64) {
        if elapsed_secs.is_finite() {
            self.record.elapsed_secs = self.record.elapsed_secs.max(elapsed_secs);
        }
    }

    pub fn history(&self) -> &SessionRecord {
        &self.record
    }

    pub fn into_record(self) -> SessionRecord {
        self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(values: [f64; 7]) -> ProbabilityVector {
        ProbabilityVector::from_values(values)
    }

    #[test]
    fn record_keeps_sequences_aligned() {
        let mut recorder = SessionRecorder::new();
        recorder.start();
        let d1 = recorder.record(2.0, vector([5.0, 80.0, 5.0, 5.0, 5.0, 0.0, 0.0])).unwrap();
        let d2 = recorder.record(4.0, vector([5.0, 5.0, 80.0, 5.0, 5.0, 0.0, 0.0])).unwrap();
        assert_eq!(d1, EmotionCategory::Happy);
        assert_eq!(d2, EmotionCategory::Sad);

        let h = recorder.history();
        assert_eq!(h.len(), 2);
        assert_eq!(h.timestamps(), &[2.0, 4.0]);
        assert_eq!(h.dominant_labels(), &[EmotionCategory::Happy, EmotionCategory::Sad]);
        assert_eq!(h.probability_vectors().len(), 2);
        assert_eq!(h.elapsed_secs(), 4.0);
    }

    #[test]
    fn tie_goes_to_earlier_category() {
        let mut recorder = SessionRecorder::new();
        let d = recorder
            .record(0.0, vector([0.0, 0.0, 0.0, 50.0, 0.0, 0.0, 50.0]))
            .unwrap();
        assert_eq!(d, EmotionCategory::Angry);
    }

    #[test]
    fn earlier_timestamp_is_rejected() {
        let mut recorder = SessionRecorder::new();
        recorder.record(4.0, ProbabilityVector::uniform()).unwrap();
        let err = recorder.record(2.0, ProbabilityVector::uniform()).unwrap_err();
        assert_eq!(err, RecordError::NonMonotonicTimestamp { previous: 4.0, got: 2.0 });
        assert_eq!(recorder.history().len(), 1);

        // Equal timestamps are allowed.
        assert!(recorder.record(4.0, ProbabilityVector::uniform()).is_ok());
    }

    #[test]
    fn invalid_timestamps_are_rejected() {
        let mut recorder = SessionRecorder::new();
        assert!(recorder.record(f64::NAN, ProbabilityVector::uniform()).is_err());
        assert!(recorder.record(-1.0, ProbabilityVector::uniform()).is_err());
        assert!(recorder.history().is_empty());
    }

    #[test]
    fn start_resets_history() {
        let mut recorder = SessionRecorder::new();
        recorder.record(1.0, ProbabilityVector::uniform()).unwrap();
        recorder.close(10.0);
        recorder.start();
        assert!(recorder.history().is_empty());
        assert_eq!(recorder.history().elapsed_secs(), 0.0);
        assert!(recorder.record(0.5, ProbabilityVector::uniform()).is_ok());
    }

    #[test]
    fn close_never_shortens_the_session() {
        let mut recorder = SessionRecorder::new();
        recorder.record(6.0, ProbabilityVector::uniform()).unwrap();
        recorder.close(3.0);
        assert_eq!(recorder.history().elapsed_secs(), 6.0);
        recorder.close(7.5);
        assert_eq!(recorder.history().elapsed_secs(), 7.5);
    }

    #[test]
    fn from_labels_preserves_order() {
        let labels = [EmotionCategory::Fear, EmotionCategory::Neutral];
        let record = SessionRecord::from_labels(&labels);
        assert_eq!(record.dominant_labels(), &labels);
        assert_eq!(record.timestamps(), &[0.0, 1.0]);
    }
}
