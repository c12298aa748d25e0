//! Aggregate statistics and the textual summary of a finished session.

mod narrative;

pub use narrative::{narrative, Stability};

use crate::emotion::{first_max_index, EmotionCategory, EMOTION_COUNT};
use crate::session::SessionRecord;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionStats {
    pub dominant: EmotionCategory,
    /// Share of ticks per category, in whole percent, indexed by category.
    /// Each entry is rounded on its own, so the total may differ from 100.
    pub distribution: [u32; EMOTION_COUNT],
    /// Number of adjacent dominant-label pairs that differ.
    pub changes: usize,
    /// `MM:SS` session length.
    pub duration: String,
}

impl SessionStats {
    pub fn percent(&self, category: EmotionCategory) -> u32 {
        self.distribution[category.index()]
    }
}

/// Summarizes a record. Pure: the same record always yields the same stats.
pub fn compute_stats(record: &SessionRecord) -> SessionStats {
    let duration = format_duration(record.elapsed_secs());
    let labels = record.dominant_labels();

    let mut counts = [0usize; EMOTION_COUNT];
    for label in labels {
        counts[label.index()] += 1;
    }

    let total = labels.len();
    let mut distribution = [0u32; EMOTION_COUNT];
    if total > 0 {
        for (slot, &count) in distribution.iter_mut().zip(&counts) {
            *slot = (count as f64 / total as f64 * 100.0).round() as u32;
        }
    }

    let dominant = if total == 0 {
        EmotionCategory::Neutral
    } else {
        first_max_index(&distribution)
            .and_then(EmotionCategory::from_index)
            .unwrap_or(EmotionCategory::Neutral)
    };

    let changes = labels.windows(2).filter(|w| w[0] != w[1]).count();

    SessionStats {
        dominant,
        distribution,
        changes,
        duration,
    }
}

/// Formats elapsed seconds as `MM:SS`. Minutes keep counting past 59.
pub fn format_duration(elapsed_secs: f64) -> String {
    let total = if elapsed_secs.is_finite() && elapsed_secs > 0.0 {
        elapsed_secs.floor() as u64
    } else {
        0
    };
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// Everything shown to the user once a session ends.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionReport {
    pub stats: SessionStats,
    pub narrative: String,
}

impl SessionReport {
    pub fn from_record(record: &SessionRecord) -> Self {
        let stats = compute_stats(record);
        let narrative = narrative(&stats);
        Self { stats, narrative }
    }
}
