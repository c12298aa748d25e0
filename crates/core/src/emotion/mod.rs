mod classifier;
mod simulator;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use classifier::{
    scores_to_probabilities, ClassifierError, EmotionClassifier, ScoreScale, SoftmaxClassifier,
    SoftmaxModel,
};
pub use simulator::{simulate_step, EmotionSimulator};

pub const EMOTION_COUNT: usize = 7;

/// Total of a normalized [`ProbabilityVector`].
pub const PERCENT_TOTAL: f64 = 100.0;

/// Emotion labels in index order. The order is the vector layout used by the
/// classifier, the simulator and the session record.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum EmotionCategory {
    Neutral,
    Happy,
    Sad,
    Angry,
    Fear,
    Disgust,
    Surprise,
}

impl EmotionCategory {
    pub const ALL: [EmotionCategory; EMOTION_COUNT] = [
        EmotionCategory::Neutral,
        EmotionCategory::Happy,
        EmotionCategory::Sad,
        EmotionCategory::Angry,
        EmotionCategory::Fear,
        EmotionCategory::Disgust,
        EmotionCategory::Surprise,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            EmotionCategory::Neutral => "neutral",
            EmotionCategory::Happy => "happy",
            EmotionCategory::Sad => "sad",
            EmotionCategory::Angry => "angry",
            EmotionCategory::Fear => "fear",
            EmotionCategory::Disgust => "disgust",
            EmotionCategory::Surprise => "surprise",
        }
    }

    /// Label with a leading capital, as shown in reports.
    pub fn display_name(self) -> String {
        let label = self.label();
        let mut chars = label.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

impl fmt::Display for EmotionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown emotion label: {0}")]
pub struct UnknownEmotion(pub String);

impl FromStr for EmotionCategory {
    type Err = UnknownEmotion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.label() == lower)
            .ok_or_else(|| UnknownEmotion(s.to_owned()))
    }
}

/// Index of the first maximum. Earlier indices win ties.
pub(crate) fn first_max_index<T: PartialOrd + Copy>(values: &[T]) -> Option<usize> {
    let mut best: Option<(usize, T)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// One value per [`EmotionCategory`], on the 0–100 scale.
///
/// Values are always finite and non-negative. Vectors built with
/// [`ProbabilityVector::normalized`] also sum to 100.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ProbabilityVector([f64; EMOTION_COUNT]);

impl ProbabilityVector {
    pub fn zero() -> Self {
        Self([0.0; EMOTION_COUNT])
    }

    pub fn uniform() -> Self {
        Self([PERCENT_TOTAL / EMOTION_COUNT as f64; EMOTION_COUNT])
    }

    /// Wraps raw values, clamping negatives and non-finite entries to zero.
    pub fn from_values(values: [f64; EMOTION_COUNT]) -> Self {
        Self(values.map(|v| if v.is_finite() { v.max(0.0) } else { 0.0 }))
    }

    /// Like [`from_values`](Self::from_values), then rescaled to sum 100.
    /// An all-zero input becomes the uniform distribution.
    pub fn normalized(values: [f64; EMOTION_COUNT]) -> Self {
        let clean = Self::from_values(values);
        let total = clean.sum();
        if total <= 0.0 || !total.is_finite() {
            return Self::uniform();
        }
        Self(clean.0.map(|v| v / total * PERCENT_TOTAL))
    }

    pub fn values(&self) -> &[f64; EMOTION_COUNT] {
        &self.0
    }

    pub fn get(&self, category: EmotionCategory) -> f64 {
        self.0[category.index()]
    }

    pub fn sum(&self) -> f64 {
        self.0.iter().sum()
    }

    pub fn is_all_zero(&self) -> bool {
        self.0.iter().all(|&v| v == 0.0)
    }

    /// Category with the highest value; ties go to the lower index.
    pub fn dominant(&self) -> EmotionCategory {
        first_max_index(&self.0)
            .and_then(EmotionCategory::from_index)
            .unwrap_or(EmotionCategory::Neutral)
    }

    pub fn iter(&self) -> impl Iterator<Item = (EmotionCategory, f64)> + '_ {
        EmotionCategory::ALL.iter().copied().zip(self.0.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_keep_fixed_index_order() {
        for (i, c) in EmotionCategory::ALL.iter().enumerate() {
            assert_eq!(c.index(), i);
            assert_eq!(EmotionCategory::from_index(i), Some(*c));
        }
        assert_eq!(EmotionCategory::from_index(EMOTION_COUNT), None);
        assert_eq!(EmotionCategory::Neutral.index(), 0);
        assert_eq!(EmotionCategory::Surprise.index(), 6);
    }

    #[test]
    fn labels_parse_back() {
        for c in EmotionCategory::ALL {
            assert_eq!(c.label().parse::<EmotionCategory>(), Ok(c));
        }
        assert_eq!("  Happy ".parse::<EmotionCategory>(), Ok(EmotionCategory::Happy));
        assert!("bored".parse::<EmotionCategory>().is_err());
    }

    #[test]
    fn display_name_capitalizes() {
        assert_eq!(EmotionCategory::Disgust.display_name(), "Disgust");
        assert_eq!(EmotionCategory::Neutral.to_string(), "neutral");
    }

    #[test]
    fn dominant_prefers_lower_index_on_tie() {
        let p = ProbabilityVector::from_values([10.0, 40.0, 40.0, 5.0, 5.0, 0.0, 0.0]);
        assert_eq!(p.dominant(), EmotionCategory::Happy);

        let flat = ProbabilityVector::uniform();
        assert_eq!(flat.dominant(), EmotionCategory::Neutral);
    }

    #[test]
    fn normalized_sums_to_hundred() {
        let p = ProbabilityVector::normalized([1.0, 2.0, 3.0, 4.0, 0.0, -5.0, f64::NAN]);
        assert!((p.sum() - 100.0).abs() < 1e-9);
        assert_eq!(p.get(EmotionCategory::Disgust), 0.0);
        assert_eq!(p.get(EmotionCategory::Surprise), 0.0);
        assert!((p.get(EmotionCategory::Angry) - 40.0).abs() < 1e-9);
    }

    #[test]
    fn normalized_zero_input_is_uniform() {
        let p = ProbabilityVector::normalized([0.0; EMOTION_COUNT]);
        assert_eq!(p, ProbabilityVector::uniform());
        assert!((p.sum() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn first_max_index_handles_empty() {
        let empty: [u32; 0] = [];
        assert_eq!(first_max_index(&empty), None);
        assert_eq!(first_max_index(&[3, 7, 7, 1]), Some(1));
    }
}
