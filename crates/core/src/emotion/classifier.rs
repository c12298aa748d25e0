use crate::emotion::{ProbabilityVector, EMOTION_COUNT, PERCENT_TOTAL};
use crate::features::{FeatureVector, FEATURE_VECTOR_LEN};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Native scale of a classifier's scores.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScoreScale {
    /// Scores in `[0, 1]`.
    #[default]
    Unit,
    /// Scores already on the 0–100 scale.
    Percent,
}

#[derive(thiserror::Error, Debug)]
pub enum ClassifierError {
    #[error("classifier model unavailable: {0}")]
    Unavailable(String),

    #[error("invalid classifier model: {0}")]
    InvalidModel(String),

    #[error("expected {expected} scores, got {got}")]
    WrongOutputLength { expected: usize, got: usize },

    #[error("classifier produced a non-finite score at index {0}")]
    NonFiniteScore(usize),

    #[error("inference failed: {0}")]
    InferenceFailed(String),
}

/// Opaque emotion model: one feature vector in, one score per category out,
/// index-aligned with [`EmotionCategory`](crate::emotion::EmotionCategory).
pub trait EmotionClassifier: Send + Sync {
    fn scale(&self) -> ScoreScale;

    fn classify(&self, features: FeatureVector) -> BoxFuture<'_, Result<Vec<f32>, ClassifierError>>;
}

/// Converts raw classifier scores to the 0–100 convention.
pub fn scores_to_probabilities(
    scores: &[f32],
    scale: ScoreScale,
) -> Result<ProbabilityVector, ClassifierError> {
    if scores.len() != EMOTION_COUNT {
        return Err(ClassifierError::WrongOutputLength {
            expected: EMOTION_COUNT,
            got: scores.len(),
        });
    }
    if let Some(i) = scores.iter().position(|s| !s.is_finite()) {
        return Err(ClassifierError::NonFiniteScore(i));
    }

    let factor = match scale {
        ScoreScale::Unit => PERCENT_TOTAL,
        ScoreScale::Percent => 1.0,
    };
    let mut values = [0.0; EMOTION_COUNT];
    for (v, &s) in values.iter_mut().zip(scores) {
        *v = f64::from(s) * factor;
    }
    Ok(ProbabilityVector::normalized(values))
}

/// On-disk form of a [`SoftmaxClassifier`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SoftmaxModel {
    /// One row per emotion category, each `FEATURE_VECTOR_LEN` wide.
    pub weights: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
    #[serde(default)]
    pub feature_mean: Option<Vec<f32>>,
    #[serde(default)]
    pub feature_std: Option<Vec<f32>>,
}

/// Linear model with a softmax head, loaded from a JSON weight file.
#[derive(Clone, Debug)]
pub struct SoftmaxClassifier {
    model: SoftmaxModel,
}

impl SoftmaxClassifier {
    pub fn new(model: SoftmaxModel) -> Result<Self, ClassifierError> {
        if model.weights.len() != EMOTION_COUNT {
            return Err(ClassifierError::InvalidModel(format!(
                "expected {EMOTION_COUNT} weight rows, got {}",
                model.weights.len()
            )));
        }
        if let Some(row) = model.weights.iter().find(|r| r.len() != FEATURE_VECTOR_LEN) {
            return Err(ClassifierError::InvalidModel(format!(
                "weight rows must have {FEATURE_VECTOR_LEN} columns, got {}",
                row.len()
            )));
        }
        if model.bias.len() != EMOTION_COUNT {
            return Err(ClassifierError::InvalidModel(format!(
                "expected {EMOTION_COUNT} bias terms, got {}",
                model.bias.len()
            )));
        }
        for (name, stats) in [("feature_mean", &model.feature_mean), ("feature_std", &model.feature_std)] {
            if let Some(v) = stats {
                if v.len() != FEATURE_VECTOR_LEN {
                    return Err(ClassifierError::InvalidModel(format!(
                        "{name} must have {FEATURE_VECTOR_LEN} entries, got {}",
                        v.len()
                    )));
                }
            }
        }
        let all_finite = model
            .weights
            .iter()
            .flatten()
            .chain(model.bias.iter())
            .all(|w| w.is_finite());
        if !all_finite {
            return Err(ClassifierError::InvalidModel("non-finite parameter".into()));
        }
        Ok(Self { model })
    }

    pub fn from_json(json: &str) -> Result<Self, ClassifierError> {
        let model: SoftmaxModel =
            serde_json::from_str(json).map_err(|e| ClassifierError::InvalidModel(e.to_string()))?;
        Self::new(model)
    }

    pub fn load(path: &Path) -> Result<Self, ClassifierError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| ClassifierError::Unavailable(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    fn standardize(&self, features: &[f32]) -> Vec<f32> {
        features
            .iter()
            .enumerate()
            .map(|(i, &x)| {
                let mean = self.model.feature_mean.as_ref().map_or(0.0, |m| m[i]);
                let std = self.model.feature_std.as_ref().map_or(1.0, |s| s[i]);
                if std.abs() > f32::EPSILON {
                    (x - mean) / std
                } else {
                    x - mean
                }
            })
            .collect()
    }

    fn predict(&self, features: &FeatureVector) -> Result<Vec<f32>, ClassifierError> {
        let x = self.standardize(features.as_slice());
        let logits: Vec<f32> = self
            .model
            .weights
            .iter()
            .zip(&self.model.bias)
            .map(|(row, b)| row.iter().zip(&x).map(|(w, v)| w * v).sum::<f32>() + b)
            .collect();

        let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        if !max.is_finite() {
            return Err(ClassifierError::InferenceFailed("logits overflowed".into()));
        }
        let exp: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
        let total: f32 = exp.iter().sum();
        Ok(exp.into_iter().map(|e| e / total).collect())
    }
}

impl EmotionClassifier for SoftmaxClassifier {
    fn scale(&self) -> ScoreScale {
        ScoreScale::Unit
    }

    fn classify(&self, features: FeatureVector) -> BoxFuture<'_, Result<Vec<f32>, ClassifierError>> {
        async move { self.predict(&features) }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::EmotionCategory;

    fn model_favoring(category: EmotionCategory) -> SoftmaxModel {
        let mut bias = vec![0.0; EMOTION_COUNT];
        bias[category.index()] = 5.0;
        SoftmaxModel {
            weights: vec![vec![0.0; FEATURE_VECTOR_LEN]; EMOTION_COUNT],
            bias,
            feature_mean: None,
            feature_std: None,
        }
    }

    #[test]
    fn unit_scores_are_scaled_to_percent() {
        let p = scores_to_probabilities(&[0.1, 0.6, 0.1, 0.05, 0.05, 0.05, 0.05], ScoreScale::Unit)
            .expect("valid scores");
        assert!((p.get(EmotionCategory::Happy) - 60.0).abs() < 1e-4);
        assert!((p.sum() - 100.0).abs() < 1e-6);
    }

    #[test]
    fn percent_scores_are_renormalized() {
        let p = scores_to_probabilities(&[50.0, 50.0, 50.0, 50.0, 0.0, 0.0, 0.0], ScoreScale::Percent)
            .expect("valid scores");
        assert!((p.get(EmotionCategory::Neutral) - 25.0).abs() < 1e-9);
    }

    #[test]
    fn wrong_length_is_rejected() {
        let err = scores_to_probabilities(&[1.0, 2.0], ScoreScale::Unit).unwrap_err();
        assert!(matches!(err, ClassifierError::WrongOutputLength { expected: 7, got: 2 }));
    }

    #[test]
    fn nan_score_is_rejected() {
        let err = scores_to_probabilities(&[0.0, f32::NAN, 0.0, 0.0, 0.0, 0.0, 0.0], ScoreScale::Unit)
            .unwrap_err();
        assert!(matches!(err, ClassifierError::NonFiniteScore(1)));
    }

    #[test]
    fn softmax_model_validates_shape() {
        let mut model = model_favoring(EmotionCategory::Sad);
        model.weights.pop();
        assert!(matches!(
            SoftmaxClassifier::new(model),
            Err(ClassifierError::InvalidModel(_))
        ));

        let mut model = model_favoring(EmotionCategory::Sad);
        model.feature_std = Some(vec![1.0; 3]);
        assert!(SoftmaxClassifier::new(model).is_err());
    }

    #[tokio::test]
    async fn softmax_classifier_follows_bias() {
        let classifier = SoftmaxClassifier::new(model_favoring(EmotionCategory::Surprise)).unwrap();
        let scores = classifier
            .classify(FeatureVector::zeros())
            .await
            .expect("inference");
        assert_eq!(scores.len(), EMOTION_COUNT);
        assert!((scores.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        let p = scores_to_probabilities(&scores, classifier.scale()).unwrap();
        assert_eq!(p.dominant(), EmotionCategory::Surprise);
    }

    #[test]
    fn loads_from_json() {
        let json = serde_json::to_string(&model_favoring(EmotionCategory::Angry)).unwrap();
        assert!(SoftmaxClassifier::from_json(&json).is_ok());
        assert!(SoftmaxClassifier::from_json("{\"weights\": []}").is_err());
    }

    #[test]
    fn missing_model_file_is_unavailable() {
        let err = SoftmaxClassifier::load(Path::new("/nonexistent/model.json")).unwrap_err();
        assert!(matches!(err, ClassifierError::Unavailable(_)));
    }
}
