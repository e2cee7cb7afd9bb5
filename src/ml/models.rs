use crate::error::{AppError, Result};
use crate::ml::classifier::{Classifier, FeedForwardNetwork};
use crate::ml::dataset::{encode_row, keyed_features, ColumnSpec, NormalizationConstant};
use crate::models::{FilterResult, PredictedClass};
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Number of output classes: reject, accept and a reserved third class
pub const NUM_CLASSES: usize = 3;

/// Class index meaning "reject"
pub const CLASS_REJECT: usize = 0;

/// Class index meaning "accept"
pub const CLASS_ACCEPT: usize = 1;

/// Classifier training configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TrainingConfig {
    /// Fraction of shuffled rows held out for validation
    #[validate(range(min = 0.0, max = 0.9))]
    pub validation_fraction: f64,

    /// Full-batch gradient descent epochs
    #[validate(range(min = 1, max = 100000))]
    pub epochs: usize,

    /// Gradient descent step size
    #[validate(range(exclusive_min = 0.0))]
    pub learning_rate: f64,

    /// Width of the sigmoid hidden layer
    #[validate(range(min = 1, max = 1024))]
    pub hidden_units: usize,

    /// Loss minimized by the optimizer
    #[serde(default)]
    pub loss: LossFunction,

    /// Fixed seed for shuffling and weight init; random when absent
    #[serde(default)]
    pub seed: Option<u64>,

    /// Log one line every N epochs (the last epoch is always logged)
    #[serde(default = "default_log_every")]
    pub log_every: usize,
}

fn default_log_every() -> usize {
    50
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            validation_fraction: 0.1,
            epochs: 300,
            learning_rate: 0.5,
            hidden_units: 8,
            loss: LossFunction::default(),
            seed: None,
            log_every: default_log_every(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LossFunction {
    #[default]
    CategoricalCrossEntropy,
    MeanSquaredError,
}

/// Layer sizes of the feed-forward network
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Topology {
    pub inputs: usize,
    pub hidden: usize,
    pub outputs: usize,
}

/// Persisted classifier: weights, topology and the normalization used at training time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    pub id: Uuid,
    pub topic_id: Uuid,
    pub filter_pattern_id: Uuid,
    pub network: FeedForwardNetwork,
    /// Feature columns in matrix order
    pub columns: Vec<ColumnSpec>,
    /// One entry per non-categorical column, in column order
    pub normalization_constants: Vec<NormalizationConstant>,
    pub score: f64,
    pub created_at: DateTime<Utc>,
}

impl TrainedModel {
    /// Encode pipeline output with the layout and constants captured at training time
    pub fn feature_row(&self, results: &[FilterResult]) -> Array2<f64> {
        let row = encode_row(
            &self.columns,
            &self.normalization_constants,
            &keyed_features(results),
        );
        Array1::from(row).insert_axis(Axis(0))
    }

    /// Class decision and the probability row for one item's pipeline output
    pub fn classify(&self, results: &[FilterResult]) -> Result<(PredictedClass, Vec<f64>)> {
        let features = self.feature_row(results);
        let probs = self.network.predict_proba(&features)?;
        let index = self
            .network
            .predict(&features)?
            .first()
            .copied()
            .ok_or_else(|| AppError::Internal("Empty prediction".to_string()))?;
        Ok((class_from_index(index), probs.row(0).to_vec()))
    }
}

/// Outcome of re-predicting one labeled example
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassifiedExample {
    pub item_id: String,
    pub selected: bool,
    pub predicted_class: PredictedClass,
}

/// Returned to the caller of a training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingResult {
    pub trained_model_id: Uuid,
    pub logs: Vec<String>,
    /// Minimum of the four component scores
    pub score: f64,
    pub score_by_validation_dataset: f64,
    pub score_by_training_dataset: f64,
    pub score_by_training_tweets: f64,
    pub score_by_training_tweets_except_unselect: f64,
    pub classified_tweets: Vec<ClassifiedExample>,
}

impl TrainingResult {
    /// Pessimistic aggregate over the four scores
    pub fn overall(scores: [f64; 4]) -> f64 {
        scores.iter().copied().fold(f64::INFINITY, f64::min)
    }
}

/// Map a class index to the item decision
pub fn class_from_index(index: usize) -> PredictedClass {
    if index == CLASS_ACCEPT {
        PredictedClass::Accept
    } else {
        PredictedClass::Reject
    }
}

/// Fraction of positions where predictions match labels; empty input scores 0
pub fn accuracy(predicted: &[usize], expected: &[usize]) -> f64 {
    if expected.is_empty() {
        return 0.0;
    }
    let correct = predicted
        .iter()
        .zip(expected.iter())
        .filter(|(p, e)| p == e)
        .count();
    correct as f64 / expected.len() as f64
}
