/// Classifier training and scoring
///
/// - `dataset`: feature matrix construction, normalization and splitting
/// - `classifier`: the `Classifier` seam and the feed-forward network
/// - `trainer`: trains a filter pattern's model from labeled examples
/// - `predictor`: classifies items with a persisted model
pub mod classifier;
pub mod dataset;
pub mod models;
pub mod predictor;
pub mod trainer;

pub use classifier::{Classifier, FeedForwardNetwork};
pub use dataset::{ColumnSpec, LabeledRow, NormalizationConstant, PreparedDataset};
pub use models::{
    ClassifiedExample, LossFunction, Topology, TrainedModel, TrainingConfig, TrainingResult,
};
pub use predictor::{Prediction, Predictor};
pub use trainer::Trainer;
