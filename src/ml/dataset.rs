use crate::error::{AppError, Result};
use crate::ml::models::{TrainingConfig, CLASS_ACCEPT, CLASS_REJECT, NUM_CLASSES};
use crate::models::{FeatureValue, FilterResult};
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One logical feature column. Categorical columns span `width` matrix columns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnSpec {
    /// `filterId.featureName`
    pub key: String,
    pub width: usize,
    pub categorical: bool,
}

/// z-score constants of one non-categorical column
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizationConstant {
    pub feature_key: String,
    pub mean: f64,
    /// Population standard deviation
    pub std: f64,
}

impl NormalizationConstant {
    pub fn apply(&self, value: f64) -> f64 {
        let divisor = if self.std > 0.0 { self.std } else { 1.0 };
        (value - self.mean) / divisor
    }
}

/// Flattened `(key, value)` view of a pipeline output in filter then feature order
pub fn keyed_features(results: &[FilterResult]) -> Vec<(String, FeatureValue)> {
    results
        .iter()
        .flat_map(|result| {
            result
                .values
                .iter()
                .map(move |f| (format!("{}.{}", result.filter_id, f.name), f.value.clone()))
        })
        .collect()
}

/// Encode one row against a fixed column layout.
///
/// Scalars are z-scored with the matching constant, categorical columns pass
/// through. Absent or mismatched columns become zeros and unknown keys are
/// dropped, so a scalar that is missing lands on its column mean.
pub fn encode_row(
    columns: &[ColumnSpec],
    constants: &[NormalizationConstant],
    features: &[(String, FeatureValue)],
) -> Vec<f64> {
    let by_key: HashMap<&str, &FeatureValue> =
        features.iter().map(|(k, v)| (k.as_str(), v)).collect();
    let constant_by_key: HashMap<&str, &NormalizationConstant> = constants
        .iter()
        .map(|c| (c.feature_key.as_str(), c))
        .collect();

    let mut row = Vec::with_capacity(columns.iter().map(|c| c.width).sum());
    for column in columns {
        match (column.categorical, by_key.get(column.key.as_str())) {
            (false, Some(FeatureValue::Scalar(v))) => {
                let normalized = constant_by_key
                    .get(column.key.as_str())
                    .map_or(*v, |c| c.apply(*v));
                row.push(normalized);
            }
            (true, Some(FeatureValue::OneHot(values))) if values.len() == column.width => {
                row.extend_from_slice(values);
            }
            _ => row.extend(std::iter::repeat(0.0).take(column.width)),
        }
    }
    row
}

/// Pipeline output for one labeled example
#[derive(Debug, Clone)]
pub struct LabeledRow {
    pub features: Vec<(String, FeatureValue)>,
    pub selected: bool,
}

impl LabeledRow {
    pub fn new(results: &[FilterResult], selected: bool) -> Self {
        Self {
            features: keyed_features(results),
            selected,
        }
    }

    pub fn class_index(&self) -> usize {
        if self.selected {
            CLASS_ACCEPT
        } else {
            CLASS_REJECT
        }
    }
}

/// Feature matrix with one-hot labels
#[derive(Debug, Clone)]
pub struct Dataset {
    pub features: Array2<f64>,
    pub labels: Array2<f64>,
    pub classes: Vec<usize>,
}

impl Dataset {
    fn from_rows(encoded: &[Vec<f64>], classes: Vec<usize>, width: usize) -> Result<Self> {
        let flat: Vec<f64> = encoded.iter().flatten().copied().collect();
        let features = Array2::from_shape_vec((encoded.len(), width), flat)
            .map_err(|e| AppError::Training(format!("Invalid feature matrix: {}", e)))?;
        Ok(Self {
            labels: one_hot_labels(&classes),
            features,
            classes,
        })
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Labels as `n x 3` one-hot rows: reject, accept, reserved
pub fn one_hot_labels(classes: &[usize]) -> Array2<f64> {
    let mut labels = Array2::zeros((classes.len(), NUM_CLASSES));
    for (mut row, &class) in labels.axis_iter_mut(Axis(0)).zip(classes) {
        row[class] = 1.0;
    }
    labels
}

/// Normalized, shuffled and split training data plus the layout needed to
/// reproduce the encoding at prediction time
#[derive(Debug, Clone)]
pub struct PreparedDataset {
    pub columns: Vec<ColumnSpec>,
    pub constants: Vec<NormalizationConstant>,
    pub train: Dataset,
    pub validation: Dataset,
}

impl PreparedDataset {
    pub fn input_width(&self) -> usize {
        self.columns.iter().map(|c| c.width).sum()
    }

    /// Build the dataset from labeled rows.
    ///
    /// The column layout is the union of feature keys in first-seen order,
    /// each column's kind and width taken from its first occurrence.
    pub fn prepare(rows: &[LabeledRow], config: &TrainingConfig, rng: &mut StdRng) -> Result<Self> {
        if rows.is_empty() {
            return Err(AppError::Training(
                "No labeled examples produced features".to_string(),
            ));
        }

        let columns = column_layout(rows);
        let width: usize = columns.iter().map(|c| c.width).sum();
        if width == 0 {
            return Err(AppError::Training(
                "Zero usable feature columns".to_string(),
            ));
        }

        let constants = normalization_constants(&columns, rows);

        let mut order: Vec<usize> = (0..rows.len()).collect();
        order.shuffle(rng);

        let validation_count = validation_size(rows.len(), config.validation_fraction);
        if validation_count >= rows.len() {
            return Err(AppError::Training(format!(
                "Validation fraction {} leaves no training rows",
                config.validation_fraction
            )));
        }

        let (validation_idx, train_idx) = order.split_at(validation_count);
        let encode = |indices: &[usize]| -> Result<Dataset> {
            let encoded: Vec<Vec<f64>> = indices
                .iter()
                .map(|&i| encode_row(&columns, &constants, &rows[i].features))
                .collect();
            let classes = indices.iter().map(|&i| rows[i].class_index()).collect();
            Dataset::from_rows(&encoded, classes, width)
        };

        let train = encode(train_idx)?;
        let validation = encode(validation_idx)?;

        tracing::debug!(
            rows = rows.len(),
            columns = columns.len(),
            width = width,
            validation = validation.len(),
            "Prepared training dataset"
        );

        Ok(Self {
            columns,
            constants,
            train,
            validation,
        })
    }
}

/// At least one validation row once there are two rows and a non-zero fraction
pub fn validation_size(rows: usize, fraction: f64) -> usize {
    if fraction <= 0.0 || rows < 2 {
        return 0;
    }
    ((rows as f64 * fraction).floor() as usize).max(1)
}

fn column_layout(rows: &[LabeledRow]) -> Vec<ColumnSpec> {
    let mut columns: Vec<ColumnSpec> = Vec::new();
    for row in rows {
        for (key, value) in &row.features {
            if columns.iter().any(|c| &c.key == key) {
                continue;
            }
            columns.push(ColumnSpec {
                key: key.clone(),
                width: value.width(),
                categorical: value.is_categorical(),
            });
        }
    }
    columns
}

fn normalization_constants(columns: &[ColumnSpec], rows: &[LabeledRow]) -> Vec<NormalizationConstant> {
    columns
        .iter()
        .filter(|c| !c.categorical)
        .map(|column| {
            let values: Vec<f64> = rows
                .iter()
                .filter_map(|row| {
                    row.features
                        .iter()
                        .find(|(k, _)| k == &column.key)
                        .and_then(|(_, v)| v.as_scalar())
                })
                .collect();

            let n = values.len().max(1) as f64;
            let mean = values.iter().sum::<f64>() / n;
            let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

            NormalizationConstant {
                feature_key: column.key.clone(),
                mean,
                std: variance.sqrt(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NamedFeature;
    use rand::SeedableRng;

    fn result(filter_id: &str, values: Vec<(&str, FeatureValue)>) -> FilterResult {
        FilterResult {
            filter_id: filter_id.to_string(),
            values: values
                .into_iter()
                .map(|(name, value)| NamedFeature {
                    name: name.to_string(),
                    title: name.to_string(),
                    value,
                })
                .collect(),
            summary: String::new(),
        }
    }

    fn create_test_rows() -> Vec<LabeledRow> {
        (0..10)
            .map(|i| {
                let results = vec![
                    result("e", vec![("likes", FeatureValue::Scalar(i as f64))]),
                    result("m", vec![("media", FeatureValue::one_hot(i % 3, 3))]),
                ];
                LabeledRow::new(&results, i >= 5)
            })
            .collect()
    }

    #[test]
    fn test_keyed_features_order() {
        let results = vec![
            result("a", vec![("x", FeatureValue::Scalar(1.0)), ("y", FeatureValue::Scalar(2.0))]),
            result("b", vec![("z", FeatureValue::one_hot(0, 2))]),
        ];
        let keys: Vec<String> = keyed_features(&results).into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a.x", "a.y", "b.z"]);
    }

    #[test]
    fn test_constants_are_population_statistics() {
        let rows = create_test_rows();
        let mut rng = StdRng::seed_from_u64(7);
        let prepared = PreparedDataset::prepare(&rows, &TrainingConfig::default(), &mut rng).unwrap();

        assert_eq!(prepared.constants.len(), 1);
        let c = &prepared.constants[0];
        assert_eq!(c.feature_key, "e.likes");
        assert!((c.mean - 4.5).abs() < 1e-9);
        assert!((c.std - 8.25f64.sqrt()).abs() < 1e-9);
        assert_eq!(prepared.input_width(), 4);
    }

    #[test]
    fn test_split_sizes() {
        let rows = create_test_rows();
        let mut rng = StdRng::seed_from_u64(1);
        let prepared = PreparedDataset::prepare(&rows, &TrainingConfig::default(), &mut rng).unwrap();
        assert_eq!(prepared.validation.len(), 1);
        assert_eq!(prepared.train.len(), 9);
        assert_eq!(prepared.train.labels.ncols(), NUM_CLASSES);
    }

    #[test]
    fn test_validation_size() {
        assert_eq!(validation_size(10, 0.1), 1);
        assert_eq!(validation_size(3, 0.1), 1);
        assert_eq!(validation_size(1, 0.1), 0);
        assert_eq!(validation_size(40, 0.25), 10);
        assert_eq!(validation_size(40, 0.0), 0);
    }

    #[test]
    fn test_missing_columns_fill_with_zeros() {
        let columns = vec![
            ColumnSpec { key: "a.x".into(), width: 1, categorical: false },
            ColumnSpec { key: "b.y".into(), width: 2, categorical: true },
        ];
        let constants = vec![NormalizationConstant {
            feature_key: "a.x".into(),
            mean: 2.0,
            std: 0.0,
        }];

        let row = encode_row(&columns, &constants, &[("c.unknown".into(), FeatureValue::Scalar(9.0))]);
        assert_eq!(row, vec![0.0, 0.0, 0.0]);

        let row = encode_row(&columns, &constants, &[("a.x".into(), FeatureValue::Scalar(5.0))]);
        assert_eq!(row, vec![3.0, 0.0, 0.0]);
    }

    #[test]
    fn test_zero_width_fails() {
        let rows = vec![LabeledRow::new(&[result("a", vec![])], true)];
        let mut rng = StdRng::seed_from_u64(1);
        let err = PreparedDataset::prepare(&rows, &TrainingConfig::default(), &mut rng).unwrap_err();
        assert!(matches!(err, AppError::Training(_)));
    }

    #[test]
    fn test_one_hot_labels() {
        let labels = one_hot_labels(&[CLASS_REJECT, CLASS_ACCEPT]);
        assert_eq!(labels.row(0).to_vec(), vec![1.0, 0.0, 0.0]);
        assert_eq!(labels.row(1).to_vec(), vec![0.0, 1.0, 0.0]);
    }
}
