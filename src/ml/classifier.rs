use crate::error::{AppError, Result};
use crate::ml::models::{LossFunction, Topology, TrainingConfig};
use ndarray::{Array1, Array2, Axis};
use ndarray_stats::QuantileExt;
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Trait for classifiers
pub trait Classifier: Send + Sync {
    /// Train on a feature matrix and one-hot labels, returning epoch logs
    fn train(
        &mut self,
        features: &Array2<f64>,
        labels: &Array2<f64>,
        config: &TrainingConfig,
    ) -> Result<Vec<String>>;

    /// Predict class probabilities, one row per sample
    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array2<f64>>;

    /// Predict class indices
    fn predict(&self, features: &Array2<f64>) -> Result<Vec<usize>>;

    /// Layer sizes
    fn topology(&self) -> Topology;

    /// Check if model is trained
    fn is_trained(&self) -> bool;
}

/// One sigmoid hidden layer and a softmax output layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedForwardNetwork {
    topology: Topology,
    w1: Array2<f64>,
    b1: Array1<f64>,
    w2: Array2<f64>,
    b2: Array1<f64>,
    trained: bool,
}

struct ForwardPass {
    hidden: Array2<f64>,
    output: Array2<f64>,
}

impl FeedForwardNetwork {
    /// Xavier-uniform initialized network
    pub fn new(topology: Topology, rng: &mut StdRng) -> Self {
        let w1 = xavier(topology.inputs, topology.hidden, rng);
        let w2 = xavier(topology.hidden, topology.outputs, rng);

        Self {
            topology,
            w1,
            b1: Array1::zeros(topology.hidden),
            w2,
            b2: Array1::zeros(topology.outputs),
            trained: false,
        }
    }

    fn check_inputs(&self, features: &Array2<f64>) -> Result<()> {
        if features.ncols() != self.topology.inputs {
            return Err(AppError::Validation(format!(
                "Expected {} feature columns, got {}",
                self.topology.inputs,
                features.ncols()
            )));
        }
        Ok(())
    }

    fn forward(&self, features: &Array2<f64>) -> ForwardPass {
        let mut z1 = features.dot(&self.w1);
        z1 += &self.b1;
        let hidden = z1.mapv(sigmoid);

        let mut z2 = hidden.dot(&self.w2);
        z2 += &self.b2;
        softmax_rows(&mut z2);

        ForwardPass { hidden, output: z2 }
    }

    /// Gradient of the loss with respect to the output pre-activations
    fn output_gradient(loss: LossFunction, probs: &Array2<f64>, labels: &Array2<f64>) -> Array2<f64> {
        let n = probs.nrows().max(1) as f64;
        match loss {
            LossFunction::CategoricalCrossEntropy => (probs - labels) / n,
            LossFunction::MeanSquaredError => {
                // dL/dp pushed through the softmax jacobian row by row
                let grad = (probs - labels) * (2.0 / n);
                let weighted = (&grad * probs).sum_axis(Axis(1)).insert_axis(Axis(1));
                let mut centered = grad;
                centered -= &weighted;
                centered * probs
            }
        }
    }

    fn loss_value(loss: LossFunction, probs: &Array2<f64>, labels: &Array2<f64>) -> f64 {
        let n = probs.nrows().max(1) as f64;
        match loss {
            LossFunction::CategoricalCrossEntropy => {
                -(labels * &probs.mapv(|p| (p + 1e-12).ln())).sum() / n
            }
            LossFunction::MeanSquaredError => (probs - labels).mapv(|d| d * d).sum() / n,
        }
    }

    fn argmax_rows(probs: &Array2<f64>) -> Result<Vec<usize>> {
        probs
            .axis_iter(Axis(0))
            .map(|row| {
                row.argmax()
                    .map_err(|e| AppError::Internal(format!("argmax failed: {}", e)))
            })
            .collect()
    }
}

impl Classifier for FeedForwardNetwork {
    fn train(
        &mut self,
        features: &Array2<f64>,
        labels: &Array2<f64>,
        config: &TrainingConfig,
    ) -> Result<Vec<String>> {
        self.check_inputs(features)?;
        if features.nrows() == 0 || features.nrows() != labels.nrows() {
            return Err(AppError::Training(format!(
                "Feature rows ({}) and label rows ({}) must match and be non-empty",
                features.nrows(),
                labels.nrows()
            )));
        }
        if labels.ncols() != self.topology.outputs {
            return Err(AppError::Training(format!(
                "Expected {} label columns, got {}",
                self.topology.outputs,
                labels.ncols()
            )));
        }

        let lr = config.learning_rate;
        let log_every = config.log_every.max(1);
        let expected = Self::argmax_rows(labels)?;
        let mut logs = Vec::new();

        for epoch in 1..=config.epochs {
            let pass = self.forward(features);

            let dz2 = Self::output_gradient(config.loss, &pass.output, labels);
            let dw2 = pass.hidden.t().dot(&dz2);
            let db2 = dz2.sum_axis(Axis(0));

            let da1 = dz2.dot(&self.w2.t());
            let dz1 = da1 * &pass.hidden.mapv(|a| a * (1.0 - a));
            let dw1 = features.t().dot(&dz1);
            let db1 = dz1.sum_axis(Axis(0));

            self.w2.scaled_add(-lr, &dw2);
            self.b2.scaled_add(-lr, &db2);
            self.w1.scaled_add(-lr, &dw1);
            self.b1.scaled_add(-lr, &db1);

            if epoch % log_every == 0 || epoch == config.epochs {
                let after = self.forward(features).output;
                let loss = Self::loss_value(config.loss, &after, labels);
                let predicted = Self::argmax_rows(&after)?;
                let acc = crate::ml::models::accuracy(&predicted, &expected);
                let line = format!("epoch {}: loss={:.6} accuracy={:.4}", epoch, loss, acc);
                tracing::debug!(epoch, loss, accuracy = acc, "Training epoch");
                logs.push(line);
            }
        }

        self.trained = true;
        Ok(logs)
    }

    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.trained {
            return Err(AppError::Internal("Model not trained".to_string()));
        }
        self.check_inputs(features)?;
        Ok(self.forward(features).output)
    }

    fn predict(&self, features: &Array2<f64>) -> Result<Vec<usize>> {
        let probs = self.predict_proba(features)?;
        Self::argmax_rows(&probs)
    }

    fn topology(&self) -> Topology {
        self.topology
    }

    fn is_trained(&self) -> bool {
        self.trained
    }
}

fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

fn softmax_rows(z: &mut Array2<f64>) {
    for mut row in z.axis_iter_mut(Axis(0)) {
        let max = row.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
}

fn xavier(fan_in: usize, fan_out: usize, rng: &mut StdRng) -> Array2<f64> {
    let limit = (6.0 / (fan_in + fan_out).max(1) as f64).sqrt();
    Array2::from_shape_fn((fan_in, fan_out), |_| rng.random_range(-limit..=limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::dataset::one_hot_labels;
    use ndarray::array;
    use rand::SeedableRng;

    fn create_separable_data() -> (Array2<f64>, Array2<f64>) {
        let features = array![
            [-1.5, -1.0],
            [-1.2, -0.8],
            [-0.9, -1.3],
            [-1.1, -1.1],
            [1.4, 1.0],
            [1.0, 1.2],
            [1.3, 0.9],
            [0.9, 1.4],
        ];
        let labels = one_hot_labels(&[0, 0, 0, 0, 1, 1, 1, 1]);
        (features, labels)
    }

    fn create_test_network(inputs: usize) -> FeedForwardNetwork {
        let mut rng = StdRng::seed_from_u64(42);
        FeedForwardNetwork::new(
            Topology {
                inputs,
                hidden: 4,
                outputs: 3,
            },
            &mut rng,
        )
    }

    #[test]
    fn test_learns_separable_data() {
        let (features, labels) = create_separable_data();
        let mut network = create_test_network(2);
        let config = TrainingConfig {
            epochs: 500,
            ..Default::default()
        };

        let logs = network.train(&features, &labels, &config).unwrap();
        assert!(!logs.is_empty());
        assert!(logs.last().unwrap().starts_with("epoch 500"));
        assert_eq!(network.predict(&features).unwrap(), vec![0, 0, 0, 0, 1, 1, 1, 1]);
    }

    #[test]
    fn test_mean_squared_error_learns() {
        let (features, labels) = create_separable_data();
        let mut network = create_test_network(2);
        let config = TrainingConfig {
            epochs: 3000,
            learning_rate: 2.0,
            loss: LossFunction::MeanSquaredError,
            ..Default::default()
        };

        network.train(&features, &labels, &config).unwrap();
        assert_eq!(network.predict(&features).unwrap(), vec![0, 0, 0, 0, 1, 1, 1, 1]);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (features, labels) = create_separable_data();
        let mut network = create_test_network(2);
        network
            .train(&features, &labels, &TrainingConfig { epochs: 5, ..Default::default() })
            .unwrap();

        let probs = network.predict_proba(&features).unwrap();
        for row in probs.axis_iter(Axis(0)) {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_untrained_and_shape_errors() {
        let network = create_test_network(2);
        assert!(!network.is_trained());
        assert!(network.predict(&array![[1.0, 2.0]]).is_err());

        let (features, labels) = create_separable_data();
        let mut network = create_test_network(3);
        assert!(network
            .train(&features, &labels, &TrainingConfig::default())
            .is_err());
    }

    #[test]
    fn test_serde_round_trip_preserves_predictions() {
        let (features, labels) = create_separable_data();
        let mut network = create_test_network(2);
        network
            .train(&features, &labels, &TrainingConfig { epochs: 50, ..Default::default() })
            .unwrap();

        let json = serde_json::to_string(&network).unwrap();
        let restored: FeedForwardNetwork = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.topology(), network.topology());
        assert_eq!(
            restored.predict(&features).unwrap(),
            network.predict(&features).unwrap()
        );
    }
}
