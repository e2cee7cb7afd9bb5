use crate::error::{AppError, Result};
use crate::filters::FilterManager;
use crate::ml::models::TrainedModel;
use crate::models::{FilterResult, Item, PredictedClass};
use crate::state::ModelStore;
use std::sync::Arc;
use uuid::Uuid;

/// Classification of one item
#[derive(Debug, Clone)]
pub struct Prediction {
    pub predicted_class: PredictedClass,
    pub probabilities: Vec<f64>,
    pub filters_result: Vec<FilterResult>,
}

enum Source {
    Store {
        models: Arc<dyn ModelStore>,
        model_id: Uuid,
    },
    Loaded,
}

/// Classifies items with a persisted model. The artifact is loaded on first
/// use and kept for the lifetime of the predictor.
pub struct Predictor {
    source: Source,
    model: Option<TrainedModel>,
}

impl Predictor {
    pub fn new(models: Arc<dyn ModelStore>, model_id: Uuid) -> Self {
        Self {
            source: Source::Store { models, model_id },
            model: None,
        }
    }

    pub fn from_model(model: TrainedModel) -> Self {
        Self {
            source: Source::Loaded,
            model: Some(model),
        }
    }

    pub async fn model(&mut self) -> Result<&TrainedModel> {
        if self.model.is_none() {
            if let Source::Store { models, model_id } = &self.source {
                let loaded = models.get_model(model_id).await?.ok_or_else(|| {
                    AppError::NotFound(format!("Trained model {} not found", model_id))
                })?;
                tracing::debug!(model_id = %model_id, "Loaded trained model");
                self.model = Some(loaded);
            }
        }
        self.model
            .as_ref()
            .ok_or_else(|| AppError::Internal("Predictor has no model".to_string()))
    }

    /// Run the filters, apply the stored normalization and classify
    pub async fn predict(&mut self, manager: &mut FilterManager, item: &Item) -> Result<Prediction> {
        let filters_result = manager.run(item).await?;
        let model = self.model().await?;
        let (predicted_class, probabilities) = model.classify(&filters_result)?;

        Ok(Prediction {
            predicted_class,
            probabilities,
            filters_result,
        })
    }
}
