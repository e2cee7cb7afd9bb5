use crate::error::{AppError, Result};
use crate::filters::FilterManager;
use crate::metrics::{TRAINING_LAST_SCORE, TRAINING_RUNS_TOTAL};
use crate::ml::classifier::{Classifier, FeedForwardNetwork};
use crate::ml::dataset::{LabeledRow, PreparedDataset};
use crate::ml::models::{
    accuracy, ClassifiedExample, Topology, TrainedModel, TrainingConfig, TrainingResult,
    NUM_CLASSES,
};
use crate::ml::predictor::Predictor;
use crate::models::{Item, PredictedClass};
use crate::state::{StagedModuleStorage, Stores};
use std::sync::Arc;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};
use uuid::Uuid;

/// Trains a filter pattern's classifier from the topic's labeled examples
pub struct Trainer {
    stores: Stores,
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(stores: Stores, config: TrainingConfig) -> Self {
        Self { stores, config }
    }

    /// Train, score and persist. Nothing is written unless every step succeeds:
    /// filter state learned during the run is staged and committed right after
    /// the model artifact is saved.
    pub async fn train(&self, topic_id: &Uuid, pattern_id: &Uuid) -> Result<TrainingResult> {
        let result = self.run(topic_id, pattern_id).await;
        let outcome = if result.is_ok() { "success" } else { "failure" };
        TRAINING_RUNS_TOTAL.with_label_values(&[outcome]).inc();

        match &result {
            Ok(r) => {
                TRAINING_LAST_SCORE
                    .with_label_values(&[&topic_id.to_string()])
                    .set(r.score);
                info!(
                    topic_id = %topic_id,
                    pattern_id = %pattern_id,
                    model_id = %r.trained_model_id,
                    score = r.score,
                    "Training completed"
                );
            }
            Err(e) => warn!(topic_id = %topic_id, pattern_id = %pattern_id, error = %e, "Training failed"),
        }
        result
    }

    async fn run(&self, topic_id: &Uuid, pattern_id: &Uuid) -> Result<TrainingResult> {
        let mut topic = self
            .stores
            .topics
            .get_topic(topic_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Topic {} not found", topic_id)))?;
        let pattern = topic
            .pattern(pattern_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Filter pattern {} not found", pattern_id)))?;

        let examples = self.load_examples(topic_id).await?;
        if examples.is_empty() {
            return Err(AppError::Training(format!(
                "Topic {} has no labeled examples",
                topic_id
            )));
        }

        // Filter state learned here only reaches the store with the model
        let staged = Arc::new(StagedModuleStorage::new(self.stores.modules.clone()));
        let mut manager = FilterManager::from_pattern(&pattern, staged.clone())?;
        manager.batch_preprocess_all().await?;
        manager.initialize_if_needed(&examples).await?;

        let mut rows = Vec::with_capacity(examples.len());
        for (item, selected) in &examples {
            match manager.run(item).await {
                Ok(results) => rows.push(LabeledRow::new(&results, *selected)),
                Err(AppError::NoUsableFilters(reason)) => {
                    warn!(item_id = %item.id_str, reason = %reason, "Skipping unscorable example");
                }
                Err(e) => return Err(e),
            }
        }

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let prepared = PreparedDataset::prepare(&rows, &self.config, &mut rng)?;
        let mut network = FeedForwardNetwork::new(
            Topology {
                inputs: prepared.input_width(),
                hidden: self.config.hidden_units,
                outputs: NUM_CLASSES,
            },
            &mut rng,
        );
        let logs = network.train(&prepared.train.features, &prepared.train.labels, &self.config)?;

        let score_by_validation_dataset = if prepared.validation.is_empty() {
            0.0
        } else {
            accuracy(
                &network.predict(&prepared.validation.features)?,
                &prepared.validation.classes,
            )
        };
        let score_by_training_dataset = accuracy(
            &network.predict(&prepared.train.features)?,
            &prepared.train.classes,
        );

        let mut model = TrainedModel {
            id: Uuid::new_v4(),
            topic_id: *topic_id,
            filter_pattern_id: *pattern_id,
            network,
            columns: prepared.columns,
            normalization_constants: prepared.constants,
            score: 0.0,
            created_at: Utc::now(),
        };

        // End to end: rerun the filters and classify through the stored layout
        let mut predictor = Predictor::from_model(model.clone());
        let mut classified_tweets = Vec::with_capacity(examples.len());
        for (item, selected) in &examples {
            let predicted_class = match predictor.predict(&mut manager, item).await {
                Ok(prediction) => prediction.predicted_class,
                Err(AppError::NoUsableFilters(_)) => PredictedClass::Unset,
                Err(e) => return Err(e),
            };
            classified_tweets.push(ClassifiedExample {
                item_id: item.id_str.clone(),
                selected: *selected,
                predicted_class,
            });
        }

        let score_by_training_tweets = end_to_end_accuracy(classified_tweets.iter());
        let score_by_training_tweets_except_unselect =
            end_to_end_accuracy(classified_tweets.iter().filter(|c| c.selected));

        let score = TrainingResult::overall([
            score_by_validation_dataset,
            score_by_training_dataset,
            score_by_training_tweets,
            score_by_training_tweets_except_unselect,
        ]);
        model.score = score;

        self.stores.models.save_model(&model).await?;
        staged.commit().await?;
        if let Some(stored_pattern) = topic.pattern_mut(pattern_id) {
            stored_pattern.score = Some(score);
            stored_pattern.trained_model_id = Some(model.id);
        }
        self.stores.topics.save_topic(&topic).await?;

        Ok(TrainingResult {
            trained_model_id: model.id,
            logs,
            score,
            score_by_validation_dataset,
            score_by_training_dataset,
            score_by_training_tweets,
            score_by_training_tweets_except_unselect,
            classified_tweets,
        })
    }

    async fn load_examples(&self, topic_id: &Uuid) -> Result<Vec<(Item, bool)>> {
        let labeled = self.stores.models.list_labeled_examples(topic_id).await?;
        let mut examples = Vec::with_capacity(labeled.len());

        for example in labeled {
            match self.stores.items.get_item(topic_id, &example.item_id).await? {
                Some(item) => examples.push((item, example.selected)),
                None => warn!(item_id = %example.item_id, "Labeled example refers to a missing item"),
            }
        }
        Ok(examples)
    }
}

/// Share of examples whose predicted class matches the label; empty sets score 0
fn end_to_end_accuracy<'a>(examples: impl Iterator<Item = &'a ClassifiedExample>) -> f64 {
    let (total, correct) = examples.fold((0usize, 0usize), |(total, correct), c| {
        let expected = if c.selected {
            PredictedClass::Accept
        } else {
            PredictedClass::Reject
        };
        (total + 1, correct + usize::from(c.predicted_class == expected))
    });

    if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FilterPattern, LabeledExample, ModuleSetting, Topic};
    use crate::state::{InMemoryStore, ModelStore, ModuleStorage};
    use async_trait::async_trait;

    /// Model store whose artifact writes always fail
    struct ReadOnlyModels(InMemoryStore);

    #[async_trait]
    impl ModelStore for ReadOnlyModels {
        async fn save_model(&self, _model: &TrainedModel) -> Result<()> {
            Err(AppError::Internal("model store is read only".to_string()))
        }

        async fn get_model(&self, id: &Uuid) -> Result<Option<TrainedModel>> {
            self.0.get_model(id).await
        }

        async fn delete_model(&self, id: &Uuid) -> Result<()> {
            self.0.delete_model(id).await
        }

        async fn save_labeled_example(&self, topic_id: &Uuid, example: &LabeledExample) -> Result<()> {
            self.0.save_labeled_example(topic_id, example).await
        }

        async fn list_labeled_examples(&self, topic_id: &Uuid) -> Result<Vec<LabeledExample>> {
            self.0.list_labeled_examples(topic_id).await
        }
    }

    fn quick_config() -> TrainingConfig {
        TrainingConfig {
            epochs: 20,
            seed: Some(3),
            ..Default::default()
        }
    }

    /// Text classifier topic with 20 labeled posts
    async fn seed(stores: &Stores) -> Topic {
        let topic = Topic::new("words").with_pattern(FilterPattern::new(
            "words",
            vec![ModuleSetting::new("text_classifier", "nb")],
        ));
        stores.topics.save_topic(&topic).await.unwrap();

        for i in 0..20 {
            let selected = i % 2 == 0;
            let text = if selected {
                "async rust runtime release"
            } else {
                "weekend cooking recipe"
            };
            let item = Item::new(format!("l-{}", i), topic.id, text);
            stores.items.save_item(&item).await.unwrap();
            stores
                .models
                .save_labeled_example(
                    &topic.id,
                    &LabeledExample {
                        item_id: item.id_str.clone(),
                        selected,
                    },
                )
                .await
                .unwrap();
        }
        topic
    }

    #[tokio::test]
    async fn test_filter_state_is_kept_only_with_the_model() {
        let memory = Arc::new(InMemoryStore::new());
        let mut stores = Stores::from_backend(memory.clone());
        stores.models = Arc::new(ReadOnlyModels(memory.as_ref().clone()));
        let topic = seed(&stores).await;
        let pattern_id = topic.filter_patterns[0].id;

        let result = Trainer::new(stores.clone(), quick_config())
            .train(&topic.id, &pattern_id)
            .await;
        assert!(result.is_err());

        // Nothing the filters learned during the failed run was written
        assert!(memory.get_module_value("text_classifier::nb").await.unwrap().is_none());
        assert!(memory
            .get_item_value("text_classifier::nb", "l-0")
            .await
            .unwrap()
            .is_none());

        // A successful run persists model and filter state together
        let stores = Stores::from_backend(memory.clone());
        let trained = Trainer::new(stores, quick_config())
            .train(&topic.id, &pattern_id)
            .await
            .unwrap();
        assert!(memory.get_model(&trained.trained_model_id).await.unwrap().is_some());
        assert!(memory.get_module_value("text_classifier::nb").await.unwrap().is_some());
    }

    fn example(selected: bool, predicted_class: PredictedClass) -> ClassifiedExample {
        ClassifiedExample {
            item_id: "x".into(),
            selected,
            predicted_class,
        }
    }

    #[test]
    fn test_end_to_end_accuracy() {
        let examples = vec![
            example(true, PredictedClass::Accept),
            example(true, PredictedClass::Reject),
            example(false, PredictedClass::Reject),
            example(false, PredictedClass::Unset),
        ];
        assert_eq!(end_to_end_accuracy(examples.iter()), 0.5);
        assert_eq!(end_to_end_accuracy(examples.iter().filter(|c| c.selected)), 0.5);
        assert_eq!(end_to_end_accuracy(std::iter::empty()), 0.0);
    }
}
