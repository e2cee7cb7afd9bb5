//! Per-topic curation operations
//!
//! `CuratorService` is what the scheduler jobs, the HTTP handlers and the CLI
//! call into: classify unclassified items, run one action pass, train the
//! enabled filter pattern, apply human corrections and out-of-band decisions.

use crate::actions::{ActionEnv, ActionManager, Decision, PassReport, TokenSigner};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::filters::FilterManager;
use crate::metrics::ITEMS_CLASSIFIED_TOTAL;
use crate::ml::{Predictor, Trainer, TrainingConfig, TrainingResult};
use crate::models::{Item, LabeledExample, PredictedClass, Topic};
use crate::state::{ItemFilter, Stores};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of one classification pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClassificationReport {
    pub accepted: usize,
    pub rejected: usize,
    /// Items no filter could score; they stay unclassified
    pub failed: usize,
    /// Set when the topic has no enabled pattern with a trained model
    pub skipped: bool,
}

/// Curation service over one set of stores
pub struct CuratorService {
    stores: Stores,
    signer: Arc<TokenSigner>,
    actions: ActionManager,
    training: TrainingConfig,
    classification_batch_size: usize,
}

impl CuratorService {
    pub fn new(stores: Stores, config: &Config) -> Result<Self> {
        let signer = Arc::new(TokenSigner::from_config(&config.tokens)?);
        let env = ActionEnv::new(
            stores.modules.clone(),
            signer.clone(),
            config.server.public_base_url.clone(),
            Duration::from_secs(config.server.request_timeout_secs),
        )?;

        Ok(Self {
            actions: ActionManager::new(stores.clone(), env, config.pipeline.action_batch_size),
            stores,
            signer,
            training: config.training.clone(),
            classification_batch_size: config.pipeline.classification_batch_size,
        })
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    pub async fn get_topic(&self, topic_id: &Uuid) -> Result<Topic> {
        self.stores
            .topics
            .get_topic(topic_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Topic {} not found", topic_id)))
    }

    pub async fn list_topics(&self) -> Result<Vec<Topic>> {
        self.stores.topics.list_topics().await
    }

    pub async fn get_item(&self, topic_id: &Uuid, item_id: &str) -> Result<Item> {
        self.stores
            .items
            .get_item(topic_id, item_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Item {} not found", item_id)))
    }

    /// Classify a batch of unclassified items of a topic with its enabled
    /// pattern, the least recently tried first
    pub async fn classify_topic(&self, topic_id: &Uuid) -> Result<ClassificationReport> {
        let topic = self.get_topic(topic_id).await?;
        let mut report = ClassificationReport::default();

        let (pattern, model_id) = match topic
            .enabled_pattern()
            .and_then(|p| p.trained_model_id.map(|id| (p, id)))
        {
            Some(found) => found,
            None => {
                warn!(topic_id = %topic_id, "No enabled pattern with a trained model, skipping classification");
                report.skipped = true;
                return Ok(report);
            }
        };

        let items = self
            .stores
            .items
            .list_items(topic_id, &ItemFilter::unclassified(), self.classification_batch_size)
            .await?;
        if items.is_empty() {
            return Ok(report);
        }

        let mut manager = FilterManager::from_pattern(pattern, self.stores.modules.clone())?;
        let mut predictor = Predictor::new(self.stores.models.clone(), model_id);

        for mut item in items {
            let prediction = match predictor.predict(&mut manager, &item).await {
                Ok(prediction) => prediction,
                Err(AppError::NoUsableFilters(message)) => {
                    warn!(item_id = %item.id_str, topic_id = %topic_id, reason = %message, "Item could not be scored");
                    // Stamped so the next pass tries items it has not seen yet first
                    item.record_classification_failure(message, Utc::now());
                    self.stores.items.update_item(&item).await?;
                    report.failed += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            item.record_classified(prediction.predicted_class, Utc::now());
            item.filters_result = prediction.filters_result;
            self.stores.items.update_item(&item).await?;

            ITEMS_CLASSIFIED_TOTAL
                .with_label_values(&[&item.predicted_class.to_string()])
                .inc();
            match item.predicted_class {
                PredictedClass::Accept => report.accepted += 1,
                _ => report.rejected += 1,
            }
            debug!(item_id = %item.id_str, class = %item.predicted_class, "Item classified");
        }

        info!(
            topic_id = %topic_id,
            accepted = report.accepted,
            rejected = report.rejected,
            failed = report.failed,
            "Classification pass finished"
        );
        Ok(report)
    }

    /// Run one action pass over the topic's accepted items
    pub async fn run_actions(&self, topic_id: &Uuid) -> Result<PassReport> {
        let topic = self.get_topic(topic_id).await?;
        self.actions.run_pass(&topic).await
    }

    /// Train the enabled pattern of a topic
    pub async fn train_topic(&self, topic_id: &Uuid) -> Result<TrainingResult> {
        let topic = self.get_topic(topic_id).await?;
        let pattern = topic.enabled_pattern().ok_or_else(|| {
            AppError::Validation(format!("Topic {} has no enabled filter pattern", topic_id))
        })?;
        self.train_pattern(topic_id, &pattern.id).await
    }

    pub async fn train_pattern(&self, topic_id: &Uuid, pattern_id: &Uuid) -> Result<TrainingResult> {
        Trainer::new(self.stores.clone(), self.training.clone())
            .train(topic_id, pattern_id)
            .await
    }

    /// Human override of a classification.
    ///
    /// Trainable filters learn from the correction, the label is kept as a
    /// training example and the item's class is replaced.
    pub async fn correct_classification(
        &self,
        topic_id: &Uuid,
        item_id: &str,
        correct: bool,
    ) -> Result<Item> {
        let topic = self.get_topic(topic_id).await?;
        let mut item = self.get_item(topic_id, item_id).await?;

        let previous = match item.predicted_class {
            PredictedClass::Accept => Some(true),
            PredictedClass::Reject => Some(false),
            PredictedClass::Unset => None,
        };

        if let Some(pattern) = topic.enabled_pattern() {
            let mut manager = FilterManager::from_pattern(pattern, self.stores.modules.clone())?;
            match previous {
                Some(previous) if previous != correct => {
                    manager.retrain_all(&item, previous, correct).await?
                }
                Some(_) => {}
                None => manager.train_all(&item, correct).await?,
            }
        }

        self.stores
            .models
            .save_labeled_example(
                topic_id,
                &LabeledExample {
                    item_id: item_id.to_string(),
                    selected: correct,
                },
            )
            .await?;

        let class = if correct {
            PredictedClass::Accept
        } else {
            PredictedClass::Reject
        };
        item.record_classified(class, Utc::now());
        self.stores.items.update_item(&item).await?;

        info!(item_id = %item_id, topic_id = %topic_id, class = %item.predicted_class, "Classification corrected");
        Ok(item)
    }

    pub async fn apply_decision(
        &self,
        topic_id: &Uuid,
        item_id: &str,
        token: &str,
        decision: Decision,
    ) -> Result<Item> {
        self.actions
            .apply_decision(topic_id, item_id, token, decision)
            .await
    }
}
