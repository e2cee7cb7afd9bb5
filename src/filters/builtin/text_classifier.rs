use crate::error::Result;
use crate::filters::{FilterContext, FilterModule, FilterScore};
use crate::models::{FeatureValue, Item, SettingDefinition, SettingType};
use crate::state::ModuleStorage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

pub const NAME: &str = "text_classifier";

const REJECT: usize = 0;
const ACCEPT: usize = 1;

pub fn settings() -> Vec<SettingDefinition> {
    vec![
        SettingDefinition::new(
            "auxiliary_accept",
            "Extra texts to learn as accepted",
            SettingType::StringList,
        ),
        SettingDefinition::new(
            "auxiliary_reject",
            "Extra texts to learn as rejected",
            SettingType::StringList,
        ),
    ]
}

pub fn create(ctx: FilterContext) -> Result<Box<dyn FilterModule>> {
    let settings = ctx.settings();
    Ok(Box::new(TextClassifierFilter {
        module_key: ctx.module_key(),
        storage: ctx.storage.clone(),
        auxiliary_accept: settings.string_list("auxiliary_accept"),
        auxiliary_reject: settings.string_list("auxiliary_reject"),
        model: None,
    }))
}

/// Word counts per class, persisted under the module key
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WordModel {
    /// Bumped on every update; invalidates per-item memos
    pub version: u64,
    pub docs: [u64; 2],
    pub totals: [u64; 2],
    pub words: HashMap<String, [u64; 2]>,
    pub auxiliary_learned: bool,
}

impl WordModel {
    fn add(&mut self, tokens: &[String], class: usize) {
        self.docs[class] += 1;
        for token in tokens {
            self.words.entry(token.clone()).or_default()[class] += 1;
            self.totals[class] += 1;
        }
        self.version += 1;
    }

    fn remove(&mut self, tokens: &[String], class: usize) {
        self.docs[class] = self.docs[class].saturating_sub(1);
        for token in tokens {
            if let Some(counts) = self.words.get_mut(token) {
                if counts[class] > 0 {
                    counts[class] -= 1;
                    self.totals[class] = self.totals[class].saturating_sub(1);
                }
            }
        }
        self.words.retain(|_, counts| counts[0] + counts[1] > 0);
        self.version += 1;
    }

    /// Multinomial naive Bayes P(accept | tokens) with Laplace smoothing
    pub fn accept_probability(&self, tokens: &[String]) -> f64 {
        let total_docs = self.docs[REJECT] + self.docs[ACCEPT];
        if total_docs == 0 {
            return 0.5;
        }

        let vocabulary = self.words.len().max(1) as f64;
        let log_score = |class: usize| -> f64 {
            let prior = (self.docs[class] as f64 + 1.0) / (total_docs as f64 + 2.0);
            let denominator = self.totals[class] as f64 + vocabulary;
            tokens.iter().fold(prior.ln(), |acc, token| {
                let count = self.words.get(token).map_or(0, |c| c[class]) as f64;
                acc + ((count + 1.0) / denominator).ln()
            })
        };

        let accept = log_score(ACCEPT);
        let reject = log_score(REJECT);
        let max = accept.max(reject);
        let a = (accept - max).exp();
        let r = (reject - max).exp();
        a / (a + r)
    }
}

/// Lowercased word tokens of at least two characters; hashtags and mentions kept
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '#' || c == '@'))
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_string)
        .collect()
}

pub struct TextClassifierFilter {
    module_key: String,
    storage: Arc<dyn ModuleStorage>,
    auxiliary_accept: Vec<String>,
    auxiliary_reject: Vec<String>,
    /// Loaded once per instance
    model: Option<WordModel>,
}

impl TextClassifierFilter {
    async fn model(&mut self) -> Result<&mut WordModel> {
        if self.model.is_none() {
            let stored = match self.storage.get_module_value(&self.module_key).await? {
                Some(value) => serde_json::from_value(value)?,
                None => WordModel::default(),
            };
            self.model = Some(stored);
        }
        Ok(self.model.get_or_insert_with(WordModel::default))
    }

    async fn persist(&mut self) -> Result<()> {
        if let Some(model) = &self.model {
            let value = serde_json::to_value(model)?;
            self.storage.set_module_value(&self.module_key, value).await?;
        }
        Ok(())
    }

    fn class_of(selected: bool) -> usize {
        if selected {
            ACCEPT
        } else {
            REJECT
        }
    }
}

#[async_trait]
impl FilterModule for TextClassifierFilter {
    async fn score(&mut self, item: &Item) -> Result<FilterScore> {
        let model = self.model().await?;
        let version = model.version;

        let memo = self
            .storage
            .get_item_value(&self.module_key, &item.id_str)
            .await?;
        let cached = memo.and_then(|m| {
            (m.get("version")?.as_u64()? == version)
                .then(|| m.get("probability")?.as_f64())
                .flatten()
        });

        let probability = match cached {
            Some(p) => p,
            None => {
                let tokens = tokenize(&item.text);
                let p = self.model().await?.accept_probability(&tokens);
                self.storage
                    .set_item_value(
                        &self.module_key,
                        &item.id_str,
                        json!({"version": version, "probability": p}),
                    )
                    .await?;
                p
            }
        };

        Ok(FilterScore::new(format!("P(accept) = {:.3}", probability)).with_value(
            "accept_probability",
            "Accept probability",
            FeatureValue::Scalar(probability),
        ))
    }

    async fn should_initialize(&mut self) -> Result<bool> {
        let model = self.model().await?;
        Ok(model.docs[REJECT] + model.docs[ACCEPT] == 0)
    }

    async fn train(&mut self, item: &Item, selected: bool) -> Result<()> {
        let tokens = tokenize(&item.text);
        self.model().await?.add(&tokens, Self::class_of(selected));
        self.persist().await
    }

    async fn retrain(&mut self, item: &Item, previous: bool, correct: bool) -> Result<()> {
        if previous == correct {
            return Ok(());
        }
        let tokens = tokenize(&item.text);
        let model = self.model().await?;
        model.remove(&tokens, Self::class_of(previous));
        model.add(&tokens, Self::class_of(correct));
        self.persist().await
    }

    async fn batch_preprocess(&mut self) -> Result<()> {
        let accept: Vec<Vec<String>> = self.auxiliary_accept.iter().map(|t| tokenize(t)).collect();
        let reject: Vec<Vec<String>> = self.auxiliary_reject.iter().map(|t| tokenize(t)).collect();

        let model = self.model().await?;
        if model.auxiliary_learned {
            return Ok(());
        }
        for tokens in &accept {
            model.add(tokens, ACCEPT);
        }
        for tokens in &reject {
            model.add(tokens, REJECT);
        }
        model.auxiliary_learned = true;

        tracing::debug!(
            module_key = %self.module_key,
            accept = accept.len(),
            reject = reject.len(),
            "Learned auxiliary examples"
        );
        self.persist().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModuleSetting;
    use crate::state::InMemoryStore;
    use uuid::Uuid;

    fn create_test_filter(storage: Arc<InMemoryStore>) -> Box<dyn FilterModule> {
        let setting = ModuleSetting::new(NAME, "nb")
            .with_setting("auxiliary_accept", json!(["great rust release"]))
            .with_setting("auxiliary_reject", json!(["buy cheap followers"]));
        create(FilterContext::new(setting, storage)).unwrap()
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("Hello, #Rust world! a @ferris"),
            vec!["hello", "#rust", "world", "@ferris"]
        );
    }

    #[tokio::test]
    async fn test_untrained_scores_half() {
        let mut filter = create_test_filter(Arc::new(InMemoryStore::new()));
        assert!(filter.should_initialize().await.unwrap());

        let score = filter.score(&Item::new("1", Uuid::new_v4(), "anything")).await.unwrap();
        assert_eq!(score.values[0].value, FeatureValue::Scalar(0.5));
    }

    #[tokio::test]
    async fn test_training_shifts_probability_and_persists() {
        let storage = Arc::new(InMemoryStore::new());
        let topic = Uuid::new_v4();
        let mut filter = create_test_filter(storage.clone());

        filter.train(&Item::new("a", topic, "rust async runtime"), true).await.unwrap();
        filter.train(&Item::new("b", topic, "cheap crypto giveaway"), false).await.unwrap();
        assert!(!filter.should_initialize().await.unwrap());

        let unseen = Item::new("c", topic, "new rust runtime");
        let p = filter.score(&unseen).await.unwrap().values[0].value.as_scalar().unwrap();
        assert!(p > 0.5);

        // A fresh instance sees the persisted word counts
        let mut reloaded = create_test_filter(storage);
        let q = reloaded.score(&unseen).await.unwrap().values[0].value.as_scalar().unwrap();
        assert!((p - q).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_retrain_moves_words_between_classes() {
        let storage = Arc::new(InMemoryStore::new());
        let topic = Uuid::new_v4();
        let mut filter = create_test_filter(storage.clone());

        let item = Item::new("a", topic, "giveaway contest");
        filter.train(&item, true).await.unwrap();
        filter.train(&Item::new("b", topic, "rust release"), false).await.unwrap();
        let before = filter.score(&item).await.unwrap().values[0].value.as_scalar().unwrap();

        filter.retrain(&item, true, false).await.unwrap();
        let after = filter.score(&item).await.unwrap().values[0].value.as_scalar().unwrap();
        assert!(after < before);

        let stored: WordModel =
            serde_json::from_value(storage.get_module_value("text_classifier::nb").await.unwrap().unwrap())
                .unwrap();
        assert_eq!(stored.docs, [2, 0]);
    }

    #[tokio::test]
    async fn test_batch_preprocess_runs_once() {
        let storage = Arc::new(InMemoryStore::new());
        let mut filter = create_test_filter(storage.clone());

        filter.batch_preprocess().await.unwrap();
        filter.batch_preprocess().await.unwrap();

        let stored: WordModel =
            serde_json::from_value(storage.get_module_value("text_classifier::nb").await.unwrap().unwrap())
                .unwrap();
        assert_eq!(stored.docs, [1, 1]);
        assert!(stored.auxiliary_learned);
    }
}
