use crate::error::{AppError, Result};
use crate::ml::TrainedModel;
use crate::models::{Item, LabeledExample, Topic};
use crate::state::{item_value_key, ItemFilter, ItemStore, ModelStore, ModuleStorage, TopicStore};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;

/// In-memory store (for development and testing)
#[derive(Clone, Default)]
pub struct InMemoryStore {
    items: Arc<DashMap<(Uuid, String), Item>>,
    module_values: Arc<DashMap<String, JsonValue>>,
    item_values: Arc<DashMap<String, JsonValue>>,
    topics: Arc<DashMap<Uuid, Topic>>,
    models: Arc<DashMap<Uuid, TrainedModel>>,
    examples: Arc<DashMap<Uuid, Vec<LabeledExample>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ItemStore for InMemoryStore {
    async fn save_item(&self, item: &Item) -> Result<()> {
        self.items
            .insert((item.topic_id, item.id_str.clone()), item.clone());
        tracing::debug!(item_id = %item.id_str, topic_id = %item.topic_id, "Item saved");
        Ok(())
    }

    async fn get_item(&self, topic_id: &Uuid, id_str: &str) -> Result<Option<Item>> {
        Ok(self
            .items
            .get(&(*topic_id, id_str.to_string()))
            .map(|entry| entry.clone()))
    }

    async fn update_item(&self, item: &Item) -> Result<()> {
        let key = (item.topic_id, item.id_str.clone());
        match self.items.get_mut(&key) {
            Some(mut entry) => {
                *entry = item.clone();
                tracing::debug!(item_id = %item.id_str, "Item updated");
                Ok(())
            }
            None => Err(AppError::NotFound(format!("Item {} not found", item.id_str))),
        }
    }

    async fn list_items(
        &self,
        topic_id: &Uuid,
        filter: &ItemFilter,
        limit: usize,
    ) -> Result<Vec<Item>> {
        let items: Vec<Item> = self
            .items
            .iter()
            .filter(|entry| &entry.key().0 == topic_id && filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();

        Ok(filter.select(items, limit))
    }
}

#[async_trait]
impl ModuleStorage for InMemoryStore {
    async fn get_module_value(&self, module_key: &str) -> Result<Option<JsonValue>> {
        Ok(self.module_values.get(module_key).map(|v| v.clone()))
    }

    async fn set_module_value(&self, module_key: &str, value: JsonValue) -> Result<()> {
        self.module_values.insert(module_key.to_string(), value);
        Ok(())
    }

    async fn delete_module_value(&self, module_key: &str) -> Result<()> {
        self.module_values.remove(module_key);
        Ok(())
    }

    async fn get_item_value(&self, module_key: &str, item_id: &str) -> Result<Option<JsonValue>> {
        Ok(self
            .item_values
            .get(&item_value_key(module_key, item_id))
            .map(|v| v.clone()))
    }

    async fn set_item_value(
        &self,
        module_key: &str,
        item_id: &str,
        value: JsonValue,
    ) -> Result<()> {
        self.item_values
            .insert(item_value_key(module_key, item_id), value);
        Ok(())
    }
}

#[async_trait]
impl TopicStore for InMemoryStore {
    async fn save_topic(&self, topic: &Topic) -> Result<()> {
        self.topics.insert(topic.id, topic.clone());
        Ok(())
    }

    async fn get_topic(&self, id: &Uuid) -> Result<Option<Topic>> {
        Ok(self.topics.get(id).map(|t| t.clone()))
    }

    async fn list_topics(&self) -> Result<Vec<Topic>> {
        let mut topics: Vec<Topic> = self.topics.iter().map(|t| t.value().clone()).collect();
        topics.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(topics)
    }
}

#[async_trait]
impl ModelStore for InMemoryStore {
    async fn save_model(&self, model: &TrainedModel) -> Result<()> {
        self.models.insert(model.id, model.clone());
        Ok(())
    }

    async fn get_model(&self, id: &Uuid) -> Result<Option<TrainedModel>> {
        Ok(self.models.get(id).map(|m| m.clone()))
    }

    async fn delete_model(&self, id: &Uuid) -> Result<()> {
        self.models.remove(id);
        Ok(())
    }

    async fn save_labeled_example(&self, topic_id: &Uuid, example: &LabeledExample) -> Result<()> {
        let mut examples = self.examples.entry(*topic_id).or_default();
        match examples.iter_mut().find(|e| e.item_id == example.item_id) {
            Some(existing) => existing.selected = example.selected,
            None => examples.push(example.clone()),
        }
        Ok(())
    }

    async fn list_labeled_examples(&self, topic_id: &Uuid) -> Result<Vec<LabeledExample>> {
        Ok(self
            .examples
            .get(topic_id)
            .map(|e| e.clone())
            .unwrap_or_default())
    }
}
