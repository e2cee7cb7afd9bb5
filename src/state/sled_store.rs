use crate::error::{AppError, Result};
use crate::ml::TrainedModel;
use crate::models::{Item, LabeledExample, Topic};
use crate::state::{item_value_key, ItemFilter, ItemStore, ModelStore, ModuleStorage, TopicStore};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use sled::Db;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Persistent store using the Sled embedded database.
///
/// Items are bincode encoded; topics, module values and model artifacts are
/// JSON because they carry free-form settings.
#[derive(Clone)]
pub struct SledStore {
    db: Arc<Db>,
    items_tree: sled::Tree,
    module_tree: sled::Tree,
    item_value_tree: sled::Tree,
    topics_tree: sled::Tree,
    models_tree: sled::Tree,
    examples_tree: sled::Tree,
}

impl SledStore {
    /// Create a new Sled store at the specified path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path.as_ref()).map_err(|e| {
            AppError::Storage(format!("Failed to open Sled database: {}", e))
        })?;

        let items_tree = db.open_tree("items")?;
        let module_tree = db.open_tree("module_storage")?;
        let item_value_tree = db.open_tree("module_item_storage")?;
        let topics_tree = db.open_tree("topics")?;
        let models_tree = db.open_tree("trained_models")?;
        let examples_tree = db.open_tree("labeled_examples")?;

        tracing::info!("Initialized Sled store at {:?}", path.as_ref());

        Ok(Self {
            db: Arc::new(db),
            items_tree,
            module_tree,
            item_value_tree,
            topics_tree,
            models_tree,
            examples_tree,
        })
    }

    /// Item key: topic uuid bytes followed by the network id
    fn item_key(topic_id: &Uuid, id_str: &str) -> Vec<u8> {
        let mut key = topic_id.as_bytes().to_vec();
        key.extend_from_slice(id_str.as_bytes());
        key
    }

    fn put_json<T: Serialize>(tree: &sled::Tree, key: &[u8], value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        tree.insert(key, bytes)?;
        tree.flush()?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(tree: &sled::Tree, key: &[u8]) -> Result<Option<T>> {
        match tree.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Flush pending writes to disk
    pub async fn flush(&self) -> Result<()> {
        self.db.flush_async().await.map_err(|e| {
            AppError::Storage(format!("Failed to flush database: {}", e))
        })?;
        Ok(())
    }

    /// Get database size in bytes
    pub fn size_on_disk(&self) -> Result<u64> {
        Ok(self.db.size_on_disk()?)
    }
}

#[async_trait]
impl ItemStore for SledStore {
    async fn save_item(&self, item: &Item) -> Result<()> {
        let key = Self::item_key(&item.topic_id, &item.id_str);
        let value = bincode::serialize(item)?;

        self.items_tree.insert(key, value)?;
        self.items_tree.flush()?;

        tracing::debug!(item_id = %item.id_str, "Item saved to Sled");
        Ok(())
    }

    async fn get_item(&self, topic_id: &Uuid, id_str: &str) -> Result<Option<Item>> {
        match self.items_tree.get(Self::item_key(topic_id, id_str))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn update_item(&self, item: &Item) -> Result<()> {
        let key = Self::item_key(&item.topic_id, &item.id_str);

        if !self.items_tree.contains_key(&key)? {
            return Err(AppError::NotFound(format!("Item {} not found", item.id_str)));
        }

        self.items_tree.insert(key, bincode::serialize(item)?)?;
        self.items_tree.flush()?;

        tracing::debug!(item_id = %item.id_str, "Item updated in Sled");
        Ok(())
    }

    async fn list_items(
        &self,
        topic_id: &Uuid,
        filter: &ItemFilter,
        limit: usize,
    ) -> Result<Vec<Item>> {
        let mut items = Vec::new();

        for result in self.items_tree.scan_prefix(topic_id.as_bytes()) {
            let (_, value) = result?;
            let item: Item = bincode::deserialize(&value)?;
            if filter.matches(&item) {
                items.push(item);
            }
        }

        Ok(filter.select(items, limit))
    }
}

#[async_trait]
impl ModuleStorage for SledStore {
    async fn get_module_value(&self, module_key: &str) -> Result<Option<JsonValue>> {
        Self::get_json(&self.module_tree, module_key.as_bytes())
    }

    async fn set_module_value(&self, module_key: &str, value: JsonValue) -> Result<()> {
        Self::put_json(&self.module_tree, module_key.as_bytes(), &value)
    }

    async fn delete_module_value(&self, module_key: &str) -> Result<()> {
        self.module_tree.remove(module_key.as_bytes())?;
        self.module_tree.flush()?;
        Ok(())
    }

    async fn get_item_value(&self, module_key: &str, item_id: &str) -> Result<Option<JsonValue>> {
        let key = item_value_key(module_key, item_id);
        Self::get_json(&self.item_value_tree, key.as_bytes())
    }

    async fn set_item_value(
        &self,
        module_key: &str,
        item_id: &str,
        value: JsonValue,
    ) -> Result<()> {
        let key = item_value_key(module_key, item_id);
        Self::put_json(&self.item_value_tree, key.as_bytes(), &value)
    }
}

#[async_trait]
impl TopicStore for SledStore {
    async fn save_topic(&self, topic: &Topic) -> Result<()> {
        Self::put_json(&self.topics_tree, topic.id.as_bytes(), topic)
    }

    async fn get_topic(&self, id: &Uuid) -> Result<Option<Topic>> {
        Self::get_json(&self.topics_tree, id.as_bytes())
    }

    async fn list_topics(&self) -> Result<Vec<Topic>> {
        let mut topics = Vec::new();
        for result in self.topics_tree.iter() {
            let (_, value) = result?;
            topics.push(serde_json::from_slice::<Topic>(&value)?);
        }
        topics.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(topics)
    }
}

#[async_trait]
impl ModelStore for SledStore {
    async fn save_model(&self, model: &TrainedModel) -> Result<()> {
        Self::put_json(&self.models_tree, model.id.as_bytes(), model)
    }

    async fn get_model(&self, id: &Uuid) -> Result<Option<TrainedModel>> {
        Self::get_json(&self.models_tree, id.as_bytes())
    }

    async fn delete_model(&self, id: &Uuid) -> Result<()> {
        self.models_tree.remove(id.as_bytes())?;
        self.models_tree.flush()?;
        Ok(())
    }

    async fn save_labeled_example(&self, topic_id: &Uuid, example: &LabeledExample) -> Result<()> {
        let mut examples: Vec<LabeledExample> =
            Self::get_json(&self.examples_tree, topic_id.as_bytes())?.unwrap_or_default();

        match examples.iter_mut().find(|e| e.item_id == example.item_id) {
            Some(existing) => existing.selected = example.selected,
            None => examples.push(example.clone()),
        }

        Self::put_json(&self.examples_tree, topic_id.as_bytes(), &examples)
    }

    async fn list_labeled_examples(&self, topic_id: &Uuid) -> Result<Vec<LabeledExample>> {
        Ok(Self::get_json(&self.examples_tree, topic_id.as_bytes())?.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        FeatureValue, FilterResult, ModuleSetting, NamedFeature, PredictedClass,
    };
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_store() -> (SledStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SledStore::new(temp_dir.path()).unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_item_round_trips_with_features() {
        let (store, _temp_dir) = create_test_store();
        let topic_id = Uuid::new_v4();

        let mut item = Item::new("7", topic_id, "text");
        item.predicted_class = PredictedClass::Accept;
        item.filters_result = vec![FilterResult {
            filter_id: "media".into(),
            values: vec![NamedFeature {
                name: "media_type".into(),
                title: "Media".into(),
                value: FeatureValue::one_hot(1, 3),
            }],
            summary: "photo".into(),
        }];

        store.save_item(&item).await.unwrap();
        let loaded = store.get_item(&topic_id, "7").await.unwrap().unwrap();
        assert_eq!(loaded.filters_result, item.filters_result);
        assert_eq!(loaded.predicted_class, PredictedClass::Accept);
    }

    #[tokio::test]
    async fn test_list_items_is_scoped_to_topic() {
        let (store, _temp_dir) = create_test_store();
        let topic_a = Uuid::new_v4();
        let topic_b = Uuid::new_v4();

        store.save_item(&Item::new("1", topic_a, "a")).await.unwrap();
        store.save_item(&Item::new("2", topic_b, "b")).await.unwrap();

        let items = store
            .list_items(&topic_a, &ItemFilter::default(), 10)
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id_str, "1");
    }

    #[tokio::test]
    async fn test_topic_with_settings_round_trips() {
        let (store, _temp_dir) = create_test_store();
        let topic = crate::models::Topic::new("rust")
            .with_action(ModuleSetting::new("wait", "w").with_setting("seconds", json!(60)));

        store.save_topic(&topic).await.unwrap();
        let loaded = store.get_topic(&topic.id).await.unwrap().unwrap();
        assert_eq!(loaded.action_settings, topic.action_settings);
        assert_eq!(store.list_topics().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_persistence_across_reopens() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().to_path_buf();
        let topic_id = Uuid::new_v4();

        {
            let store = SledStore::new(&path).unwrap();
            let mut item = Item::new("9", topic_id, "persist me");
            item.complete_action_index = 1;
            item.last_action_index = 2;
            store.save_item(&item).await.unwrap();
            store
                .set_item_value("wait::w", "9", json!({"seen": true}))
                .await
                .unwrap();
            store.flush().await.unwrap();
        }

        {
            let store = SledStore::new(&path).unwrap();
            let item = store.get_item(&topic_id, "9").await.unwrap().unwrap();
            assert_eq!(item.complete_action_index, 1);
            assert_eq!(item.last_action_index, 2);
            assert_eq!(
                store.get_item_value("wait::w", "9").await.unwrap(),
                Some(json!({"seen": true}))
            );
        }
    }
}
