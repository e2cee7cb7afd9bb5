use crate::error::Result;
use crate::state::ModuleStorage;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Module storage that buffers writes over a base storage until `commit`.
///
/// Reads see buffered writes first and fall through to the base. Dropping
/// the overlay without committing discards every buffered write.
pub struct StagedModuleStorage {
    base: Arc<dyn ModuleStorage>,
    /// `None` records a delete
    module_values: DashMap<String, Option<JsonValue>>,
    item_values: DashMap<(String, String), JsonValue>,
}

impl StagedModuleStorage {
    pub fn new(base: Arc<dyn ModuleStorage>) -> Self {
        Self {
            base,
            module_values: DashMap::new(),
            item_values: DashMap::new(),
        }
    }

    /// Number of buffered writes
    pub fn pending(&self) -> usize {
        self.module_values.len() + self.item_values.len()
    }

    /// Write every buffered change through to the base storage
    pub async fn commit(&self) -> Result<()> {
        let modules: Vec<(String, Option<JsonValue>)> = self
            .module_values
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        let items: Vec<((String, String), JsonValue)> = self
            .item_values
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        for (module_key, value) in modules {
            match value {
                Some(value) => self.base.set_module_value(&module_key, value).await?,
                None => self.base.delete_module_value(&module_key).await?,
            }
            self.module_values.remove(&module_key);
        }
        for ((module_key, item_id), value) in items {
            self.base.set_item_value(&module_key, &item_id, value).await?;
            self.item_values.remove(&(module_key, item_id));
        }

        tracing::debug!("Staged module storage committed");
        Ok(())
    }
}

#[async_trait]
impl ModuleStorage for StagedModuleStorage {
    async fn get_module_value(&self, module_key: &str) -> Result<Option<JsonValue>> {
        let staged = self
            .module_values
            .get(module_key)
            .map(|entry| entry.value().clone());
        match staged {
            Some(value) => Ok(value),
            None => self.base.get_module_value(module_key).await,
        }
    }

    async fn set_module_value(&self, module_key: &str, value: JsonValue) -> Result<()> {
        self.module_values.insert(module_key.to_string(), Some(value));
        Ok(())
    }

    async fn delete_module_value(&self, module_key: &str) -> Result<()> {
        self.module_values.insert(module_key.to_string(), None);
        Ok(())
    }

    async fn get_item_value(&self, module_key: &str, item_id: &str) -> Result<Option<JsonValue>> {
        let key = (module_key.to_string(), item_id.to_string());
        let staged = self.item_values.get(&key).map(|entry| entry.value().clone());
        match staged {
            Some(value) => Ok(Some(value)),
            None => self.base.get_item_value(module_key, item_id).await,
        }
    }

    async fn set_item_value(&self, module_key: &str, item_id: &str, value: JsonValue) -> Result<()> {
        self.item_values
            .insert((module_key.to_string(), item_id.to_string()), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::InMemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_writes_stay_local_until_commit() {
        let base = Arc::new(InMemoryStore::new());
        base.set_module_value("keyword::k", json!(1)).await.unwrap();
        base.set_module_value("old::o", json!("gone")).await.unwrap();

        let staged = StagedModuleStorage::new(base.clone());
        staged.set_module_value("keyword::k", json!(2)).await.unwrap();
        staged.delete_module_value("old::o").await.unwrap();
        staged
            .set_item_value("keyword::k", "42", json!({"seen": true}))
            .await
            .unwrap();

        assert_eq!(staged.get_module_value("keyword::k").await.unwrap(), Some(json!(2)));
        assert!(staged.get_module_value("old::o").await.unwrap().is_none());
        assert_eq!(
            staged.get_item_value("keyword::k", "42").await.unwrap(),
            Some(json!({"seen": true}))
        );
        assert_eq!(staged.pending(), 3);

        // Base untouched
        assert_eq!(base.get_module_value("keyword::k").await.unwrap(), Some(json!(1)));
        assert_eq!(base.get_module_value("old::o").await.unwrap(), Some(json!("gone")));
        assert!(base.get_item_value("keyword::k", "42").await.unwrap().is_none());

        staged.commit().await.unwrap();
        assert_eq!(staged.pending(), 0);
        assert_eq!(base.get_module_value("keyword::k").await.unwrap(), Some(json!(2)));
        assert!(base.get_module_value("old::o").await.unwrap().is_none());
        assert_eq!(
            base.get_item_value("keyword::k", "42").await.unwrap(),
            Some(json!({"seen": true}))
        );
    }

    #[tokio::test]
    async fn test_dropped_overlay_discards_writes() {
        let base = Arc::new(InMemoryStore::new());
        {
            let staged = StagedModuleStorage::new(base.clone());
            staged.set_module_value("text_classifier::c", json!({"docs": 1})).await.unwrap();
        }
        assert!(base.get_module_value("text_classifier::c").await.unwrap().is_none());
    }
}
