pub mod factory;
pub mod sled_store;
pub mod staged;
pub mod store;

pub use factory::{create_in_memory_stores, create_stores};
pub use sled_store::SledStore;
pub use staged::StagedModuleStorage;
pub use store::InMemoryStore;

use crate::error::Result;
use crate::ml::TrainedModel;
use crate::models::{Item, LabeledExample, PredictedClass, Topic};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::sync::Arc;
use uuid::Uuid;

/// Persistence for crawled items and their pipeline state
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Insert or replace an item
    async fn save_item(&self, item: &Item) -> Result<()>;

    /// Get an item by topic and network id
    async fn get_item(&self, topic_id: &Uuid, id_str: &str) -> Result<Option<Item>>;

    /// Replace an existing item, failing if it was never saved
    async fn update_item(&self, item: &Item) -> Result<()>;

    /// List items of a topic matching `filter`, in the filter's order
    async fn list_items(&self, topic_id: &Uuid, filter: &ItemFilter, limit: usize)
        -> Result<Vec<Item>>;
}

/// Per-module and per-module-per-item key/value persistence.
///
/// Keys are `moduleName::moduleId`; item-scoped values are additionally keyed
/// by the item id. Writes are last-writer-wins.
#[async_trait]
pub trait ModuleStorage: Send + Sync {
    async fn get_module_value(&self, module_key: &str) -> Result<Option<JsonValue>>;

    async fn set_module_value(&self, module_key: &str, value: JsonValue) -> Result<()>;

    async fn delete_module_value(&self, module_key: &str) -> Result<()>;

    async fn get_item_value(&self, module_key: &str, item_id: &str) -> Result<Option<JsonValue>>;

    async fn set_item_value(&self, module_key: &str, item_id: &str, value: JsonValue)
        -> Result<()>;
}

/// Persistence for topic configuration
#[async_trait]
pub trait TopicStore: Send + Sync {
    async fn save_topic(&self, topic: &Topic) -> Result<()>;

    async fn get_topic(&self, id: &Uuid) -> Result<Option<Topic>>;

    async fn list_topics(&self) -> Result<Vec<Topic>>;
}

/// Persistence for trained classifier artifacts and labeled examples
#[async_trait]
pub trait ModelStore: Send + Sync {
    async fn save_model(&self, model: &TrainedModel) -> Result<()>;

    async fn get_model(&self, id: &Uuid) -> Result<Option<TrainedModel>>;

    async fn delete_model(&self, id: &Uuid) -> Result<()>;

    /// Insert or replace the label for one item
    async fn save_labeled_example(&self, topic_id: &Uuid, example: &LabeledExample)
        -> Result<()>;

    async fn list_labeled_examples(&self, topic_id: &Uuid) -> Result<Vec<LabeledExample>>;
}

/// Order in which `list_items` returns matching items
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ItemOrder {
    /// Oldest crawl first
    #[default]
    Crawled,
    /// Never-attempted items first, then the longest since their last action attempt
    LeastRecentlyActed,
    /// Never-classified items first, then the longest since their last classification attempt
    LeastRecentlyClassified,
}

/// Filter for querying items
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub predicted_class: Option<PredictedClass>,
    pub complete_action_index: Option<i32>,
    /// Drop items whose chain of this length is complete
    pub unarchived_for: Option<usize>,
    /// Drop items whose next action index is one of these
    pub skip_next_actions: Vec<i32>,
    /// Drop items a reviewer rejected at their next action
    pub exclude_frozen: bool,
    pub order: ItemOrder,
}

impl ItemFilter {
    /// Unset items, the least recently tried first
    pub fn unclassified() -> Self {
        Self {
            predicted_class: Some(PredictedClass::Unset),
            order: ItemOrder::LeastRecentlyClassified,
            ..Default::default()
        }
    }

    /// Accepted items that still have actions to run, the least recently tried first
    pub fn actionable(num_actions: usize) -> Self {
        Self {
            predicted_class: Some(PredictedClass::Accept),
            unarchived_for: Some(num_actions),
            exclude_frozen: true,
            order: ItemOrder::LeastRecentlyActed,
            ..Default::default()
        }
    }

    /// Accepted items waiting on exactly `action_index`
    pub fn waiting_on(action_index: usize) -> Self {
        Self {
            predicted_class: Some(PredictedClass::Accept),
            complete_action_index: Some(action_index as i32 - 1),
            exclude_frozen: true,
            ..Default::default()
        }
    }

    /// Leave out items whose next action is one of `indices`
    pub fn skipping_next_actions(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.skip_next_actions
            .extend(indices.into_iter().map(|index| index as i32));
        self
    }

    pub fn matches(&self, item: &Item) -> bool {
        let class_match = self
            .predicted_class
            .map_or(true, |class| item.predicted_class == class);

        let index_match = self
            .complete_action_index
            .map_or(true, |index| item.complete_action_index == index);

        let unarchived_match = self
            .unarchived_for
            .map_or(true, |num_actions| !item.is_archived(num_actions));

        let next_match = !self.skip_next_actions.contains(&item.next_action_index());
        let frozen_match = !(self.exclude_frozen && item.is_frozen());

        class_match && index_match && unarchived_match && next_match && frozen_match
    }

    /// Sort by the filter's order, then truncate to `limit`
    pub(crate) fn select(&self, mut items: Vec<Item>, limit: usize) -> Vec<Item> {
        // `None` sorts before `Some`, so untried items come first
        match self.order {
            ItemOrder::Crawled => items.sort_by(crawl_order),
            ItemOrder::LeastRecentlyActed => items.sort_by(|a, b| {
                a.last_action_executed_at
                    .cmp(&b.last_action_executed_at)
                    .then_with(|| crawl_order(a, b))
            }),
            ItemOrder::LeastRecentlyClassified => items.sort_by(|a, b| {
                a.classification_attempted_at
                    .cmp(&b.classification_attempted_at)
                    .then_with(|| crawl_order(a, b))
            }),
        }
        items.truncate(limit);
        items
    }
}

/// Oldest crawl first, ties broken by id
fn crawl_order(a: &Item, b: &Item) -> Ordering {
    a.crawled_at
        .cmp(&b.crawled_at)
        .then_with(|| a.id_str.cmp(&b.id_str))
}

/// Handles onto every store, usually backed by one engine
#[derive(Clone)]
pub struct Stores {
    pub items: Arc<dyn ItemStore>,
    pub modules: Arc<dyn ModuleStorage>,
    pub topics: Arc<dyn TopicStore>,
    pub models: Arc<dyn ModelStore>,
}

impl Stores {
    pub fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: ItemStore + ModuleStorage + TopicStore + ModelStore + 'static,
    {
        Self {
            items: backend.clone(),
            modules: backend.clone(),
            topics: backend.clone(),
            models: backend,
        }
    }
}

/// Item-scoped module storage key
pub(crate) fn item_value_key(module_key: &str, item_id: &str) -> String {
    format!("{}::{}", module_key, item_id)
}
