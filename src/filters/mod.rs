/// Filter modules turn an item into named features for the classifier
///
/// - `registry`: static name → factory table of built-in filters
/// - `manager`: runs a filter pattern and fans out training calls
/// - `builtin`: the filters shipped with the crate
pub mod builtin;
pub mod manager;
pub mod registry;

pub use manager::FilterManager;
pub use registry::{FilterDescriptor, FilterRegistry};

use crate::error::Result;
use crate::models::{FeatureValue, Item, ModuleSetting, NamedFeature, Settings};
use crate::state::ModuleStorage;
use async_trait::async_trait;
use std::sync::Arc;

/// Output of `FilterModule::score`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterScore {
    pub summary: String,
    /// Ordered features; order is the column order within this filter
    pub values: Vec<NamedFeature>,
}

impl FilterScore {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            values: Vec::new(),
        }
    }

    pub fn with_value(mut self, name: &str, title: &str, value: FeatureValue) -> Self {
        self.values.push(NamedFeature {
            name: name.to_string(),
            title: title.to_string(),
            value,
        });
        self
    }
}

/// Everything a filter instance is built from
#[derive(Clone)]
pub struct FilterContext {
    pub module: ModuleSetting,
    pub storage: Arc<dyn ModuleStorage>,
}

impl FilterContext {
    pub fn new(module: ModuleSetting, storage: Arc<dyn ModuleStorage>) -> Self {
        Self { module, storage }
    }

    pub fn settings(&self) -> Settings<'_> {
        Settings::new(&self.module.module_name, &self.module.settings)
    }

    /// `moduleName::moduleId`
    pub fn module_key(&self) -> String {
        self.module.module_key()
    }
}

/// A configured filter instance.
///
/// Only `score` is required. The training hooks default to no-ops for
/// filters without learned state.
#[async_trait]
pub trait FilterModule: Send + Sync {
    /// Score one item
    async fn score(&mut self, item: &Item) -> Result<FilterScore>;

    /// Whether the filter needs seeding from labeled examples before use
    async fn should_initialize(&mut self) -> Result<bool> {
        Ok(false)
    }

    /// Learn from one labeled item
    async fn train(&mut self, _item: &Item, _selected: bool) -> Result<()> {
        Ok(())
    }

    /// Move a previously learned label to the corrected one
    async fn retrain(&mut self, _item: &Item, _previous: bool, _correct: bool) -> Result<()> {
        Ok(())
    }

    /// One-off preprocessing over module-level data
    async fn batch_preprocess(&mut self) -> Result<()> {
        Ok(())
    }
}
