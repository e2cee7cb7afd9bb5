use crate::error::{AppError, Result};
use crate::filters::{FilterModule, FilterRegistry};
use crate::metrics::FILTER_FAILURES_TOTAL;
use crate::models::{FilterPattern, FilterResult, Item, ModuleSetting};
use crate::state::ModuleStorage;
use std::sync::Arc;
use tracing::{debug, warn};

struct ConfiguredFilter {
    setting: ModuleSetting,
    module: Box<dyn FilterModule>,
}

/// Runs an ordered set of configured filters against items
pub struct FilterManager {
    filters: Vec<ConfiguredFilter>,
}

impl FilterManager {
    /// Instantiate every filter up front so configuration errors surface before
    /// any item is touched
    pub fn from_settings(settings: &[ModuleSetting], storage: Arc<dyn ModuleStorage>) -> Result<Self> {
        let filters = settings
            .iter()
            .map(|setting| {
                Ok(ConfiguredFilter {
                    setting: setting.clone(),
                    module: FilterRegistry::create(setting, storage.clone())?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { filters })
    }

    pub fn from_pattern(pattern: &FilterPattern, storage: Arc<dyn ModuleStorage>) -> Result<Self> {
        Self::from_settings(&pattern.filters, storage)
    }

    /// Append an already constructed filter instance
    pub fn push(&mut self, setting: ModuleSetting, module: Box<dyn FilterModule>) {
        self.filters.push(ConfiguredFilter { setting, module });
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Score an item with every filter, in configuration order.
    ///
    /// A failing filter is logged and left out of the result; the call only
    /// fails when no filter produced output.
    pub async fn run(&mut self, item: &Item) -> Result<Vec<FilterResult>> {
        if self.filters.is_empty() {
            return Err(AppError::NoUsableFilters(
                "no filters configured".to_string(),
            ));
        }

        let mut results = Vec::with_capacity(self.filters.len());
        let mut failures = Vec::new();

        for filter in &mut self.filters {
            match filter.module.score(item).await {
                Ok(score) => results.push(FilterResult {
                    filter_id: filter.setting.id.clone(),
                    values: score.values,
                    summary: score.summary,
                }),
                Err(e) => {
                    warn!(
                        item_id = %item.id_str,
                        filter_id = %filter.setting.id,
                        filter = %filter.setting.module_name,
                        error = %e,
                        "Filter failed, omitting its features"
                    );
                    FILTER_FAILURES_TOTAL
                        .with_label_values(&[filter.setting.module_name.as_str()])
                        .inc();
                    failures.push(format!("{}: {}", filter.setting.id, e));
                }
            }
        }

        if results.is_empty() {
            return Err(AppError::NoUsableFilters(failures.join("; ")));
        }

        debug!(
            item_id = %item.id_str,
            filters = results.len(),
            failed = failures.len(),
            "Filters scored item"
        );
        Ok(results)
    }

    /// Seed filters that report they need it from labeled examples; returns
    /// how many filters were seeded
    pub async fn initialize_if_needed(&mut self, examples: &[(Item, bool)]) -> Result<usize> {
        let mut seeded = 0;
        for filter in &mut self.filters {
            if !filter.module.should_initialize().await? {
                continue;
            }
            for (item, selected) in examples {
                filter.module.train(item, *selected).await?;
            }
            debug!(
                filter_id = %filter.setting.id,
                examples = examples.len(),
                "Initialized filter"
            );
            seeded += 1;
        }
        Ok(seeded)
    }

    pub async fn train_all(&mut self, item: &Item, selected: bool) -> Result<()> {
        for filter in &mut self.filters {
            filter.module.train(item, selected).await?;
        }
        Ok(())
    }

    pub async fn retrain_all(&mut self, item: &Item, previous: bool, correct: bool) -> Result<()> {
        for filter in &mut self.filters {
            filter.module.retrain(item, previous, correct).await?;
        }
        Ok(())
    }

    pub async fn batch_preprocess_all(&mut self) -> Result<()> {
        for filter in &mut self.filters {
            filter.module.batch_preprocess().await?;
        }
        Ok(())
    }
}
