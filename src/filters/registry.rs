use crate::error::{AppError, Result};
use crate::filters::builtin::{author, engagement, keyword, media, text_classifier, text_length};
use crate::filters::{FilterContext, FilterModule};
use crate::models::{ModuleSetting, SettingDefinition};
use crate::state::ModuleStorage;
use serde::Serialize;
use std::sync::Arc;

pub type FilterFactory = fn(FilterContext) -> Result<Box<dyn FilterModule>>;

/// Static description of one filter kind
#[derive(Clone, Copy)]
pub struct FilterDescriptor {
    pub name: &'static str,
    pub title: &'static str,
    pub settings: fn() -> Vec<SettingDefinition>,
    pub factory: FilterFactory,
}

/// Serializable view of a descriptor for configuration UIs
#[derive(Debug, Clone, Serialize)]
pub struct FilterInfo {
    pub name: &'static str,
    pub title: &'static str,
    pub settings: Vec<SettingDefinition>,
}

static FILTERS: &[FilterDescriptor] = &[
    FilterDescriptor {
        name: engagement::NAME,
        title: "Engagement",
        settings: engagement::settings,
        factory: engagement::create,
    },
    FilterDescriptor {
        name: author::NAME,
        title: "Author",
        settings: author::settings,
        factory: author::create,
    },
    FilterDescriptor {
        name: text_length::NAME,
        title: "Text length",
        settings: text_length::settings,
        factory: text_length::create,
    },
    FilterDescriptor {
        name: media::NAME,
        title: "Media",
        settings: media::settings,
        factory: media::create,
    },
    FilterDescriptor {
        name: keyword::NAME,
        title: "Keywords",
        settings: keyword::settings,
        factory: keyword::create,
    },
    FilterDescriptor {
        name: text_classifier::NAME,
        title: "Text classifier",
        settings: text_classifier::settings,
        factory: text_classifier::create,
    },
];

/// Name → factory table of the built-in filters
pub struct FilterRegistry;

impl FilterRegistry {
    pub fn descriptors() -> &'static [FilterDescriptor] {
        FILTERS
    }

    pub fn get(name: &str) -> Option<&'static FilterDescriptor> {
        FILTERS.iter().find(|d| d.name == name)
    }

    pub fn describe() -> Vec<FilterInfo> {
        FILTERS
            .iter()
            .map(|d| FilterInfo {
                name: d.name,
                title: d.title,
                settings: (d.settings)(),
            })
            .collect()
    }

    /// Instantiate a configured filter; unknown names and bad settings are
    /// configuration errors
    pub fn create(
        setting: &ModuleSetting,
        storage: Arc<dyn ModuleStorage>,
    ) -> Result<Box<dyn FilterModule>> {
        let descriptor = Self::get(&setting.module_name).ok_or_else(|| {
            AppError::Configuration(format!("Unknown filter module '{}'", setting.module_name))
        })?;
        (descriptor.factory)(FilterContext::new(setting.clone(), storage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::InMemoryStore;

    #[test]
    fn test_builtin_names_are_unique() {
        let mut names: Vec<&str> = FilterRegistry::descriptors().iter().map(|d| d.name).collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[test]
    fn test_unknown_filter_is_configuration_error() {
        let storage = Arc::new(InMemoryStore::new());
        let result = FilterRegistry::create(&ModuleSetting::new("nope", "1"), storage);
        assert!(matches!(result, Err(AppError::Configuration(_))));
    }

    #[test]
    fn test_describe_lists_required_settings() {
        let info = FilterRegistry::describe();
        let keyword = info.iter().find(|i| i.name == "keyword").unwrap();
        assert!(keyword.settings.iter().any(|s| s.name == "keywords" && s.required));
    }
}
