use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// A curated topic: its filter patterns and its action chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub id: Uuid,
    pub name: String,
    pub filter_patterns: Vec<FilterPattern>,
    /// Ordered action chain; position is the action index
    pub action_settings: Vec<ModuleSetting>,
    pub created_at: DateTime<Utc>,
}

/// Named, scored configuration of filters plus its trained classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterPattern {
    pub id: Uuid,
    pub name: String,
    pub enabled: bool,
    pub filters: Vec<ModuleSetting>,
    /// Overall score of the last successful training run
    pub score: Option<f64>,
    pub trained_model_id: Option<Uuid>,
}

/// Configured module instance: `{moduleName, id, settings}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModuleSetting {
    pub module_name: String,
    pub id: String,
    #[serde(default)]
    pub settings: HashMap<String, JsonValue>,
}

impl ModuleSetting {
    pub fn new(module_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            id: id.into(),
            settings: HashMap::new(),
        }
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.settings.insert(key.into(), value);
        self
    }

    /// Storage key `moduleName::moduleId`
    pub fn module_key(&self) -> String {
        format!("{}::{}", self.module_name, self.id)
    }
}

impl Topic {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            filter_patterns: Vec::new(),
            action_settings: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_action(mut self, action: ModuleSetting) -> Self {
        self.action_settings.push(action);
        self
    }

    /// Add a pattern; the first pattern added is enabled
    pub fn with_pattern(mut self, mut pattern: FilterPattern) -> Self {
        pattern.enabled = self.filter_patterns.is_empty();
        self.filter_patterns.push(pattern);
        self
    }

    pub fn num_actions(&self) -> usize {
        self.action_settings.len()
    }

    pub fn enabled_pattern(&self) -> Option<&FilterPattern> {
        self.filter_patterns.iter().find(|p| p.enabled)
    }

    pub fn pattern(&self, pattern_id: &Uuid) -> Option<&FilterPattern> {
        self.filter_patterns.iter().find(|p| &p.id == pattern_id)
    }

    pub fn pattern_mut(&mut self, pattern_id: &Uuid) -> Option<&mut FilterPattern> {
        self.filter_patterns.iter_mut().find(|p| &p.id == pattern_id)
    }

    /// Make `pattern_id` the only enabled pattern
    pub fn enable_pattern(&mut self, pattern_id: &Uuid) -> Result<()> {
        if self.pattern(pattern_id).is_none() {
            return Err(AppError::NotFound(format!(
                "Filter pattern {} not found in topic {}",
                pattern_id, self.id
            )));
        }
        for pattern in &mut self.filter_patterns {
            pattern.enabled = &pattern.id == pattern_id;
        }
        Ok(())
    }
}

impl FilterPattern {
    pub fn new(name: impl Into<String>, filters: Vec<ModuleSetting>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            enabled: false,
            filters,
            score: None,
            trained_model_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_enabled_pattern() {
        let mut topic = Topic::new("rust")
            .with_pattern(FilterPattern::new("a", vec![]))
            .with_pattern(FilterPattern::new("b", vec![]));

        assert_eq!(topic.enabled_pattern().unwrap().name, "a");

        let b = topic.filter_patterns[1].id;
        topic.enable_pattern(&b).unwrap();
        assert_eq!(topic.enabled_pattern().unwrap().name, "b");
        assert_eq!(topic.filter_patterns.iter().filter(|p| p.enabled).count(), 1);
    }

    #[test]
    fn test_enable_unknown_pattern_fails() {
        let mut topic = Topic::new("rust");
        assert!(topic.enable_pattern(&Uuid::new_v4()).is_err());
    }

    #[test]
    fn test_module_key() {
        let setting = ModuleSetting::new("wait", "w1");
        assert_eq!(setting.module_key(), "wait::w1");
    }
}
