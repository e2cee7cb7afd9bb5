use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

use crate::error::{AppError, Result};

/// Self-description of one module setting, consumed by configuration UIs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SettingDefinition {
    pub name: String,
    pub title: String,
    pub setting_type: SettingType,
    pub placeholder: Option<String>,
    pub required: bool,
    /// Template variables accepted inside the value, e.g. `{{text}}`
    #[serde(default)]
    pub template_variables: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SettingType {
    Text,
    TextArea,
    Number,
    Boolean,
    StringList,
}

impl SettingDefinition {
    pub fn new(name: &str, title: &str, setting_type: SettingType) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            setting_type,
            placeholder: None,
            required: false,
            template_variables: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn placeholder(mut self, placeholder: &str) -> Self {
        self.placeholder = Some(placeholder.to_string());
        self
    }

    pub fn template_variables(mut self, vars: &[&str]) -> Self {
        self.template_variables = vars.iter().map(|v| v.to_string()).collect();
        self
    }
}

/// Typed accessors over a module's raw settings map
pub struct Settings<'a> {
    module: &'a str,
    values: &'a HashMap<String, JsonValue>,
}

impl<'a> Settings<'a> {
    pub fn new(module: &'a str, values: &'a HashMap<String, JsonValue>) -> Self {
        Self { module, values }
    }

    pub fn str(&self, key: &str) -> Option<&'a str> {
        self.values.get(key).and_then(|v| v.as_str())
    }

    pub fn require_str(&self, key: &str) -> Result<&'a str> {
        self.str(key)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| AppError::missing_setting(self.module, key))
    }

    /// Numbers may be configured either as JSON numbers or numeric strings
    pub fn f64(&self, key: &str) -> Option<f64> {
        match self.values.get(key)? {
            JsonValue::Number(n) => n.as_f64(),
            JsonValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn require_f64(&self, key: &str) -> Result<f64> {
        self.f64(key)
            .ok_or_else(|| AppError::missing_setting(self.module, key))
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        match self.values.get(key)? {
            JsonValue::Bool(b) => Some(*b),
            JsonValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// A list given as a JSON array or a comma separated string
    pub fn string_list(&self, key: &str) -> Vec<String> {
        match self.values.get(key) {
            Some(JsonValue::Array(arr)) => arr
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Some(JsonValue::String(s)) => s
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Human label for a crawled item, used as training data
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabeledExample {
    pub item_id: String,
    pub selected: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_settings_accessors() {
        let mut values = HashMap::new();
        values.insert("seconds".to_string(), json!("30"));
        values.insert("keywords".to_string(), json!("rust, tokio ,"));
        values.insert("flag".to_string(), json!(true));

        let settings = Settings::new("wait", &values);
        assert_eq!(settings.f64("seconds"), Some(30.0));
        assert_eq!(settings.string_list("keywords"), vec!["rust", "tokio"]);
        assert_eq!(settings.bool("flag"), Some(true));
        assert!(settings.require_str("missing").is_err());
    }
}
