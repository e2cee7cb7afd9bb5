use crate::error::{AppError, Result};
use crate::filters::{FilterContext, FilterModule, FilterScore};
use crate::models::{FeatureValue, Item, SettingDefinition, SettingType};
use async_trait::async_trait;
use regex::{Regex, RegexBuilder};

pub const NAME: &str = "keyword";

pub fn settings() -> Vec<SettingDefinition> {
    vec![
        SettingDefinition::new("keywords", "Keywords", SettingType::StringList)
            .required()
            .placeholder("rust, tokio, async"),
        SettingDefinition::new("whole_word", "Match whole words only", SettingType::Boolean),
    ]
}

pub fn create(ctx: FilterContext) -> Result<Box<dyn FilterModule>> {
    let settings = ctx.settings();
    let keywords = settings.string_list("keywords");
    if keywords.is_empty() {
        return Err(AppError::missing_setting(NAME, "keywords"));
    }
    let whole_word = settings.bool("whole_word").unwrap_or(true);

    Ok(Box::new(KeywordFilter::new(&keywords, whole_word)?))
}

/// Counts case-insensitive keyword occurrences
pub struct KeywordFilter {
    pattern: Regex,
}

impl KeywordFilter {
    pub fn new(keywords: &[String], whole_word: bool) -> Result<Self> {
        let alternation = keywords
            .iter()
            .map(|k| regex::escape(k))
            .collect::<Vec<_>>()
            .join("|");
        let source = if whole_word {
            format!(r"\b(?:{})\b", alternation)
        } else {
            format!("(?:{})", alternation)
        };

        let pattern = RegexBuilder::new(&source)
            .case_insensitive(true)
            .build()
            .map_err(|e| AppError::Configuration(format!("Invalid keyword pattern: {}", e)))?;

        Ok(Self { pattern })
    }
}

#[async_trait]
impl FilterModule for KeywordFilter {
    async fn score(&mut self, item: &Item) -> Result<FilterScore> {
        let matched: Vec<&str> = self.pattern.find_iter(&item.text).map(|m| m.as_str()).collect();

        Ok(FilterScore::new(if matched.is_empty() {
            "no keywords".to_string()
        } else {
            matched.join(", ")
        })
        .with_value(
            "keyword_matches",
            "Keyword matches",
            FeatureValue::Scalar(matched.len() as f64),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModuleSetting;
    use crate::state::InMemoryStore;
    use serde_json::json;
    use std::sync::Arc;
    use uuid::Uuid;

    fn create_test_context(setting: ModuleSetting) -> FilterContext {
        FilterContext::new(setting, Arc::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn test_counts_matches_case_insensitively() {
        let mut filter = create(create_test_context(
            ModuleSetting::new(NAME, "k").with_setting("keywords", json!(["rust", "tokio"])),
        ))
        .unwrap();

        let item = Item::new("1", Uuid::new_v4(), "Rust and Tokio; rusty rust");
        let score = filter.score(&item).await.unwrap();
        assert_eq!(score.values[0].value, FeatureValue::Scalar(3.0));
    }

    #[tokio::test]
    async fn test_substring_matching_when_whole_word_disabled() {
        let mut filter = create(create_test_context(
            ModuleSetting::new(NAME, "k")
                .with_setting("keywords", json!("rust"))
                .with_setting("whole_word", json!(false)),
        ))
        .unwrap();

        let item = Item::new("1", Uuid::new_v4(), "rusty rust");
        let score = filter.score(&item).await.unwrap();
        assert_eq!(score.values[0].value, FeatureValue::Scalar(2.0));
    }

    #[test]
    fn test_missing_keywords_is_configuration_error() {
        let result = create(create_test_context(ModuleSetting::new(NAME, "k")));
        assert!(matches!(result, Err(AppError::Configuration(_))));
    }
}
