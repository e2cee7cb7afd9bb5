use crate::error::Result;
use crate::filters::{FilterContext, FilterModule, FilterScore};
use crate::models::{FeatureValue, Item, SettingDefinition};
use async_trait::async_trait;

pub const NAME: &str = "text_length";

pub fn settings() -> Vec<SettingDefinition> {
    Vec::new()
}

pub fn create(_ctx: FilterContext) -> Result<Box<dyn FilterModule>> {
    Ok(Box::new(TextLengthFilter))
}

pub struct TextLengthFilter;

#[async_trait]
impl FilterModule for TextLengthFilter {
    async fn score(&mut self, item: &Item) -> Result<FilterScore> {
        let chars = item.text.chars().count();
        let words = item.text.split_whitespace().count();

        Ok(FilterScore::new(format!("{} chars, {} words", chars, words))
            .with_value("char_count", "Characters", FeatureValue::Scalar(chars as f64))
            .with_value("word_count", "Words", FeatureValue::Scalar(words as f64)))
    }
}
