use super::log_scale;
use crate::error::Result;
use crate::filters::{FilterContext, FilterModule, FilterScore};
use crate::models::{FeatureValue, Item, SettingDefinition};
use async_trait::async_trait;

pub const NAME: &str = "engagement";

pub fn settings() -> Vec<SettingDefinition> {
    Vec::new()
}

pub fn create(_ctx: FilterContext) -> Result<Box<dyn FilterModule>> {
    Ok(Box::new(EngagementFilter))
}

/// Retweet and favorite counts, log-scaled
pub struct EngagementFilter;

#[async_trait]
impl FilterModule for EngagementFilter {
    async fn score(&mut self, item: &Item) -> Result<FilterScore> {
        Ok(FilterScore::new(format!(
            "{} retweets, {} favorites",
            item.retweet_count, item.favorite_count
        ))
        .with_value(
            "retweet_count",
            "Retweets",
            FeatureValue::Scalar(log_scale(item.retweet_count)),
        )
        .with_value(
            "favorite_count",
            "Favorites",
            FeatureValue::Scalar(log_scale(item.favorite_count)),
        ))
    }
}
