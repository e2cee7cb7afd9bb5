use super::log_scale;
use crate::error::Result;
use crate::filters::{FilterContext, FilterModule, FilterScore};
use crate::models::{FeatureValue, Item, SettingDefinition};
use async_trait::async_trait;

pub const NAME: &str = "author";

pub fn settings() -> Vec<SettingDefinition> {
    Vec::new()
}

pub fn create(_ctx: FilterContext) -> Result<Box<dyn FilterModule>> {
    Ok(Box::new(AuthorFilter))
}

/// Author reach and verification
pub struct AuthorFilter;

#[async_trait]
impl FilterModule for AuthorFilter {
    async fn score(&mut self, item: &Item) -> Result<FilterScore> {
        let author = &item.author;
        Ok(FilterScore::new(format!(
            "@{} ({} followers{})",
            author.screen_name,
            author.followers_count,
            if author.verified { ", verified" } else { "" }
        ))
        .with_value(
            "followers_count",
            "Followers",
            FeatureValue::Scalar(log_scale(author.followers_count)),
        )
        .with_value(
            "friends_count",
            "Friends",
            FeatureValue::Scalar(log_scale(author.friends_count)),
        )
        .with_value(
            "verified",
            "Verified",
            FeatureValue::one_hot(usize::from(author.verified), 2),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Author;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_verified_is_one_hot() {
        let item = Item::new("1", Uuid::new_v4(), "t").with_author(Author {
            screen_name: "ferris".into(),
            followers_count: 99,
            friends_count: 0,
            verified: true,
        });

        let score = AuthorFilter.score(&item).await.unwrap();
        assert_eq!(score.values[2].value, FeatureValue::OneHot(vec![0.0, 1.0]));
        assert!(score.summary.contains("verified"));
    }
}
