use crate::error::Result;
use crate::filters::{FilterContext, FilterModule, FilterScore};
use crate::models::{FeatureValue, Item, MediaType, SettingDefinition};
use async_trait::async_trait;

pub const NAME: &str = "media";

const MEDIA_KINDS: [MediaType; 3] = [MediaType::None, MediaType::Photo, MediaType::Video];

pub fn settings() -> Vec<SettingDefinition> {
    Vec::new()
}

pub fn create(_ctx: FilterContext) -> Result<Box<dyn FilterModule>> {
    Ok(Box::new(MediaFilter))
}

/// Media kind as a categorical feature
pub struct MediaFilter;

#[async_trait]
impl FilterModule for MediaFilter {
    async fn score(&mut self, item: &Item) -> Result<FilterScore> {
        let index = MEDIA_KINDS
            .iter()
            .position(|kind| *kind == item.media_type)
            .unwrap_or(0);

        Ok(FilterScore::new(item.media_type.to_string()).with_value(
            "media_type",
            "Media type",
            FeatureValue::one_hot(index, MEDIA_KINDS.len()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_video_one_hot() {
        let item = Item::new("1", Uuid::new_v4(), "t").with_media(MediaType::Video);
        let score = MediaFilter.score(&item).await.unwrap();
        assert_eq!(score.summary, "video");
        assert_eq!(score.values[0].value, FeatureValue::OneHot(vec![0.0, 0.0, 1.0]));
    }
}
