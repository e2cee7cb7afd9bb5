use crate::actions::{ActionContext, ActionModule};
use crate::error::{AppError, Result};
use crate::models::{Item, SettingDefinition, SettingType};
use async_trait::async_trait;

pub const NAME: &str = "filter_threshold";

pub fn settings() -> Vec<SettingDefinition> {
    vec![
        SettingDefinition::new("feature", "Feature name", SettingType::Text)
            .required()
            .placeholder("accept_probability"),
        SettingDefinition::new("min", "Minimum value", SettingType::Number).required(),
        SettingDefinition::new("max", "Maximum value", SettingType::Number),
    ]
}

pub fn create(ctx: ActionContext) -> Result<Box<dyn ActionModule>> {
    let settings = ctx.settings();
    Ok(Box::new(FilterThresholdAction {
        feature: settings.require_str("feature")?.to_string(),
        min: settings.require_f64("min")?,
        max: settings.f64("max"),
    }))
}

/// Gate: advances only while a scalar feature lies within `[min, max]`
pub struct FilterThresholdAction {
    feature: String,
    min: f64,
    max: Option<f64>,
}

#[async_trait]
impl ActionModule for FilterThresholdAction {
    async fn exec_action(&mut self, item: &Item) -> Result<bool> {
        let value = item
            .feature(&self.feature)
            .and_then(|v| v.as_scalar())
            .ok_or_else(|| {
                AppError::Action(format!("feature '{}' has no scalar value", self.feature))
            })?;

        Ok(value >= self.min && self.max.map_or(true, |max| value <= max))
    }
}
