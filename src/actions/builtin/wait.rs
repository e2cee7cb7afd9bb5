use crate::actions::{ActionContext, ActionModule};
use crate::error::{AppError, Result};
use crate::models::{Item, SettingDefinition, SettingType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

pub const NAME: &str = "wait";

pub fn settings() -> Vec<SettingDefinition> {
    vec![SettingDefinition::new("seconds", "Seconds to wait", SettingType::Number)
        .required()
        .placeholder("3600")]
}

pub fn create(ctx: ActionContext) -> Result<Box<dyn ActionModule>> {
    let seconds = ctx.settings().require_f64("seconds")?;
    if seconds < 0.0 {
        return Err(AppError::Configuration(format!(
            "'{}' requires a non-negative 'seconds' setting",
            NAME
        )));
    }
    Ok(Box::new(WaitAction { ctx, seconds }))
}

/// Holds an item until `seconds` have passed since it first reached this action
pub struct WaitAction {
    ctx: ActionContext,
    seconds: f64,
}

impl WaitAction {
    async fn started_at(&self, item: &Item) -> Result<Option<DateTime<Utc>>> {
        let stored = self
            .ctx
            .storage()
            .get_item_value(&self.ctx.module_key(), &item.id_str)
            .await?;

        Ok(stored
            .as_ref()
            .and_then(|v| v.get("started_at"))
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc)))
    }
}

#[async_trait]
impl ActionModule for WaitAction {
    async fn exec_action(&mut self, item: &Item) -> Result<bool> {
        if self.seconds <= 0.0 {
            return Ok(true);
        }

        let now = Utc::now();
        let first_arrival = !item.was_attempted(self.ctx.action_index as i32);
        let started = match self.started_at(item).await? {
            Some(started) if !first_arrival => started,
            _ => {
                self.ctx
                    .storage()
                    .set_item_value(
                        &self.ctx.module_key(),
                        &item.id_str,
                        json!({ "started_at": now.to_rfc3339() }),
                    )
                    .await?;
                return Ok(false);
            }
        };

        let elapsed = (now - started).num_milliseconds() as f64 / 1000.0;
        Ok(elapsed >= self.seconds)
    }
}
