use crate::actions::{ActionContext, ActionModule};
use crate::error::{AppError, Result};
use crate::models::{Item, SettingDefinition, SettingType};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::cmp::Ordering;
use std::collections::HashMap;
use strum::EnumString;

pub const NAME: &str = "schedule";

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SortOrder {
    Asc,
    Desc,
}

pub fn settings() -> Vec<SettingDefinition> {
    vec![
        SettingDefinition::new("max_items_at_one_time", "Items released per run", SettingType::Number)
            .required()
            .placeholder("1"),
        SettingDefinition::new("sort_by", "Sort by", SettingType::Text)
            .placeholder("favorite_count"),
        SettingDefinition::new("sort_order", "Sort order", SettingType::Text).placeholder("desc"),
        SettingDefinition::new("interval_minutes", "Minimum minutes between releases", SettingType::Number),
    ]
}

pub fn create(ctx: ActionContext) -> Result<Box<dyn ActionModule>> {
    let settings = ctx.settings();
    let max_items = settings.require_f64("max_items_at_one_time")?;
    if max_items < 0.0 {
        return Err(AppError::Configuration(format!(
            "'{}' requires a non-negative 'max_items_at_one_time'",
            NAME
        )));
    }

    let sort_order = match settings.str("sort_order") {
        Some(order) => order.parse().map_err(|_| {
            AppError::Configuration(format!("'{}': unknown sort_order '{}'", NAME, order))
        })?,
        None => SortOrder::Desc,
    };

    Ok(Box::new(ScheduleAction {
        max_items: max_items as usize,
        sort_by: settings.str("sort_by").map(str::to_string),
        sort_order,
        interval: settings
            .f64("interval_minutes")
            .filter(|m| *m > 0.0)
            .map(|m| Duration::seconds((m * 60.0) as i64)),
        ctx,
    }))
}

/// Releases at most `max_items_at_one_time` waiting items per run, best first
pub struct ScheduleAction {
    ctx: ActionContext,
    max_items: usize,
    sort_by: Option<String>,
    sort_order: SortOrder,
    interval: Option<Duration>,
}

/// Numeric sort key of an item: a known item field or a scalar feature
pub fn sort_value(item: &Item, sort_by: &str) -> Option<f64> {
    match sort_by {
        "retweet_count" => Some(item.retweet_count as f64),
        "favorite_count" => Some(item.favorite_count as f64),
        "followers_count" => Some(item.author.followers_count as f64),
        "crawled_at" => Some(item.crawled_at.timestamp_millis() as f64),
        feature => item.feature(feature).and_then(|v| v.as_scalar()),
    }
}

impl ScheduleAction {
    async fn last_release(&self) -> Result<Option<DateTime<Utc>>> {
        let stored = self.ctx.storage().get_module_value(&self.ctx.module_key()).await?;
        Ok(stored
            .as_ref()
            .and_then(|v| v.get("last_release_at"))
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc)))
    }

    fn ordered<'a>(&self, items: &'a [Item]) -> Vec<&'a Item> {
        let mut ordered: Vec<&Item> = items.iter().collect();
        if let Some(sort_by) = &self.sort_by {
            // Items without a value sort last in either direction
            ordered.sort_by(|a, b| {
                match (sort_value(a, sort_by), sort_value(b, sort_by)) {
                    (Some(x), Some(y)) => {
                        let ord = x.partial_cmp(&y).unwrap_or(Ordering::Equal);
                        match self.sort_order {
                            SortOrder::Asc => ord,
                            SortOrder::Desc => ord.reverse(),
                        }
                    }
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                }
            });
        }
        ordered
    }
}

#[async_trait]
impl ActionModule for ScheduleAction {
    async fn exec_action_bulk(&mut self, items: &[Item]) -> Result<HashMap<String, bool>> {
        let now = Utc::now();
        let gated = match (self.interval, self.last_release().await?) {
            (Some(interval), Some(last)) => now - last < interval,
            _ => false,
        };
        let quota = if gated { 0 } else { self.max_items };

        let decisions: HashMap<String, bool> = self
            .ordered(items)
            .into_iter()
            .enumerate()
            .map(|(rank, item)| (item.id_str.clone(), rank < quota))
            .collect();

        let released = decisions.values().filter(|advance| **advance).count();
        if released > 0 && self.interval.is_some() {
            self.ctx
                .storage()
                .set_module_value(
                    &self.ctx.module_key(),
                    json!({ "last_release_at": now.to_rfc3339() }),
                )
                .await?;
        }

        tracing::debug!(
            topic_id = %self.ctx.topic_id,
            waiting = items.len(),
            released,
            gated,
            "Schedule run"
        );
        Ok(decisions)
    }
}
