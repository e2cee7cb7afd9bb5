use crate::actions::{ActionContext, ActionModule};
use crate::error::Result;
use crate::models::{Item, SettingDefinition, SettingType};
use async_trait::async_trait;
use serde_json::json;

pub const NAME: &str = "notify";

pub(crate) const TEMPLATE_VARIABLES: &[&str] =
    &["id_str", "text", "topic_id", "screen_name", "accept_url", "reject_url"];

pub fn settings() -> Vec<SettingDefinition> {
    vec![
        SettingDefinition::new("webhook_url", "Webhook URL", SettingType::Text)
            .required()
            .placeholder("https://hooks.example.com/curator"),
        SettingDefinition::new("message", "Message", SettingType::TextArea)
            .placeholder("New post {{id_str}}: {{text}}")
            .template_variables(TEMPLATE_VARIABLES),
    ]
}

pub fn create(ctx: ActionContext) -> Result<Box<dyn ActionModule>> {
    let settings = ctx.settings();
    let webhook_url = settings.require_str("webhook_url")?.to_string();
    let message = settings
        .str("message")
        .unwrap_or("{{text}}")
        .to_string();

    Ok(Box::new(NotifyAction {
        ctx,
        webhook_url,
        message,
    }))
}

/// Posts a rendered message to a webhook, then advances
pub struct NotifyAction {
    ctx: ActionContext,
    webhook_url: String,
    message: String,
}

#[async_trait]
impl ActionModule for NotifyAction {
    async fn exec_action(&mut self, item: &Item) -> Result<bool> {
        let payload = json!({
            "text": self.ctx.render(&self.message, item),
            "item_id": item.id_str,
            "topic_id": self.ctx.topic_id,
            "action_index": self.ctx.action_index,
        });

        self.ctx.post_json(&self.webhook_url, &payload).await?;
        tracing::info!(item_id = %item.id_str, action_index = self.ctx.action_index, "Notification sent");
        Ok(true)
    }
}
