use crate::actions::builtin::notify::TEMPLATE_VARIABLES;
use crate::actions::{ActionContext, ActionModule};
use crate::error::{AppError, Result};
use crate::models::{Item, SettingDefinition, SettingType};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

pub const NAME: &str = "approval";

/// Error recorded on an item a reviewer rejected
pub const REJECTED_MESSAGE: &str = "rejected by reviewer";

pub fn settings() -> Vec<SettingDefinition> {
    vec![
        SettingDefinition::new("webhook_url", "Webhook URL", SettingType::Text)
            .required()
            .placeholder("https://hooks.example.com/review"),
        SettingDefinition::new("message", "Message", SettingType::TextArea)
            .placeholder("Approve {{id_str}}? {{accept_url}} / {{reject_url}}")
            .template_variables(TEMPLATE_VARIABLES),
    ]
}

pub fn create(ctx: ActionContext) -> Result<Box<dyn ActionModule>> {
    let settings = ctx.settings();
    let webhook_url = settings.require_str("webhook_url")?.to_string();
    let message = settings
        .str("message")
        .unwrap_or("{{text}}\nAccept: {{accept_url}}\nReject: {{reject_url}}")
        .to_string();

    Ok(Box::new(ApprovalAction {
        ctx,
        webhook_url,
        message,
    }))
}

/// Asks a reviewer with signed accept/reject links and holds until they answer
pub struct ApprovalAction {
    ctx: ActionContext,
    webhook_url: String,
    message: String,
}

#[async_trait]
impl ActionModule for ApprovalAction {
    async fn exec_action(&mut self, item: &Item) -> Result<bool> {
        let decision = self
            .ctx
            .storage()
            .get_item_value(&self.ctx.module_key(), &item.id_str)
            .await?;

        let record = decision.as_ref();
        match record.and_then(|d| d.get("decision")).and_then(|d| d.as_str()) {
            Some("accept") => return Ok(true),
            Some("reject") => return Err(AppError::Action(REJECTED_MESSAGE.to_string())),
            _ => {}
        }

        // Ask once; a failed delivery is retried on the next pass
        if record.and_then(|d| d.get("requested_at")).is_none() {
            let (accept_url, reject_url) = self.ctx.decision_urls(item);
            let payload = json!({
                "text": self.ctx.render(&self.message, item),
                "item_id": item.id_str,
                "topic_id": self.ctx.topic_id,
                "accept_url": accept_url,
                "reject_url": reject_url,
            });
            self.ctx.post_json(&self.webhook_url, &payload).await?;
            self.ctx
                .storage()
                .set_item_value(
                    &self.ctx.module_key(),
                    &item.id_str,
                    json!({ "requested_at": Utc::now().to_rfc3339() }),
                )
                .await?;
            tracing::info!(item_id = %item.id_str, action_index = self.ctx.action_index, "Approval requested");
        }

        Ok(false)
    }
}
