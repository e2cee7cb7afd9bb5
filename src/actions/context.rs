use crate::actions::TokenSigner;
use crate::error::{AppError, Result};
use crate::models::{Item, ModuleSetting, Settings};
use crate::state::ModuleStorage;
use reqwest::Client;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Handles shared by every action instance of a pass
#[derive(Clone)]
pub struct ActionEnv {
    pub storage: Arc<dyn ModuleStorage>,
    pub signer: Arc<TokenSigner>,
    /// Externally reachable base URL for accept/reject links
    pub public_base_url: String,
    pub http: Client,
}

impl ActionEnv {
    pub fn new(
        storage: Arc<dyn ModuleStorage>,
        signer: Arc<TokenSigner>,
        public_base_url: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            storage,
            signer,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }
}

/// Everything one configured action instance is built from
#[derive(Clone)]
pub struct ActionContext {
    pub topic_id: Uuid,
    pub action_index: usize,
    pub setting: ModuleSetting,
    pub env: ActionEnv,
}

impl ActionContext {
    pub fn settings(&self) -> Settings<'_> {
        Settings::new(&self.setting.module_name, &self.setting.settings)
    }

    /// `moduleName::moduleId`
    pub fn module_key(&self) -> String {
        self.setting.module_key()
    }

    pub fn storage(&self) -> &Arc<dyn ModuleStorage> {
        &self.env.storage
    }

    /// Signed accept and reject links for `item` at this action's index
    pub fn decision_urls(&self, item: &Item) -> (String, String) {
        let token = self
            .env
            .signer
            .sign(&self.topic_id, self.action_index, &item.id_str);
        let base = format!(
            "{}/topics/{}/tweets/{}",
            self.env.public_base_url, self.topic_id, item.id_str
        );
        (
            format!("{}/accept?token={}", base, token),
            format!("{}/reject?token={}", base, token),
        )
    }

    /// Replace `{{variable}}` placeholders with item values
    pub fn render(&self, template: &str, item: &Item) -> String {
        let mut variables = vec![
            ("id_str", item.id_str.clone()),
            ("text", item.text.clone()),
            ("topic_id", self.topic_id.to_string()),
            ("screen_name", item.author.screen_name.clone()),
        ];
        if template.contains("{{accept_url}}") || template.contains("{{reject_url}}") {
            let (accept_url, reject_url) = self.decision_urls(item);
            variables.push(("accept_url", accept_url));
            variables.push(("reject_url", reject_url));
        }

        let mut result = template.to_string();
        for (key, value) in variables {
            let placeholder = format!("{{{{{}}}}}", key);
            result = result.replace(&placeholder, &value);
        }
        result
    }

    /// POST a JSON payload; any non-2xx status is an error
    pub async fn post_json(&self, url: &str, payload: &JsonValue) -> Result<()> {
        let response = self.env.http.post(url).json(payload).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Action(format!(
                "Webhook returned non-success status {}: {}",
                status, body
            )));
        }
        Ok(())
    }
}

/// Context over in-memory storage for action unit tests
#[cfg(test)]
pub(crate) fn create_test_context(setting: ModuleSetting, action_index: usize) -> ActionContext {
    let env = ActionEnv::new(
        Arc::new(crate::state::InMemoryStore::new()),
        Arc::new(TokenSigner::new("test-secret-0123456789", None).unwrap()),
        "http://curator.local/",
        Duration::from_secs(5),
    )
    .unwrap();

    ActionContext {
        topic_id: Uuid::new_v4(),
        action_index,
        setting,
        env,
    }
}
