use crate::actions::builtin::approval::REJECTED_MESSAGE;
use crate::actions::{ActionContext, ActionEnv, ActionKind, ActionModule, ActionRegistry};
use crate::error::{AppError, Result};
use crate::metrics::ACTION_TRANSITIONS_TOTAL;
use crate::models::{Item, PredictedClass, Topic};
use crate::state::{ItemFilter, Stores};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use strum::{Display, EnumString};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Out-of-band reviewer decision carried by an accept/reject link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Decision {
    Accept,
    Reject,
}

/// Counts of what one action pass did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// Action steps that advanced (an item may advance several times)
    pub advanced: usize,
    pub held: usize,
    pub errored: usize,
    /// Items whose chain completed during the pass
    pub archived: usize,
}

enum Step {
    Advanced,
    Held,
    Errored(String),
}

impl Step {
    fn outcome(&self) -> &'static str {
        match self {
            Step::Advanced => "advanced",
            Step::Held => "held",
            Step::Errored(_) => "errored",
        }
    }
}

/// Action instances of one pass, one per configured action
type InstanceCache = HashMap<usize, Box<dyn ActionModule>>;

/// Drives accepted items of a topic through its action chain.
///
/// Progress is persisted after every step and the next action is always
/// derived from the stored `complete_action_index`, so a pass can be
/// interrupted at any point and resumed by the next one.
pub struct ActionManager {
    stores: Stores,
    env: ActionEnv,
    batch_size: usize,
}

impl ActionManager {
    pub fn new(stores: Stores, env: ActionEnv, batch_size: usize) -> Self {
        Self {
            stores,
            env,
            batch_size: batch_size.max(1),
        }
    }

    /// Run one pass: every bulk action in chain order, then the single-item phase
    pub async fn run_pass(&self, topic: &Topic) -> Result<PassReport> {
        let mut report = PassReport::default();
        if topic.num_actions() == 0 {
            debug!(topic_id = %topic.id, "Topic has no actions configured");
            return Ok(report);
        }

        let mut instances = InstanceCache::new();
        let released = self.run_bulk_phase(topic, &mut instances, &mut report).await?;
        self.run_single_phase(topic, released, &mut instances, &mut report)
            .await?;

        info!(
            topic_id = %topic.id,
            advanced = report.advanced,
            held = report.held,
            errored = report.errored,
            archived = report.archived,
            "Action pass finished"
        );
        Ok(report)
    }

    /// Run every bulk action over its waiting items. Returns the items a bulk
    /// action advanced, in their latest state.
    async fn run_bulk_phase(
        &self,
        topic: &Topic,
        instances: &mut InstanceCache,
        report: &mut PassReport,
    ) -> Result<Vec<Item>> {
        let mut released: Vec<Item> = Vec::new();

        for index in bulk_indices(topic) {
            let items = self
                .stores
                .items
                .list_items(&topic.id, &ItemFilter::waiting_on(index), usize::MAX)
                .await?;
            if items.is_empty() {
                continue;
            }

            debug!(topic_id = %topic.id, action_index = index, items = items.len(), "Running bulk action");

            let result = match self.instance(instances, topic, index) {
                Ok(module) => module.exec_action_bulk(&items).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(decisions) => {
                    for item in items {
                        let step = match decisions.get(&item.id_str) {
                            Some(true) => Step::Advanced,
                            Some(false) => Step::Held,
                            None => Step::Errored(format!(
                                "bulk action returned no result for item {}",
                                item.id_str
                            )),
                        };
                        let advanced = matches!(step, Step::Advanced);
                        let item = self.record(topic, index, item, step, report).await?;
                        released.retain(|r| r.id_str != item.id_str);
                        if advanced {
                            released.push(item);
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        topic_id = %topic.id,
                        action_index = index,
                        items = items.len(),
                        error = %e,
                        "Bulk action failed for the whole batch"
                    );
                    let message = e.to_string();
                    for item in items {
                        released.retain(|r| r.id_str != item.id_str);
                        self.record(topic, index, item, Step::Errored(message.clone()), report)
                            .await?;
                    }
                }
            }
        }
        Ok(released)
    }

    /// Drive items through single-item actions: everything a bulk action just
    /// released, then a batch of the least recently attempted items.
    ///
    /// Items blocked on a bulk action or frozen by a rejection never enter the
    /// batch, so they cannot crowd out items that can still move.
    async fn run_single_phase(
        &self,
        topic: &Topic,
        released: Vec<Item>,
        instances: &mut InstanceCache,
        report: &mut PassReport,
    ) -> Result<()> {
        let num_actions = topic.num_actions();
        let filter = ItemFilter::actionable(num_actions).skipping_next_actions(bulk_indices(topic));
        let batch = self
            .stores
            .items
            .list_items(&topic.id, &filter, self.batch_size)
            .await?;

        let mut seen: HashSet<String> = HashSet::new();
        for item in released.into_iter().chain(batch) {
            if !seen.insert(item.id_str.clone()) {
                continue;
            }
            self.advance_item(topic, item, instances, report).await?;
        }
        Ok(())
    }

    /// Step one item forward until it holds, errors, reaches a bulk action or archives
    async fn advance_item(
        &self,
        topic: &Topic,
        mut item: Item,
        instances: &mut InstanceCache,
        report: &mut PassReport,
    ) -> Result<()> {
        let num_actions = topic.num_actions();
        loop {
            if item.is_archived(num_actions) {
                report.archived += 1;
                debug!(item_id = %item.id_str, topic_id = %topic.id, "Item archived");
                return Ok(());
            }

            let index = item.next_action_index() as usize;
            if item.is_frozen() {
                // Rejected ahead of time; surface it once the chain gets here
                if item.last_action_error.is_none() {
                    self.record(
                        topic,
                        index,
                        item,
                        Step::Errored(REJECTED_MESSAGE.to_string()),
                        report,
                    )
                    .await?;
                }
                return Ok(());
            }
            if action_kind(topic, index) == Some(ActionKind::Bulk) {
                return Ok(());
            }

            let result = match self.instance(instances, topic, index) {
                Ok(module) => module.exec_action(&item).await,
                Err(e) => Err(e),
            };

            let step = match result {
                Ok(true) => Step::Advanced,
                Ok(false) => Step::Held,
                Err(e) => Step::Errored(e.to_string()),
            };
            let advanced = matches!(step, Step::Advanced);
            item = self.record(topic, index, item, step, report).await?;
            if !advanced {
                return Ok(());
            }
        }
    }

    /// Apply one step's outcome to the item and persist it
    async fn record(
        &self,
        topic: &Topic,
        index: usize,
        mut item: Item,
        step: Step,
        report: &mut PassReport,
    ) -> Result<Item> {
        let now = Utc::now();
        let action = topic.action_settings[index].module_name.as_str();
        ACTION_TRANSITIONS_TOTAL
            .with_label_values(&[action, step.outcome()])
            .inc();

        match step {
            Step::Advanced => {
                item.record_advance(index as i32, now);
                report.advanced += 1;
            }
            Step::Held => {
                item.record_hold(index as i32, now);
                report.held += 1;
            }
            Step::Errored(message) => {
                warn!(
                    item_id = %item.id_str,
                    topic_id = %topic.id,
                    action_index = index,
                    action,
                    error = %message,
                    "Action failed"
                );
                item.record_error(index as i32, message, now);
                report.errored += 1;
            }
        }

        self.stores.items.update_item(&item).await?;
        Ok(item)
    }

    fn instance<'a>(
        &self,
        instances: &'a mut InstanceCache,
        topic: &Topic,
        index: usize,
    ) -> Result<&'a mut Box<dyn ActionModule>> {
        match instances.entry(index) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let setting = &topic.action_settings[index];
                let descriptor = ActionRegistry::require(&setting.module_name)?;
                let module = (descriptor.factory)(ActionContext {
                    topic_id: topic.id,
                    action_index: index,
                    setting: setting.clone(),
                    env: self.env.clone(),
                })?;
                Ok(entry.insert(module))
            }
        }
    }

    /// Apply an accept/reject link to an item.
    ///
    /// Accept completes the bound action, never moving progress backwards.
    /// Reject freezes the chain at the bound action whatever module runs there;
    /// the item is left out of every later pass until an accept moves it past.
    pub async fn apply_decision(
        &self,
        topic_id: &Uuid,
        item_id: &str,
        token: &str,
        decision: Decision,
    ) -> Result<Item> {
        let index = self.env.signer.verify(token, topic_id, item_id)?;

        let topic = self
            .stores
            .topics
            .get_topic(topic_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Topic {} not found", topic_id)))?;
        let setting = topic.action_settings.get(index).ok_or_else(|| {
            AppError::InvalidToken(format!("action index {} does not exist", index))
        })?;

        let mut item = self
            .stores
            .items
            .get_item(topic_id, item_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Item {} not found", item_id)))?;
        if item.predicted_class != PredictedClass::Accept {
            return Err(AppError::InvalidStateTransition(format!(
                "Item {} is {} and has no action chain",
                item_id, item.predicted_class
            )));
        }

        let index = index as i32;
        if decision == Decision::Reject && index <= item.complete_action_index {
            return Err(AppError::InvalidStateTransition(format!(
                "Action {} of item {} already completed",
                index, item_id
            )));
        }

        let now = Utc::now();
        let module_key = setting.module_key();
        let mut record = match self.env.storage.get_item_value(&module_key, item_id).await? {
            Some(JsonValue::Object(map)) => map,
            _ => Map::new(),
        };
        record.insert("decision".to_string(), json!(decision.to_string()));
        record.insert("decided_at".to_string(), json!(now.to_rfc3339()));
        self.env
            .storage
            .set_item_value(&module_key, item_id, JsonValue::Object(record))
            .await?;

        match decision {
            Decision::Accept => {
                if item.complete_action_index < index {
                    item.record_advance(index, now);
                }
            }
            Decision::Reject => item.record_rejection(index, REJECTED_MESSAGE, now),
        }

        self.stores.items.update_item(&item).await?;
        let outcome = decision.to_string();
        ACTION_TRANSITIONS_TOTAL
            .with_label_values(&[setting.module_name.as_str(), outcome.as_str()])
            .inc();

        info!(
            item_id = %item_id,
            topic_id = %topic_id,
            action_index = index,
            decision = %decision,
            "Out-of-band decision applied"
        );
        Ok(item)
    }
}

fn bulk_indices(topic: &Topic) -> Vec<usize> {
    (0..topic.num_actions())
        .filter(|index| action_kind(topic, *index) == Some(ActionKind::Bulk))
        .collect()
}

fn action_kind(topic: &Topic, index: usize) -> Option<ActionKind> {
    topic
        .action_settings
        .get(index)
        .and_then(|setting| ActionRegistry::get(&setting.module_name))
        .map(|descriptor| descriptor.kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::TokenSigner;
    use crate::models::{FeatureValue, FilterResult, ModuleSetting, NamedFeature};
    use crate::state::create_in_memory_stores;
    use std::sync::Arc;
    use std::time::Duration;

    fn create_test_manager() -> ActionManager {
        let stores = create_in_memory_stores();
        let env = ActionEnv::new(
            stores.modules.clone(),
            Arc::new(TokenSigner::new("test-secret-0123456789", None).unwrap()),
            "http://curator.local",
            Duration::from_secs(5),
        )
        .unwrap();
        ActionManager::new(stores, env, 10)
    }

    fn threshold(id: &str, min: f64) -> ModuleSetting {
        ModuleSetting::new("filter_threshold", id)
            .with_setting("feature", json!("score"))
            .with_setting("min", json!(min))
    }

    fn wait(id: &str, seconds: u64) -> ModuleSetting {
        ModuleSetting::new("wait", id).with_setting("seconds", json!(seconds))
    }

    async fn accepted_item(manager: &ActionManager, topic: &Topic, id: &str) -> Item {
        let mut item = Item::new(id, topic.id, "text");
        item.predicted_class = PredictedClass::Accept;
        item.filters_result = vec![FilterResult {
            filter_id: "f".to_string(),
            values: vec![NamedFeature {
                name: "score".to_string(),
                title: "Score".to_string(),
                value: FeatureValue::Scalar(1.0),
            }],
            summary: String::new(),
        }];
        manager.stores.items.save_item(&item).await.unwrap();
        item
    }

    async fn reload(manager: &ActionManager, item: &Item) -> Item {
        manager
            .stores
            .items
            .get_item(&item.topic_id, &item.id_str)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_advance_then_hold_stops_the_pass() {
        let manager = create_test_manager();
        let topic = Topic::new("t")
            .with_action(threshold("a", 0.0))
            .with_action(threshold("b", 5.0))
            .with_action(wait("c", 0));
        let item = accepted_item(&manager, &topic, "1").await;

        let report = manager.run_pass(&topic).await.unwrap();
        assert_eq!(report.advanced, 1);
        assert_eq!(report.held, 1);

        let item = reload(&manager, &item).await;
        assert_eq!(item.complete_action_index, 0);
        assert_eq!(item.last_action_index, 1);
        assert!(item.last_action_error.is_none());
    }

    #[tokio::test]
    async fn test_error_is_recorded_and_retried() {
        let manager = create_test_manager();
        let missing = ModuleSetting::new("filter_threshold", "m")
            .with_setting("feature", json!("absent"))
            .with_setting("min", json!(0));
        let topic = Topic::new("t").with_action(wait("a", 0)).with_action(missing);
        let item = accepted_item(&manager, &topic, "1").await;

        manager.run_pass(&topic).await.unwrap();
        let first = reload(&manager, &item).await;
        assert_eq!(first.complete_action_index, 0);
        assert_eq!(first.last_action_index, 1);
        assert!(first.last_action_error.as_deref().unwrap().contains("absent"));

        let report = manager.run_pass(&topic).await.unwrap();
        assert_eq!(report.errored, 1);
        assert_eq!(reload(&manager, &item).await.complete_action_index, 0);
    }

    #[tokio::test]
    async fn test_unknown_action_is_an_item_error() {
        let manager = create_test_manager();
        let topic = Topic::new("t").with_action(ModuleSetting::new("retweet", "r"));
        let item = accepted_item(&manager, &topic, "1").await;

        manager.run_pass(&topic).await.unwrap();
        let item = reload(&manager, &item).await;
        assert_eq!(item.complete_action_index, -1);
        assert!(item.last_action_error.unwrap().contains("Unknown action module"));
    }

    #[tokio::test]
    async fn test_chain_completes_within_one_pass() {
        let manager = create_test_manager();
        let topic = Topic::new("t")
            .with_action(wait("a", 0))
            .with_action(threshold("b", 0.0));
        let item = accepted_item(&manager, &topic, "1").await;

        let report = manager.run_pass(&topic).await.unwrap();
        assert_eq!(report.archived, 1);
        assert!(reload(&manager, &item).await.is_archived(2));

        // archived items are no longer picked up
        let report = manager.run_pass(&topic).await.unwrap();
        assert_eq!(report, PassReport::default());
    }

    #[tokio::test]
    async fn test_bulk_schedule_releases_quota_before_single_phase() {
        let manager = create_test_manager();
        let schedule = ModuleSetting::new("schedule", "s")
            .with_setting("max_items_at_one_time", json!(1));
        let topic = Topic::new("t").with_action(schedule).with_action(wait("w", 3600));
        for i in 0..3 {
            accepted_item(&manager, &topic, &i.to_string()).await;
        }

        let report = manager.run_pass(&topic).await.unwrap();
        // one released and then held by the wait, two held by the schedule
        assert_eq!(report.advanced, 1);
        assert_eq!(report.held, 3);
    }

    #[tokio::test]
    async fn test_unclassified_items_are_ignored() {
        let manager = create_test_manager();
        let topic = Topic::new("t").with_action(wait("a", 0));
        let item = Item::new("1", topic.id, "x");
        manager.stores.items.save_item(&item).await.unwrap();

        assert_eq!(manager.run_pass(&topic).await.unwrap(), PassReport::default());
        assert_eq!(reload(&manager, &item).await.last_action_index, -1);
    }

    #[tokio::test]
    async fn test_apply_decision_accept_and_reject() {
        let manager = create_test_manager();
        let topic = Topic::new("t")
            .with_action(wait("a", 3600))
            .with_action(wait("b", 3600));
        manager.stores.topics.save_topic(&topic).await.unwrap();
        let item = accepted_item(&manager, &topic, "1").await;

        let token = manager.env.signer.sign(&topic.id, 0, "1");
        let accepted = manager
            .apply_decision(&topic.id, "1", &token, Decision::Accept)
            .await
            .unwrap();
        assert_eq!(accepted.complete_action_index, 0);
        assert_eq!(accepted.last_action_index, 0);

        let token = manager.env.signer.sign(&topic.id, 1, "1");
        let rejected = manager
            .apply_decision(&topic.id, "1", &token, Decision::Reject)
            .await
            .unwrap();
        assert_eq!(rejected.complete_action_index, 0);
        assert_eq!(rejected.last_action_index, 1);
        assert_eq!(rejected.last_action_error.as_deref(), Some(REJECTED_MESSAGE));
        assert_eq!(reload(&manager, &item).await.last_action_index, 1);
    }

    #[tokio::test]
    async fn test_reject_of_a_later_action_waits_for_the_chain() {
        let manager = create_test_manager();
        let topic = Topic::new("t")
            .with_action(wait("a", 0))
            .with_action(wait("b", 0))
            .with_action(wait("c", 0));
        manager.stores.topics.save_topic(&topic).await.unwrap();
        let item = accepted_item(&manager, &topic, "1").await;

        let token = manager.env.signer.sign(&topic.id, 1, "1");
        let rejected = manager
            .apply_decision(&topic.id, "1", &token, Decision::Reject)
            .await
            .unwrap();
        assert!(rejected.last_action_error.is_none());
        assert_eq!(rejected.last_action_index, -1);

        let report = manager.run_pass(&topic).await.unwrap();
        assert_eq!(report.advanced, 1);
        assert_eq!(report.errored, 1);

        let item = reload(&manager, &item).await;
        assert_eq!(item.complete_action_index, 0);
        assert_eq!(item.last_action_index, 1);
        assert_eq!(item.last_action_error.as_deref(), Some(REJECTED_MESSAGE));

        // Frozen from now on
        assert_eq!(manager.run_pass(&topic).await.unwrap(), PassReport::default());
    }

    #[tokio::test]
    async fn test_reject_of_a_completed_action_is_refused() {
        let manager = create_test_manager();
        let topic = Topic::new("t")
            .with_action(wait("a", 0))
            .with_action(wait("b", 3600));
        manager.stores.topics.save_topic(&topic).await.unwrap();
        let item = accepted_item(&manager, &topic, "1").await;
        manager.run_pass(&topic).await.unwrap();

        let token = manager.env.signer.sign(&topic.id, 0, "1");
        assert!(matches!(
            manager.apply_decision(&topic.id, "1", &token, Decision::Reject).await,
            Err(AppError::InvalidStateTransition(_))
        ));

        let item = reload(&manager, &item).await;
        assert_eq!(item.complete_action_index, 0);
        assert!(item.last_action_error.is_none());
        assert!(item.rejected_action_index.is_none());
    }

    #[tokio::test]
    async fn test_bulk_blocked_items_leave_the_batch_to_others() {
        let stores = create_in_memory_stores();
        let env = ActionEnv::new(
            stores.modules.clone(),
            Arc::new(TokenSigner::new("test-secret-0123456789", None).unwrap()),
            "http://curator.local",
            Duration::from_secs(5),
        )
        .unwrap();
        let manager = ActionManager::new(stores, env, 2);
        let schedule = ModuleSetting::new("schedule", "s")
            .with_setting("max_items_at_one_time", json!(1));
        let topic = Topic::new("t")
            .with_action(wait("a", 0))
            .with_action(schedule)
            .with_action(wait("c", 3600));

        // Waiting on the schedule, older than anything else
        for i in 0..4 {
            let mut item = accepted_item(&manager, &topic, &format!("blocked-{}", i)).await;
            item.crawled_at = item.crawled_at - chrono::Duration::hours(1);
            item.record_advance(0, item.crawled_at);
            manager.stores.items.update_item(&item).await.unwrap();
        }
        let fresh = accepted_item(&manager, &topic, "fresh").await;

        manager.run_pass(&topic).await.unwrap();
        let fresh = reload(&manager, &fresh).await;
        assert_eq!(fresh.complete_action_index, 0);
    }

    #[tokio::test]
    async fn test_apply_decision_never_moves_backwards() {
        let manager = create_test_manager();
        let topic = Topic::new("t")
            .with_action(wait("a", 0))
            .with_action(wait("b", 3600));
        manager.stores.topics.save_topic(&topic).await.unwrap();
        let mut item = accepted_item(&manager, &topic, "1").await;
        item.record_advance(1, Utc::now());
        manager.stores.items.update_item(&item).await.unwrap();

        let token = manager.env.signer.sign(&topic.id, 0, "1");
        let item = manager
            .apply_decision(&topic.id, "1", &token, Decision::Accept)
            .await
            .unwrap();
        assert_eq!(item.complete_action_index, 1);
    }

    #[tokio::test]
    async fn test_apply_decision_requires_accepted_item() {
        let manager = create_test_manager();
        let topic = Topic::new("t").with_action(wait("a", 3600));
        manager.stores.topics.save_topic(&topic).await.unwrap();
        let mut item = accepted_item(&manager, &topic, "1").await;
        item.predicted_class = PredictedClass::Reject;
        manager.stores.items.update_item(&item).await.unwrap();

        let token = manager.env.signer.sign(&topic.id, 0, "1");
        assert!(matches!(
            manager.apply_decision(&topic.id, "1", &token, Decision::Accept).await,
            Err(AppError::InvalidStateTransition(_))
        ));
    }

    #[tokio::test]
    async fn test_apply_decision_rejects_bad_tokens() {
        let manager = create_test_manager();
        let topic = Topic::new("t").with_action(wait("a", 3600));
        manager.stores.topics.save_topic(&topic).await.unwrap();
        accepted_item(&manager, &topic, "1").await;

        let other_item = manager.env.signer.sign(&topic.id, 0, "2");
        assert!(matches!(
            manager.apply_decision(&topic.id, "1", &other_item, Decision::Accept).await,
            Err(AppError::InvalidToken(_))
        ));

        let out_of_range = manager.env.signer.sign(&topic.id, 5, "1");
        assert!(matches!(
            manager.apply_decision(&topic.id, "1", &out_of_range, Decision::Accept).await,
            Err(AppError::InvalidToken(_))
        ));
    }
}
