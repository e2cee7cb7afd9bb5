use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// A crawled post flowing through the curation pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    /// Network identifier of the post, immutable
    pub id_str: String,

    /// Topic this item was crawled for
    pub topic_id: Uuid,

    /// Post text
    pub text: String,

    /// Author snapshot at crawl time
    pub author: Author,

    /// Retweet count at crawl time
    pub retweet_count: u64,

    /// Favorite count at crawl time
    pub favorite_count: u64,

    /// Attached media kind
    pub media_type: MediaType,

    /// When the crawler stored the item
    pub crawled_at: DateTime<Utc>,

    /// Classifier decision
    pub predicted_class: PredictedClass,

    /// Per-filter feature output from the last classification
    pub filters_result: Vec<FilterResult>,

    /// Index of the last action fully completed (-1 before any)
    pub complete_action_index: i32,

    /// Index of the last action attempted (-1 before any)
    pub last_action_index: i32,

    /// When the last action attempt ran
    pub last_action_executed_at: Option<DateTime<Utc>>,

    /// Message of the last failed attempt, cleared by the next hold or advance
    pub last_action_error: Option<String>,

    /// Action index a reviewer rejected; the chain stays frozen there
    #[serde(default)]
    pub rejected_action_index: Option<i32>,

    /// When the classifier last looked at this item, successful or not
    #[serde(default)]
    pub classification_attempted_at: Option<DateTime<Utc>>,

    /// Why the last classification attempt could not score the item
    #[serde(default)]
    pub classification_error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Author {
    pub screen_name: String,
    pub followers_count: u64,
    pub friends_count: u64,
    pub verified: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MediaType {
    #[default]
    None,
    Photo,
    Video,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PredictedClass {
    Accept,
    Reject,
    #[default]
    Unset,
}

/// Output of one filter for one item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilterResult {
    pub filter_id: String,
    pub values: Vec<NamedFeature>,
    pub summary: String,
}

/// A single named feature. Order within `FilterResult::values` is the column order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NamedFeature {
    pub name: String,
    pub title: String,
    pub value: FeatureValue,
}

/// Scalar numeric feature or one-hot encoded categorical feature
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum FeatureValue {
    Scalar(f64),
    OneHot(Vec<f64>),
}

impl FeatureValue {
    /// Number of matrix columns this value occupies once flattened
    pub fn width(&self) -> usize {
        match self {
            FeatureValue::Scalar(_) => 1,
            FeatureValue::OneHot(values) => values.len(),
        }
    }

    pub fn is_categorical(&self) -> bool {
        matches!(self, FeatureValue::OneHot(_))
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            FeatureValue::Scalar(v) => Some(*v),
            FeatureValue::OneHot(_) => None,
        }
    }

    /// Build a one-hot vector of `len` with `index` set
    pub fn one_hot(index: usize, len: usize) -> Self {
        let mut values = vec![0.0; len];
        if index < len {
            values[index] = 1.0;
        }
        FeatureValue::OneHot(values)
    }
}

/// Where an item stands in its action chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum ActionState {
    /// No attempt recorded for the next action yet
    Pending,
    /// Next action declined to advance without error
    Held,
    /// Last attempt failed
    Errored,
    /// Every configured action has completed
    Archived,
}

impl Item {
    /// Create a freshly crawled item
    pub fn new(id_str: impl Into<String>, topic_id: Uuid, text: impl Into<String>) -> Self {
        Self {
            id_str: id_str.into(),
            topic_id,
            text: text.into(),
            author: Author::default(),
            retweet_count: 0,
            favorite_count: 0,
            media_type: MediaType::None,
            crawled_at: Utc::now(),
            predicted_class: PredictedClass::Unset,
            filters_result: Vec::new(),
            complete_action_index: -1,
            last_action_index: -1,
            last_action_executed_at: None,
            last_action_error: None,
            rejected_action_index: None,
            classification_attempted_at: None,
            classification_error: None,
        }
    }

    pub fn with_author(mut self, author: Author) -> Self {
        self.author = author;
        self
    }

    pub fn with_counts(mut self, retweet_count: u64, favorite_count: u64) -> Self {
        self.retweet_count = retweet_count;
        self.favorite_count = favorite_count;
        self
    }

    pub fn with_media(mut self, media_type: MediaType) -> Self {
        self.media_type = media_type;
        self
    }

    pub fn with_crawled_at(mut self, crawled_at: DateTime<Utc>) -> Self {
        self.crawled_at = crawled_at;
        self
    }

    pub fn is_accepted(&self) -> bool {
        self.predicted_class == PredictedClass::Accept
    }

    /// Index of the action that should run next
    pub fn next_action_index(&self) -> i32 {
        self.complete_action_index + 1
    }

    pub fn is_archived(&self, num_actions: usize) -> bool {
        self.complete_action_index + 1 >= num_actions as i32
    }

    /// A reviewer rejected the action this item would run next
    pub fn is_frozen(&self) -> bool {
        self.rejected_action_index == Some(self.next_action_index())
    }

    pub fn action_state(&self, num_actions: usize) -> ActionState {
        if self.is_archived(num_actions) {
            ActionState::Archived
        } else if self.last_action_error.is_some() {
            ActionState::Errored
        } else if self.last_action_index == self.complete_action_index + 1 {
            ActionState::Held
        } else {
            ActionState::Pending
        }
    }

    /// Whether the action at `index` already ran for this item at least once
    pub fn was_attempted(&self, index: i32) -> bool {
        self.last_action_index >= index && self.complete_action_index < index
    }

    /// Action at `index` completed
    pub fn record_advance(&mut self, index: i32, at: DateTime<Utc>) {
        self.touch_attempt(index, at);
        self.last_action_error = None;
        if index > self.complete_action_index {
            self.complete_action_index = index;
        }
        if self.rejected_action_index.map_or(false, |rejected| rejected <= index) {
            self.rejected_action_index = None;
        }
    }

    /// Reviewer declined the action at `index`. The error is recorded now if
    /// the item is waiting on that action, otherwise once the chain reaches it.
    pub fn record_rejection(&mut self, index: i32, message: impl Into<String>, at: DateTime<Utc>) {
        self.rejected_action_index = Some(index);
        if index == self.next_action_index() {
            self.record_error(index, message, at);
        }
    }

    /// Classifier scored the item
    pub fn record_classified(&mut self, class: PredictedClass, at: DateTime<Utc>) {
        self.predicted_class = class;
        self.classification_attempted_at = Some(at);
        self.classification_error = None;
    }

    /// Classifier could not score the item; it stays unset
    pub fn record_classification_failure(&mut self, message: impl Into<String>, at: DateTime<Utc>) {
        self.classification_attempted_at = Some(at);
        self.classification_error = Some(message.into());
    }

    /// Action at `index` declined to advance
    pub fn record_hold(&mut self, index: i32, at: DateTime<Utc>) {
        self.touch_attempt(index, at);
        self.last_action_error = None;
    }

    /// Action at `index` failed
    pub fn record_error(&mut self, index: i32, message: impl Into<String>, at: DateTime<Utc>) {
        self.touch_attempt(index, at);
        self.last_action_error = Some(message.into());
    }

    fn touch_attempt(&mut self, index: i32, at: DateTime<Utc>) {
        self.last_action_index = self.last_action_index.max(index);
        self.last_action_executed_at = Some(at);
    }

    /// Look up a feature by name across all filter results
    pub fn feature(&self, name: &str) -> Option<&FeatureValue> {
        self.filters_result
            .iter()
            .flat_map(|r| r.values.iter())
            .find(|f| f.name == name)
            .map(|f| &f.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_item_defaults() {
        let item = Item::new("100", Uuid::new_v4(), "hello");
        assert_eq!(item.complete_action_index, -1);
        assert_eq!(item.last_action_index, -1);
        assert_eq!(item.predicted_class, PredictedClass::Unset);
        assert_eq!(item.next_action_index(), 0);
        assert_eq!(item.action_state(3), ActionState::Pending);
    }

    #[test]
    fn test_record_transitions() {
        let mut item = Item::new("1", Uuid::new_v4(), "text");
        let now = Utc::now();

        item.record_advance(0, now);
        assert_eq!(item.complete_action_index, 0);
        assert_eq!(item.last_action_index, 0);

        item.record_hold(1, now);
        assert_eq!(item.complete_action_index, 0);
        assert_eq!(item.last_action_index, 1);
        assert_eq!(item.action_state(3), ActionState::Held);
        assert!(item.was_attempted(1));

        item.record_error(1, "boom", now);
        assert_eq!(item.action_state(3), ActionState::Errored);

        item.record_advance(1, now);
        assert!(item.last_action_error.is_none());
        item.record_advance(2, now);
        assert_eq!(item.action_state(3), ActionState::Archived);
    }

    #[test]
    fn test_last_action_index_never_decreases() {
        let mut item = Item::new("1", Uuid::new_v4(), "text");
        item.record_hold(2, Utc::now());
        item.record_hold(1, Utc::now());
        assert_eq!(item.last_action_index, 2);
    }

    #[test]
    fn test_rejection_freezes_until_advanced() {
        let mut item = Item::new("1", Uuid::new_v4(), "text");
        let now = Utc::now();

        item.record_rejection(0, "no", now);
        assert!(item.is_frozen());
        assert_eq!(item.action_state(2), ActionState::Errored);

        // Holding again does not thaw the rejection
        item.record_hold(0, now);
        assert!(item.is_frozen());

        item.record_advance(0, now);
        assert!(!item.is_frozen());
        assert!(item.rejected_action_index.is_none());

        // Rejecting a later action only freezes once the chain gets there
        item.record_rejection(2, "no", now);
        assert!(!item.is_frozen());
        assert!(item.last_action_error.is_none());
        item.record_advance(1, now);
        assert!(item.is_frozen());
    }

    #[test]
    fn test_classification_bookkeeping() {
        let mut item = Item::new("1", Uuid::new_v4(), "text");
        let now = Utc::now();

        item.record_classification_failure("no usable filters", now);
        assert_eq!(item.predicted_class, PredictedClass::Unset);
        assert_eq!(item.classification_attempted_at, Some(now));
        assert!(item.classification_error.is_some());

        item.record_classified(PredictedClass::Accept, now);
        assert!(item.is_accepted());
        assert!(item.classification_error.is_none());
    }

    #[test]
    fn test_predicted_class_strings() {
        assert_eq!(PredictedClass::Accept.to_string(), "accept");
        assert_eq!("reject".parse::<PredictedClass>().unwrap(), PredictedClass::Reject);
    }

    #[test]
    fn test_feature_value_width() {
        assert_eq!(FeatureValue::Scalar(3.0).width(), 1);
        assert_eq!(FeatureValue::one_hot(1, 3), FeatureValue::OneHot(vec![0.0, 1.0, 0.0]));
        assert!(FeatureValue::one_hot(0, 2).is_categorical());
    }
}
