//! Configuration for the scheduler module

use serde::{Deserialize, Serialize};

/// Configuration for the scheduler service.
///
/// Schedules are six-field cron expressions (seconds first), as accepted by
/// `tokio-cron-scheduler`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Whether the scheduler is enabled
    pub enabled: bool,

    /// Timezone for cron expressions; only "UTC" is supported
    pub timezone: String,

    /// Action pass over every topic
    pub action_schedule: String,

    /// Classification of unclassified items of every topic
    pub classification_schedule: String,

    /// Retraining of every topic's enabled pattern
    pub training_schedule: String,

    /// Whether the training job is registered at all
    pub training_enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timezone: "UTC".to_string(),
            action_schedule: "0 */5 * * * *".to_string(), // Every 5 minutes
            classification_schedule: "0 */10 * * * *".to_string(), // Every 10 minutes
            training_schedule: "0 0 3 * * *".to_string(), // Daily at 3 AM
            training_enabled: false,
        }
    }
}

/// Builder for SchedulerConfig
pub struct SchedulerConfigBuilder {
    config: SchedulerConfig,
}

impl SchedulerConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SchedulerConfig::default(),
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    pub fn timezone(mut self, timezone: impl Into<String>) -> Self {
        self.config.timezone = timezone.into();
        self
    }

    pub fn action_schedule(mut self, schedule: impl Into<String>) -> Self {
        self.config.action_schedule = schedule.into();
        self
    }

    pub fn classification_schedule(mut self, schedule: impl Into<String>) -> Self {
        self.config.classification_schedule = schedule.into();
        self
    }

    pub fn training(mut self, enabled: bool, schedule: impl Into<String>) -> Self {
        self.config.training_enabled = enabled;
        self.config.training_schedule = schedule.into();
        self
    }

    pub fn build(self) -> SchedulerConfig {
        self.config
    }
}

impl Default for SchedulerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
