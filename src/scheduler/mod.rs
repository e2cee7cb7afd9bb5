//! Cron-driven curation jobs
//!
//! Periodic jobs built on tokio-cron-scheduler fan out over every topic:
//! classification of new items, one action pass, and optional retraining.
//!
//! # Features
//!
//! - **Cron Expression Support**: six-field cron syntax per job
//! - **Single Flight**: a topic never has two jobs in flight (`TopicJobQueue`)
//! - **Metrics Integration**: Prometheus metrics for job execution and skipped topics
//!
//! # Example
//!
//! ```no_run
//! use post_curator::scheduler::{SchedulerConfig, SchedulerService, TopicJobQueue};
//! # use post_curator::pipeline::CuratorService;
//! # use std::sync::Arc;
//!
//! # async fn run(service: Arc<CuratorService>) -> Result<(), Box<dyn std::error::Error>> {
//! let mut scheduler = SchedulerService::new(SchedulerConfig::default()).await?;
//! scheduler
//!     .register_curation_jobs(service, TopicJobQueue::new())
//!     .await?;
//! scheduler.start().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod core;
mod error;
mod jobs;
mod metrics;
mod queue;
mod tasks;

pub use config::{SchedulerConfig, SchedulerConfigBuilder};
pub use core::{SchedulerService, SchedulerStats};
pub use error::{SchedulerError, SchedulerResult};
pub use jobs::{Job, JobContext, JobId, JobMetadata, JobStatus};
pub use metrics::{init_scheduler_metrics, SCHEDULER_METRICS};
pub use queue::{TopicJobGuard, TopicJobKind, TopicJobQueue};
pub use tasks::{classify_topics, run_action_passes, train_topics, TaskSummary};
