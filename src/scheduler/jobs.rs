//! Job definitions and management

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier for a scheduled job
pub type JobId = Uuid;

/// Status of a scheduled job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Job is scheduled and will run
    Scheduled,
    /// Job is currently running
    Running,
    /// Last run completed successfully
    Completed,
    /// Last run failed
    Failed,
}

/// Metadata about a scheduled job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMetadata {
    pub id: JobId,

    /// Human-readable job name, also the metrics label
    pub name: String,

    pub description: Option<String>,

    /// Cron expression
    pub schedule: String,

    pub status: JobStatus,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    pub last_run: Option<DateTime<Utc>>,

    pub run_count: u64,

    pub success_count: u64,

    pub failure_count: u64,

    /// Average execution duration in milliseconds
    pub avg_duration_ms: f64,

    /// Error of the most recent failed run, cleared by a success
    pub last_error: Option<String>,
}

impl JobMetadata {
    pub fn new(name: impl Into<String>, schedule: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            schedule: schedule.into(),
            status: JobStatus::Scheduled,
            created_at: now,
            updated_at: now,
            last_run: None,
            run_count: 0,
            success_count: 0,
            failure_count: 0,
            avg_duration_ms: 0.0,
            last_error: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn update_execution(&mut self, outcome: &Result<(), String>, duration_ms: u64) {
        self.run_count += 1;
        match outcome {
            Ok(()) => {
                self.success_count += 1;
                self.last_error = None;
                self.status = JobStatus::Completed;
            }
            Err(e) => {
                self.failure_count += 1;
                self.last_error = Some(e.clone());
                self.status = JobStatus::Failed;
            }
        }

        // Incremental mean
        self.avg_duration_ms = ((self.avg_duration_ms * (self.run_count - 1) as f64)
            + duration_ms as f64)
            / self.run_count as f64;

        self.last_run = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    pub fn success_rate(&self) -> f64 {
        if self.run_count == 0 {
            0.0
        } else {
            (self.success_count as f64 / self.run_count as f64) * 100.0
        }
    }
}

/// Context passed to job execution functions
#[derive(Clone)]
pub struct JobContext {
    pub metadata: JobMetadata,
}

impl JobContext {
    pub fn new(metadata: JobMetadata) -> Self {
        Self { metadata }
    }
}

type JobFn = dyn Fn(JobContext) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send>>
    + Send
    + Sync;

/// A scheduled job
pub struct Job {
    pub metadata: Arc<tokio::sync::RwLock<JobMetadata>>,

    pub execute: Arc<JobFn>,
}

impl Job {
    pub fn new<F, Fut>(metadata: JobMetadata, execute: F) -> Self
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        Self {
            metadata: Arc::new(tokio::sync::RwLock::new(metadata)),
            execute: Arc::new(move |ctx| Box::pin(execute(ctx))),
        }
    }

    pub async fn get_metadata(&self) -> JobMetadata {
        self.metadata.read().await.clone()
    }

    pub async fn execute(&self, ctx: JobContext) -> Result<(), String> {
        let start = std::time::Instant::now();

        {
            let mut metadata = self.metadata.write().await;
            metadata.status = JobStatus::Running;
            metadata.updated_at = Utc::now();
        }

        let result = (self.execute)(ctx).await;

        let duration_ms = start.elapsed().as_millis() as u64;
        {
            let mut metadata = self.metadata.write().await;
            metadata.update_execution(&result, duration_ms);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_execution_statistics() {
        let mut metadata = JobMetadata::new("actions", "0 * * * * *");
        metadata.update_execution(&Err("2 actions topic job(s) failed".to_string()), 100);
        metadata.update_execution(&Ok(()), 300);

        assert_eq!(metadata.run_count, 2);
        assert_eq!(metadata.failure_count, 1);
        assert_eq!(metadata.status, JobStatus::Completed);
        assert!(metadata.last_error.is_none());
        assert!((metadata.avg_duration_ms - 200.0).abs() < 1e-9);
        assert!((metadata.success_rate() - 50.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_execute_tracks_status() {
        let job = Job::new(JobMetadata::new("failing", "0 * * * * *"), |_ctx| async {
            Err("boom".to_string())
        });

        let ctx = JobContext::new(job.get_metadata().await);
        assert!(job.execute(ctx).await.is_err());

        let metadata = job.get_metadata().await;
        assert_eq!(metadata.status, JobStatus::Failed);
        assert_eq!(metadata.last_error.as_deref(), Some("boom"));
        assert_eq!(metadata.run_count, 1);
    }
}
