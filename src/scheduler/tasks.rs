//! Scheduled curation tasks
//!
//! Every task fans out over all topics. Topics run concurrently, each behind
//! the `TopicJobQueue` so one topic never has two jobs in flight.

use super::queue::{TopicJobKind, TopicJobQueue};
use crate::error::Result;
use crate::pipeline::CuratorService;
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Per-run tally of a fan-out task
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Classify unclassified items of every topic
///
/// Default schedule: every 10 minutes (`0 */10 * * * *`)
pub async fn classify_topics(
    service: Arc<CuratorService>,
    queue: TopicJobQueue,
) -> std::result::Result<TaskSummary, String> {
    let topics = topic_ids(&service, false).await?;
    let summary = for_each_topic(&queue, topics, TopicJobKind::Classification, |topic_id| {
        let service = service.clone();
        async move { service.classify_topic(&topic_id).await }
    })
    .await;
    finish(TopicJobKind::Classification, summary)
}

/// Run one action pass for every topic
///
/// Default schedule: every 5 minutes (`0 */5 * * * *`)
pub async fn run_action_passes(
    service: Arc<CuratorService>,
    queue: TopicJobQueue,
) -> std::result::Result<TaskSummary, String> {
    let topics = topic_ids(&service, false).await?;
    let summary = for_each_topic(&queue, topics, TopicJobKind::Actions, |topic_id| {
        let service = service.clone();
        async move { service.run_actions(&topic_id).await }
    })
    .await;
    finish(TopicJobKind::Actions, summary)
}

/// Retrain the enabled pattern of every topic that has one
///
/// Default schedule: daily at 3 AM (`0 0 3 * * *`), off unless enabled
pub async fn train_topics(
    service: Arc<CuratorService>,
    queue: TopicJobQueue,
) -> std::result::Result<TaskSummary, String> {
    let topics = topic_ids(&service, true).await?;
    let summary = for_each_topic(&queue, topics, TopicJobKind::Training, |topic_id| {
        let service = service.clone();
        async move { service.train_topic(&topic_id).await }
    })
    .await;
    finish(TopicJobKind::Training, summary)
}

async fn topic_ids(
    service: &CuratorService,
    with_enabled_pattern: bool,
) -> std::result::Result<Vec<Uuid>, String> {
    let topics = service.list_topics().await.map_err(|e| e.to_string())?;
    Ok(topics
        .into_iter()
        .filter(|t| !with_enabled_pattern || t.enabled_pattern().is_some())
        .map(|t| t.id)
        .collect())
}

async fn for_each_topic<F, Fut, T>(
    queue: &TopicJobQueue,
    topics: Vec<Uuid>,
    kind: TopicJobKind,
    job: F,
) -> TaskSummary
where
    F: Fn(Uuid) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let runs = topics.into_iter().map(|topic_id| {
        let run = job(topic_id);
        async move { (topic_id, queue.run(topic_id, kind, || run).await) }
    });

    let mut summary = TaskSummary::default();
    for (topic_id, outcome) in join_all(runs).await {
        match outcome {
            Some(Ok(_)) => {
                debug!(topic_id = %topic_id, kind = %kind, "Topic job finished");
                summary.succeeded += 1;
            }
            Some(Err(e)) => {
                error!(topic_id = %topic_id, kind = %kind, error = %e, "Topic job failed");
                summary.failed += 1;
            }
            None => summary.skipped += 1,
        }
    }
    summary
}

fn finish(kind: TopicJobKind, summary: TaskSummary) -> std::result::Result<TaskSummary, String> {
    info!(
        kind = %kind,
        succeeded = summary.succeeded,
        failed = summary.failed,
        skipped = summary.skipped,
        "Scheduled task completed"
    );

    if summary.failed > 0 {
        Err(format!(
            "{} {} topic job(s) failed",
            summary.failed, kind
        ))
    } else {
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_busy_topic_is_skipped() {
        let queue = TopicJobQueue::new();
        let busy = Uuid::new_v4();
        let free = Uuid::new_v4();
        let _guard = queue.try_acquire(busy, TopicJobKind::Training).unwrap();

        let summary = for_each_topic(&queue, vec![busy, free], TopicJobKind::Actions, |_| async {
            Ok::<_, crate::error::AppError>(())
        })
        .await;

        assert_eq!(
            summary,
            TaskSummary {
                succeeded: 1,
                failed: 0,
                skipped: 1
            }
        );
    }

    #[test]
    fn test_failures_fail_the_run() {
        let summary = TaskSummary {
            succeeded: 2,
            failed: 1,
            skipped: 0,
        };
        let err = finish(TopicJobKind::Actions, summary).unwrap_err();
        assert!(err.contains("1 actions"));
    }
}
