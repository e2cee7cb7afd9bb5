//! Single-flight gate for per-topic jobs

use super::metrics::SCHEDULER_METRICS;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use strum::Display;
use tracing::info;
use uuid::Uuid;

/// What a per-topic job does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TopicJobKind {
    Classification,
    Actions,
    Training,
}

/// At most one job per topic at a time, whatever its kind.
///
/// A job for a topic that is still busy is skipped, not queued behind the
/// running one; the next tick picks the topic up again.
#[derive(Clone, Default)]
pub struct TopicJobQueue {
    in_flight: Arc<DashMap<Uuid, TopicJobKind>>,
}

/// Releases the topic when dropped
pub struct TopicJobGuard {
    topic_id: Uuid,
    in_flight: Arc<DashMap<Uuid, TopicJobKind>>,
}

impl Drop for TopicJobGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.topic_id);
    }
}

impl TopicJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a topic; `None` while another job holds it
    pub fn try_acquire(&self, topic_id: Uuid, kind: TopicJobKind) -> Option<TopicJobGuard> {
        match self.in_flight.entry(topic_id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(entry) => {
                entry.insert(kind);
                Some(TopicJobGuard {
                    topic_id,
                    in_flight: self.in_flight.clone(),
                })
            }
        }
    }

    /// Kind of the job currently holding the topic
    pub fn running(&self, topic_id: &Uuid) -> Option<TopicJobKind> {
        self.in_flight.get(topic_id).map(|kind| *kind)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Run `job` for a topic unless the topic is busy; `None` when skipped
    pub async fn run<F, Fut, T>(&self, topic_id: Uuid, kind: TopicJobKind, job: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let Some(_guard) = self.try_acquire(topic_id, kind) else {
            let running = self.running(&topic_id);
            info!(
                topic_id = %topic_id,
                kind = %kind,
                running = ?running,
                "Topic busy, skipping job"
            );
            SCHEDULER_METRICS.record_topic_skip(&kind.to_string());
            return None;
        };

        Some(job().await)
    }
}
