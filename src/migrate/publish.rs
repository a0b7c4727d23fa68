//! Publish queue
//!
//! Publishing is asynchronous on the hub: starting a publish returns a job
//! location which is polled until the job completes or fails. The queue caps
//! the number of jobs in flight with a FIFO-fair semaphore; a caller of
//! [`PublishQueue::publish`] waits for a free slot before the job starts.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::domain::ContentItem;
use crate::hub::{HubError, HubResult, PublishJobState, Publisher};
use crate::storage::PublishConfig;

/// Concurrency and polling policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishPolicy {
    pub max_concurrent: usize,
    pub max_attempts: u32,
    pub attempt_delay: Duration,
}

impl Default for PublishPolicy {
    fn default() -> Self {
        Self::from(&PublishConfig::default())
    }
}

impl From<&PublishConfig> for PublishPolicy {
    fn from(config: &PublishConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent.max(1),
            max_attempts: config.max_attempts,
            attempt_delay: config.attempt_delay(),
        }
    }
}

/// Terminal state of a publish job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Completed,
    Failed,
    /// Attempts ran out before the job finished
    TimedOut,
}

/// One publish job
#[derive(Debug, Clone)]
pub struct PublishJob {
    pub item: ContentItem,
    pub location: String,
    pub outcome: PublishOutcome,
}

/// Bounded-concurrency publish runner
pub struct PublishQueue {
    publisher: Arc<dyn Publisher>,
    policy: PublishPolicy,
    permits: Arc<Semaphore>,
    jobs: JoinSet<PublishJob>,
    failed_jobs: Vec<PublishJob>,
    completed: usize,
}

impl PublishQueue {
    pub fn new(publisher: Arc<dyn Publisher>, policy: PublishPolicy) -> Self {
        let permits = Arc::new(Semaphore::new(policy.max_concurrent.max(1)));
        Self {
            publisher,
            policy,
            permits,
            jobs: JoinSet::new(),
            failed_jobs: Vec::new(),
            completed: 0,
        }
    }

    /// Starts publishing an item once a slot is free
    ///
    /// Returns an error if the hub refused to start the job; polling failures
    /// are recorded in [`PublishQueue::failed_jobs`] instead.
    pub async fn publish(&mut self, item: ContentItem) -> HubResult<()> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| HubError::Transport(format!("Publish queue closed: {e}")))?;

        let location = self.publisher.start_publish(&item).await?;
        debug!("Publishing {} ({})", item.label, location);

        let publisher = self.publisher.clone();
        let policy = self.policy;
        self.jobs.spawn(async move {
            let outcome = poll_job(publisher.as_ref(), &policy, &location).await;
            drop(permit);
            PublishJob {
                item,
                location,
                outcome,
            }
        });

        Ok(())
    }

    /// Waits until every started job has reached a terminal state
    pub async fn wait_for_all(&mut self) {
        while let Some(result) = self.jobs.join_next().await {
            match result {
                Ok(job) if job.outcome == PublishOutcome::Completed => self.completed += 1,
                Ok(job) => {
                    warn!(
                        "Publish of {} ({}) did not complete: {:?}",
                        job.item.label,
                        job.item.id_str(),
                        job.outcome
                    );
                    self.failed_jobs.push(job);
                }
                Err(e) => warn!("Publish task ended abnormally: {}", e),
            }
        }
    }

    /// Jobs that failed or timed out
    pub fn failed_jobs(&self) -> &[PublishJob] {
        &self.failed_jobs
    }

    /// Number of jobs that completed
    pub fn completed(&self) -> usize {
        self.completed
    }
}

async fn poll_job(publisher: &dyn Publisher, policy: &PublishPolicy, location: &str) -> PublishOutcome {
    for attempt in 0..policy.max_attempts {
        match publisher.publish_job_state(location).await {
            Ok(PublishJobState::Completed) => return PublishOutcome::Completed,
            Ok(PublishJobState::Failed) => return PublishOutcome::Failed,
            Ok(_) => {}
            Err(e) => debug!("Polling {} failed: {}", location, e),
        }

        if attempt + 1 < policy.max_attempts {
            tokio::time::sleep(policy.attempt_delay).await;
        }
    }

    PublishOutcome::TimedOut
}
