//! Bounded background job pool.
//!
//! - At most `workers` jobs run at once; the rest wait for a permit.
//! - At most one queued or running job per tag (the protocol identifier).
//! - Job state is observable by id until it ages out of the retained window.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{watch, Mutex, Semaphore};
use tracing::{error, info};
use uuid::Uuid;

use crate::metrics::JOBS_IN_FLIGHT;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed { error: String },
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub id: Uuid,
    pub tag: String,
    pub kind: String,
    #[serde(flatten)]
    pub state: JobState,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("a job is already active for {0}")]
    TagBusy(String),
}

/// Handle returned by `submit`; lets the caller poll or await the job.
#[derive(Debug, Clone)]
pub struct JobTicket {
    pub id: Uuid,
    pub tag: String,
    rx: watch::Receiver<JobState>,
}

impl JobTicket {
    pub fn state(&self) -> JobState {
        self.rx.borrow().clone()
    }

    /// Resolve once the job has succeeded or failed.
    pub async fn wait(mut self) -> JobState {
        loop {
            let current = self.rx.borrow_and_update().clone();
            if current.is_terminal() {
                return current;
            }
            if self.rx.changed().await.is_err() {
                return self.rx.borrow().clone();
            }
        }
    }
}

struct JobRecord {
    info: JobInfo,
    tx: watch::Sender<JobState>,
}

struct PoolInner {
    permits: Arc<Semaphore>,
    active: DashMap<String, Uuid>,
    jobs: DashMap<Uuid, JobRecord>,
    finished: Mutex<VecDeque<Uuid>>,
    retained: usize,
}

impl PoolInner {
    fn set_state(&self, id: Uuid, state: JobState) {
        if let Some(mut record) = self.jobs.get_mut(&id) {
            if state.is_terminal() {
                record.info.finished_at = Some(Utc::now());
            }
            record.info.state = state.clone();
            record.tx.send_replace(state);
        }
    }

    async fn finish(&self, id: Uuid, tag: &str, state: JobState) {
        // free the tag before waiters observe the terminal state
        self.active.remove_if(tag, |_, active| *active == id);
        JOBS_IN_FLIGHT.dec();
        self.set_state(id, state);

        let mut finished = self.finished.lock().await;
        finished.push_back(id);
        while finished.len() > self.retained {
            if let Some(old) = finished.pop_front() {
                self.jobs.remove(&old);
            }
        }
    }
}

#[derive(Clone)]
pub struct JobPool {
    inner: Arc<PoolInner>,
}

impl JobPool {
    pub fn new(workers: usize, retained: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                permits: Arc::new(Semaphore::new(workers.max(1))),
                active: DashMap::new(),
                jobs: DashMap::new(),
                finished: Mutex::new(VecDeque::new()),
                retained: retained.max(1),
            }),
        }
    }

    pub fn from_config(cfg: &configs::LifecycleConfig) -> Self {
        Self::new(cfg.job_workers, cfg.retained_jobs)
    }

    /// Queue `job` under `tag`. The job's `Err` text becomes the failed state; a panic
    /// inside the job is caught and reported as a failure too.
    pub fn submit<F>(&self, tag: &str, kind: &str, job: F) -> Result<JobTicket, JobError>
    where
        F: Future<Output = Result<(), String>> + Send + 'static,
    {
        let id = Uuid::new_v4();
        match self.inner.active.entry(tag.to_string()) {
            Entry::Occupied(_) => return Err(JobError::TagBusy(tag.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }

        let (tx, rx) = watch::channel(JobState::Queued);
        let info = JobInfo {
            id,
            tag: tag.to_string(),
            kind: kind.to_string(),
            state: JobState::Queued,
            submitted_at: Utc::now(),
            finished_at: None,
        };
        self.inner.jobs.insert(id, JobRecord { info, tx });
        JOBS_IN_FLIGHT.inc();

        let inner = self.inner.clone();
        let owned_tag = tag.to_string();
        let owned_kind = kind.to_string();
        tokio::spawn(async move {
            let permit = match inner.permits.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => {
                    inner.finish(id, &owned_tag, JobState::Failed { error: "job pool closed".into() }).await;
                    return;
                }
            };
            inner.set_state(id, JobState::Running);
            info!(job_id = %id, tag = %owned_tag, kind = %owned_kind, "job_started");

            let state = match tokio::spawn(job).await {
                Ok(Ok(())) => JobState::Succeeded,
                Ok(Err(error)) => JobState::Failed { error },
                Err(join) => {
                    error!(job_id = %id, tag = %owned_tag, error = %join, "job_panicked");
                    JobState::Failed { error: format!("job aborted: {join}") }
                }
            };
            drop(permit);
            info!(job_id = %id, tag = %owned_tag, kind = %owned_kind, state = ?state, "job_finished");
            inner.finish(id, &owned_tag, state).await;
        });

        Ok(JobTicket { id, tag: tag.to_string(), rx })
    }

    pub fn get(&self, id: Uuid) -> Option<JobInfo> {
        self.inner.jobs.get(&id).map(|r| r.info.clone())
    }

    pub fn active_for(&self, tag: &str) -> Option<Uuid> {
        self.inner.active.get(tag).map(|id| *id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn job_runs_to_success() {
        let pool = JobPool::new(2, 16);
        let ticket = pool.submit("ftp", "install", async { Ok(()) }).unwrap();
        let id = ticket.id;
        assert_eq!(ticket.wait().await, JobState::Succeeded);
        let info = pool.get(id).unwrap();
        assert_eq!(info.state, JobState::Succeeded);
        assert!(info.finished_at.is_some());
    }

    #[tokio::test]
    async fn error_and_panic_become_failed() {
        let pool = JobPool::new(2, 16);
        let failed = pool.submit("smb", "install", async { Err("boom".to_string()) }).unwrap();
        assert_eq!(failed.wait().await, JobState::Failed { error: "boom".into() });

        let panicked = pool
            .submit("nfs", "install", async {
                panic!("installer exploded");
            })
            .unwrap();
        assert!(matches!(panicked.wait().await, JobState::Failed { .. }));
        assert!(pool.active_for("nfs").is_none());
    }

    #[tokio::test]
    async fn one_active_job_per_tag() {
        let pool = JobPool::new(4, 16);
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let first = pool
            .submit("sftp", "install", async move {
                let _ = release_rx.await;
                Ok(())
            })
            .unwrap();
        assert_eq!(pool.submit("sftp", "uninstall", async { Ok(()) }).unwrap_err(), JobError::TagBusy("sftp".into()));
        assert!(pool.submit("s3", "install", async { Ok(()) }).is_ok());

        release_tx.send(()).unwrap();
        first.wait().await;
        assert!(pool.submit("sftp", "uninstall", async { Ok(()) }).is_ok());
    }

    #[tokio::test]
    async fn worker_count_bounds_concurrency() {
        let pool = JobPool::new(1, 16);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut tickets = Vec::new();
        for tag in ["a", "b", "c"] {
            let running = running.clone();
            let peak = peak.clone();
            tickets.push(
                pool.submit(tag, "install", async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap(),
            );
        }
        for t in tickets {
            assert_eq!(t.wait().await, JobState::Succeeded);
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn finished_jobs_are_pruned_beyond_retention() {
        let pool = JobPool::new(1, 2);
        let mut ids = Vec::new();
        for tag in ["a", "b", "c"] {
            let t = pool.submit(tag, "install", async { Ok(()) }).unwrap();
            ids.push(t.id);
            t.wait().await;
        }
        // pruning runs right after the terminal state is published
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(pool.get(ids[0]).is_none());
        assert!(pool.get(ids[2]).is_some());
    }

    #[test]
    fn job_info_serializes_flat_state() {
        let info = JobInfo {
            id: Uuid::nil(),
            tag: "ftp".into(),
            kind: "install".into(),
            state: JobState::Failed { error: "x".into() },
            submitted_at: Utc::now(),
            finished_at: None,
        };
        let v = serde_json::to_value(&info).unwrap();
        assert_eq!(v["state"], "failed");
        assert_eq!(v["error"], "x");
    }
}
