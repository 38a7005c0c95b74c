use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::debug;

use super::models::{Job, JobId, JobSnapshot, JobState, NewJob};

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Job id already in use: {0}")]
    Duplicate(JobId),

    #[error("Job {id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        id: JobId,
        from: JobState,
        to: JobState,
    },
}

/// Outcome of a progress update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressUpdate {
    Applied,
    /// The offered value was below the stored one; nothing changed
    Stale { current: u8 },
}

/// In-memory table of jobs keyed by id
///
/// The map lock only guards insertion, lookup and removal. Each record has
/// its own mutex, so updates for one job are serialized without blocking
/// other jobs.
///
/// Ids are never reused, even after their record has been removed.
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Arc<Mutex<Job>>>>,
    issued: Mutex<HashSet<JobId>>,
    clock: Clock,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(Utc::now))
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            issued: Mutex::new(HashSet::new()),
            clock,
        }
    }

    /// Register a job in the `Created` state and return its id
    pub fn create(&self, new_job: NewJob) -> Result<JobId, RegistryError> {
        let id = new_job.id.unwrap_or_else(JobId::generate);
        let job = Job {
            id: id.clone(),
            input_path: new_job.input_path,
            output_path: new_job.output_path,
            quality_profile: new_job.quality_profile,
            state: JobState::Created,
            progress_percent: 0,
            status_message: "Queued".to_string(),
            original_size: new_job.original_size,
            produced_size: None,
            failure_reason: None,
            created_at: (self.clock)(),
            terminated_at: None,
        };

        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let mut issued = lock(&self.issued);
        if !issued.insert(id.clone()) {
            return Err(RegistryError::Duplicate(id));
        }
        jobs.insert(id.clone(), Arc::new(Mutex::new(job)));

        debug!("Registered job id={}", id);
        Ok(id)
    }

    /// Whether `id` was ever handed out, live or expired
    pub fn is_issued(&self, id: &JobId) -> bool {
        lock(&self.issued).contains(id)
    }

    pub fn get(&self, id: &JobId) -> Option<JobSnapshot> {
        let entry = self.entry(id).ok()?;
        let job = lock(&entry).clone();
        Some(JobSnapshot {
            job,
            taken_at: (self.clock)(),
        })
    }

    /// Move a `Created` job to `Running`
    pub fn mark_running(&self, id: &JobId, progress: u8, message: &str) -> Result<(), RegistryError> {
        let entry = self.entry(id)?;
        let mut job = lock(&entry);
        if job.state != JobState::Created {
            return Err(RegistryError::InvalidTransition {
                id: id.clone(),
                from: job.state,
                to: JobState::Running,
            });
        }
        job.state = JobState::Running;
        job.progress_percent = job.progress_percent.max(progress.min(100));
        job.status_message = message.to_string();
        Ok(())
    }

    /// Compare-and-set progress update; lower values are rejected as stale
    pub fn update(&self, id: &JobId, progress: u8, message: &str) -> Result<ProgressUpdate, RegistryError> {
        let entry = self.entry(id)?;
        let mut job = lock(&entry);
        if job.state.is_terminal() {
            return Err(RegistryError::InvalidTransition {
                id: id.clone(),
                from: job.state,
                to: job.state,
            });
        }

        let progress = progress.min(100);
        if progress < job.progress_percent {
            debug!(
                "Ignoring stale progress for job {}: offered={} current={}",
                id, progress, job.progress_percent
            );
            return Ok(ProgressUpdate::Stale {
                current: job.progress_percent,
            });
        }

        job.progress_percent = progress;
        job.status_message = message.to_string();
        Ok(ProgressUpdate::Applied)
    }

    /// Terminal success; only reachable from `Running`
    pub fn transition_to_succeeded(&self, id: &JobId, produced_size: u64) -> Result<JobSnapshot, RegistryError> {
        let now = (self.clock)();
        let entry = self.entry(id)?;
        let mut job = lock(&entry);
        if job.state != JobState::Running {
            return Err(RegistryError::InvalidTransition {
                id: id.clone(),
                from: job.state,
                to: JobState::Succeeded,
            });
        }
        job.state = JobState::Succeeded;
        job.progress_percent = 100;
        job.status_message = "Complete!".to_string();
        job.produced_size = Some(produced_size);
        job.terminated_at = Some(now);

        Ok(JobSnapshot {
            job: job.clone(),
            taken_at: now,
        })
    }

    /// Terminal failure; reachable from any non-terminal state
    pub fn transition_to_failed(&self, id: &JobId, reason: &str) -> Result<JobSnapshot, RegistryError> {
        let now = (self.clock)();
        let entry = self.entry(id)?;
        let mut job = lock(&entry);
        if job.state.is_terminal() {
            return Err(RegistryError::InvalidTransition {
                id: id.clone(),
                from: job.state,
                to: JobState::Failed,
            });
        }
        job.state = JobState::Failed;
        job.status_message = reason.to_string();
        job.failure_reason = Some(reason.to_string());
        job.terminated_at = Some(now);

        Ok(JobSnapshot {
            job: job.clone(),
            taken_at: now,
        })
    }

    pub fn remove(&self, id: &JobId) -> Option<Job> {
        let entry = self
            .jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)?;
        let job = lock(&entry).clone();
        debug!("Removed job record id={}", id);
        Some(job)
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn entry(&self, id: &JobId) -> Result<Arc<Mutex<Job>>, RegistryError> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }
}

fn lock<T>(entry: &Mutex<T>) -> MutexGuard<'_, T> {
    entry.lock().unwrap_or_else(|e| e.into_inner())
}
