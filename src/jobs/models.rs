use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::profile::QualityProfile;

/// Opaque job handle
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn generate() -> Self {
        JobId(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Accept a client-chosen token: 1..=64 ASCII alphanumerics, `-` or `_`
    pub fn from_client(raw: &str) -> Option<Self> {
        let valid = !raw.is_empty()
            && raw.len() <= 64
            && raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        valid.then(|| JobId(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Job lifecycle state
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Created,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

/// Input for registering a new job
#[derive(Debug, Clone)]
pub struct NewJob {
    /// Client-chosen id; a fresh one is generated when absent
    pub id: Option<JobId>,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub quality_profile: QualityProfile,
    pub original_size: u64,
}

/// Registry record of one job
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub quality_profile: QualityProfile,
    pub state: JobState,
    pub progress_percent: u8,
    pub status_message: String,
    pub original_size: u64,
    pub produced_size: Option<u64>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub terminated_at: Option<DateTime<Utc>>,
}

/// Point-in-time copy of a job handed to readers
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub job: Job,
    pub taken_at: DateTime<Utc>,
}

impl JobSnapshot {
    pub fn elapsed(&self) -> Duration {
        let end = self.job.terminated_at.unwrap_or(self.taken_at);
        end - self.job.created_at
    }

    /// Linear estimate of the remaining time; only known while the job is
    /// partway through.
    pub fn eta(&self) -> Option<Duration> {
        let progress = i64::from(self.job.progress_percent);
        if self.job.state.is_terminal() || progress == 0 || progress >= 100 {
            return None;
        }
        let elapsed_ms = self.elapsed().num_milliseconds();
        Some(Duration::milliseconds(elapsed_ms * (100 - progress) / progress))
    }
}
