use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, trace, warn};

use crate::engine::{EngineEvent, EngineInvocation, TranscodeEngine};
use crate::jobs::{profile, Job, JobId, JobRegistry, ProgressUpdate};
use crate::worker::cleanup::CleanupScheduler;

/// Progress reserved for startup
pub const PROGRESS_FLOOR: u8 = 10;
/// Highest progress reported before the output is verified
pub const PROGRESS_CEILING: u8 = 95;
/// Advance applied when the engine gives no usable fraction
pub const PROGRESS_STEP: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Preparing the run failed before or around engine start
    Staging,
    /// The engine reported failure or stopped without an outcome
    Engine,
    /// The engine claimed success but the output is unusable
    Verification,
}

/// Terminal failure of a job, as reported to the submitting client
#[derive(Debug, Clone, thiserror::Error)]
#[error("{reason}")]
pub struct JobFailure {
    pub id: JobId,
    pub kind: FailureKind,
    pub reason: String,
}

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct CompressionOutcome {
    pub id: JobId,
    pub original_size: u64,
    pub produced_size: u64,
    pub output_path: PathBuf,
}

/// Drives one job from `Created` to a terminal state
pub struct TranscodeOrchestrator {
    registry: Arc<JobRegistry>,
    engine: Arc<dyn TranscodeEngine>,
    cleanup: Arc<CleanupScheduler>,
    verify_delay: Duration,
}

impl TranscodeOrchestrator {
    pub fn new(
        registry: Arc<JobRegistry>,
        engine: Arc<dyn TranscodeEngine>,
        cleanup: Arc<CleanupScheduler>,
        verify_delay: Duration,
    ) -> Self {
        Self {
            registry,
            engine,
            cleanup,
            verify_delay,
        }
    }

    /// Run a registered job to completion
    ///
    /// # Lifecycle
    /// - Resolves engine parameters from the job's quality profile
    /// - Marks the job `Running` at 10% and starts the engine
    /// - Relays engine progress into the registry (normalized to 10-95%)
    /// - On engine success, verifies the output exists and is non-empty
    /// - Removes the input on every terminal path, and the output on failure
    ///
    /// Exactly one terminal transition is made; the returned value mirrors it.
    pub async fn run(&self, id: JobId) -> Result<CompressionOutcome, JobFailure> {
        let Some(snapshot) = self.registry.get(&id) else {
            error!("Orchestrator: job {} is not registered", id);
            return Err(JobFailure {
                id,
                kind: FailureKind::Staging,
                reason: "Job not found".to_string(),
            });
        };
        let job = snapshot.job;
        let params = profile::resolve(job.quality_profile);
        info!(
            "Orchestrator: starting job {} profile={} crf={} preset={} audio={}",
            id,
            job.quality_profile,
            params.quality_factor,
            params.speed_preset.ffmpeg_name(),
            params.audio_bitrate()
        );

        if let Err(e) = self.registry.mark_running(&id, PROGRESS_FLOOR, "Starting...") {
            error!("Orchestrator: cannot start job {}: {}", id, e);
            return Err(JobFailure {
                id,
                kind: FailureKind::Staging,
                reason: e.to_string(),
            });
        }

        if let Some(dir) = job.output_path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                let reason = format!("Failed to prepare output directory: {}", e);
                return self.fail(&job, FailureKind::Staging, reason).await;
            }
        }

        let events = self.engine.start(EngineInvocation {
            input: job.input_path.clone(),
            output: job.output_path.clone(),
            params,
        });

        match self.consume_events(&id, events).await {
            Ok(()) => self.verify_and_complete(&job).await,
            Err(reason) => {
                let reason = format!("Compression failed: {}", reason);
                self.fail(&job, FailureKind::Engine, reason).await
            }
        }
    }

    /// Read events until the terminal one. Only `Finished`/`Failed` end the
    /// loop; a closed channel without either counts as an engine failure.
    async fn consume_events(
        &self,
        id: &JobId,
        mut events: mpsc::Receiver<EngineEvent>,
    ) -> Result<(), String> {
        let mut current = PROGRESS_FLOOR;

        while let Some(event) = events.recv().await {
            match event {
                EngineEvent::Started { command_line } => {
                    info!("Job {}: engine started: {}", id, command_line);
                    current = self.report(id, current, current, "Analyzing video...");
                }
                EngineEvent::Progress { percent, timemark } => {
                    let next = normalize_progress(percent, current);
                    let message = match timemark {
                        Some(mark) => format!("Processing... {}", mark),
                        None => "Processing...".to_string(),
                    };
                    trace!("Job {}: engine percent={:?} -> {}", id, percent, next);
                    current = self.report(id, current, next, &message);
                }
                EngineEvent::Diagnostic(line) => {
                    if looks_like_error(&line) {
                        warn!("Job {}: engine error output: {}", id, line);
                    } else {
                        trace!("Job {}: {}", id, line);
                    }
                }
                EngineEvent::Finished => {
                    info!("Job {}: engine finished", id);
                    return Ok(());
                }
                EngineEvent::Failed { reason } => return Err(reason),
            }
        }

        Err("engine stopped without reporting an outcome".to_string())
    }

    /// Push a progress value and return what the registry now holds
    fn report(&self, id: &JobId, current: u8, next: u8, message: &str) -> u8 {
        match self.registry.update(id, next, message) {
            Ok(ProgressUpdate::Applied) => next,
            Ok(ProgressUpdate::Stale { current }) => current,
            Err(e) => {
                warn!("Job {}: progress update rejected: {}", id, e);
                current
            }
        }
    }

    async fn verify_and_complete(&self, job: &Job) -> Result<CompressionOutcome, JobFailure> {
        // Give the muxer a moment to flush before trusting the file size
        if !self.verify_delay.is_zero() {
            sleep(self.verify_delay).await;
        }

        let produced_size = match verify_output(&job.output_path).await {
            Ok(size) => size,
            Err(reason) => return self.fail(job, FailureKind::Verification, reason).await,
        };

        if let Err(e) = self.registry.transition_to_succeeded(&job.id, produced_size) {
            return self.fail(job, FailureKind::Staging, e.to_string()).await;
        }

        info!(
            "Job {} complete: original={} bytes compressed={} bytes savings={:.1}%",
            job.id,
            job.original_size,
            produced_size,
            savings_percent(job.original_size, produced_size)
        );

        self.cleanup.cleanup(&[job.input_path.as_path()]).await;
        self.cleanup.schedule_retention(job.output_path.clone());
        self.cleanup
            .schedule_record_expiry(self.registry.clone(), job.id.clone());

        Ok(CompressionOutcome {
            id: job.id.clone(),
            original_size: job.original_size,
            produced_size,
            output_path: job.output_path.clone(),
        })
    }

    async fn fail(
        &self,
        job: &Job,
        kind: FailureKind,
        reason: String,
    ) -> Result<CompressionOutcome, JobFailure> {
        error!("Job {} failed ({:?}): {}", job.id, kind, reason);

        if let Err(e) = self.registry.transition_to_failed(&job.id, &reason) {
            warn!("Job {}: could not record failure: {}", job.id, e);
        }
        self.cleanup
            .cleanup(&[job.input_path.as_path(), job.output_path.as_path()])
            .await;
        self.cleanup
            .schedule_record_expiry(self.registry.clone(), job.id.clone());

        Err(JobFailure {
            id: job.id.clone(),
            kind,
            reason,
        })
    }
}

/// Map an engine completion percentage into the 10-95 band
///
/// A missing or non-positive fraction advances by [`PROGRESS_STEP`]. The
/// result is never below `current`.
pub fn normalize_progress(engine_percent: Option<f64>, current: u8) -> u8 {
    let current = current.clamp(PROGRESS_FLOOR, PROGRESS_CEILING);
    match engine_percent {
        Some(percent) if percent.is_finite() && percent > 0.0 => {
            let span = f64::from(PROGRESS_CEILING - PROGRESS_FLOOR);
            let mapped = f64::from(PROGRESS_FLOOR) + (percent.min(100.0) / 100.0 * span).round();
            (mapped as u8).clamp(PROGRESS_FLOOR, PROGRESS_CEILING).max(current)
        }
        _ => current.saturating_add(PROGRESS_STEP).min(PROGRESS_CEILING),
    }
}

/// Percentage of bytes saved, negative when the output grew
pub fn savings_percent(original_size: u64, produced_size: u64) -> f64 {
    if original_size == 0 {
        return 0.0;
    }
    (original_size as f64 - produced_size as f64) / original_size as f64 * 100.0
}

async fn verify_output(path: &Path) -> Result<u64, String> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.len() > 0 => Ok(meta.len()),
        Ok(_) => Err("empty or missing output: output file is empty (0 bytes)".to_string()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err("empty or missing output: output file was not created".to_string())
        }
        Err(e) => Err(format!("empty or missing output: {}", e)),
    }
}

fn looks_like_error(line: &str) -> bool {
    line.contains("Error") || line.contains("error")
}
