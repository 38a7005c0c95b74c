use actix_multipart::form::tempfile::TempFile;
use actix_web::mime::{self, Mime};
use chrono::Utc;
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use super::dto::{CompressForm, CompressResponse, CompressionData};
use crate::api::error::ApiError;
use crate::config::Config;
use crate::jobs::{JobId, JobRegistry, NewJob, QualityProfile};
use crate::worker::orchestrator::savings_percent;
use crate::worker::TranscodeOrchestrator;

/// Accepts uploads, registers jobs and waits for their outcome
pub struct CompressService {
    config: Arc<Config>,
    registry: Arc<JobRegistry>,
    orchestrator: Arc<TranscodeOrchestrator>,
}

impl CompressService {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<JobRegistry>,
        orchestrator: Arc<TranscodeOrchestrator>,
    ) -> Self {
        Self {
            config,
            registry,
            orchestrator,
        }
    }

    /// Compress one uploaded video
    ///
    /// # Business Logic
    /// - Rejects missing, non-video or oversize uploads before a job exists
    /// - Stages the upload under a unique name and registers the job
    /// - Runs the orchestrator in its own task and waits for the terminal state
    ///
    /// # Returns
    /// - `Ok(CompressResponse)` - Job succeeded
    /// - `Err(ApiError)` - Rejected (400) or failed (500)
    pub async fn compress(&self, form: CompressForm) -> Result<CompressResponse, ApiError> {
        let video = form
            .video
            .ok_or_else(|| ApiError::Validation("No video file uploaded".to_string()))?;
        validate_upload(video.content_type.as_ref(), video.size as u64, self.config.max_upload_size)?;

        let requested_id = match &form.compression_id {
            Some(raw) => {
                let id = JobId::from_client(raw.trim()).ok_or_else(|| {
                    ApiError::Validation("Invalid compressionId".to_string())
                })?;
                if self.registry.is_issued(&id) {
                    return Err(ApiError::Validation(format!("compressionId already in use: {}", id)));
                }
                Some(id)
            }
            None => None,
        };

        let quality_profile = QualityProfile::parse_or_default(form.quality.as_ref().map(|q| q.as_str()));
        let original_name = video.file_name.clone().unwrap_or_default();
        let original_size = video.size as u64;

        let input_path = self.stage_upload(video)?;
        let output_path = self.config.output_dir.join(unique_name("compressed", Some("mp4")));

        info!(
            "Service: received {} ({} bytes) profile={} staged at {}",
            original_name,
            original_size,
            quality_profile,
            input_path.display()
        );

        let id = match self.registry.create(NewJob {
            id: requested_id,
            input_path: input_path.clone(),
            output_path,
            quality_profile,
            original_size,
        }) {
            Ok(id) => id,
            Err(e) => {
                discard(&input_path).await;
                return Err(ApiError::Validation(e.to_string()));
            }
        };

        // Own task so a dropped connection cannot abort a running job
        let orchestrator = self.orchestrator.clone();
        let outcome = tokio::spawn(async move { orchestrator.run(id).await })
            .await
            .map_err(|e| ApiError::Internal(format!("Compression task failed: {}", e)))?
            .map_err(|failure| ApiError::Compression(failure.reason))?;

        let filename = outcome
            .output_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(CompressResponse {
            success: true,
            message: "Video compressed successfully".to_string(),
            data: CompressionData {
                original_size: outcome.original_size,
                compressed_size: outcome.produced_size,
                savings_percent: format!(
                    "{:.1}",
                    savings_percent(outcome.original_size, outcome.produced_size)
                ),
                download_url: format!("/download/{}", filename),
                filename,
                compression_id: outcome.id.to_string(),
            },
        })
    }

    /// Move the upload out of its temp file into the staging directory
    fn stage_upload(&self, video: TempFile) -> Result<PathBuf, ApiError> {
        let extension = video.file_name.as_deref().and_then(safe_extension);
        let input_path = self.config.upload_dir.join(unique_name("video", extension.as_deref()));

        video
            .file
            .persist(&input_path)
            .map_err(|e| ApiError::Internal(format!("Failed to store upload: {}", e.error)))?;

        Ok(input_path)
    }
}

/// Upload checks done before any job is created
pub fn validate_upload(content_type: Option<&Mime>, size: u64, max_upload_size: u64) -> Result<(), ApiError> {
    let is_video = content_type.is_some_and(|ct| ct.type_() == mime::VIDEO);
    if !is_video {
        return Err(ApiError::Validation("Only video files are allowed!".to_string()));
    }
    if size > max_upload_size {
        return Err(ApiError::file_too_large(max_upload_size));
    }
    Ok(())
}

/// `<prefix>-<millis>-<random>[.ext]`
fn unique_name(prefix: &str, extension: Option<&str>) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    let stem = format!("{}-{}-{}", prefix, Utc::now().timestamp_millis(), suffix);
    match extension {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem,
    }
}

fn safe_extension(file_name: &str) -> Option<String> {
    let ext = Path::new(file_name).extension()?.to_str()?;
    let valid = !ext.is_empty() && ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then(|| ext.to_ascii_lowercase())
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!("Could not delete {}: {}", path.display(), e);
    }
}
