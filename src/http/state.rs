use actix_multipart::form::tempfile::TempFileConfig;
use actix_web::web;
use std::sync::Arc;

use crate::api::compress::CompressService;
use crate::api::error::multipart_config;
use crate::config::Config;
use crate::engine::TranscodeEngine;
use crate::jobs::JobRegistry;
use crate::worker::{CleanupScheduler, TranscodeOrchestrator};

/// Services shared by every HTTP worker
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<JobRegistry>,
    pub cleanup: Arc<CleanupScheduler>,
    pub engine: Arc<dyn TranscodeEngine>,
    pub orchestrator: Arc<TranscodeOrchestrator>,
}

impl AppState {
    pub fn new(config: Config, engine: Arc<dyn TranscodeEngine>) -> Self {
        let registry = Arc::new(JobRegistry::new());
        let cleanup = Arc::new(CleanupScheduler::new(config.retention, config.record_expiry));
        let orchestrator = Arc::new(TranscodeOrchestrator::new(
            registry.clone(),
            engine.clone(),
            cleanup.clone(),
            config.verify_delay,
        ));

        Self {
            config: Arc::new(config),
            registry,
            cleanup,
            engine,
            orchestrator,
        }
    }

    /// Register shared data and upload limits on an app
    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        let compress_service = CompressService::new(
            self.config.clone(),
            self.registry.clone(),
            self.orchestrator.clone(),
        );

        cfg.app_data(web::Data::from(self.config.clone()))
            .app_data(web::Data::from(self.registry.clone()))
            .app_data(web::Data::from(self.cleanup.clone()))
            .app_data(web::Data::from(self.engine.clone()))
            .app_data(web::Data::new(compress_service))
            .app_data(multipart_config(self.config.max_upload_size))
            // Stage uploads next to their final location so persisting is a rename
            .app_data(TempFileConfig::default().directory(&self.config.upload_dir));
    }
}
