use actix_web::web;

pub mod compress;
pub mod download;
pub mod error;
pub mod health;
pub mod maintenance;
pub mod progress;

pub use error::not_found;

/// Register every endpoint
pub fn routes(config: &mut web::ServiceConfig) {
    config
        .configure(health::health_config)
        .configure(compress::compress_config)
        .configure(progress::progress_config)
        .configure(download::download_config)
        .configure(maintenance::maintenance_config);
}
