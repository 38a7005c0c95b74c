use actix_web::{web, App, HttpServer};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, Layer};

mod api;
mod cli;
mod config;
mod engine;
mod http;
mod jobs;
mod shutdown;
mod worker;

use crate::cli::{Cli, Command};
use crate::engine::FfmpegEngine;
use crate::http::AppState;
use crate::shutdown::ShutdownCoordinator;
use crate::worker::CleanupScheduler;

/// Console output plus daily rotated per-level log files
/// (logs/info.2024-12-22.log, logs/error.2024-12-22.log, ...)
fn init_tracing(log_dir: &Path) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    let info_file = tracing_appender::rolling::daily(log_dir, "info.log");
    let warn_file = tracing_appender::rolling::daily(log_dir, "warn.log");
    let error_file = tracing_appender::rolling::daily(log_dir, "error.log");
    let debug_file = tracing_appender::rolling::daily(log_dir, "debug.log");

    let info_layer = tracing_subscriber::fmt::layer()
        .with_writer(info_file)
        .with_ansi(false)
        .with_filter(LevelFilter::INFO);

    let warn_layer = tracing_subscriber::fmt::layer()
        .with_writer(warn_file)
        .with_ansi(false)
        .with_filter(LevelFilter::WARN);

    let error_layer = tracing_subscriber::fmt::layer()
        .with_writer(error_file)
        .with_ansi(false)
        .with_filter(LevelFilter::ERROR);

    let debug_layer = tracing_subscriber::fmt::layer()
        .with_writer(debug_file)
        .with_ansi(false)
        .with_filter(LevelFilter::DEBUG);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(info_layer)
        .with(warn_layer)
        .with(error_layer)
        .with(debug_layer)
        .init();
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();

    let mut config = config::Config::from_env()
        .map_err(std::io::Error::other)?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    std::fs::create_dir_all(&config.log_dir)?;
    init_tracing(&config.log_dir);

    if cli.command == Some(Command::Cleanup) {
        let scheduler = CleanupScheduler::new(config.retention, config.record_expiry);
        let removed = scheduler
            .purge_all(&[config.upload_dir.as_path(), config.output_dir.as_path()])
            .await?;
        info!("Removed {} files", removed);
        return Ok(());
    }

    std::fs::create_dir_all(&config.upload_dir)?;
    std::fs::create_dir_all(&config.output_dir)?;

    info!("Starting VidCrush video compression service");
    info!("Configuration loaded successfully:");
    info!("  - Upload directory: {}", config.upload_dir.display());
    info!("  - Compressed files: {}", config.output_dir.display());
    info!("  - FFmpeg binary: {}", config.ffmpeg_bin.display());
    info!("  - Max upload size: {} bytes", config.max_upload_size);
    info!("  - Retention: {:?}", config.retention);
    info!("  - Shutdown grace period: {:?}", config.shutdown_timeout);

    let engine = Arc::new(FfmpegEngine::new(config.ffmpeg_bin.clone()));
    let bind = (config.host.clone(), config.port);
    let shutdown_timeout = config.shutdown_timeout.as_secs();
    let state = AppState::new(config, engine);
    let cleanup = state.cleanup.clone();

    let server = HttpServer::new(move || {
        App::new()
            .configure(|cfg| state.configure(cfg))
            .configure(api::routes)
            .default_service(web::to(api::not_found))
    });

    info!("Server starting on http://{}:{}", bind.0, bind.1);

    // Jobs run inside their upload request; the grace period bounds how long
    // a stop waits for them before workers (and ffmpeg children) are dropped
    let server = server
        .shutdown_timeout(shutdown_timeout)
        .bind(bind)?
        .run();

    // Get server handle for graceful shutdown
    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    let coordinator = ShutdownCoordinator::new(server_handle, server_task, cleanup);
    coordinator.wait_for_shutdown().await
}
