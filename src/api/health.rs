use actix_web::{get, web, HttpResponse, Responder};
use chrono::Utc;
use serde::Serialize;
use tracing::error;

use crate::engine::TranscodeEngine;

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    message: String,
    timestamp: String,
}

#[derive(Serialize)]
struct EngineCheckResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Health check endpoint
///
/// Does not check the engine; use `/verify-ffmpeg` for that.
#[get("/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "OK".to_string(),
        message: "VidCrush server is running".to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Liveness check endpoint
#[get("/live")]
async fn liveness_check() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "alive".to_string(),
        message: "process is running".to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Engine availability check
///
/// Returns 503 when the transcoding engine cannot be executed.
#[get("/verify-ffmpeg")]
async fn verify_engine(engine: web::Data<dyn TranscodeEngine>) -> impl Responder {
    match engine.probe().await {
        Ok(version) => HttpResponse::Ok().json(EngineCheckResponse {
            success: true,
            message: Some("FFmpeg is working correctly".to_string()),
            version: Some(version),
            error: None,
        }),
        Err(e) => {
            error!("Engine check failed: {}", e);
            HttpResponse::ServiceUnavailable().json(EngineCheckResponse {
                success: false,
                message: None,
                version: None,
                error: Some(format!("FFmpeg not available: {}", e)),
            })
        }
    }
}

pub fn health_config(config: &mut web::ServiceConfig) {
    config
        .service(health_check)
        .service(liveness_check)
        .service(verify_engine);
}
