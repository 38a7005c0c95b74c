use actix_web::{delete, web, HttpResponse};
use serde::Serialize;
use tracing::info;

use crate::api::error::ApiError;
use crate::config::Config;
use crate::worker::CleanupScheduler;

#[derive(Serialize)]
struct CleanupResponse {
    success: bool,
    message: String,
}

/// Operator escape hatch: delete every staged upload and produced artifact
#[delete("/cleanup")]
async fn cleanup_all(
    config: web::Data<Config>,
    cleanup: web::Data<CleanupScheduler>,
) -> Result<HttpResponse, ApiError> {
    let removed = cleanup
        .purge_all(&[config.upload_dir.as_path(), config.output_dir.as_path()])
        .await
        .map_err(|e| ApiError::Internal(format!("Cleanup failed: {}", e)))?;

    info!("Manual cleanup removed {} files", removed);

    Ok(HttpResponse::Ok().json(CleanupResponse {
        success: true,
        message: "All temporary files cleaned up".to_string(),
    }))
}

pub fn maintenance_config(config: &mut web::ServiceConfig) {
    config.service(cleanup_all);
}

#[cfg(test)]
mod tests {
    use crate::api;
    use crate::engine::testing::ScriptedEngine;
    use crate::http::state::testing::{files_in, test_state};
    use actix_web::{test, App};
    use std::sync::Arc;

    #[actix_web::test]
    async fn test_cleanup_empties_directories() {
        let (_dir, state) = test_state(Arc::new(ScriptedEngine::succeeding(b"x")), 1024);
        std::fs::write(state.config.upload_dir.join("video-1.mp4"), b"in").unwrap();
        std::fs::write(state.config.output_dir.join("compressed-1.mp4"), b"out").unwrap();
        std::fs::write(state.config.output_dir.join("compressed-2.mp4"), b"out").unwrap();

        let app = test::init_service(
            App::new()
                .configure(|cfg| state.configure(cfg))
                .configure(api::routes),
        )
        .await;

        let req = test::TestRequest::delete().uri("/cleanup").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);

        assert_eq!(files_in(&state.config.upload_dir), 0);
        assert_eq!(files_in(&state.config.output_dir), 0);
    }
}
