use actix_multipart::form::MultipartForm;
use actix_web::{
    post,
    web::{scope, Data, ServiceConfig},
    HttpResponse,
};

use super::dto::CompressForm;
use super::service::CompressService;
use crate::api::error::ApiError;

#[post("")]
async fn compress(
    service: Data<CompressService>,
    MultipartForm(form): MultipartForm<CompressForm>,
) -> Result<HttpResponse, ApiError> {
    let response = service.compress(form).await?;
    Ok(HttpResponse::Ok().json(response))
}

pub fn compress_config(config: &mut ServiceConfig) {
    config.service(scope("/compress").service(compress));
}

#[cfg(test)]
mod tests {
    use crate::api;
    use crate::engine::testing::ScriptedEngine;
    use crate::http::state::testing::{files_in, multipart_body, multipart_content_type, test_state, Part};
    use actix_web::http::{header, StatusCode};
    use actix_web::{test, web, App};
    use std::sync::Arc;

    const MAX: u64 = 500 * 1024 * 1024;

    fn upload_request(parts: &[Part<'_>]) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/compress")
            .insert_header((header::CONTENT_TYPE, multipart_content_type()))
            .set_payload(multipart_body(parts))
    }

    #[actix_web::test]
    async fn test_compress_success_and_download() {
        let engine = Arc::new(ScriptedEngine::succeeding(&[9u8; 250]));
        let (_dir, state) = test_state(engine.clone(), MAX);
        let app = test::init_service(
            App::new()
                .configure(|cfg| state.configure(cfg))
                .configure(api::routes)
                .default_service(web::to(api::not_found)),
        )
        .await;

        let input = vec![1u8; 1_000];
        let req = upload_request(&[
            Part { name: "video", file: Some(("holiday.mp4", "video/mp4")), body: &input },
            Part { name: "quality", file: None, body: b"low" },
        ])
        .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["originalSize"], 1_000);
        assert_eq!(body["data"]["compressedSize"], 250);
        assert_eq!(body["data"]["savingsPercent"], "75.0");
        let filename = body["data"]["filename"].as_str().unwrap().to_string();
        assert_eq!(body["data"]["downloadUrl"], format!("/download/{}", filename));

        // Light profile reached the engine
        let invocations = engine.invocations();
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].params.quality_factor, 23);

        // Input is gone, output kept for download
        assert_eq!(files_in(&state.config.upload_dir), 0);
        assert_eq!(files_in(&state.config.output_dir), 1);

        let req = test::TestRequest::get()
            .uri(&format!("/download/{}", filename))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let disposition = resp
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.contains("attachment"));
        assert!(disposition.contains(&filename));
        let bytes = test::read_body(resp).await;
        assert_eq!(bytes.as_ref(), &[9u8; 250][..]);
    }

    #[actix_web::test]
    async fn test_client_chosen_id_is_pollable() {
        let engine = Arc::new(ScriptedEngine::succeeding(&[9u8; 10]));
        let (_dir, state) = test_state(engine, MAX);
        let app = test::init_service(
            App::new()
                .configure(|cfg| state.configure(cfg))
                .configure(api::routes),
        )
        .await;

        let req = upload_request(&[
            Part { name: "compressionId", file: None, body: b"client-42" },
            Part { name: "video", file: Some(("a.mov", "video/quicktime")), body: b"frames" },
        ])
        .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["compressionId"], "client-42");

        let req = test::TestRequest::get()
            .uri("/compression-progress/client-42")
            .to_request();
        let progress: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(progress["progress"], 100);
        assert_eq!(progress["status"], "Complete!");

        // The same id cannot be reused while its record is alive
        let req = upload_request(&[
            Part { name: "compressionId", file: None, body: b"client-42" },
            Part { name: "video", file: Some(("b.mov", "video/quicktime")), body: b"frames" },
        ])
        .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(files_in(&state.config.upload_dir), 0);

        // Nor after its record has expired
        let id = crate::jobs::JobId::from_client("client-42").unwrap();
        state.registry.remove(&id).unwrap();
        let req = upload_request(&[
            Part { name: "compressionId", file: None, body: b"client-42" },
            Part { name: "video", file: Some(("c.mov", "video/quicktime")), body: b"frames" },
        ])
        .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "compressionId already in use: client-42");
    }

    #[actix_web::test]
    async fn test_non_video_upload_is_rejected() {
        let engine = Arc::new(ScriptedEngine::succeeding(&[9u8; 10]));
        let (_dir, state) = test_state(engine.clone(), MAX);
        let app = test::init_service(
            App::new()
                .configure(|cfg| state.configure(cfg))
                .configure(api::routes),
        )
        .await;

        let req = upload_request(&[Part {
            name: "video",
            file: Some(("notes.txt", "text/plain")),
            body: b"not a video",
        }])
        .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Only video files are allowed!");

        assert_eq!(state.registry.len(), 0);
        assert!(engine.invocations().is_empty());
        assert_eq!(files_in(&state.config.upload_dir), 0);
        assert_eq!(files_in(&state.config.output_dir), 0);
    }

    #[actix_web::test]
    async fn test_oversize_upload_is_rejected_before_engine() {
        let engine = Arc::new(ScriptedEngine::succeeding(&[9u8; 10]));
        let (_dir, state) = test_state(engine.clone(), 1024);
        let app = test::init_service(
            App::new()
                .configure(|cfg| state.configure(cfg))
                .configure(api::routes),
        )
        .await;

        let big = vec![0u8; 4096];
        let req = upload_request(&[Part {
            name: "video",
            file: Some(("big.mp4", "video/mp4")),
            body: &big,
        }])
        .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().starts_with("File too large"));
        assert_eq!(state.registry.len(), 0);
        assert!(engine.invocations().is_empty());
        assert_eq!(files_in(&state.config.upload_dir), 0);
    }

    #[actix_web::test]
    async fn test_missing_video_part_is_rejected() {
        let engine = Arc::new(ScriptedEngine::succeeding(&[9u8; 10]));
        let (_dir, state) = test_state(engine, MAX);
        let app = test::init_service(
            App::new()
                .configure(|cfg| state.configure(cfg))
                .configure(api::routes),
        )
        .await;

        let req = upload_request(&[Part { name: "quality", file: None, body: b"high" }]).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "No video file uploaded");
    }

    #[actix_web::test]
    async fn test_empty_engine_output_is_a_server_error() {
        let engine = Arc::new(ScriptedEngine::new(
            vec![crate::engine::EngineEvent::Finished],
            Some(Vec::new()),
        ));
        let (_dir, state) = test_state(engine, MAX);
        let app = test::init_service(
            App::new()
                .configure(|cfg| state.configure(cfg))
                .configure(api::routes),
        )
        .await;

        let req = upload_request(&[Part {
            name: "video",
            file: Some(("clip.mp4", "video/mp4")),
            body: &[5u8; 64],
        }])
        .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().starts_with("empty or missing output"));
        assert_eq!(files_in(&state.config.upload_dir), 0);
        assert_eq!(files_in(&state.config.output_dir), 0);
    }

    #[actix_web::test]
    async fn test_engine_failure_is_a_server_error() {
        let engine = Arc::new(ScriptedEngine::failing("Conversion failed!", None));
        let (_dir, state) = test_state(engine, MAX);
        let app = test::init_service(
            App::new()
                .configure(|cfg| state.configure(cfg))
                .configure(api::routes),
        )
        .await;

        let req = upload_request(&[Part {
            name: "video",
            file: Some(("clip.webm", "video/webm")),
            body: &[5u8; 64],
        }])
        .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Compression failed: Conversion failed!");
        assert_eq!(files_in(&state.config.upload_dir), 0);
    }
}
