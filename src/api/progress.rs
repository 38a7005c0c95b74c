use actix_web::{get, web, HttpResponse, Responder};
use serde::Serialize;

use crate::jobs::{JobId, JobRegistry};

/// Snapshot returned to polling clients
#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressResponse {
    pub progress: u8,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<i64>,
}

impl ProgressResponse {
    fn unknown() -> Self {
        Self {
            progress: 0,
            status: "Unknown".to_string(),
            elapsed_seconds: None,
            eta_seconds: None,
        }
    }
}

/// Current progress of a job. Unknown or expired ids yield a zero-progress
/// placeholder, never an error.
pub fn query(registry: &JobRegistry, raw_id: &str) -> ProgressResponse {
    let Some(snapshot) = JobId::from_client(raw_id).and_then(|id| registry.get(&id)) else {
        return ProgressResponse::unknown();
    };

    ProgressResponse {
        progress: snapshot.job.progress_percent,
        status: snapshot.job.status_message.clone(),
        elapsed_seconds: Some(snapshot.elapsed().num_seconds()),
        eta_seconds: snapshot.eta().map(|eta| eta.num_seconds()),
    }
}

#[get("/compression-progress/{id}")]
async fn compression_progress(registry: web::Data<JobRegistry>, path: web::Path<String>) -> impl Responder {
    HttpResponse::Ok().json(query(&registry, &path.into_inner()))
}

pub fn progress_config(config: &mut web::ServiceConfig) {
    config.service(compression_progress);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{NewJob, QualityProfile};
    use actix_web::{test as actix_test, App};
    use std::path::PathBuf;
    use std::sync::Arc;

    fn register(registry: &JobRegistry) -> JobId {
        registry
            .create(NewJob {
                id: None,
                input_path: PathBuf::from("in.mp4"),
                output_path: PathBuf::from("out.mp4"),
                quality_profile: QualityProfile::Balanced,
                original_size: 100,
            })
            .unwrap()
    }

    #[test]
    fn test_query_running_job() {
        let registry = JobRegistry::new();
        let id = register(&registry);
        registry.mark_running(&id, 10, "Starting...").unwrap();
        registry.update(&id, 42, "Processing... 00:00:04.20").unwrap();

        let response = query(&registry, id.as_str());
        assert_eq!(response.progress, 42);
        assert_eq!(response.status, "Processing... 00:00:04.20");
        assert!(response.elapsed_seconds.is_some());
    }

    #[test]
    fn test_query_malformed_id_is_unknown() {
        let registry = JobRegistry::new();
        assert_eq!(query(&registry, "../../etc"), ProgressResponse::unknown());
        assert_eq!(query(&registry, ""), ProgressResponse::unknown());
    }

    #[actix_web::test]
    async fn test_unknown_id_returns_placeholder() {
        let registry = Arc::new(JobRegistry::new());
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::from(registry))
                .configure(progress_config),
        )
        .await;

        let req = actix_test::TestRequest::get()
            .uri("/compression-progress/never-issued-123")
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert_eq!(body, serde_json::json!({"progress": 0, "status": "Unknown"}));
    }
}
