use actix_multipart::form::MultipartFormConfig;
use actix_multipart::MultipartError;
use actix_web::error::PayloadError;
use actix_web::http::{header, StatusCode};
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use tracing::{error, warn};

/// Extra room on top of the file ceiling for the text fields and part headers
const FORM_OVERHEAD: usize = 64 * 1024;

/// Body of every failed request
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

/// API-level errors
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Request rejected before any job exists
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// The job ran and ended `Failed`
    #[error("{0}")]
    Compression(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn file_too_large(max_upload_size: u64) -> Self {
        ApiError::Validation(format!(
            "File too large. Maximum size is {}MB.",
            max_upload_size / (1024 * 1024)
        ))
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Compression(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            ApiError::Validation(msg) => warn!("Validation error: {}", msg),
            ApiError::NotFound(msg) => warn!("Not found: {}", msg),
            ApiError::Compression(msg) => error!("Compression process failed: {}", msg),
            ApiError::Internal(msg) => error!("Server error: {}", msg),
        }

        HttpResponse::build(self.status_code()).json(ErrorResponse {
            success: false,
            error: self.to_string(),
        })
    }
}

/// Multipart limits with the standardized error body
///
/// An oversize body is reported as "File too large"; any other form error is
/// a plain validation failure.
pub fn multipart_config(max_upload_size: u64) -> MultipartFormConfig {
    let total_limit = usize::try_from(max_upload_size)
        .unwrap_or(usize::MAX)
        .saturating_add(FORM_OVERHEAD);

    MultipartFormConfig::default()
        .total_limit(total_limit)
        .error_handler(move |err, req| {
            let declared_len = req
                .headers()
                .get(header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());

            upload_error(&err, declared_len, max_upload_size).into()
        })
}

/// Classify a rejected multipart body. Overflowing the form limit is "File
/// too large" whether or not the client declared a length.
fn upload_error(err: &MultipartError, declared_len: Option<u64>, max_upload_size: u64) -> ApiError {
    let overflowed = matches!(err, MultipartError::Payload(PayloadError::Overflow))
        || declared_len.is_some_and(|len| len > max_upload_size);

    if overflowed {
        ApiError::file_too_large(max_upload_size)
    } else {
        ApiError::Validation(format!("Invalid upload: {}", err))
    }
}

/// Fallback for unmatched routes
pub async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(ErrorResponse {
        success: false,
        error: "Endpoint not found".to_string(),
    })
}
