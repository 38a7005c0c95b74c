use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{get, web, HttpResponse};
use futures_util::TryStreamExt;
use std::io;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use crate::api::error::ApiError;
use crate::config::Config;

/// Stream a produced artifact as an attachment
#[get("/download/{filename}")]
async fn download(config: web::Data<Config>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let filename = path.into_inner();
    let not_found = || ApiError::NotFound(format!("File not found: {}", filename));

    if !is_plain_file_name(&filename) {
        return Err(not_found());
    }

    let file_path = config.output_dir.join(&filename);
    let file = match tokio::fs::File::open(&file_path).await {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(not_found()),
        Err(e) => return Err(ApiError::Internal(format!("Download failed: {}", e))),
    };
    let size = file
        .metadata()
        .await
        .map_err(|e| ApiError::Internal(format!("Download failed: {}", e)))?
        .len();

    info!("Download request for {} ({} bytes)", filename, size);

    let name = filename.clone();
    let body = ReaderStream::new(file).inspect_err(move |e| {
        warn!("Download of {} interrupted: {}", name, e);
    });

    Ok(HttpResponse::Ok()
        .content_type("video/mp4")
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(filename)],
        })
        .no_chunking(size)
        .streaming(body))
}

/// A single path component with no traversal
fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

pub fn download_config(config: &mut web::ServiceConfig) {
    config.service(download);
}
