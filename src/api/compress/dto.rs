use actix_multipart::form::{tempfile::TempFile, text::Text, MultipartForm};
use serde::Serialize;

/// Multipart body of `POST /compress`
#[derive(MultipartForm)]
pub struct CompressForm {
    pub video: Option<TempFile>,
    pub quality: Option<Text<String>>,
    /// Client-chosen id to poll while the request is pending
    #[multipart(rename = "compressionId")]
    pub compression_id: Option<Text<String>>,
}

/// Details of a finished compression
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CompressionData {
    pub original_size: u64,
    pub compressed_size: u64,
    /// One decimal place, e.g. "42.5"
    pub savings_percent: String,
    pub download_url: String,
    pub filename: String,
    pub compression_id: String,
}

/// Response for a successful compression
#[derive(Serialize, Debug)]
pub struct CompressResponse {
    pub success: bool,
    pub message: String,
    pub data: CompressionData,
}
