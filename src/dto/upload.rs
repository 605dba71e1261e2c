use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    pub filename: String,
    /// Relative URL served by the static `/uploads` route.
    pub url: String,
    pub content_type: String,
    pub size: usize,
}
