use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
};

use crate::{
    dto::upload::UploadResponse,
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    services::upload_service::{self, MAX_UPLOAD_BYTES},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        // room for the multipart framing around a full-size file
        .route(
            "/",
            post(upload_image).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + 64 * 1024)),
        )
        .route("/{filename}", get(serve_upload))
}

#[utoipa::path(
    post,
    path = "/api/upload",
    request_body(content_type = "multipart/form-data", description = "Form with a `file` field"),
    responses(
        (status = 200, description = "Stored image", body = ApiResponse<UploadResponse>),
        (status = 400, description = "Unsupported, empty or oversized file"),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Upload"
)]
pub async fn upload_image(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<UploadResponse>>> {
    let resp = upload_service::upload_image(&state, &user, multipart).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/upload/{filename}",
    params(("filename" = String, Path, description = "Stored file name")),
    responses(
        (status = 200, description = "Image bytes"),
        (status = 400, description = "Invalid filename"),
        (status = 404, description = "File not found")
    ),
    tag = "Upload"
)]
pub async fn serve_upload(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> AppResult<impl IntoResponse> {
    let (content_type, content) = upload_service::read_upload(&state, &filename).await?;
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "public, max-age=86400"),
        ],
        content,
    ))
}
