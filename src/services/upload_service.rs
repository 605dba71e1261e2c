//! Product image uploads.
//!
//! Files land in the configured upload directory as `<uuid>.<ext>` and are
//! served back by the static `/uploads` route or `GET /api/upload/{filename}`.

use std::path::Path;

use axum::extract::Multipart;
use image::ImageFormat;
use uuid::Uuid;

use crate::{
    audit,
    dto::upload::UploadResponse,
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    response::ApiResponse,
    state::AppState,
};

/// 5 MiB per file.
pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

const ALLOWED: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/webp", "webp"),
    ("image/gif", "gif"),
];

pub fn extension_for(content_type: &str) -> Option<&'static str> {
    let content_type = content_type.trim().to_ascii_lowercase();
    ALLOWED
        .iter()
        .find(|(mime, _)| *mime == content_type)
        .map(|(_, ext)| *ext)
}

pub fn content_type_for(filename: &str) -> Option<&'static str> {
    let ext = Path::new(filename)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();
    let ext = if ext == "jpeg" { "jpg".to_string() } else { ext };
    ALLOWED
        .iter()
        .find(|(_, known)| *known == ext)
        .map(|(mime, _)| *mime)
}

fn extension_of(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Jpeg => Some("jpg"),
        ImageFormat::Png => Some("png"),
        ImageFormat::WebP => Some("webp"),
        ImageFormat::Gif => Some("gif"),
        _ => None,
    }
}

/// Check a received file and pick the extension it is stored under. The
/// bytes must decode as an image of the declared type.
pub fn validate_image(content_type: &str, data: &[u8]) -> AppResult<&'static str> {
    let ext = extension_for(content_type).ok_or_else(|| {
        AppError::BadRequest(format!(
            "Unsupported file type '{content_type}'. Allowed: jpeg, png, webp, gif"
        ))
    })?;
    if data.is_empty() {
        return Err(AppError::BadRequest("Empty file provided".into()));
    }
    if data.len() > MAX_UPLOAD_BYTES {
        return Err(AppError::BadRequest(format!(
            "File too large. Maximum size is {}MB",
            MAX_UPLOAD_BYTES / 1024 / 1024
        )));
    }

    let format = image::guess_format(data)
        .map_err(|_| AppError::BadRequest("File is not a recognizable image".into()))?;
    if extension_of(format) != Some(ext) {
        return Err(AppError::BadRequest(
            "File content does not match its content type".into(),
        ));
    }
    if let Err(e) = image::load_from_memory_with_format(data, format) {
        return Err(AppError::BadRequest(format!("Invalid image file ({ext}): {e}")));
    }
    Ok(ext)
}

/// A bare file name: no separators, no parent references.
pub fn is_safe_filename(filename: &str) -> bool {
    !filename.is_empty()
        && !filename.contains("..")
        && !filename.contains('/')
        && !filename.contains('\\')
        && !filename.starts_with('.')
}

pub async fn upload_image(
    state: &AppState,
    user: &AuthUser,
    mut multipart: Multipart,
) -> AppResult<ApiResponse<UploadResponse>> {
    ensure_admin(user)?;

    let mut file: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart request: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_default();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Multipart error: {e}")))?;
        file = Some((content_type, data.to_vec()));
        break;
    }

    let (content_type, data) =
        file.ok_or_else(|| AppError::BadRequest("No 'file' field found".into()))?;
    let (content_type, data, ext) = tokio::task::spawn_blocking(move || {
        validate_image(&content_type, &data).map(|ext| (content_type, data, ext))
    })
    .await
    .map_err(|e| AppError::Internal(anyhow::anyhow!("image check task: {e}")))??;

    let upload_dir = &state.config.upload_dir;
    tokio::fs::create_dir_all(upload_dir)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("create upload dir: {e}")))?;

    let filename = format!("{}.{ext}", Uuid::new_v4());
    tokio::fs::write(upload_dir.join(&filename), &data)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("write upload: {e}")))?;

    tracing::info!(filename = %filename, size = data.len(), "image uploaded");

    audit::record(
        &state.orm,
        user,
        "image_upload",
        "uploads",
        serde_json::json!({ "filename": filename, "size": data.len() }),
    )
    .await;

    let resp = UploadResponse {
        url: format!("/uploads/{filename}"),
        filename,
        content_type: content_type.trim().to_ascii_lowercase(),
        size: data.len(),
    };
    Ok(ApiResponse::success("Uploaded", resp, None))
}

/// Read a stored upload back, with the content type derived from its name.
pub async fn read_upload(state: &AppState, filename: &str) -> AppResult<(&'static str, Vec<u8>)> {
    if !is_safe_filename(filename) {
        return Err(AppError::BadRequest("Invalid filename".into()));
    }
    let content_type = content_type_for(filename).ok_or(AppError::NotFound("File"))?;

    match tokio::fs::read(state.config.upload_dir.join(filename)).await {
        Ok(content) => Ok((content_type, content)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(AppError::NotFound("File")),
        Err(err) => Err(AppError::Internal(anyhow::anyhow!("read upload: {err}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use image::{DynamicImage, ImageFormat};
    use std::io::Cursor;

    fn encoded(format: ImageFormat) -> Vec<u8> {
        // gif wants an alpha channel, jpeg refuses one
        let img = if format == ImageFormat::Gif {
            DynamicImage::new_rgba8(2, 2)
        } else {
            DynamicImage::new_rgb8(2, 2)
        };
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, format).unwrap();
        buffer.into_inner()
    }

    #[test]
    fn accepts_known_image_types() {
        let png = encoded(ImageFormat::Png);
        assert_eq!(validate_image("image/png", &png).unwrap(), "png");
        assert_eq!(validate_image("IMAGE/PNG ", &png).unwrap(), "png");
        let jpeg = encoded(ImageFormat::Jpeg);
        assert_eq!(validate_image("image/jpeg", &jpeg).unwrap(), "jpg");
        let gif = encoded(ImageFormat::Gif);
        assert_eq!(validate_image("image/gif", &gif).unwrap(), "gif");
        let webp = encoded(ImageFormat::WebP);
        assert_eq!(validate_image("image/webp", &webp).unwrap(), "webp");
    }

    #[test]
    fn rejects_payload_behind_an_image_signature() {
        let mut fake = b"\x89PNG\r\n\x1a\n".to_vec();
        fake.extend_from_slice(b"<?php system($_GET['c']); ?> not an image at all");
        assert!(matches!(
            validate_image("image/png", &fake),
            Err(AppError::BadRequest(_))
        ));

        let png = encoded(ImageFormat::Png);
        let truncated = &png[..png.len() / 2];
        assert!(validate_image("image/png", truncated).is_err());
    }

    #[test]
    fn rejects_other_types() {
        assert!(matches!(
            validate_image("application/pdf", b"%PDF-1.7"),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            validate_image("image/svg+xml", b"<svg/>"),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn rejects_empty_and_oversized() {
        assert!(validate_image("image/png", &[]).is_err());
        let mut big = encoded(ImageFormat::Png);
        big.resize(MAX_UPLOAD_BYTES + 1, 0);
        assert!(validate_image("image/png", &big).is_err());
    }

    #[test]
    fn rejects_content_that_lies_about_its_type() {
        let png = encoded(ImageFormat::Png);
        assert!(validate_image("image/jpeg", &png).is_err());
    }

    #[test]
    fn filename_guards() {
        assert!(is_safe_filename("9b2f.png"));
        assert!(!is_safe_filename("../etc/passwd"));
        assert!(!is_safe_filename("a/b.png"));
        assert!(!is_safe_filename("a\\b.png"));
        assert!(!is_safe_filename(".env"));
        assert!(!is_safe_filename(""));
    }

    #[test]
    fn content_type_from_extension() {
        assert_eq!(content_type_for("x.JPEG"), Some("image/jpeg"));
        assert_eq!(content_type_for("x.webp"), Some("image/webp"));
        assert_eq!(content_type_for("x.txt"), None);
        assert_eq!(content_type_for("noext"), None);
    }

    #[tokio::test]
    async fn reads_back_stored_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = crate::config::AppConfig::for_tests();
        config.upload_dir = dir.path().to_path_buf();
        let state = AppState::new(sea_orm::DatabaseConnection::Disconnected, config);

        let png = encoded(ImageFormat::Png);
        tokio::fs::write(dir.path().join("swatch.png"), &png).await.unwrap();
        let (content_type, bytes) = read_upload(&state, "swatch.png").await.unwrap();
        assert_eq!(content_type, "image/png");
        assert_eq!(bytes, png);

        assert!(matches!(
            read_upload(&state, "missing.png").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            read_upload(&state, "../swatch.png").await,
            Err(AppError::BadRequest(_))
        ));
    }
}
