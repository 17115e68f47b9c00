//! Handlers for detection-label exports.

use annotator_core::archive::stream_archive;
use annotator_core::error::CoreError;
use annotator_core::export::{self, ExportFormat};
use annotator_core::types::ImageId;
use axum::extract::Path;
use axum::response::Response;

use crate::error::AppResult;
use crate::middleware::session::ActiveSession;
use crate::response::zip_attachment;

/// GET /api/export-image/{id}/{format}
///
/// Zip holding the image and its label file.
pub async fn export_image(
    ActiveSession(session): ActiveSession,
    Path((id, format)): Path<(ImageId, String)>,
) -> AppResult<Response> {
    let format: ExportFormat = format.parse()?;
    let image = session.image(id).await?;

    let entries = export::export_image(&image, format);
    Ok(zip_attachment(
        &format!("image-{id}.zip"),
        stream_archive(entries, session),
    ))
}

/// GET /api/export-all-images/{format}
///
/// Zip with every image under `images/` and its label under `labels/`.
pub async fn export_all_images(
    ActiveSession(session): ActiveSession,
    Path(format): Path<String>,
) -> AppResult<Response> {
    let format: ExportFormat = format.parse()?;
    let images = session.images().await;
    if images.is_empty() {
        return Err(CoreError::NotFound {
            entity: "images in session",
            id: session.id().to_string(),
        }
        .into());
    }

    let entries = export::export_all(&images, format);
    tracing::info!(
        session_id = %session.id(),
        images = images.len(),
        "Exporting all images",
    );
    Ok(zip_attachment("export.zip", stream_archive(entries, session)))
}
