//! Handlers for images held by a session.
//!
//! Every route here requires the `x-session-id` header (see
//! [`ActiveSession`]).

use std::sync::Arc;

use annotator_core::archive::stream_archive;
use annotator_core::export;
use annotator_core::ingest::{self, RejectedUpload, UploadedFile};
use annotator_core::session::{AnnotatedImage, PAGE_SIZE};
use annotator_core::shapes::{validate_shapes, Shape};
use annotator_core::types::ImageId;
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

use crate::error::{AppError, AppResult};
use crate::middleware::session::ActiveSession;
use crate::response::{zip_attachment, DataResponse};
use crate::state::AppState;

/// Multipart field carrying image uploads.
const IMAGES_FIELD: &str = "images";

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Summary of one stored image.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInfo {
    pub id: ImageId,
    pub file_name: String,
    pub format: &'static str,
    pub metadata: Option<Vec<Shape>>,
}

impl From<&AnnotatedImage> for ImageInfo {
    fn from(image: &AnnotatedImage) -> Self {
        Self {
            id: image.id,
            file_name: image.source_name.clone(),
            format: image.extension(),
            metadata: image.metadata.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UploadResult {
    pub uploaded: Vec<ImageInfo>,
    pub rejected: Vec<RejectedUpload>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageCount {
    pub total_images: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

#[derive(Debug, Serialize)]
pub struct ImageMetadata {
    pub id: ImageId,
    pub metadata: Option<Vec<Shape>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageParams {
    pub page_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddMetadataRequest {
    pub id: ImageId,
    pub shapes: Vec<Shape>,
}

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

/// POST /api/upload-images
///
/// Accepts any number of `images` multipart fields. Files that are not
/// readable images are listed under `rejected`; the others are stored.
pub async fn upload_images(
    State(state): State<AppState>,
    ActiveSession(session): ActiveSession,
    mut multipart: Multipart,
) -> AppResult<Json<DataResponse<UploadResult>>> {
    let mut uploads = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if field.name() != Some(IMAGES_FIELD) {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        uploads.push(UploadedFile { file_name, data });
    }

    if uploads.is_empty() {
        return Err(AppError::BadRequest(format!(
            "No files provided in the '{IMAGES_FIELD}' field"
        )));
    }

    let report = ingest::ingest_images(&session, Arc::clone(&state.codec), uploads).await;

    Ok(Json(DataResponse {
        data: UploadResult {
            uploaded: report.accepted.iter().map(ImageInfo::from).collect(),
            rejected: report.rejected,
        },
    }))
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// GET /api/image/{id}
pub async fn get_image(
    ActiveSession(session): ActiveSession,
    Path(id): Path<ImageId>,
) -> AppResult<Response> {
    let image = session.image(id).await?;

    let file = tokio::fs::File::open(&image.path)
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?;
    let file_size = file
        .metadata()
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?
        .len();

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, image.content_type().to_string()),
            (header::CONTENT_LENGTH, file_size.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"image-{}.{}\"", image.id, image.extension()),
            ),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

/// GET /api/image/{id}/metadata
///
/// Returns the shapes recorded for the image, `null` when none could be read.
pub async fn get_image_metadata(
    ActiveSession(session): ActiveSession,
    Path(id): Path<ImageId>,
) -> AppResult<Json<DataResponse<ImageMetadata>>> {
    let image = session.image(id).await?;
    Ok(Json(DataResponse {
        data: ImageMetadata {
            id: image.id,
            metadata: image.metadata,
        },
    }))
}

/// GET /api/images?pageNumber=N
///
/// Zip of one page of images. Pages are 1-based; a page past the end yields
/// an empty archive.
pub async fn get_images_page(
    ActiveSession(session): ActiveSession,
    Query(params): Query<PageParams>,
) -> AppResult<Response> {
    let raw = params
        .page_number
        .ok_or_else(|| AppError::BadRequest("pageNumber is required".into()))?;
    let page_number: usize = raw
        .trim()
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid pageNumber '{raw}'")))?;

    let page = session.page(page_number).await?;
    let entries = export::page_entries(&page);
    Ok(zip_attachment("images.zip", stream_archive(entries, session)))
}

/// GET /api/all-images
pub async fn get_all_images(ActiveSession(session): ActiveSession) -> Response {
    let entries = export::image_entries(&session.images().await);
    zip_attachment("images.zip", stream_archive(entries, session))
}

/// GET /api/number-pages-total-images
pub async fn count_images(
    ActiveSession(session): ActiveSession,
) -> Json<DataResponse<ImageCount>> {
    let total_images = session.len().await;
    Json(DataResponse {
        data: ImageCount {
            total_images,
            page_size: PAGE_SIZE,
            total_pages: total_images.div_ceil(PAGE_SIZE),
        },
    })
}

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

/// DELETE /api/delete-image/{id}
///
/// Idempotent: deleting an unknown image also returns 204.
pub async fn delete_image(
    ActiveSession(session): ActiveSession,
    Path(id): Path<ImageId>,
) -> StatusCode {
    if session.remove_image(id).await {
        tracing::info!(session_id = %session.id(), image_id = %id, "Image deleted");
    }
    StatusCode::NO_CONTENT
}

/// POST /api/add-metadata
///
/// Embeds `shapes` into the image file and records them. An empty list
/// clears previous annotations.
pub async fn add_metadata(
    State(state): State<AppState>,
    ActiveSession(session): ActiveSession,
    payload: Result<Json<AddMetadataRequest>, JsonRejection>,
) -> AppResult<Json<DataResponse<ImageInfo>>> {
    let Json(input) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    validate_shapes(&input.shapes)?;

    let image = session
        .attach_metadata(input.id, input.shapes, Arc::clone(&state.codec))
        .await?;

    Ok(Json(DataResponse {
        data: ImageInfo::from(&image),
    }))
}
