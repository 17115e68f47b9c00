//! Bringing uploads into a session.
//!
//! Image uploads are judged one by one: a file that is not a supported
//! image ends up in the report's `rejected` list and the rest of the batch
//! is still stored. Videos are decoded one after another; a failing video
//! stops the request, but frames from videos before it stay in the session.

use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use image::ImageFormat;
use serde::Serialize;

use crate::error::CoreError;
use crate::ffmpeg::{FfmpegConfig, FrameRate};
use crate::frames::{self, ExtractedFrame};
use crate::metadata::MetadataCodec;
use crate::session::{AnnotatedImage, Session};
use crate::shapes::Shape;

/// Image containers accepted for upload.
pub const SUPPORTED_IMAGE_FORMATS: &[ImageFormat] =
    &[ImageFormat::Png, ImageFormat::Jpeg, ImageFormat::WebP];

/// A file received from a client.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub data: Bytes,
}

impl UploadedFile {
    fn display_name(&self, index: usize) -> String {
        self.file_name
            .clone()
            .unwrap_or_else(|| format!("upload-{index}"))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedUpload {
    pub file_name: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub accepted: Vec<AnnotatedImage>,
    pub rejected: Vec<RejectedUpload>,
}

/// Store uploaded images, reading any embedded annotations.
///
/// Accepted images are appended in upload order once the whole batch has
/// been written.
pub async fn ingest_images(
    session: &Session,
    codec: Arc<dyn MetadataCodec>,
    uploads: Vec<UploadedFile>,
) -> IngestReport {
    let mut report = IngestReport::default();

    for (index, upload) in uploads.into_iter().enumerate() {
        let file_name = upload.display_name(index);
        match store_upload(session, Arc::clone(&codec), upload, file_name.clone()).await {
            Ok(image) => report.accepted.push(image),
            Err(reason) => {
                tracing::info!(
                    session_id = %session.id(),
                    file_name = %file_name,
                    reason = %reason,
                    "Upload rejected",
                );
                report.rejected.push(RejectedUpload { file_name, reason });
            }
        }
    }

    tracing::info!(
        session_id = %session.id(),
        accepted = report.accepted.len(),
        rejected = report.rejected.len(),
        "Images ingested",
    );
    session.push_images(report.accepted.clone()).await;
    report
}

async fn store_upload(
    session: &Session,
    codec: Arc<dyn MetadataCodec>,
    upload: UploadedFile,
    file_name: String,
) -> Result<AnnotatedImage, String> {
    let data = upload.data;
    let inspected = {
        let data = data.clone();
        tokio::task::spawn_blocking(move || inspect_image(&data, codec.as_ref()))
            .await
            .map_err(|e| format!("inspection task failed: {e}"))?
    };
    let (format, metadata) = inspected?;

    session
        .write_image(&data, format, file_name, metadata)
        .await
        .map_err(|e| e.to_string())
}

/// Check the upload is a readable image and pull out annotations.
fn inspect_image(
    data: &[u8],
    codec: &dyn MetadataCodec,
) -> Result<(ImageFormat, Option<Vec<Shape>>), String> {
    let format = image::guess_format(data).map_err(|_| "not a recognised image".to_string())?;
    if !SUPPORTED_IMAGE_FORMATS.contains(&format) {
        return Err(format!("unsupported image format {format:?}"));
    }
    image::ImageReader::with_format(Cursor::new(data), format)
        .into_dimensions()
        .map_err(|e| format!("unreadable image: {e}"))?;

    let metadata = match codec.extract(data) {
        Ok(shapes) => Some(shapes),
        Err(e) => {
            tracing::debug!(error = %e, "No annotations recovered from upload");
            None
        }
    };
    Ok((format, metadata))
}

// ---------------------------------------------------------------------------
// Videos
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct VideoUpload {
    pub file: UploadedFile,
    pub frame_rate: FrameRate,
}

/// What one video contributed to the session.
#[derive(Debug, Clone)]
pub struct VideoReport {
    pub video_index: usize,
    pub intrinsic_rate: FrameRate,
    pub effective_rate: FrameRate,
    pub images: Vec<AnnotatedImage>,
}

/// Decode each video into frames and add them to the session.
///
/// Videos are processed strictly one at a time.
pub async fn ingest_videos(
    session: &Session,
    ffmpeg: &FfmpegConfig,
    scratch_root: &Path,
    videos: Vec<VideoUpload>,
) -> Result<Vec<VideoReport>, CoreError> {
    let mut reports = Vec::with_capacity(videos.len());

    for (video_index, video) in videos.into_iter().enumerate() {
        let source = stage_video(scratch_root, &video.file).await?;
        let extraction = frames::extract_frames(
            ffmpeg,
            scratch_root,
            source.path(),
            video.frame_rate,
            video_index,
        )
        .await;
        drop(source);
        let extraction = extraction?;

        let images = store_frames(session, &extraction.frames).await?;
        session.push_images(images.clone()).await;

        tracing::info!(
            session_id = %session.id(),
            video_index,
            effective_rate = %extraction.effective_rate,
            frames = images.len(),
            "Video ingested",
        );
        reports.push(VideoReport {
            video_index,
            intrinsic_rate: extraction.intrinsic_rate,
            effective_rate: extraction.effective_rate,
            images,
        });
    }

    Ok(reports)
}

/// Write a video's frames into the session directory.
///
/// On failure the frames already written for this video are removed, so a
/// video contributes all of its frames or none.
async fn store_frames(
    session: &Session,
    frames: &[ExtractedFrame],
) -> Result<Vec<AnnotatedImage>, CoreError> {
    let mut images = Vec::with_capacity(frames.len());
    for frame in frames {
        match session
            .write_image(&frame.data, ImageFormat::Png, frame.source_name(), None)
            .await
        {
            Ok(image) => images.push(image),
            Err(e) => {
                discard_images(&images).await;
                return Err(e);
            }
        }
    }
    Ok(images)
}

async fn discard_images(images: &[AnnotatedImage]) {
    for image in images {
        if let Err(e) = tokio::fs::remove_file(&image.path).await {
            tracing::warn!(path = %image.path.display(), error = %e, "Failed to remove partial frame");
        }
    }
}

/// Write an uploaded video to a temporary file for ffmpeg to read.
async fn stage_video(
    scratch_root: &Path,
    file: &UploadedFile,
) -> Result<tempfile::NamedTempFile, CoreError> {
    let suffix = file
        .file_name
        .as_deref()
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.bytes().all(|b| b.is_ascii_alphanumeric()))
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();
    let root = scratch_root.to_path_buf();
    let data = file.data.clone();

    tokio::task::spawn_blocking(move || {
        let mut staged = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(&suffix)
            .tempfile_in(&root)?;
        staged.write_all(&data)?;
        staged.flush()?;
        Ok::<_, std::io::Error>(staged)
    })
    .await
    .map_err(|e| CoreError::Internal(format!("staging task failed: {e}")))?
    .map_err(|e| CoreError::Internal(format!("failed to stage video: {e}")))
}
