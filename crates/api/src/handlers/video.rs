//! Handler for turning uploaded videos into session frames.

use annotator_core::ffmpeg::FrameRate;
use annotator_core::ingest::{self, UploadedFile, VideoUpload};
use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::handlers::images::ImageInfo;
use crate::middleware::session::ActiveSession;
use crate::response::DataResponse;
use crate::state::AppState;

/// Multipart field carrying the video files.
const FILES_FIELD: &str = "files";

/// Multipart field with a JSON array of requested rates, one per file.
const FRAME_RATES_FIELD: &str = "frameRates";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedVideo {
    pub video_index: usize,
    /// Native rate reported by ffprobe, as a fraction string.
    pub intrinsic_frame_rate: String,
    /// Rate frames were extracted at.
    pub frame_rate: f64,
    pub frames: Vec<ImageInfo>,
}

#[derive(Debug, Serialize)]
pub struct ProcessVideoResult {
    pub videos: Vec<ProcessedVideo>,
}

/// POST /api/process-video
///
/// Extracts frames from each `files` field at the matching entry of
/// `frameRates`, capped at the video's native rate. Videos are processed in
/// order; if one fails the request fails, keeping frames of the videos
/// before it.
pub async fn process_video(
    State(state): State<AppState>,
    ActiveSession(session): ActiveSession,
    mut multipart: Multipart,
) -> AppResult<Json<DataResponse<ProcessVideoResult>>> {
    let mut files = Vec::new();
    let mut requested: Option<Vec<f64>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        match field.name() {
            Some(FILES_FIELD) => {
                let file_name = field.file_name().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                files.push(UploadedFile { file_name, data });
            }
            Some(FRAME_RATES_FIELD) => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                let rates = serde_json::from_str(&text).map_err(|e| {
                    AppError::BadRequest(format!(
                        "'{FRAME_RATES_FIELD}' must be a JSON array of numbers: {e}"
                    ))
                })?;
                requested = Some(rates);
            }
            _ => {}
        }
    }

    if files.is_empty() {
        return Err(AppError::BadRequest(format!(
            "No files provided in the '{FILES_FIELD}' field"
        )));
    }
    let requested = requested.ok_or_else(|| {
        AppError::BadRequest(format!("Missing '{FRAME_RATES_FIELD}' field"))
    })?;
    if requested.len() != files.len() {
        return Err(AppError::BadRequest(format!(
            "{} frame rates given for {} files",
            requested.len(),
            files.len()
        )));
    }

    let videos = files
        .into_iter()
        .zip(requested)
        .map(|(file, fps)| {
            Ok(VideoUpload {
                file,
                frame_rate: FrameRate::from_fps(fps)?,
            })
        })
        .collect::<AppResult<Vec<_>>>()?;

    let reports = ingest::ingest_videos(
        &session,
        &state.config.ffmpeg,
        &state.config.session.scratch_root,
        videos,
    )
    .await?;

    let videos = reports
        .iter()
        .map(|report| ProcessedVideo {
            video_index: report.video_index,
            intrinsic_frame_rate: report.intrinsic_rate.to_string(),
            frame_rate: report.effective_rate.as_f64(),
            frames: report.images.iter().map(ImageInfo::from).collect(),
        })
        .collect();

    Ok(Json(DataResponse {
        data: ProcessVideoResult { videos },
    }))
}
