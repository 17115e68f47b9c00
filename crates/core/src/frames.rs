//! Frame extraction from uploaded videos.
//!
//! Each call gets a private scratch directory for ffmpeg's numbered output.
//! The directory is a [`TempDir`] guard, so it is removed on success, on
//! decode failure and on any I/O error in between.

use std::path::Path;

use tempfile::TempDir;

use crate::ffmpeg::{self, FfmpegConfig, FfmpegError, FrameRate};

/// Extension ffmpeg writes frames with.
pub const FRAME_EXTENSION: &str = "png";

/// One decoded still, tagged with where it came from.
#[derive(Debug, Clone)]
pub struct ExtractedFrame {
    /// Position of the source video within its request.
    pub video_index: usize,
    /// 0-based position of the frame within the video's output.
    pub frame_index: usize,
    pub data: Vec<u8>,
}

impl ExtractedFrame {
    /// Name the frame is known by before it gets an image id.
    pub fn source_name(&self) -> String {
        format!(
            "frame-{}-{}.{FRAME_EXTENSION}",
            self.video_index, self.frame_index
        )
    }
}

/// Outcome of extracting one video.
#[derive(Debug)]
pub struct Extraction {
    pub intrinsic_rate: FrameRate,
    pub effective_rate: FrameRate,
    pub frames: Vec<ExtractedFrame>,
}

/// Decode `video_path` into ordered stills at `min(requested, native)` fps.
///
/// `scratch_root` is the parent under which the per-call scratch directory
/// is created.
pub async fn extract_frames(
    config: &FfmpegConfig,
    scratch_root: &Path,
    video_path: &Path,
    requested: FrameRate,
    video_index: usize,
) -> Result<Extraction, FfmpegError> {
    let intrinsic_rate = ffmpeg::probe_frame_rate(config, video_path).await?;
    let effective_rate = ffmpeg::effective_frame_rate(requested, intrinsic_rate);

    tracing::debug!(
        video_index,
        requested = %requested,
        intrinsic = %intrinsic_rate,
        effective = %effective_rate,
        "Extracting frames"
    );

    let scratch = tempfile::Builder::new()
        .prefix(&format!("frames-{video_index}-"))
        .tempdir_in(scratch_root)?;

    let frames = decode_into(config, &scratch, video_path, effective_rate, video_index).await;

    let scratch_path = scratch.path().to_path_buf();
    if let Err(e) = scratch.close() {
        tracing::warn!(path = %scratch_path.display(), error = %e, "Failed to remove frame scratch directory");
    }

    Ok(Extraction {
        intrinsic_rate,
        effective_rate,
        frames: frames?,
    })
}

async fn decode_into(
    config: &FfmpegConfig,
    scratch: &TempDir,
    video_path: &Path,
    rate: FrameRate,
    video_index: usize,
) -> Result<Vec<ExtractedFrame>, FfmpegError> {
    let pattern = scratch
        .path()
        .join(format!("{video_index}-frame-%d.{FRAME_EXTENSION}"));

    let output = tokio::process::Command::new(&config.ffmpeg_bin)
        .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-y", "-i"])
        .arg(video_path)
        .args(["-vf", &format!("fps={rate}")])
        .arg(&pattern)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(FfmpegError::NotFound)?;

    if !output.status.success() {
        return Err(FfmpegError::DecodeFailed {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(scratch.path()).await?;
    while let Some(entry) = entries.next_entry().await? {
        names.push(entry.file_name().to_string_lossy().to_string());
    }

    let mut frames = Vec::with_capacity(names.len());
    for (frame_index, name) in order_frame_files(video_index, names).into_iter().enumerate() {
        let data = tokio::fs::read(scratch.path().join(&name)).await?;
        frames.push(ExtractedFrame {
            video_index,
            frame_index,
            data,
        });
    }

    Ok(frames)
}

/// Numeric frame number embedded in a `{video}-frame-{n}.png` file name.
pub fn frame_number(video_index: usize, file_name: &str) -> Option<u64> {
    let prefix = format!("{video_index}-frame-");
    let n = file_name
        .strip_prefix(&prefix)?
        .strip_suffix(FRAME_EXTENSION)?
        .strip_suffix('.')?;
    if n.is_empty() || !n.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    n.parse().ok()
}

/// Keep frame files of `video_index` and sort them by frame number.
///
/// Lexical order would put `frame-10` before `frame-2`; callers rely on
/// frame N sitting at position N.
pub fn order_frame_files(video_index: usize, names: Vec<String>) -> Vec<String> {
    let mut numbered: Vec<(u64, String)> = names
        .into_iter()
        .filter_map(|name| frame_number(video_index, &name).map(|n| (n, name)))
        .collect();
    numbered.sort_by_key(|(n, _)| *n);
    numbered.into_iter().map(|(_, name)| name).collect()
}
