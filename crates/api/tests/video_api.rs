//! Integration tests for `/api/process-video`.
//!
//! ffprobe and ffmpeg are replaced by shell scripts so the tests control
//! the reported frame rate and the frames written.

mod common;

use axum::http::StatusCode;
use common::{body_json, build_test_app, expect_error, post_multipart, start_session, Part};

#[cfg(unix)]
mod fake_tools {
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    use annotator_core::ffmpeg::FfmpegConfig;

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// ffprobe reporting `rate`; ffmpeg writing `frames` numbered outputs.
    pub fn working(dir: &Path, rate: &str, frames: u32) -> FfmpegConfig {
        let ffprobe = write_script(dir, "ffprobe", &format!("echo '{rate}'"));
        let ffmpeg = write_script(
            dir,
            "ffmpeg",
            &format!(
                r#"for last; do :; done
n={frames}
while [ "$n" -gt 0 ]; do
  out=$(printf '%s' "$last" | sed "s/%d/$n/")
  printf 'frame %s' "$n" > "$out"
  n=$((n - 1))
done"#
            ),
        );
        FfmpegConfig {
            ffmpeg_bin: ffmpeg,
            ffprobe_bin: ffprobe,
        }
    }

    pub fn failing_decode(dir: &Path) -> FfmpegConfig {
        let ffprobe = write_script(dir, "ffprobe", "echo '25/1'");
        let ffmpeg = write_script(dir, "ffmpeg", "echo 'moov atom not found' >&2\nexit 1");
        FfmpegConfig {
            ffmpeg_bin: ffmpeg,
            ffprobe_bin: ffprobe,
        }
    }
}

#[cfg(unix)]
#[tokio::test]
async fn frames_are_added_in_order_at_capped_rate() {
    let tools = tempfile::tempdir().unwrap();
    let app = common::build_test_app_with_ffmpeg(fake_tools::working(tools.path(), "30000/1001", 11));
    let session = start_session(&app).await;

    let response = app
        .send(post_multipart(
            "/api/process-video",
            &session,
            &[
                Part::File { name: "files", file_name: "clip.mp4", data: b"video" },
                Part::Text { name: "frameRates", value: "[60]" },
            ],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let video = &json["data"]["videos"][0];
    assert_eq!(video["videoIndex"], 0);
    assert_eq!(video["intrinsicFrameRate"], "30000/1001");
    let rate = video["frameRate"].as_f64().unwrap();
    assert!((rate - 29.97).abs() < 0.01, "rate {rate}");

    let frames = video["frames"].as_array().unwrap();
    assert_eq!(frames.len(), 11);
    for (i, frame) in frames.iter().enumerate() {
        assert_eq!(frame["fileName"], format!("frame-0-{i}.png"));
        assert!(frame["metadata"].is_null());
    }

    // Frame 10 sorts after frame 9, not after frame 1.
    let tenth = frames[9]["id"].as_str().unwrap();
    let bytes = common::body_bytes(app.send(common::get(&format!("/api/image/{tenth}"), &session)).await).await;
    assert_eq!(bytes, b"frame 10");
}

#[cfg(unix)]
#[tokio::test]
async fn frame_rate_count_must_match_files() {
    let tools = tempfile::tempdir().unwrap();
    let app = common::build_test_app_with_ffmpeg(fake_tools::working(tools.path(), "25", 1));
    let session = start_session(&app).await;

    let response = app
        .send(post_multipart(
            "/api/process-video",
            &session,
            &[
                Part::File { name: "files", file_name: "a.mp4", data: b"video" },
                Part::File { name: "files", file_name: "b.mp4", data: b"video" },
                Part::Text { name: "frameRates", value: "[1]" },
            ],
        ))
        .await;
    expect_error(response, StatusCode::BAD_REQUEST, "BAD_REQUEST").await;
}

#[cfg(unix)]
#[tokio::test]
async fn decode_failure_returns_diagnostics() {
    let tools = tempfile::tempdir().unwrap();
    let app = common::build_test_app_with_ffmpeg(fake_tools::failing_decode(tools.path()));
    let session = start_session(&app).await;

    let response = app
        .send(post_multipart(
            "/api/process-video",
            &session,
            &[
                Part::File { name: "files", file_name: "broken.mp4", data: b"video" },
                Part::Text { name: "frameRates", value: "[5]" },
            ],
        ))
        .await;
    let json = expect_error(response, StatusCode::INTERNAL_SERVER_ERROR, "DECODE_FAILED").await;
    assert!(json["error"].as_str().unwrap().contains("moov atom"));

    // Only the session directory is left in the scratch root.
    assert_eq!(std::fs::read_dir(app.scratch.path()).unwrap().count(), 1);
}

#[tokio::test]
async fn non_positive_frame_rate_is_rejected() {
    let app = build_test_app();
    let session = start_session(&app).await;

    let response = app
        .send(post_multipart(
            "/api/process-video",
            &session,
            &[
                Part::File { name: "files", file_name: "a.mp4", data: b"video" },
                Part::Text { name: "frameRates", value: "[0]" },
            ],
        ))
        .await;
    expect_error(response, StatusCode::BAD_REQUEST, "VALIDATION_ERROR").await;
}

#[tokio::test]
async fn missing_frame_rates_is_rejected() {
    let app = build_test_app();
    let session = start_session(&app).await;

    let response = app
        .send(post_multipart(
            "/api/process-video",
            &session,
            &[Part::File { name: "files", file_name: "a.mp4", data: b"video" }],
        ))
        .await;
    expect_error(response, StatusCode::BAD_REQUEST, "BAD_REQUEST").await;

    let response = app
        .send(post_multipart(
            "/api/process-video",
            &session,
            &[
                Part::File { name: "files", file_name: "a.mp4", data: b"video" },
                Part::Text { name: "frameRates", value: "fast" },
            ],
        ))
        .await;
    expect_error(response, StatusCode::BAD_REQUEST, "BAD_REQUEST").await;
}
