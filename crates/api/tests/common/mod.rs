#![allow(dead_code)]

use std::io::{Cursor, Read};
use std::path::Path;
use std::time::Duration;

use annotator_api::config::ServerConfig;
use annotator_api::router::build_app_router;
use annotator_api::state::AppState;
use annotator_core::ffmpeg::FfmpegConfig;
use annotator_core::session::SessionConfig;
use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

pub const SESSION_HEADER: &str = "x-session-id";

const BOUNDARY: &str = "annotator-test-boundary";

/// Build a test `ServerConfig` with safe defaults rooted at `scratch`.
pub fn test_config(scratch: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:4200".to_string()],
        request_timeout_secs: 30,
        max_upload_bytes: 64 * 1024 * 1024,
        session: SessionConfig {
            ttl: Duration::from_secs(900),
            sweep_interval: Duration::from_secs(180),
            scratch_root: scratch.to_path_buf(),
        },
        ffmpeg: FfmpegConfig::default(),
    }
}

/// The application router plus the scratch directory backing it.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub scratch: TempDir,
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

/// Build the full application router with all middleware layers.
pub fn build_test_app() -> TestApp {
    build_test_app_with_ffmpeg(FfmpegConfig::default())
}

pub fn build_test_app_with_ffmpeg(ffmpeg: FfmpegConfig) -> TestApp {
    let scratch = tempfile::tempdir().unwrap();
    let mut config = test_config(scratch.path());
    config.ffmpeg = ffmpeg;
    let state = AppState::new(config.clone());
    let router = build_app_router(state.clone(), &config);
    TestApp {
        router,
        state,
        scratch,
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

pub fn get(uri: &str, session: &str) -> Request<Body> {
    Request::get(uri)
        .header(SESSION_HEADER, session)
        .body(Body::empty())
        .unwrap()
}

pub fn post_empty(uri: &str, session: Option<&str>) -> Request<Body> {
    let mut builder = Request::post(uri);
    if let Some(session) = session {
        builder = builder.header(SESSION_HEADER, session);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, session: &str, body: &serde_json::Value) -> Request<Body> {
    post_raw_json(uri, session, body.to_string())
}

pub fn post_raw_json(uri: &str, session: &str, body: String) -> Request<Body> {
    Request::post(uri)
        .header(SESSION_HEADER, session)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

pub fn delete(uri: &str, session: &str) -> Request<Body> {
    Request::delete(uri)
        .header(SESSION_HEADER, session)
        .body(Body::empty())
        .unwrap()
}

/// One part of a multipart body.
pub enum Part<'a> {
    File {
        name: &'a str,
        file_name: &'a str,
        data: &'a [u8],
    },
    Text {
        name: &'a str,
        value: &'a str,
    },
}

pub fn post_multipart(uri: &str, session: &str, parts: &[Part<'_>]) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::File {
                name,
                file_name,
                data,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
            Part::Text { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}")
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::post(uri)
        .header(SESSION_HEADER, session)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Assert an error response and return its JSON body.
pub async fn expect_error(response: Response<Body>, status: StatusCode, code: &str) -> serde_json::Value {
    assert_eq!(response.status(), status);
    let json = body_json(response).await;
    assert_eq!(json["code"], code, "unexpected body: {json}");
    json
}

/// Entries of a zip response body, in archive order.
pub async fn zip_entries(response: Response<Body>) -> Vec<(String, Vec<u8>)> {
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/zip"
    );
    let bytes = body_bytes(response).await;
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    (0..archive.len())
        .map(|i| {
            let mut file = archive.by_index(i).unwrap();
            let mut data = Vec::new();
            file.read_to_end(&mut data).unwrap();
            (file.name().to_string(), data)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A small RGBA PNG; `seed` varies the pixels.
pub fn png_bytes(seed: u8) -> Vec<u8> {
    let img = image::RgbaImage::from_fn(3, 2, |x, y| {
        image::Rgba([seed, x as u8 * 80, y as u8 * 120, 255])
    });
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

pub fn jpeg_bytes() -> Vec<u8> {
    let img = image::RgbImage::from_fn(8, 8, |x, y| image::Rgb([x as u8 * 30, y as u8 * 30, 60]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Jpeg)
        .unwrap();
    out.into_inner()
}

/// Start a session and return its id.
pub async fn start_session(app: &TestApp) -> String {
    let response = app.send(post_empty("/api/start-session", None)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    json["data"]["sessionId"].as_str().unwrap().to_string()
}

/// Upload PNGs named `0.png`, `1.png`, ... and return their ids in order.
pub async fn upload_pngs(app: &TestApp, session: &str, count: u8) -> Vec<String> {
    let images: Vec<(String, Vec<u8>)> = (0..count)
        .map(|i| (format!("{i}.png"), png_bytes(i)))
        .collect();
    let parts: Vec<Part<'_>> = images
        .iter()
        .map(|(name, data)| Part::File {
            name: "images",
            file_name: name,
            data,
        })
        .collect();

    let response = app
        .send(post_multipart("/api/upload-images", session, &parts))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    json["data"]["uploaded"]
        .as_array()
        .unwrap()
        .iter()
        .map(|img| img["id"].as_str().unwrap().to_string())
        .collect()
}
