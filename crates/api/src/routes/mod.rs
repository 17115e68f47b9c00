pub mod health;

use axum::routing::{delete, get, post};
use axum::Router;

use crate::handlers::{export, images, session, video};
use crate::state::AppState;

/// Build the `/api` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /start-session                          create session (public)
/// /ping-session                           extend session
/// /end-session                            delete session and its images
///
/// /upload-images                          multipart `images` upload (POST)
/// /process-video                          multipart `files` + `frameRates` (POST)
///
/// /image/{id}                             raw image bytes
/// /image/{id}/metadata                    recorded shapes
/// /images?pageNumber=N                    zip of one page
/// /all-images                             zip of every image
/// /number-pages-total-images              image and page counts
/// /delete-image/{id}                      remove image (DELETE)
/// /add-metadata                           embed shapes (POST)
///
/// /export-image/{id}/{format}             zip of image + label
/// /export-all-images/{format}             zip of images/ + labels/
/// ```
///
/// Every route except `/start-session` requires the `x-session-id` header.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Session lifecycle
        .route("/start-session", post(session::start_session))
        .route("/ping-session", post(session::ping_session))
        .route("/end-session", post(session::end_session))
        // Ingestion
        .route("/upload-images", post(images::upload_images))
        .route("/process-video", post(video::process_video))
        // Images
        .route("/image/{id}", get(images::get_image))
        .route("/image/{id}/metadata", get(images::get_image_metadata))
        .route("/images", get(images::get_images_page))
        .route("/all-images", get(images::get_all_images))
        .route("/number-pages-total-images", get(images::count_images))
        .route("/delete-image/{id}", delete(images::delete_image))
        .route("/add-metadata", post(images::add_metadata))
        // Export
        .route("/export-image/{id}/{format}", get(export::export_image))
        .route("/export-all-images/{format}", get(export::export_all_images))
}
