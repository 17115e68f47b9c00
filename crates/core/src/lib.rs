//! Domain logic for the annotation media service.
//!
//! Everything here is transport-agnostic: the HTTP layer in `annotator-api`
//! parses requests into these types and maps [`error::CoreError`] onto
//! responses.

pub mod archive;
pub mod error;
pub mod export;
pub mod ffmpeg;
pub mod frames;
pub mod ingest;
pub mod metadata;
pub mod session;
pub mod shapes;
pub mod types;
