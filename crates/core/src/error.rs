use crate::ffmpeg::FfmpegError;
use crate::metadata::MetadataError;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid session ID: {0}")]
    InvalidSession(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Ffmpeg(#[from] FfmpegError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("Internal error: {0}")]
    Internal(String),
}
