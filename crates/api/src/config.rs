use std::path::PathBuf;
use std::time::Duration;

use annotator_core::ffmpeg::FfmpegConfig;
use annotator_core::session::SessionConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `300`). Video requests wait
    /// on ffmpeg, so this is generous.
    pub request_timeout_secs: u64,
    /// Largest accepted request body in bytes (default: 1 GiB).
    pub max_upload_bytes: usize,
    /// Session lifetime, sweep period and scratch location.
    pub session: SessionConfig,
    /// External media tools.
    pub ffmpeg: FfmpegConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:4200`    |
    /// | `REQUEST_TIMEOUT_SECS` | `300`                      |
    /// | `MAX_UPLOAD_BYTES`     | `1073741824`               |
    /// | `SESSION_TTL_MS`       | `900000`                   |
    /// | `SWEEP_INTERVAL_MS`    | `180000`                   |
    /// | `SCRATCH_DIR`          | OS temp directory          |
    /// | `FFMPEG_BIN`           | `ffmpeg`                   |
    /// | `FFPROBE_BIN`          | `ffprobe`                  |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:4200".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "300".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let max_upload_bytes: usize = std::env::var("MAX_UPLOAD_BYTES")
            .unwrap_or_else(|_| "1073741824".into())
            .parse()
            .expect("MAX_UPLOAD_BYTES must be a valid usize");

        let ttl_ms: u64 = std::env::var("SESSION_TTL_MS")
            .unwrap_or_else(|_| "900000".into())
            .parse()
            .expect("SESSION_TTL_MS must be a valid u64");

        let sweep_ms: u64 = std::env::var("SWEEP_INTERVAL_MS")
            .unwrap_or_else(|_| "180000".into())
            .parse()
            .expect("SWEEP_INTERVAL_MS must be a valid u64");
        assert!(sweep_ms > 0, "SWEEP_INTERVAL_MS must be greater than zero");

        let scratch_root = std::env::var("SCRATCH_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir());

        let defaults = FfmpegConfig::default();
        let ffmpeg = FfmpegConfig {
            ffmpeg_bin: std::env::var("FFMPEG_BIN")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffmpeg_bin),
            ffprobe_bin: std::env::var("FFPROBE_BIN")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffprobe_bin),
        };

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            max_upload_bytes,
            session: SessionConfig {
                ttl: Duration::from_millis(ttl_ms),
                sweep_interval: Duration::from_millis(sweep_ms),
                scratch_root,
            },
            ffmpeg,
        }
    }
}
