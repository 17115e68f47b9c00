//! FFmpeg/FFprobe command utilities.
//!
//! The service never decodes video itself: it shells out to `ffprobe` for
//! the native frame rate and to `ffmpeg` for frame extraction (see
//! [`crate::frames`]). Binary names are configurable so deployments can
//! point at a bundled build.

use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::CoreError;

/// Requested rates are quantized to this many steps per frame.
const REQUESTED_RATE_SCALE: u64 = 1000;

/// Longest fractional part accepted in a decimal probe value.
const MAX_DECIMAL_DIGITS: usize = 9;

/// Error type for FFmpeg/FFprobe operations.
#[derive(Debug, thiserror::Error)]
pub enum FfmpegError {
    #[error("ffprobe/ffmpeg binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("ffprobe failed (exit code {exit_code:?}): {stderr}")]
    ProbeFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("ffmpeg frame extraction failed (exit code {exit_code:?}): {stderr}")]
    DecodeFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to parse ffprobe output: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("video file not found: {0}")]
    VideoNotFound(String),
}

/// Locations of the external media tools.
#[derive(Debug, Clone)]
pub struct FfmpegConfig {
    pub ffmpeg_bin: PathBuf,
    pub ffprobe_bin: PathBuf,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            ffprobe_bin: PathBuf::from("ffprobe"),
        }
    }
}

// ---------------------------------------------------------------------------
// Frame rates
// ---------------------------------------------------------------------------

/// An exact, strictly positive frame rate stored as a reduced fraction.
///
/// ffprobe reports rates such as `30000/1001`; keeping them rational means
/// capping a requested rate never rounds above the source rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRate {
    num: u64,
    den: u64,
}

impl FrameRate {
    /// Build a rate from a fraction. Returns `None` when either part is zero.
    pub fn new(num: u64, den: u64) -> Option<Self> {
        if num == 0 || den == 0 {
            return None;
        }
        let g = gcd(num, den);
        Some(Self {
            num: num / g,
            den: den / g,
        })
    }

    /// Convert a client-requested frames-per-second value.
    ///
    /// The value is quantized to 1/1000 fps and must be finite and positive.
    pub fn from_fps(fps: f64) -> Result<Self, CoreError> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(CoreError::Validation(format!(
                "frame rate must be a positive number, got {fps}"
            )));
        }
        let scaled = (fps * REQUESTED_RATE_SCALE as f64).round();
        if scaled < 1.0 || scaled > u32::MAX as f64 {
            return Err(CoreError::Validation(format!(
                "frame rate {fps} is out of range"
            )));
        }
        Self::new(scaled as u64, REQUESTED_RATE_SCALE)
            .ok_or_else(|| CoreError::Validation(format!("frame rate {fps} is out of range")))
    }

    pub fn numerator(&self) -> u64 {
        self.num
    }

    pub fn denominator(&self) -> u64 {
        self.den
    }

    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl Ord for FrameRate {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.num as u128 * other.den as u128).cmp(&(other.num as u128 * self.den as u128))
    }
}

impl PartialOrd for FrameRate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Rendered in the form ffmpeg's `fps` filter accepts (`30000/1001`, `25`).
impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

/// Rate to extract at: the requested rate, capped at the source's native rate.
pub fn effective_frame_rate(requested: FrameRate, intrinsic: FrameRate) -> FrameRate {
    requested.min(intrinsic)
}

/// Parse an ffprobe rate value.
///
/// Accepted grammar: `digits`, `digits.digits` or `digits/digits`. Anything
/// else, including zero rates and zero denominators, is an error.
pub fn parse_frame_rate(raw: &str) -> Result<FrameRate, FfmpegError> {
    let s = raw.trim();
    let invalid = || FfmpegError::ParseError(format!("invalid frame rate '{s}'"));

    let (num, den) = if let Some((n, d)) = s.split_once('/') {
        (parse_digits(n).ok_or_else(invalid)?, parse_digits(d).ok_or_else(invalid)?)
    } else if let Some((int, frac)) = s.split_once('.') {
        if frac.len() > MAX_DECIMAL_DIGITS {
            return Err(invalid());
        }
        let int = parse_digits(int).ok_or_else(invalid)?;
        let frac_value = parse_digits(frac).ok_or_else(invalid)?;
        let den = 10u64.pow(frac.len() as u32);
        let num = int
            .checked_mul(den)
            .and_then(|v| v.checked_add(frac_value))
            .ok_or_else(invalid)?;
        (num, den)
    } else {
        (parse_digits(s).ok_or_else(invalid)?, 1)
    };

    FrameRate::new(num, den).ok_or_else(invalid)
}

fn parse_digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

// ---------------------------------------------------------------------------
// Probe
// ---------------------------------------------------------------------------

/// Query the native frame rate of the first video stream.
pub async fn probe_frame_rate(
    config: &FfmpegConfig,
    video_path: &Path,
) -> Result<FrameRate, FfmpegError> {
    if !video_path.exists() {
        return Err(FfmpegError::VideoNotFound(
            video_path.to_string_lossy().to_string(),
        ));
    }

    let output = tokio::process::Command::new(&config.ffprobe_bin)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=r_frame_rate",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(video_path)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(FfmpegError::NotFound)?;

    if !output.status.success() {
        return Err(FfmpegError::ProbeFailed {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| FfmpegError::ParseError("ffprobe reported no video stream".into()))?;

    parse_frame_rate(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parse_integer_rate() {
        assert_eq!(parse_frame_rate("25").unwrap(), FrameRate::new(25, 1).unwrap());
    }

    #[test]
    fn parse_ntsc_fraction() {
        let rate = parse_frame_rate("30000/1001\n").unwrap();
        assert_eq!(rate.numerator(), 30000);
        assert_eq!(rate.denominator(), 1001);
        assert!((rate.as_f64() - 29.97).abs() < 0.01);
    }

    #[test]
    fn parse_reduces_fraction() {
        assert_eq!(parse_frame_rate("60/2").unwrap().to_string(), "30");
    }

    #[test]
    fn parse_decimal_rate() {
        let rate = parse_frame_rate("29.97").unwrap();
        assert_eq!(rate, FrameRate::new(2997, 100).unwrap());
    }

    #[test]
    fn parse_rejects_zero_denominator() {
        assert_matches!(parse_frame_rate("30/0"), Err(FfmpegError::ParseError(_)));
    }

    #[test]
    fn parse_rejects_zero_rate() {
        assert_matches!(parse_frame_rate("0/0"), Err(FfmpegError::ParseError(_)));
        assert_matches!(parse_frame_rate("0"), Err(FfmpegError::ParseError(_)));
    }

    #[test]
    fn parse_rejects_expressions() {
        for raw in ["", "N/A", "30000/1001*2", "process.exit()", "1e3", "-30", " / ", "29.", ".5"] {
            assert_matches!(
                parse_frame_rate(raw),
                Err(FfmpegError::ParseError(_)),
                "accepted {raw:?}"
            );
        }
    }

    #[test]
    fn parse_rejects_overflow() {
        assert_matches!(
            parse_frame_rate("99999999999999999999999/1"),
            Err(FfmpegError::ParseError(_))
        );
    }

    #[test]
    fn from_fps_quantizes() {
        assert_eq!(FrameRate::from_fps(0.5).unwrap(), FrameRate::new(1, 2).unwrap());
        assert_eq!(FrameRate::from_fps(60.0).unwrap().to_string(), "60");
    }

    #[test]
    fn from_fps_rejects_non_positive() {
        assert_matches!(FrameRate::from_fps(0.0), Err(CoreError::Validation(_)));
        assert_matches!(FrameRate::from_fps(-1.0), Err(CoreError::Validation(_)));
        assert_matches!(FrameRate::from_fps(f64::NAN), Err(CoreError::Validation(_)));
        assert_matches!(FrameRate::from_fps(0.0001), Err(CoreError::Validation(_)));
    }

    #[test]
    fn effective_rate_is_capped_by_intrinsic() {
        let intrinsic = parse_frame_rate("30000/1001").unwrap();
        let effective = effective_frame_rate(FrameRate::from_fps(60.0).unwrap(), intrinsic);
        assert_eq!(effective, intrinsic);
        assert!((effective.as_f64() - 29.97).abs() < 0.01);
        assert_eq!(effective.to_string(), "30000/1001");
    }

    #[test]
    fn effective_rate_keeps_lower_request() {
        let intrinsic = parse_frame_rate("30/1").unwrap();
        let requested = FrameRate::from_fps(2.0).unwrap();
        assert_eq!(effective_frame_rate(requested, intrinsic), requested);
    }

    #[test]
    fn effective_rate_never_exceeds_intrinsic() {
        let intrinsics = ["24000/1001", "25", "30000/1001", "50", "60000/1001", "1/3"];
        let requests = [0.1, 1.0, 23.976, 24.0, 29.97, 30.0, 59.94, 120.0];
        for raw in intrinsics {
            let m = parse_frame_rate(raw).unwrap();
            for r in requests {
                let r = FrameRate::from_fps(r).unwrap();
                let e = effective_frame_rate(r, m);
                assert!(e <= m);
                assert_eq!(e, std::cmp::min(r, m));
            }
        }
    }

    #[tokio::test]
    async fn probe_missing_video_is_an_error() {
        let err = probe_frame_rate(&FfmpegConfig::default(), Path::new("/no/such/video.mp4"))
            .await
            .unwrap_err();
        assert_matches!(err, FfmpegError::VideoNotFound(_));
    }
}
