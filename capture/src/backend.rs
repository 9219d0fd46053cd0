use crate::{
    error::CaptureError,
    metadata,
};
use async_trait::async_trait;
use bitrate_analyzer_config::StreamTarget;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    path::{
        Path,
        PathBuf,
    },
    process::Stdio,
    time::{
        Duration,
        Instant,
    },
};
use tokio::process::Command;

/// Which capture strategy produced a measurement.
///
/// Re-encode numbers are systematically inflated (up to ~2-3x the raw network
/// bitrate) and must not be compared against raw-copy numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum BackendKind {
    #[serde(rename = "raw-copy")]
    #[strum(serialize = "raw-copy")]
    RawCopy,
    #[serde(rename = "re-encode")]
    #[strum(serialize = "re-encode")]
    Reencode,
}

/// Outcome of one capture attempt. Every attempt resolves to a value; no
/// error escapes the backend boundary.
#[derive(Debug, Clone)]
pub enum CaptureOutcome {
    Success {
        bytes_captured: u64,
        elapsed: Duration,
        declared_bitrate_bps: Option<f64>,
    },
    Failure(CaptureError),
}

#[async_trait]
pub trait CaptureBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Captures one segment of `target` into `scratch_dir`, bounded by
    /// `timeout`. `timeout` must be strictly greater than `segment_duration`;
    /// a stalled stream never blocks past it.
    async fn capture(
        &self,
        target: &StreamTarget,
        segment_duration: Duration,
        timeout: Duration,
        scratch_dir: &Path,
    ) -> CaptureOutcome;
}

/// Copies incoming stream packets verbatim into a scratch file. No
/// re-encoding, highest fidelity.
pub struct RawCopyBackend {
    ffmpeg: PathBuf,
    ffprobe: Option<PathBuf>,
}

impl RawCopyBackend {
    pub fn new(ffmpeg: PathBuf, ffprobe: Option<PathBuf>) -> Self {
        Self { ffmpeg, ffprobe }
    }
}

#[async_trait]
impl CaptureBackend for RawCopyBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::RawCopy
    }

    async fn capture(
        &self,
        target: &StreamTarget,
        segment_duration: Duration,
        timeout: Duration,
        scratch_dir: &Path,
    ) -> CaptureOutcome {
        let outfile = scratch_dir.join("segment.ts");
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-hide_banner", "-nostdin", "-y", "-loglevel", "error"]);
        if target.url.scheme() == "rtsp" {
            cmd.args(["-rtsp_transport", "tcp"]);
        }
        cmd.args(["-i", target.url.as_str()])
            .args(["-t", &format!("{:.3}", segment_duration.as_secs_f64())])
            .args(["-map", "0", "-c", "copy", "-f", "mpegts"])
            .arg(&outfile);

        debug!(stream = %target.name, "starting raw-copy capture");
        let wall = match run_capture_process(cmd, timeout).await {
            Ok(wall) => wall,
            Err(err) => return CaptureOutcome::Failure(err),
        };

        finish_capture(&outfile, self.ffprobe.as_deref(), segment_duration, wall, true).await
    }
}

/// Decodes and re-encodes the stream, deriving bitrate from the resulting
/// file size. Fallback only: the transcode inflates sizes well above the raw
/// network bitrate, so results carry [`BackendKind::Reencode`].
pub struct ReencodeBackend {
    ffmpeg: PathBuf,
    ffprobe: Option<PathBuf>,
}

impl ReencodeBackend {
    pub fn new(ffmpeg: PathBuf, ffprobe: Option<PathBuf>) -> Self {
        Self { ffmpeg, ffprobe }
    }
}

#[async_trait]
impl CaptureBackend for ReencodeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Reencode
    }

    async fn capture(
        &self,
        target: &StreamTarget,
        segment_duration: Duration,
        timeout: Duration,
        scratch_dir: &Path,
    ) -> CaptureOutcome {
        let outfile = scratch_dir.join("segment.mkv");
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-hide_banner", "-nostdin", "-y", "-loglevel", "error"]);
        if target.url.scheme() == "rtsp" {
            cmd.args(["-rtsp_transport", "tcp"]);
        }
        cmd.args(["-i", target.url.as_str()])
            .args(["-t", &format!("{:.3}", segment_duration.as_secs_f64())])
            .args(["-c:v", "libx264", "-preset", "ultrafast", "-c:a", "aac"])
            .args(["-f", "matroska"])
            .arg(&outfile);

        debug!(stream = %target.name, "starting re-encode capture");
        let wall = match run_capture_process(cmd, timeout).await {
            Ok(wall) => wall,
            Err(err) => return CaptureOutcome::Failure(err),
        };

        // Declared metadata does not survive a transcode.
        finish_capture(&outfile, self.ffprobe.as_deref(), segment_duration, wall, false).await
    }
}

/// Spawns the capture process and waits for it, killing it if `limit`
/// expires. Returns the wall-clock time spent.
async fn run_capture_process(mut cmd: Command, limit: Duration) -> Result<Duration, CaptureError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let started = Instant::now();
    let child = cmd
        .spawn()
        .map_err(|err| CaptureError::Tool(format!("failed to spawn capture process: {err}")))?;

    let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => return Err(CaptureError::Tool(format!("capture process failed: {err}"))),
        Err(_) => return Err(CaptureError::Timeout { limit }),
    };

    if !output.status.success() {
        return Err(classify_stderr(&String::from_utf8_lossy(&output.stderr)));
    }
    Ok(started.elapsed())
}

/// Sizes up the scratch file and attaches metadata. `elapsed` prefers the
/// media-reported duration; without ffprobe it falls back to the requested
/// window capped by wall-clock time.
async fn finish_capture(
    outfile: &Path,
    ffprobe: Option<&Path>,
    segment_duration: Duration,
    wall: Duration,
    keep_declared: bool,
) -> CaptureOutcome {
    let bytes_captured = match tokio::fs::metadata(outfile).await {
        Ok(meta) => meta.len(),
        Err(_) => 0,
    };
    if bytes_captured == 0 {
        return CaptureOutcome::Failure(CaptureError::EmptyCapture);
    }

    let probe = match ffprobe {
        Some(ffprobe) => metadata::probe_media(ffprobe, outfile).await,
        None => Default::default(),
    };

    let elapsed = probe
        .duration_secs
        .map(Duration::from_secs_f64)
        .unwrap_or_else(|| segment_duration.min(wall));

    CaptureOutcome::Success {
        bytes_captured,
        elapsed,
        declared_bitrate_bps: if keep_declared { probe.declared_bitrate_bps } else { None },
    }
}

/// Maps the stderr of a failed capture process onto the failure taxonomy.
fn classify_stderr(stderr: &str) -> CaptureError {
    let tail = stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("unknown error")
        .to_string();
    let lower = stderr.to_ascii_lowercase();

    if lower.contains("401") || lower.contains("unauthorized") || lower.contains("authorization failed") {
        CaptureError::Authentication(tail)
    } else if lower.contains("connection refused")
        || lower.contains("connection timed out")
        || lower.contains("no route to host")
        || lower.contains("network is unreachable")
        || lower.contains("failed to resolve")
        || lower.contains("name or service not known")
    {
        CaptureError::Connection(tail)
    } else {
        CaptureError::Tool(tail)
    }
}
