use crate::{
    backend::{
        CaptureBackend,
        RawCopyBackend,
        ReencodeBackend,
    },
    error::ProbeError,
};
use std::{
    path::{
        Path,
        PathBuf,
    },
    sync::Arc,
};
use tokio::process::Command;

/// Finds capture tooling and selects the backend for this run.
///
/// Called once, before any network activity; the decision holds for every
/// stream in the run. Raw-copy is preferred, re-encode is the fallback, and
/// no ffmpeg at all is fatal.
pub async fn probe() -> Result<Arc<dyn CaptureBackend>, ProbeError> {
    let ffmpeg = find_binary(&["ffmpeg"]).ok_or(ProbeError::ToolUnavailable)?;
    let ffprobe = find_binary(&["ffprobe"]);
    if ffprobe.is_none() {
        warn!("ffprobe not found, declared bitrates will be unavailable");
    }

    if supports_raw_copy(&ffmpeg).await? {
        info!(ffmpeg = %ffmpeg.display(), "selected raw-copy capture backend");
        Ok(Arc::new(RawCopyBackend::new(ffmpeg, ffprobe)))
    } else {
        warn!(
            ffmpeg = %ffmpeg.display(),
            "raw-copy capture unavailable, falling back to re-encode; expect measured bitrates inflated by the transcode"
        );
        Ok(Arc::new(ReencodeBackend::new(ffmpeg, ffprobe)))
    }
}

fn find_binary(names: &[&str]) -> Option<PathBuf> {
    names.iter().find_map(|name| {
        which::which(name).ok().map(|path| {
            debug!(?path, "found {} at", name);
            path
        })
    })
}

/// The raw-copy path muxes copied packets into MPEG-TS; check the muxer is
/// compiled in.
async fn supports_raw_copy(ffmpeg: &Path) -> Result<bool, ProbeError> {
    let output = Command::new(ffmpeg).args(["-hide_banner", "-muxers"]).output().await?;
    if !output.status.success() {
        return Ok(false);
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout
        .lines()
        .any(|line| line.split_whitespace().nth(1) == Some("mpegts")))
}
