use std::path::Path;
use tokio::process::Command;

/// Best-effort metadata read from a captured segment. Absent fields are not
/// errors; streams frequently declare nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct MediaProbe {
    /// Media duration of the captured file, in seconds.
    pub duration_secs: Option<f64>,
    /// Bitrate declared by stream/container metadata, in bits per second.
    pub declared_bitrate_bps: Option<f64>,
}

/// Runs ffprobe against a captured file.
pub(crate) async fn probe_media(ffprobe: &Path, media: &Path) -> MediaProbe {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "quiet",
            "-show_entries",
            "stream=codec_type,bit_rate",
            "-show_entries",
            "format=duration,bit_rate",
            "-of",
            "json",
        ])
        .arg(media)
        .output()
        .await;

    let output = match output {
        Ok(output) if output.status.success() => output,
        Ok(_) => {
            debug!(media = %media.display(), "ffprobe reported failure, skipping metadata");
            return MediaProbe::default();
        }
        Err(err) => {
            debug!(media = %media.display(), error = %err, "ffprobe invocation failed, skipping metadata");
            return MediaProbe::default();
        }
    };

    parse_probe_output(&String::from_utf8_lossy(&output.stdout))
}

/// Parses ffprobe `-of json` output. The declared bitrate is taken from the
/// video stream when present, falling back to the container value.
pub(crate) fn parse_probe_output(json: &str) -> MediaProbe {
    let mut probe = MediaProbe::default();

    let data: serde_json::Value = match serde_json::from_str(json) {
        Ok(data) => data,
        Err(err) => {
            debug!(error = %err, "failed to parse ffprobe output");
            return probe;
        }
    };

    let format = data.get("format");

    probe.duration_secs = format
        .and_then(|f| f.get("duration"))
        .and_then(|v| v.as_str())
        .filter(|v| *v != "N/A")
        .and_then(|v| v.parse::<f64>().ok());

    let stream_bit_rate = data
        .get("streams")
        .and_then(|s| s.as_array())
        .and_then(|streams| {
            streams
                .iter()
                .find(|s| s.get("codec_type").and_then(|v| v.as_str()) == Some("video"))
        })
        .and_then(|s| s.get("bit_rate"))
        .and_then(|v| v.as_str())
        .filter(|v| *v != "N/A")
        .and_then(|v| v.parse::<f64>().ok());

    probe.declared_bitrate_bps = stream_bit_rate.or_else(|| {
        format
            .and_then(|f| f.get("bit_rate"))
            .and_then(|v| v.as_str())
            .filter(|v| *v != "N/A")
            .and_then(|v| v.parse::<f64>().ok())
    });

    probe
}
