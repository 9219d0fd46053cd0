use crate::metrics::{
    AnalysisReport,
    StreamStatistics,
};
use eyre::{
    Context as _,
    Result,
};
use std::path::Path;

/// Writes the per-stream CSV report, one row per requested target, including
/// the ones that produced no data.
pub fn write_csv(report: &AnalysisReport, path: &Path) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).wrap_err_with(|| format!("failed to create {}", path.display()))?;

    writer.write_record([
        "name",
        "url",
        "backend",
        "accepted",
        "discarded",
        "failed",
        "mean_kbps",
        "std_dev_kbps",
        "min_kbps",
        "max_kbps",
        "declared_kbps",
        "low_confidence",
        "failure_reason",
    ])?;

    for stream in &report.streams {
        writer.write_record([
            stream.name.clone(),
            stream.url.clone(),
            stream.used_backend.to_string(),
            stream.accepted.to_string(),
            stream.discarded.to_string(),
            stream.failed.to_string(),
            kbps(stream.mean_bps),
            kbps(stream.std_dev_bps),
            kbps(stream.min_bps),
            kbps(stream.max_bps),
            kbps(stream.declared_bps),
            stream.low_confidence.to_string(),
            stream.failure_reason.clone().unwrap_or_default(),
        ])?;
    }

    writer.flush().wrap_err("failed to flush CSV report")?;
    Ok(())
}

/// Exports the whole report as pretty JSON.
pub async fn write_json(report: &AnalysisReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    tokio::fs::write(path, json)
        .await
        .wrap_err_with(|| format!("failed to write {}", path.display()))
}

/// Renders the stdout summary.
pub fn format_summary(report: &AnalysisReport) -> String {
    let mut out = String::new();

    out.push_str(&format!("\n{}\n", "=".repeat(80)));
    out.push_str(&format!("{:^80}\n", "STREAM BITRATE REPORT"));
    out.push_str(&format!("{}\n", "=".repeat(80)));
    out.push_str(&format!(
        "Generated: {}\n",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    for stream in &report.streams {
        out.push_str(&format!("\n{} ({})\n", stream.name, stream.url));
        out.push_str(&format_stream(stream));
    }

    out.push_str(&format!("\n{}\n", "=".repeat(80)));
    out
}

fn format_stream(stream: &StreamStatistics) -> String {
    if stream.no_data {
        return format!(
            "  no data ({})\n  samples failed: {}\n",
            stream.failure_reason.as_deref().unwrap_or("unknown"),
            stream.failed
        );
    }

    let mut out = format!(
        "  mean: {} kbps (std dev {}, min {}, max {}) via {}\n  samples: {} accepted, {} discarded, {} failed\n",
        kbps(stream.mean_bps),
        kbps(stream.std_dev_bps),
        kbps(stream.min_bps),
        kbps(stream.max_bps),
        stream.used_backend,
        stream.accepted,
        stream.discarded,
        stream.failed,
    );
    if let Some(declared) = stream.declared_bps {
        out.push_str(&format!("  declared: {:.2} kbps", declared / 1000.0));
        if let Some(delta) = stream.declared_delta_bps() {
            out.push_str(&format!(" (measured - declared: {:.2} kbps)", delta / 1000.0));
        }
        if stream.declared_disagreement {
            out.push_str(" [observations disagreed]");
        }
        out.push('\n');
    }
    if stream.low_confidence {
        out.push_str("  low confidence: too few samples to discard outliers\n");
    }
    out
}

fn kbps(bps: Option<f64>) -> String {
    bps.map(|bps| format!("{:.2}", bps / 1000.0)).unwrap_or_default()
}

#[cfg(test)]
mod test {
    use super::*;
    use bitrate_analyzer_capture::BackendKind;
    use pretty_assertions::assert_eq;

    fn healthy() -> StreamStatistics {
        StreamStatistics {
            name: "lobby".to_string(),
            url: "rtsp://cam.example.com/live".to_string(),
            used_backend: BackendKind::RawCopy,
            accepted: 3,
            discarded: 2,
            failed: 0,
            mean_bps: Some(1_000_000.0),
            std_dev_bps: Some(0.0),
            min_bps: Some(1_000_000.0),
            max_bps: Some(1_000_000.0),
            declared_bps: Some(1_100_000.0),
            declared_disagreement: false,
            low_confidence: false,
            no_data: false,
            failure_reason: None,
        }
    }

    fn dead() -> StreamStatistics {
        StreamStatistics {
            name: "basement".to_string(),
            url: "rtsp://dark.example.com/live".to_string(),
            used_backend: BackendKind::RawCopy,
            accepted: 0,
            discarded: 0,
            failed: 5,
            mean_bps: None,
            std_dev_bps: None,
            min_bps: None,
            max_bps: None,
            declared_bps: None,
            declared_disagreement: false,
            low_confidence: true,
            no_data: true,
            failure_reason: Some("connection failed: refused".to_string()),
        }
    }

    #[test]
    fn csv_has_one_row_per_target_including_no_data() {
        let report = AnalysisReport::new(vec![healthy(), dead()]);
        let dir = temp_dir::TempDir::new().unwrap();
        let path = dir.path().join("report.csv");

        write_csv(&report, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("name,url,backend"));
        assert!(lines[1].contains("lobby"));
        assert!(lines[1].contains("1000.00"));
        assert!(lines[2].contains("basement"));
        assert!(lines[2].contains("connection failed: refused"));
    }

    #[test]
    fn summary_mentions_every_stream_and_failure_reason() {
        let report = AnalysisReport::new(vec![healthy(), dead()]);
        let summary = format_summary(&report);
        assert!(summary.contains("lobby"));
        assert!(summary.contains("mean: 1000.00 kbps"));
        assert!(summary.contains("basement"));
        assert!(summary.contains("no data (connection failed: refused)"));
    }
}
