use crate::{
    filter::FilterOutcome,
    metrics::StreamStatistics,
};
use bitrate_analyzer_capture::BackendKind;
use bitrate_analyzer_config::StreamTarget;

/// Relative spread above which declared bitrates count as disagreeing.
const DECLARED_DISAGREEMENT_TOLERANCE: f64 = 0.01;

/// Reduces the filtered observations for one stream into its final
/// statistics. An empty kept set produces a `no_data` entry; numeric fields
/// stay `None` rather than turning into synthetic zeros.
///
/// The standard deviation is the sample standard deviation (divide by n-1);
/// a single observation reports 0.0, not an absent value.
pub fn aggregate(
    target: &StreamTarget,
    filtered: &FilterOutcome,
    failed: usize,
    used_backend: BackendKind,
    failure_reason: Option<String>,
) -> StreamStatistics {
    let kept = &filtered.kept;
    if kept.is_empty() {
        return no_data_statistics(
            target,
            used_backend,
            failed,
            failure_reason.unwrap_or_else(|| "no successful captures".to_string()),
        );
    }

    let values: Vec<f64> = kept.iter().map(|o| o.measured_bps).collect();
    let n = values.len();
    let mean = values.iter().sum::<f64>() / n as f64;
    let std_dev = if n > 1 {
        (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
    } else {
        0.0
    };
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let declared: Vec<f64> = kept.iter().filter_map(|o| o.declared_bps).collect();
    let declared_bps = declared.last().copied();
    let declared_disagreement = match (
        declared.iter().copied().fold(f64::INFINITY, f64::min),
        declared.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    ) {
        (lo, hi) if declared.len() > 1 => (hi - lo) / hi > DECLARED_DISAGREEMENT_TOLERANCE,
        _ => false,
    };
    if declared_disagreement {
        warn!(
            stream = %target.name,
            "observations declared different bitrates, reporting the most recent one"
        );
    }

    StreamStatistics {
        name: target.name.clone(),
        url: target.redacted_url(),
        used_backend,
        accepted: n,
        discarded: filtered.discarded,
        failed,
        mean_bps: Some(mean),
        std_dev_bps: Some(std_dev),
        min_bps: Some(min),
        max_bps: Some(max),
        declared_bps,
        declared_disagreement,
        low_confidence: filtered.low_confidence,
        no_data: false,
        failure_reason: None,
    }
}

/// A statistics entry for a stream that produced nothing. The report must
/// enumerate every requested target, so these replace silent omission.
pub fn no_data_statistics(
    target: &StreamTarget,
    used_backend: BackendKind,
    failed: usize,
    reason: String,
) -> StreamStatistics {
    StreamStatistics {
        name: target.name.clone(),
        url: target.redacted_url(),
        used_backend,
        accepted: 0,
        discarded: 0,
        failed,
        mean_bps: None,
        std_dev_bps: None,
        min_bps: None,
        max_bps: None,
        declared_bps: None,
        declared_disagreement: false,
        low_confidence: true,
        no_data: true,
        failure_reason: Some(reason),
    }
}
