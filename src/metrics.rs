use bitrate_analyzer_capture::BackendKind;
use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Deserialize,
    Serialize,
};

/// One accepted measurement for a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BitrateObservation {
    /// Bitrate computed from captured byte count and elapsed time.
    pub measured_bps: f64,
    /// Bitrate the stream metadata declared for this segment, if any.
    pub declared_bps: Option<f64>,
    /// Which sample slot produced this observation.
    pub sample_index: usize,
    pub timestamp: DateTime<Utc>,
}

/// Final per-stream result. Immutable once produced.
///
/// `no_data` entries carry a `failure_reason` instead of numbers; numeric
/// fields are never synthesized to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamStatistics {
    pub name: String,
    /// Stream URL with any password masked.
    pub url: String,
    pub used_backend: BackendKind,
    pub accepted: usize,
    pub discarded: usize,
    pub failed: usize,
    pub mean_bps: Option<f64>,
    pub std_dev_bps: Option<f64>,
    pub min_bps: Option<f64>,
    pub max_bps: Option<f64>,
    /// Most recent declared bitrate any observation carried.
    pub declared_bps: Option<f64>,
    /// Set when observations carried declared bitrates that disagree.
    pub declared_disagreement: bool,
    /// Set when there were too few observations to discard outliers.
    pub low_confidence: bool,
    pub no_data: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl StreamStatistics {
    /// Declared-vs-measured delta in bits per second, when both are known.
    pub fn declared_delta_bps(&self) -> Option<f64> {
        match (self.mean_bps, self.declared_bps) {
            (Some(mean), Some(declared)) => Some(mean - declared),
            _ => None,
        }
    }
}

/// The result of one full run: one entry per requested target, input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub generated_at: DateTime<Utc>,
    pub streams: Vec<StreamStatistics>,
}

impl AnalysisReport {
    pub fn new(streams: Vec<StreamStatistics>) -> Self {
        Self {
            generated_at: Utc::now(),
            streams,
        }
    }
}
