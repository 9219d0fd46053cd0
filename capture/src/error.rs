use std::time::Duration;

/// Failure of one capture attempt. Always travels as a value inside
/// [`CaptureOutcome`](crate::CaptureOutcome); retry policy lives with the
/// caller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CaptureError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("authentication rejected: {0}")]
    Authentication(String),
    #[error("capture timed out after {limit:?}")]
    Timeout { limit: Duration },
    #[error("capture produced no data")]
    EmptyCapture,
    #[error("captured segment lasted {actual_secs:.2}s, outside tolerance of the requested {requested_secs:.2}s")]
    DurationMismatch { actual_secs: f64, requested_secs: f64 },
    #[error("capture tool failed: {0}")]
    Tool(String),
}

/// No backend could be selected. Fatal to the whole run; surfaced before any
/// network activity starts.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("no usable capture tool: ffmpeg was not found on PATH")]
    ToolUnavailable,
    #[error("capture tool probe failed: {0}")]
    Io(#[from] std::io::Error),
}
