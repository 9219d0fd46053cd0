use crate::metrics::BitrateObservation;
use bitrate_analyzer_capture::{
    CaptureBackend,
    CaptureError,
    CaptureOutcome,
};
use bitrate_analyzer_config::{
    Config,
    StreamTarget,
};
use chrono::Utc;
use std::{
    path::Path,
    time::Duration,
};
use tokio_util::sync::CancellationToken;

/// Captures shorter or longer than this fraction of the requested segment
/// duration are failures, not observations.
const DURATION_TOLERANCE: f64 = 0.5;

/// Settings one sampling pass runs under.
#[derive(Debug, Clone)]
pub struct SamplerSettings {
    pub samples: usize,
    pub segment_duration: Duration,
    pub retry_attempts: usize,
    pub attempt_timeout: Duration,
    pub pause_between_samples: Duration,
}

impl SamplerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            samples: config.samples,
            segment_duration: config.segment_duration(),
            retry_attempts: config.retry_attempts,
            attempt_timeout: config.attempt_timeout(),
            pause_between_samples: config.pause_between_samples(),
        }
    }

    /// Upper bound on how long one sampling pass can take. The orchestrator
    /// budgets its run deadline against this.
    pub fn worst_case(&self) -> Duration {
        self.attempt_timeout * (self.samples * (self.retry_attempts + 1)) as u32
            + self.pause_between_samples * self.samples as u32
    }
}

/// Everything one sampling pass produced. Failed slots are counted, never
/// silently skipped.
#[derive(Debug, Clone)]
pub struct SampleRun {
    pub observations: Vec<BitrateObservation>,
    pub failed_slots: usize,
    pub last_failure: Option<CaptureError>,
}

/// Drives `backend` through `settings.samples` independent sample slots
/// against one target. Retries stay on the same slot; a slot whose retries
/// are exhausted contributes no observation and is recorded as failed.
pub async fn sample(
    target: &StreamTarget,
    backend: &dyn CaptureBackend,
    settings: &SamplerSettings,
    scratch_dir: &Path,
    cancel: &CancellationToken,
) -> SampleRun {
    let mut observations = Vec::with_capacity(settings.samples);
    let mut failed_slots = 0;
    let mut last_failure = None;

    for slot in 0..settings.samples {
        if cancel.is_cancelled() {
            failed_slots += 1;
            last_failure = Some(CaptureError::Timeout {
                limit: settings.attempt_timeout,
            });
            continue;
        }

        if slot > 0 && !settings.pause_between_samples.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(settings.pause_between_samples) => {}
                _ = cancel.cancelled() => {}
            }
        }

        match capture_slot(target, backend, settings, slot, scratch_dir, cancel).await {
            Ok(observation) => {
                info!(
                    stream = %target.name,
                    slot,
                    measured_bps = observation.measured_bps,
                    "accepted sample"
                );
                observations.push(observation);
            }
            Err(err) => {
                warn!(stream = %target.name, slot, error = %err, "sample slot exhausted");
                failed_slots += 1;
                last_failure = Some(err);
            }
        }
    }

    SampleRun {
        observations,
        failed_slots,
        last_failure,
    }
}

/// One slot: up to `retry_attempts + 1` capture calls with backoff between
/// them.
async fn capture_slot(
    target: &StreamTarget,
    backend: &dyn CaptureBackend,
    settings: &SamplerSettings,
    slot: usize,
    scratch_dir: &Path,
    cancel: &CancellationToken,
) -> Result<BitrateObservation, CaptureError> {
    let mut backoff = maybe_backoff::MaybeBackoff::default();
    let mut attempt = 0;
    loop {
        backoff.sleep().await;
        match capture_once(target, backend, settings, slot, scratch_dir, cancel).await {
            Ok(observation) => return Ok(observation),
            Err(_) if attempt < settings.retry_attempts && !cancel.is_cancelled() => {
                attempt += 1;
                backoff.arm();
                warn!(stream = %target.name, slot, attempt, "capture attempt failed, retrying...");
            }
            Err(err) => return Err(err),
        }
    }
}

async fn capture_once(
    target: &StreamTarget,
    backend: &dyn CaptureBackend,
    settings: &SamplerSettings,
    slot: usize,
    scratch_dir: &Path,
    cancel: &CancellationToken,
) -> Result<BitrateObservation, CaptureError> {
    let outcome = tokio::select! {
        outcome = backend.capture(target, settings.segment_duration, settings.attempt_timeout, scratch_dir) => outcome,
        _ = cancel.cancelled() => CaptureOutcome::Failure(CaptureError::Timeout {
            limit: settings.attempt_timeout,
        }),
    };

    let (bytes_captured, elapsed, declared_bitrate_bps) = match outcome {
        CaptureOutcome::Success {
            bytes_captured,
            elapsed,
            declared_bitrate_bps,
        } => (bytes_captured, elapsed, declared_bitrate_bps),
        CaptureOutcome::Failure(err) => return Err(err),
    };

    let requested_secs = settings.segment_duration.as_secs_f64();
    let actual_secs = elapsed.as_secs_f64();
    if (actual_secs - requested_secs).abs() > requested_secs * DURATION_TOLERANCE {
        return Err(CaptureError::DurationMismatch {
            actual_secs,
            requested_secs,
        });
    }

    Ok(BitrateObservation {
        measured_bps: bytes_captured as f64 * 8.0 / actual_secs,
        declared_bps: declared_bitrate_bps,
        sample_index: slot,
        timestamp: Utc::now(),
    })
}
