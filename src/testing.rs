//! Scripted capture backend for pipeline tests.

use async_trait::async_trait;
use bitrate_analyzer_capture::{
    BackendKind,
    CaptureBackend,
    CaptureError,
    CaptureOutcome,
};
use bitrate_analyzer_config::StreamTarget;
use std::{
    collections::{
        HashMap,
        VecDeque,
    },
    path::Path,
    sync::{
        atomic::{
            AtomicUsize,
            Ordering,
        },
        Mutex,
    },
    time::Duration,
};

pub(crate) fn success(bytes_captured: u64, elapsed_secs: f64) -> CaptureOutcome {
    CaptureOutcome::Success {
        bytes_captured,
        elapsed: Duration::from_secs_f64(elapsed_secs),
        declared_bitrate_bps: None,
    }
}

pub(crate) fn failure(error: CaptureError) -> CaptureOutcome {
    CaptureOutcome::Failure(error)
}

/// Replays a per-target script of outcomes; once a script runs dry the
/// default outcome repeats. Counts every capture call.
pub(crate) struct ScriptedBackend {
    script: Mutex<HashMap<String, VecDeque<CaptureOutcome>>>,
    default: CaptureOutcome,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedBackend {
    pub(crate) fn always(outcome: CaptureOutcome) -> Self {
        Self {
            script: Mutex::new(HashMap::new()),
            default: outcome,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_script(target_name: &str, outcomes: Vec<CaptureOutcome>) -> Self {
        let backend = Self::always(failure(CaptureError::EmptyCapture));
        backend.script(target_name, outcomes);
        backend
    }

    pub(crate) fn script(&self, target_name: &str, outcomes: Vec<CaptureOutcome>) {
        self.script
            .lock()
            .unwrap()
            .insert(target_name.to_string(), outcomes.into());
    }

    /// Every capture call sleeps this long first, for concurrency tests.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of captures that were ever running at once.
    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureBackend for ScriptedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::RawCopy
    }

    async fn capture(
        &self,
        target: &StreamTarget,
        _segment_duration: Duration,
        _timeout: Duration,
        _scratch_dir: &Path,
    ) -> CaptureOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let scripted = self
            .script
            .lock()
            .unwrap()
            .get_mut(&target.name)
            .and_then(|queue| queue.pop_front());
        scripted.unwrap_or_else(|| self.default.clone())
    }
}
