use crate::{
    aggregate,
    filter,
    metrics::{
        AnalysisReport,
        StreamStatistics,
    },
    sampler::{
        self,
        SamplerSettings,
    },
};
use bitrate_analyzer_capture::CaptureBackend;
use bitrate_analyzer_config::{
    Config,
    StreamTarget,
};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Runs the full sample -> filter -> aggregate pipeline for every target.
///
/// Targets run on a bounded worker pool; each worker owns its pipeline and
/// its scratch space, and one failing stream never aborts the others. The
/// report lists targets in input order regardless of completion order.
pub async fn run(
    targets: &[StreamTarget],
    config: &Config,
    backend: Arc<dyn CaptureBackend>,
) -> AnalysisReport {
    let settings = SamplerSettings::from_config(config);
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent_streams));
    let cancel = CancellationToken::new();

    if let Some(deadline) = config.run_deadline() {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            warn!(
                deadline_secs = deadline.as_secs_f64(),
                "run deadline exceeded, cancelling in-flight captures"
            );
            cancel.cancel();
        });
    }

    info!(
        targets = targets.len(),
        concurrency = config.max_concurrent_streams,
        worst_case_secs = settings.worst_case().as_secs_f64(),
        "starting analysis run"
    );

    let discard_threshold = config.discard_threshold;
    let handles: Vec<_> = targets
        .iter()
        .cloned()
        .map(|target| {
            let backend = Arc::clone(&backend);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let settings = settings.clone();
            tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return aggregate::no_data_statistics(
                            &target,
                            backend.kind(),
                            0,
                            "worker pool closed".to_string(),
                        )
                    }
                };
                if cancel.is_cancelled() {
                    return aggregate::no_data_statistics(
                        &target,
                        backend.kind(),
                        0,
                        "not attempted: run deadline exceeded".to_string(),
                    );
                }
                analyze_target(&target, backend.as_ref(), &settings, discard_threshold, &cancel).await
            })
        })
        .collect();

    let mut streams = Vec::with_capacity(targets.len());
    for (target, joined) in targets.iter().zip(join_all(handles).await) {
        match joined {
            Ok(stats) => streams.push(stats),
            Err(err) => {
                error!(stream = %target.name, error = %err, "stream pipeline panicked");
                streams.push(aggregate::no_data_statistics(
                    target,
                    backend.kind(),
                    0,
                    format!("pipeline panicked: {err}"),
                ));
            }
        }
    }

    AnalysisReport::new(streams)
}

/// The fully sequential pipeline for one target.
async fn analyze_target(
    target: &StreamTarget,
    backend: &dyn CaptureBackend,
    settings: &SamplerSettings,
    discard_threshold: f64,
    cancel: &CancellationToken,
) -> StreamStatistics {
    // Scratch space for this pipeline only; removed on drop, whichever way
    // the pipeline exits.
    let scratch = match temp_dir::TempDir::with_prefix("bitrate-analyzer") {
        Ok(dir) => dir,
        Err(err) => {
            return aggregate::no_data_statistics(
                target,
                backend.kind(),
                0,
                format!("failed to create scratch directory: {err}"),
            )
        }
    };

    info!(stream = %target.name, url = %target.redacted_url(), "analyzing stream");
    let run = sampler::sample(target, backend, settings, scratch.path(), cancel).await;
    let failed = run.failed_slots;
    let reason = run.last_failure.as_ref().map(ToString::to_string);
    let filtered = filter::filter(run.observations, discard_threshold);
    aggregate::aggregate(target, &filtered, failed, backend.kind(), reason)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::{
        failure,
        success,
        ScriptedBackend,
    };
    use bitrate_analyzer_capture::CaptureError;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn config() -> Config {
        Config {
            samples: 3,
            segment_duration: 10.0,
            discard_threshold: 0.0,
            retry_attempts: 0,
            timeout_seconds: 30.0,
            pause_between_samples: 0.0,
            max_concurrent_streams: 4,
            ..Config::default()
        }
    }

    fn target(name: &str) -> StreamTarget {
        StreamTarget::from_url_str(&format!("rtsp://{name}.example.com/live")).unwrap()
    }

    #[tokio::test]
    async fn one_failing_stream_does_not_block_the_healthy_one() {
        let targets = vec![target("healthy"), target("failing")];
        let backend = ScriptedBackend::always(success(1_250_000, 10.0));
        backend.script(
            &targets[1].name,
            vec![
                failure(CaptureError::Connection("refused".to_string())),
                failure(CaptureError::Connection("refused".to_string())),
                failure(CaptureError::Connection("refused".to_string())),
            ],
        );

        let report = run(&targets, &config(), Arc::new(backend)).await;

        assert_eq!(report.streams.len(), 2);
        // Input order, not completion order.
        assert_eq!(report.streams[0].name, targets[0].name);
        assert_eq!(report.streams[1].name, targets[1].name);

        assert!(!report.streams[0].no_data);
        assert_eq!(report.streams[0].accepted, 3);
        assert_eq!(report.streams[0].mean_bps, Some(1_000_000.0));

        assert!(report.streams[1].no_data);
        assert_eq!(report.streams[1].failed, 3);
        assert!(report.streams[1].failure_reason.as_deref().unwrap().contains("refused"));
    }

    #[tokio::test]
    async fn every_requested_target_appears_in_the_report() {
        let targets = vec![target("a"), target("b"), target("c")];
        let backend = ScriptedBackend::always(failure(CaptureError::Timeout {
            limit: Duration::from_secs(30),
        }));

        let report = run(&targets, &config(), Arc::new(backend)).await;

        assert_eq!(report.streams.len(), 3);
        for (stats, target) in report.streams.iter().zip(&targets) {
            assert_eq!(stats.name, target.name);
            assert!(stats.no_data);
            assert_eq!(stats.failed, 3);
            assert!(stats.failure_reason.is_some());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_marks_unstarted_targets_as_not_attempted() {
        let targets = vec![target("slow"), target("queued")];
        // One worker at a time; the first target's captures outlast the
        // deadline, so the second is never started.
        let cfg = Config {
            max_concurrent_streams: 1,
            run_deadline: Some(5.0),
            ..config()
        };
        let backend = ScriptedBackend::always(success(1_250_000, 10.0)).with_delay(Duration::from_secs(60));

        let report = run(&targets, &cfg, Arc::new(backend)).await;

        assert_eq!(report.streams.len(), 2);
        assert!(report.streams[0].no_data);
        assert!(report.streams[1].no_data);
        assert_eq!(
            report.streams[1].failure_reason.as_deref(),
            Some("not attempted: run deadline exceeded")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn worker_pool_honors_the_concurrency_bound() {
        let targets: Vec<_> = ["a", "b", "c", "d"].iter().copied().map(target).collect();
        let cfg = Config {
            samples: 1,
            max_concurrent_streams: 2,
            ..config()
        };
        let backend = Arc::new(ScriptedBackend::always(success(1_250_000, 10.0)).with_delay(Duration::from_secs(1)));

        let report = run(&targets, &cfg, backend.clone()).await;

        assert_eq!(report.streams.len(), 4);
        assert!(backend.max_in_flight() <= 2);
    }

    #[tokio::test]
    async fn steady_stream_trims_extremes_and_reports_zero_deviation() {
        let cfg = Config {
            samples: 5,
            discard_threshold: 0.2,
            ..config()
        };
        let backend = ScriptedBackend::always(success(1_250_000, 10.0));

        let report = run(&[target("steady")], &cfg, Arc::new(backend)).await;
        let stats = &report.streams[0];

        assert_eq!(stats.accepted, 3);
        assert_eq!(stats.discarded, 2);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.mean_bps, Some(1_000_000.0));
        assert_eq!(stats.std_dev_bps, Some(0.0));
    }

    #[tokio::test]
    async fn report_carries_a_generation_timestamp() {
        let before = chrono::Utc::now();
        let report = run(&[target("a")], &config(), Arc::new(ScriptedBackend::always(success(1_250_000, 10.0)))).await;
        assert!(report.generated_at >= before);
    }
}
