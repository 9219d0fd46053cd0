use clap::Parser;
use std::path::PathBuf;

/// Live stream bitrate analyzer
#[derive(Parser, Debug, Clone)]
#[command(author, version = version(), about, long_about = None)]
pub struct Args {
    /// Stream URLs to analyze, in addition to any stream list file.
    #[clap(value_name = "URL")]
    pub urls: Vec<String>,

    /// Path to a YAML stream list file.
    #[clap(long, value_name = "FILE", env = "BITRATE_ANALYZER_STREAMS")]
    pub streams: Option<PathBuf>,

    /// Number of segment samples to capture per stream.
    #[clap(long, value_name = "COUNT")]
    pub samples: Option<usize>,

    /// Duration of each captured segment, in seconds.
    #[clap(long = "segment-duration", value_name = "SECONDS")]
    pub segment_duration: Option<f64>,

    /// Fraction of extreme observations to discard per end before statistics
    /// are computed.
    #[clap(long = "discard-threshold", value_name = "FRACTION")]
    pub discard_threshold: Option<f64>,

    /// Retries per sample slot after a failed capture attempt.
    #[clap(long = "retry-attempts", value_name = "COUNT")]
    pub retry_attempts: Option<usize>,

    /// Per-attempt timeout, in seconds. Must exceed the segment duration.
    #[clap(long = "timeout", value_name = "SECONDS")]
    pub timeout_seconds: Option<f64>,

    /// Pause between consecutive sample slots, in seconds.
    #[clap(long = "pause", value_name = "SECONDS")]
    pub pause_between_samples: Option<f64>,

    /// Maximum number of streams analyzed concurrently.
    #[clap(long = "concurrency", value_name = "COUNT")]
    pub max_concurrent_streams: Option<usize>,

    /// Abort the whole run after this long (e.g. "90s", "10m").
    #[clap(long = "run-deadline", value_name = "DURATION")]
    pub run_deadline: Option<String>,

    /// Directory the CSV/JSON reports are written to.
    #[clap(long = "output-dir", value_name = "DIR")]
    pub output_directory: Option<PathBuf>,

    /// Enable debug logging.
    #[clap(long, action)]
    pub verbose: bool,
}

mod config_ext {
    use super::*;
    use config::{
        Map,
        Source,
        Value,
    };
    use std::collections::HashMap;

    impl Source for Args {
        fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
            Box::new((*self).clone())
        }

        fn collect(&self) -> Result<Map<String, Value>, config::ConfigError> {
            let mut cache = HashMap::<String, Value>::new();
            if let Some(streams) = &self.streams {
                cache.insert("streams_file".to_string(), streams.display().to_string().into());
            }
            if let Some(samples) = self.samples {
                cache.insert("samples".to_string(), (samples as u64).into());
            }
            if let Some(segment_duration) = self.segment_duration {
                cache.insert("segment_duration".to_string(), segment_duration.into());
            }
            if let Some(discard_threshold) = self.discard_threshold {
                cache.insert("discard_threshold".to_string(), discard_threshold.into());
            }
            if let Some(retry_attempts) = self.retry_attempts {
                cache.insert("retry_attempts".to_string(), (retry_attempts as u64).into());
            }
            if let Some(timeout_seconds) = self.timeout_seconds {
                cache.insert("timeout_seconds".to_string(), timeout_seconds.into());
            }
            if let Some(pause) = self.pause_between_samples {
                cache.insert("pause_between_samples".to_string(), pause.into());
            }
            if let Some(concurrency) = self.max_concurrent_streams {
                cache.insert("max_concurrent_streams".to_string(), (concurrency as u64).into());
            }
            if let Some(deadline) = &self.run_deadline {
                let deadline = humantime::parse_duration(deadline).map_err(|e| {
                    config::ConfigError::Message(format!("invalid run deadline '{deadline}': {e}"))
                })?;
                cache.insert("run_deadline".to_string(), deadline.as_secs_f64().into());
            }
            if let Some(output_directory) = &self.output_directory {
                cache.insert(
                    "output_directory".to_string(),
                    output_directory.display().to_string().into(),
                );
            }
            Ok(cache)
        }
    }
}

pub fn version() -> String {
    let author = clap::crate_authors!();
    let config_dir_path = crate::get_config_dir().display().to_string();
    let data_dir_path = crate::get_data_dir().display().to_string();

    format!(
        "\
Authors: {author}

Config directory: {config_dir_path}
Data directory: {data_dir_path}"
    )
}
