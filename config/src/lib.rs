#[macro_use]
extern crate tracing;

mod app_config;
mod args;
mod stream_list;

pub use app_config::{
    get_config_dir,
    get_data_dir,
};
pub use args::Args;
use eyre::eyre;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    collections::HashMap,
    path::PathBuf,
    time::Duration,
};
pub use stream_list::{
    load_targets,
    parse_stream_list,
    StreamEntry,
    StreamList,
    StreamTarget,
};

/// Runtime configuration for one analysis run.
///
/// Values are layered: built-in defaults, then an optional `config.yaml` in
/// the config directory, then command-line arguments. Call [`Config::validate`]
/// before starting any capture.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Number of segment samples captured per stream.
    pub samples: usize,
    /// Duration of each captured segment, in seconds.
    pub segment_duration: f64,
    /// Fraction of extreme observations discarded per end before statistics.
    pub discard_threshold: f64,
    /// Retries per sample slot after a failed capture attempt.
    pub retry_attempts: usize,
    /// Per-attempt timeout, in seconds. Must exceed `segment_duration`.
    pub timeout_seconds: f64,
    /// Pause between consecutive sample slots, in seconds.
    pub pause_between_samples: f64,
    /// Maximum number of streams analyzed concurrently.
    pub max_concurrent_streams: usize,
    /// Abort the whole run after this many seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_deadline: Option<f64>,
    /// Directory the report writers place their output in. Not used by the
    /// measurement pipeline itself.
    pub output_directory: PathBuf,
    /// Optional YAML stream list file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streams_file: Option<PathBuf>,
}

const DEFAULT_CONFIG: &str = include_str!("default-config.yaml");

impl Default for Config {
    fn default() -> Self {
        serde_yml::from_str(DEFAULT_CONFIG).expect("Failed to parse default config")
    }
}

impl config::Source for Config {
    fn clone_into_box(&self) -> Box<dyn config::Source + Send + Sync> {
        Box::new((*self).clone())
    }

    fn collect(&self) -> Result<config::Map<String, config::Value>, config::ConfigError> {
        let mut cache = HashMap::<String, config::Value>::new();
        cache.insert("samples".to_string(), (self.samples as u64).into());
        cache.insert("segment_duration".to_string(), self.segment_duration.into());
        cache.insert("discard_threshold".to_string(), self.discard_threshold.into());
        cache.insert("retry_attempts".to_string(), (self.retry_attempts as u64).into());
        cache.insert("timeout_seconds".to_string(), self.timeout_seconds.into());
        cache.insert("pause_between_samples".to_string(), self.pause_between_samples.into());
        cache.insert(
            "max_concurrent_streams".to_string(),
            (self.max_concurrent_streams as u64).into(),
        );
        if let Some(deadline) = self.run_deadline {
            cache.insert("run_deadline".to_string(), deadline.into());
        }
        cache.insert(
            "output_directory".to_string(),
            self.output_directory.display().to_string().into(),
        );
        if let Some(file) = &self.streams_file {
            cache.insert("streams_file".to_string(), file.display().to_string().into());
        }
        Ok(cache)
    }
}

impl Config {
    pub fn new(args: &Args) -> Result<Self, config::ConfigError> {
        let config_dir = get_config_dir();
        let mut builder = config::Config::builder();

        builder = builder.add_source(Config::default());

        let config_files = [("config.yaml", config::FileFormat::Yaml)];
        for (file, format) in &config_files {
            let source = config::File::from(config_dir.join(file))
                .format(*format)
                .required(false);
            builder = builder.add_source(source);
        }

        builder = builder.add_source(args.clone());

        let cfg: Self = builder.build()?.try_deserialize()?;
        Ok(cfg)
    }

    /// Checks all value ranges. Must pass before any capture starts.
    pub fn validate(&self) -> eyre::Result<()> {
        if self.samples == 0 {
            return Err(eyre!("samples must be at least 1"));
        }
        if self.segment_duration <= 0.0 {
            return Err(eyre!("segment_duration must be positive, got {}", self.segment_duration));
        }
        if !(0.0..0.5).contains(&self.discard_threshold) {
            return Err(eyre!(
                "discard_threshold must be a fraction in [0, 0.5), got {}",
                self.discard_threshold
            ));
        }
        if self.timeout_seconds <= self.segment_duration {
            return Err(eyre!(
                "timeout_seconds ({}) must exceed segment_duration ({})",
                self.timeout_seconds,
                self.segment_duration
            ));
        }
        if self.pause_between_samples < 0.0 {
            return Err(eyre!(
                "pause_between_samples must not be negative, got {}",
                self.pause_between_samples
            ));
        }
        if self.max_concurrent_streams == 0 {
            return Err(eyre!("max_concurrent_streams must be at least 1"));
        }
        if let Some(deadline) = self.run_deadline {
            if deadline <= 0.0 {
                return Err(eyre!("run_deadline must be positive, got {}", deadline));
            }
        }
        Ok(())
    }

    pub fn segment_duration(&self) -> Duration {
        Duration::from_secs_f64(self.segment_duration)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_seconds)
    }

    pub fn pause_between_samples(&self) -> Duration {
        Duration::from_secs_f64(self.pause_between_samples)
    }

    pub fn run_deadline(&self) -> Option<Duration> {
        self.run_deadline.map(Duration::from_secs_f64)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_config_parses_and_validates() {
        let cfg = Config::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.samples, 5);
        assert_eq!(cfg.discard_threshold, 0.2);
    }

    #[test]
    fn validation_rejects_out_of_range_values() {
        let base = Config::default();

        let cfg = Config { samples: 0, ..base.clone() };
        assert!(cfg.validate().unwrap_err().to_string().contains("samples"));

        let cfg = Config {
            discard_threshold: 0.5,
            ..base.clone()
        };
        assert!(cfg.validate().unwrap_err().to_string().contains("discard_threshold"));

        let cfg = Config {
            discard_threshold: -0.1,
            ..base.clone()
        };
        assert!(cfg.validate().is_err());

        let cfg = Config {
            timeout_seconds: base.segment_duration,
            ..base.clone()
        };
        assert!(cfg.validate().unwrap_err().to_string().contains("timeout_seconds"));

        let cfg = Config {
            segment_duration: 0.0,
            ..base.clone()
        };
        assert!(cfg.validate().is_err());

        let cfg = Config {
            max_concurrent_streams: 0,
            ..base.clone()
        };
        assert!(cfg.validate().is_err());

        let cfg = Config {
            run_deadline: Some(0.0),
            ..base
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn duration_helpers_round_trip() {
        let cfg = Config {
            segment_duration: 2.5,
            timeout_seconds: 7.5,
            ..Config::default()
        };
        assert_eq!(cfg.segment_duration(), Duration::from_millis(2500));
        assert_eq!(cfg.attempt_timeout(), Duration::from_millis(7500));
        assert_eq!(cfg.run_deadline(), None);
    }
}
