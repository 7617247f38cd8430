use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

const ONE_MINUTE: Duration = Duration::from_secs(60);
const FIVE_MINUTES: Duration = Duration::from_secs(5 * 60);
const ONE_HOUR: Duration = Duration::from_secs(60 * 60);
const SIX_HOURS: Duration = Duration::from_secs(6 * 60 * 60);

const COLLECT_INTERVAL_ENV: &str = "TELEMETRY_COLLECT_INTERVAL_MILLIS";
const EXPORT_INTERVAL_ENV: &str = "TELEMETRY_EXPORT_INTERVAL_MILLIS";

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors detected while validating a [TelemetryConfig].
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConfigError {
    /// The export cadence cannot usefully be faster than collection.
    #[error("export interval {export:?} must not be shorter than collect interval {collect:?}")]
    ExportFasterThanCollect {
        /// Configured collect interval.
        collect: Duration,
        /// Configured export interval.
        export: Duration,
    },

    /// The scheduler needs a non-zero cadence.
    #[error("schedule interval must not be zero")]
    ZeroScheduleInterval,
}

/// Configuration for the telemetry manager.
///
/// Cadence follows the platform mode: development collects every minute and
/// exports every five, production collects hourly and exports every six
/// hours. The scheduler tick is half the collect interval in either mode.
/// [TelemetryConfig::from_env] additionally honors the
/// `TELEMETRY_COLLECT_INTERVAL_MILLIS` / `TELEMETRY_EXPORT_INTERVAL_MILLIS`
/// environment overrides.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Development mode switches cadence and enables the console sink.
    pub dev_mode: bool,
    /// Key for the scheduler's distributed lock, so only one cluster node
    /// runs the sampler.
    pub lock_key: String,
    /// Remote collector URL. `None` disables the remote sink entirely.
    pub otlp_endpoint: Option<String>,
    /// Where the file sink appends its batch records.
    pub metrics_file: PathBuf,
    /// Mirror batches to stdout (development only, off by default).
    pub console_debug: bool,
    /// How often instrument values are sampled into reader buffers.
    pub collect_interval: Duration,
    /// How often buffered points are shipped to each sink.
    pub export_interval: Duration,
    /// How often the host scheduler invokes the sampler.
    pub schedule_interval: Duration,
    /// Timeout for the one-shot collector connectivity probe.
    pub probe_timeout: Duration,
}

impl TelemetryConfig {
    /// Build a config with the default cadence for `dev_mode`.
    pub fn new(dev_mode: bool, lock_key: impl Into<String>, metrics_file: impl Into<PathBuf>) -> Self {
        let (collect_interval, export_interval) = if dev_mode {
            (ONE_MINUTE, FIVE_MINUTES)
        } else {
            (ONE_HOUR, SIX_HOURS)
        };

        TelemetryConfig {
            dev_mode,
            lock_key: lock_key.into(),
            otlp_endpoint: None,
            metrics_file: metrics_file.into(),
            console_debug: false,
            collect_interval,
            export_interval,
            schedule_interval: collect_interval / 2,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Like [TelemetryConfig::new], additionally honoring the
    /// `TELEMETRY_COLLECT_INTERVAL_MILLIS` / `TELEMETRY_EXPORT_INTERVAL_MILLIS`
    /// environment overrides. This is the constructor production wiring
    /// uses; an unparsable value falls back to the mode default.
    pub fn from_env(
        dev_mode: bool,
        lock_key: impl Into<String>,
        metrics_file: impl Into<PathBuf>,
    ) -> Self {
        let mut config = Self::new(dev_mode, lock_key, metrics_file);
        config.collect_interval = interval_from_env(COLLECT_INTERVAL_ENV, config.collect_interval);
        config.export_interval = interval_from_env(EXPORT_INTERVAL_ENV, config.export_interval);
        config.schedule_interval = config.collect_interval / 2;
        config
    }

    /// Set the remote collector URL.
    pub fn with_otlp_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.otlp_endpoint = Some(endpoint.into());
        self
    }

    /// Mirror batches to the console (effective in dev mode only).
    pub fn with_console_debug(mut self, enabled: bool) -> Self {
        self.console_debug = enabled;
        self
    }

    /// Override the collect interval. The schedule interval follows along at
    /// half the collect cadence.
    pub fn with_collect_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.collect_interval = interval;
            self.schedule_interval = interval / 2;
        }
        self
    }

    /// Override the export interval.
    pub fn with_export_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.export_interval = interval;
        }
        self
    }

    /// Check the interval invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.export_interval < self.collect_interval {
            return Err(ConfigError::ExportFasterThanCollect {
                collect: self.collect_interval,
                export: self.export_interval,
            });
        }
        if self.schedule_interval.is_zero() {
            return Err(ConfigError::ZeroScheduleInterval);
        }
        Ok(())
    }
}

fn interval_from_env(name: &str, default: Duration) -> Duration {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().map(Duration::from_millis).ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::dev(true, ONE_MINUTE, FIVE_MINUTES, Duration::from_secs(30))]
    #[case::prod(false, ONE_HOUR, SIX_HOURS, Duration::from_secs(30 * 60))]
    fn cadence_follows_platform_mode(
        #[case] dev_mode: bool,
        #[case] collect: Duration,
        #[case] export: Duration,
        #[case] schedule: Duration,
    ) {
        let config = TelemetryConfig::new(dev_mode, "lock", "/tmp/metrics.ndjson");
        assert_eq!(config.collect_interval, collect);
        assert_eq!(config.export_interval, export);
        assert_eq!(config.schedule_interval, schedule);
    }

    #[test]
    fn environment_overrides_metric_intervals() {
        temp_env::with_vars(
            [
                (COLLECT_INTERVAL_ENV, Some("250")),
                (EXPORT_INTERVAL_ENV, Some("1000")),
            ],
            || {
                let config = TelemetryConfig::from_env(true, "lock", "/tmp/metrics.ndjson");
                assert_eq!(config.collect_interval, Duration::from_millis(250));
                assert_eq!(config.export_interval, Duration::from_millis(1000));
                assert_eq!(config.schedule_interval, Duration::from_millis(125));
            },
        );
    }

    #[test]
    fn unparsable_override_falls_back_to_default() {
        temp_env::with_var(COLLECT_INTERVAL_ENV, Some("not-a-number"), || {
            let config = TelemetryConfig::from_env(true, "lock", "/tmp/metrics.ndjson");
            assert_eq!(config.collect_interval, ONE_MINUTE);
        });
    }

    #[test]
    fn export_faster_than_collect_is_rejected() {
        let config = TelemetryConfig::new(true, "lock", "/tmp/metrics.ndjson")
            .with_collect_interval(Duration::from_secs(60))
            .with_export_interval(Duration::from_secs(10));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ExportFasterThanCollect { .. })
        ));
    }
}
