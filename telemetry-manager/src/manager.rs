use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use telemetry_otlp::{probe_connectivity, OtlpMetricExporter};
use telemetry_sdk::metrics::exporter::PushMetricExporter;
use telemetry_sdk::metrics::exporters::{ConsoleMetricExporter, FileMetricExporter};
use telemetry_sdk::metrics::{BatchExportingReader, MeterRegistry, ReaderBuilder};
use telemetry_sdk::{
    KeyValue, MetricResult, Resource, SERVICE_INSTANCE_ID, SERVICE_VERSION,
};

use crate::config::{ConfigError, TelemetryConfig};
use crate::sampler::{DomainInstruments, TelemetrySampler};
use crate::source::{PlatformSettings, PlatformSource};

const TELEMETRY_SERVICE_NAME: &str = "platform-telemetry";
// carried alongside the standard service attributes
const SERVICE_INSTANCE_CREATION: &str = "service.instance.creation";

/// Errors raised by [TelemetryManager::setup].
///
/// Setup only refuses to run on configuration errors. Unreachable sinks and
/// unreadable settings degrade to a smaller (possibly empty) sink set
/// instead: telemetry absence must never block platform startup.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ManagerError {
    /// The configuration violates an interval invariant.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Lifecycle state of the manager.
///
/// `Uninitialized → Ready (after setup) → Running (started) → Stopped`.
/// There is no transition out of `Stopped`; restarting requires a fresh
/// [TelemetryManager::setup].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    /// Setup has not completed.
    Uninitialized,
    /// Sinks and registry are built; timers not armed yet.
    Ready,
    /// Reader timers armed, sampler accepting scheduler ticks.
    Running,
    /// Timers cancelled, buffers flushed. Terminal.
    Stopped,
}

/// The destinations a manager ended up wiring at setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    /// Append-only local file.
    File,
    /// Human-readable stdout mirror (development).
    Console,
    /// Remote OTLP collector.
    Otlp,
}

/// The contract honored by the host scheduler.
///
/// The scheduler is expected to invoke the sampler every
/// `schedule_interval`, holding the distributed lock identified by
/// `lock_key` so only one cluster node runs it. Cron mechanics and lock
/// acquisition live entirely on the scheduler side.
#[derive(Debug, Clone)]
pub struct ManagerDefinition {
    /// Stable manager identifier.
    pub id: &'static str,
    /// Human-readable label.
    pub label: &'static str,
    /// Distributed lock key for single-instance execution.
    pub lock_key: String,
    /// Sampler invocation cadence.
    pub schedule_interval: Duration,
    /// Whether the manager should be scheduled at all.
    pub enabled: bool,
}

/// Long-lived handle owning the telemetry pipeline of one process.
pub struct TelemetryManager {
    config: TelemetryConfig,
    registry: MeterRegistry,
    sampler: TelemetrySampler,
    active_sinks: Vec<SinkKind>,
    state: Mutex<ManagerState>,
}

impl TelemetryManager {
    /// One-time setup: build sinks, probe the remote collector, construct
    /// the registry and domain instruments.
    ///
    /// The file sink is always attempted; the console sink is wired in dev
    /// mode when `console_debug` is set; the remote sink is wired in
    /// production only when the connectivity probe succeeds — a probe
    /// failure disables it for this manager's whole lifetime. Every sink
    /// failure degrades to a smaller sink set.
    pub fn setup(
        config: TelemetryConfig,
        source: Arc<dyn PlatformSource>,
    ) -> Result<TelemetryManager, ManagerError> {
        config.validate()?;

        let mut readers: Vec<BatchExportingReader> = Vec::new();
        let mut active_sinks = Vec::new();

        match FileMetricExporter::new(&config.metrics_file) {
            Ok(exporter) => match reader_for(&config, exporter) {
                Ok(reader) => {
                    readers.push(reader);
                    active_sinks.push(SinkKind::File);
                    info!(path = %config.metrics_file.display(), "file exporter activated");
                }
                Err(err) => warn!(error = %err, "file exporter disabled"),
            },
            Err(err) => warn!(error = %err, "file exporter disabled"),
        }

        if config.dev_mode && config.console_debug {
            match reader_for(&config, ConsoleMetricExporter::default()) {
                Ok(reader) => {
                    readers.push(reader);
                    active_sinks.push(SinkKind::Console);
                    info!("console exporter activated");
                }
                Err(err) => warn!(error = %err, "console exporter disabled"),
            }
        }

        if !config.dev_mode {
            if let Some(endpoint) = &config.otlp_endpoint {
                if probe_connectivity(endpoint, config.probe_timeout) {
                    let reader = OtlpMetricExporter::builder()
                        .with_endpoint(endpoint.as_str())
                        .build()
                        .map_err(|err| warn!(error = %err, "otlp exporter disabled"))
                        .ok()
                        .and_then(|exporter| {
                            reader_for(&config, exporter)
                                .map_err(|err| warn!(error = %err, "otlp exporter disabled"))
                                .ok()
                        });
                    if let Some(reader) = reader {
                        readers.push(reader);
                        active_sinks.push(SinkKind::Otlp);
                        info!(endpoint = %endpoint, "otlp exporter activated");
                    }
                } else {
                    info!(endpoint = %endpoint, "otlp exporter deactivated for connectivity issue");
                }
            }
        }

        if active_sinks.is_empty() {
            warn!("telemetry manager starting with zero active sinks");
        }

        let settings = source.settings().unwrap_or_else(|err| {
            warn!(error = %err, "cannot read platform settings, using fallback resource");
            PlatformSettings {
                instance_id: "unknown".into(),
                version: "unknown".into(),
                created_at: String::new(),
                enterprise_edition: false,
            }
        });
        let resource = Resource::builder()
            .with_service_name(TELEMETRY_SERVICE_NAME)
            .with_attribute(KeyValue::new(SERVICE_VERSION, settings.version))
            .with_attribute(KeyValue::new(SERVICE_INSTANCE_ID, settings.instance_id))
            .with_attribute(KeyValue::new(SERVICE_INSTANCE_CREATION, settings.created_at))
            .build();

        let mut builder = MeterRegistry::builder().with_resource(resource);
        for reader in readers {
            builder = builder.with_reader(reader);
        }
        let registry = builder.build();
        let instruments = DomainInstruments::register(&registry);
        let sampler = TelemetrySampler::new(source, instruments, config.collect_interval);

        debug!(sinks = active_sinks.len(), "telemetry manager ready");
        Ok(TelemetryManager {
            config,
            registry,
            sampler,
            active_sinks,
            state: Mutex::new(ManagerState::Ready),
        })
    }

    /// Arm the reader timers and begin accepting scheduler ticks.
    pub fn start(&self) {
        let mut state = self.state.lock().expect("lock poisoned");
        match *state {
            ManagerState::Ready => {
                self.registry.start();
                *state = ManagerState::Running;
                info!(
                    schedule_interval_ms = self.config.schedule_interval.as_millis() as u64,
                    "telemetry manager started"
                );
            }
            ManagerState::Running => debug!("telemetry manager already running"),
            ManagerState::Stopped => {
                warn!("telemetry manager is stopped; a fresh setup is required to restart");
            }
            ManagerState::Uninitialized => debug!("telemetry manager not set up"),
        }
    }

    /// One scheduler tick: refresh every domain gauge from platform state.
    ///
    /// Skipped (with a debug log) unless the manager is running. Never
    /// fails: sampling errors are contained per step.
    pub fn run_once(&self) {
        let state = *self.state.lock().expect("lock poisoned");
        if state != ManagerState::Running {
            debug!(state = ?state, "skipping sampler run");
            return;
        }
        self.sampler.run();
    }

    /// Cancel all reader timers and flush buffered points. Terminal and
    /// idempotent.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock().expect("lock poisoned");
            if *state == ManagerState::Stopped {
                debug!("telemetry manager already stopped");
                return;
            }
            *state = ManagerState::Stopped;
        }
        // reader shutdown joins timer threads; keep the state lock released
        self.registry.shutdown();
        info!("telemetry manager stopped");
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ManagerState {
        *self.state.lock().expect("lock poisoned")
    }

    /// The sinks wired at setup, in activation order.
    pub fn active_sinks(&self) -> &[SinkKind] {
        &self.active_sinks
    }

    /// The registry business code updates between scheduler ticks.
    pub fn registry(&self) -> &MeterRegistry {
        &self.registry
    }

    /// The scheduling contract for the host's cron facility.
    pub fn definition(&self) -> ManagerDefinition {
        ManagerDefinition {
            id: "TELEMETRY_MANAGER",
            label: "Telemetry manager",
            lock_key: self.config.lock_key.clone(),
            schedule_interval: self.config.schedule_interval,
            enabled: true,
        }
    }
}

impl Drop for TelemetryManager {
    fn drop(&mut self) {
        // reader timer threads must not outlive the manager handle
        self.stop();
    }
}

impl fmt::Debug for TelemetryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryManager")
            .field("state", &self.state())
            .field("active_sinks", &self.active_sinks)
            .finish()
    }
}

fn reader_for<E>(config: &TelemetryConfig, exporter: E) -> MetricResult<BatchExportingReader>
where
    E: PushMetricExporter,
{
    ReaderBuilder::new(exporter)
        .with_collect_interval(config.collect_interval)
        .with_export_interval(config.export_interval)
        .build()
}
