use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use telemetry_sdk::metrics::{Counter, MeterRegistry, UpDownCounter};

use crate::source::{PlatformSource, SourceResult};

/// Names of the domain instruments, one per sampled platform dimension.
pub(crate) mod instrument_names {
    pub const ENTERPRISE_EDITION: &str = "platform.enterprise_edition";
    pub const CLUSTER_INSTANCES: &str = "platform.cluster.instances";
    pub const USERS_ACTIVE: &str = "platform.users.active";
    pub const USERS_TOTAL: &str = "platform.users.total";
    pub const CONNECTORS_TOTAL: &str = "platform.connectors.total";
    pub const CONNECTORS_ACTIVE: &str = "platform.connectors.active";
    pub const SAMPLER_RUNS: &str = "telemetry.sampler.runs";
}

pub(crate) struct DomainInstruments {
    enterprise_edition: UpDownCounter,
    cluster_instances: UpDownCounter,
    users_active: UpDownCounter,
    users_total: UpDownCounter,
    connectors_total: UpDownCounter,
    connectors_active: UpDownCounter,
    sampler_runs: Counter,
}

impl DomainInstruments {
    pub(crate) fn register(registry: &MeterRegistry) -> Self {
        DomainInstruments {
            enterprise_edition: registry.up_down_counter(instrument_names::ENTERPRISE_EDITION),
            cluster_instances: registry.up_down_counter(instrument_names::CLUSTER_INSTANCES),
            users_active: registry.up_down_counter(instrument_names::USERS_ACTIVE),
            users_total: registry.up_down_counter(instrument_names::USERS_TOTAL),
            connectors_total: registry.up_down_counter(instrument_names::CONNECTORS_TOTAL),
            connectors_active: registry.up_down_counter(instrument_names::CONNECTORS_ACTIVE),
            sampler_runs: registry.counter(instrument_names::SAMPLER_RUNS),
        }
    }
}

/// One execution = one refresh of every domain gauge from current platform
/// state.
///
/// The steps are independent failure domains: a data-source timeout in one
/// is logged and the remaining steps still run. A sampler run never returns
/// an error, so a transient failure cannot disable the host scheduler.
pub struct TelemetrySampler {
    source: Arc<dyn PlatformSource>,
    instruments: DomainInstruments,
    session_window: Duration,
}

impl TelemetrySampler {
    pub(crate) fn new(
        source: Arc<dyn PlatformSource>,
        instruments: DomainInstruments,
        session_window: Duration,
    ) -> Self {
        TelemetrySampler {
            source,
            instruments,
            session_window,
        }
    }

    /// Refresh every domain gauge.
    pub fn run(&self) {
        debug!("telemetry sampler run");
        self.instruments.sampler_runs.add(1);

        guard_step("settings", || {
            let settings = self.source.settings()?;
            self.instruments
                .enterprise_edition
                .set(i64::from(settings.enterprise_edition));
            Ok(())
        });
        guard_step("cluster", || {
            let cluster = self.source.cluster_info()?;
            self.instruments
                .cluster_instances
                .set(cluster.instance_count as i64);
            Ok(())
        });
        guard_step("sessions", || {
            let active = self.source.active_session_count(self.session_window)?;
            self.instruments.users_active.set(active as i64);
            Ok(())
        });
        guard_step("entities", || {
            let users = self.source.user_count()?;
            self.instruments.users_total.set(users as i64);
            let connectors = self.source.connector_stats()?;
            self.instruments.connectors_total.set(connectors.total as i64);
            self.instruments
                .connectors_active
                .set(connectors.active as i64);
            Ok(())
        });
    }
}

/// Run one sampling step, containing its failure to a log line.
fn guard_step(step: &str, f: impl FnOnce() -> SourceResult<()>) {
    if let Err(err) = f() {
        warn!(step, error = %err, "telemetry sampling step failed");
    }
}
