use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use tracing::warn;

use super::data::{InstrumentKind, InstrumentSnapshot};

/// Storage slot for one named instrument.
///
/// Updates go through the atomic so handles never contend with collection
/// ticks; the registry table lock only covers instrument creation and
/// snapshot assembly.
pub(crate) struct InstrumentInner {
    name: Cow<'static, str>,
    kind: InstrumentKind,
    value: AtomicI64,
    start_time: SystemTime,
}

impl InstrumentInner {
    pub(crate) fn new(name: Cow<'static, str>, kind: InstrumentKind) -> Self {
        InstrumentInner {
            name,
            kind,
            value: AtomicI64::new(0),
            start_time: SystemTime::now(),
        }
    }

    pub(crate) fn name(&self) -> &Cow<'static, str> {
        &self.name
    }

    pub(crate) fn kind(&self) -> InstrumentKind {
        self.kind
    }

    pub(crate) fn snapshot(&self) -> InstrumentSnapshot {
        InstrumentSnapshot {
            name: self.name.clone(),
            kind: self.kind,
            value: self.value.load(Ordering::Relaxed),
            start_time: self.start_time,
        }
    }
}

impl fmt::Debug for InstrumentInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrument")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// An instrument that records monotonically increasing values.
#[derive(Clone, Debug)]
pub struct Counter(pub(crate) Arc<InstrumentInner>);

impl Counter {
    /// Record an increment.
    ///
    /// A negative delta violates the monotonic invariant; it is logged and
    /// ignored without changing the value.
    pub fn add(&self, delta: i64) {
        if delta < 0 {
            warn!(
                instrument = %self.0.name(),
                delta,
                "negative delta rejected on monotonic counter"
            );
            return;
        }
        self.0.value.fetch_add(delta, Ordering::Relaxed);
    }

    /// The instrument name.
    pub fn name(&self) -> &str {
        self.0.name()
    }
}

/// An instrument holding a current count snapshot that can move both ways.
#[derive(Clone, Debug)]
pub struct UpDownCounter(pub(crate) Arc<InstrumentInner>);

impl UpDownCounter {
    /// Replace the current value. Sign is unconstrained.
    pub fn set(&self, value: i64) {
        self.0.value.store(value, Ordering::Relaxed);
    }

    /// The instrument name.
    pub fn name(&self) -> &str {
        self.0.name()
    }
}
