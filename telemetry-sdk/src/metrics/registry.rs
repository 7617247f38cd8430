use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use tracing::warn;

use super::data::{InstrumentKind, InstrumentSnapshot};
use super::instrument::{Counter, InstrumentInner, UpDownCounter};
use super::reader::BatchExportingReader;
use crate::resource::Resource;

/// Source of instrument snapshots for a reader's collection ticks.
pub(crate) trait MetricProducer: Send + Sync {
    /// Produce a consistent snapshot of every registered instrument, in
    /// registration order.
    fn produce(&self) -> Vec<InstrumentSnapshot>;
}

#[derive(Default)]
struct InstrumentTable {
    by_name: HashMap<Cow<'static, str>, usize>,
    ordered: Vec<Arc<InstrumentInner>>,
}

impl InstrumentTable {
    /// Look up or create the slot for `name`. A name registered under a
    /// different kind keeps its original slot; the mismatch is logged and
    /// the existing slot is returned so there is never more than one
    /// instrument per name.
    fn get_or_create(&mut self, name: Cow<'static, str>, kind: InstrumentKind) -> Arc<InstrumentInner> {
        if let Some(&idx) = self.by_name.get(&name) {
            let existing = &self.ordered[idx];
            if existing.kind() != kind {
                warn!(
                    instrument = %name,
                    requested = ?kind,
                    registered = ?existing.kind(),
                    "instrument already registered with a different kind"
                );
            }
            return Arc::clone(existing);
        }
        let inner = Arc::new(InstrumentInner::new(name.clone(), kind));
        self.by_name.insert(name, self.ordered.len());
        self.ordered.push(Arc::clone(&inner));
        inner
    }
}

pub(crate) struct RegistryInner {
    resource: Resource,
    instruments: Mutex<InstrumentTable>,
    readers: Vec<BatchExportingReader>,
}

impl MetricProducer for RegistryInner {
    fn produce(&self) -> Vec<InstrumentSnapshot> {
        let table = self.instruments.lock().expect("lock poisoned");
        table.ordered.iter().map(|i| i.snapshot()).collect()
    }
}

/// Process-wide table of named instruments.
///
/// Constructed once at manager setup and shared by handle; all mutation and
/// snapshotting is safe under concurrent access from samplers and readers.
#[derive(Clone)]
pub struct MeterRegistry {
    inner: Arc<RegistryInner>,
}

impl MeterRegistry {
    /// Configuration options for a registry.
    pub fn builder() -> MeterRegistryBuilder {
        MeterRegistryBuilder {
            resource: Resource::empty(),
            readers: Vec::new(),
        }
    }

    /// Look up or create a monotonic counter named `name`.
    pub fn counter(&self, name: impl Into<Cow<'static, str>>) -> Counter {
        let mut table = self.inner.instruments.lock().expect("lock poisoned");
        Counter(table.get_or_create(name.into(), InstrumentKind::Counter))
    }

    /// Look up or create an up-down counter named `name`.
    pub fn up_down_counter(&self, name: impl Into<Cow<'static, str>>) -> UpDownCounter {
        let mut table = self.inner.instruments.lock().expect("lock poisoned");
        UpDownCounter(table.get_or_create(name.into(), InstrumentKind::UpDownCounter))
    }

    /// A consistent snapshot of every instrument, in registration order.
    pub fn snapshot(&self) -> Vec<InstrumentSnapshot> {
        self.inner.produce()
    }

    /// The resource attached to every batch produced from this registry.
    pub fn resource(&self) -> &Resource {
        &self.inner.resource
    }

    /// Arm the timers of every attached reader. Idempotent.
    pub fn start(&self) {
        for reader in &self.inner.readers {
            reader.start();
        }
    }

    /// Stop every attached reader, flushing per each reader's stop policy.
    ///
    /// There is no restart: a stopped registry requires a fresh setup.
    pub fn shutdown(&self) {
        for reader in &self.inner.readers {
            reader.stop();
        }
    }
}

impl fmt::Debug for MeterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeterRegistry")
            .field("resource", &self.inner.resource)
            .field("readers", &self.inner.readers.len())
            .finish()
    }
}

/// Builder for [MeterRegistry].
pub struct MeterRegistryBuilder {
    resource: Resource,
    readers: Vec<BatchExportingReader>,
}

impl MeterRegistryBuilder {
    /// Attach the resource copied into every exported batch.
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resource = resource;
        self
    }

    /// Attach a reader. The reader is wired to this registry at build time
    /// but its timers stay unarmed until [MeterRegistry::start].
    pub fn with_reader(mut self, reader: BatchExportingReader) -> Self {
        self.readers.push(reader);
        self
    }

    /// Build the registry and register it as the producer of every attached
    /// reader.
    pub fn build(self) -> MeterRegistry {
        let inner = Arc::new(RegistryInner {
            resource: self.resource.clone(),
            instruments: Mutex::new(InstrumentTable::default()),
            readers: self.readers,
        });
        let producer: Weak<RegistryInner> = Arc::downgrade(&inner);
        for reader in &inner.readers {
            reader.register_producer(producer.clone(), self.resource.clone());
        }
        MeterRegistry { inner }
    }
}

impl fmt::Debug for MeterRegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeterRegistryBuilder")
            .field("readers", &self.readers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_value_is_sum_of_deltas() {
        let registry = MeterRegistry::builder().build();
        let counter = registry.counter("requests");
        counter.add(3);
        counter.add(0);
        counter.add(4);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].value, 7);
        assert_eq!(snapshot[0].kind, InstrumentKind::Counter);
    }

    #[test]
    fn negative_delta_is_rejected_without_changing_value() {
        let registry = MeterRegistry::builder().build();
        let counter = registry.counter("requests");
        counter.add(5);
        counter.add(-2);

        assert_eq!(registry.snapshot()[0].value, 5);
    }

    #[test]
    fn same_name_returns_same_slot() {
        let registry = MeterRegistry::builder().build();
        let a = registry.counter("shared");
        let b = registry.counter("shared");
        a.add(1);
        b.add(1);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].value, 2);
    }

    #[test]
    fn kind_mismatch_keeps_existing_slot() {
        let registry = MeterRegistry::builder().build();
        let gauge = registry.up_down_counter("sessions");
        gauge.set(9);
        // re-registration under the wrong kind must not create a second
        // instrument nor reset the existing one
        let _mismatched = registry.counter("sessions");

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].kind, InstrumentKind::UpDownCounter);
        assert_eq!(snapshot[0].value, 9);
    }

    #[test]
    fn snapshot_preserves_registration_order() {
        let registry = MeterRegistry::builder().build();
        registry.up_down_counter("b.second");
        registry.counter("a.first");
        registry.up_down_counter("c.third");

        let names: Vec<_> = registry.snapshot().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["b.second", "a.first", "c.third"]);
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let registry = MeterRegistry::builder().build();
        let counter = registry.counter("hits");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = counter.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        counter.add(1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.snapshot()[0].value, 8000);
    }
}
