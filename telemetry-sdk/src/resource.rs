//! Representation of the entity producing telemetry.
//!
//! A [Resource] is an immutable attribute set built once at registry
//! construction and copied into every exported batch.

use std::sync::Arc;

use crate::common::{KeyValue, Value};

/// Well-known attribute key for the logical service name.
pub const SERVICE_NAME: &str = "service.name";
/// Well-known attribute key for the service version.
pub const SERVICE_VERSION: &str = "service.version";
/// Well-known attribute key for the unique service instance id.
pub const SERVICE_INSTANCE_ID: &str = "service.instance.id";

#[derive(Debug, PartialEq)]
struct ResourceInner {
    attrs: Vec<KeyValue>,
}

/// An immutable set of attributes describing the telemetry producer.
///
/// Shared via `Arc`, so cloning a `Resource` is cheap.
#[derive(Clone, Debug, PartialEq)]
pub struct Resource {
    inner: Arc<ResourceInner>,
}

impl Resource {
    /// Create a [ResourceBuilder] starting from an empty attribute set.
    pub fn builder() -> ResourceBuilder {
        ResourceBuilder { attrs: Vec::new() }
    }

    /// A resource with no attributes.
    pub fn empty() -> Self {
        Resource {
            inner: Arc::new(ResourceInner { attrs: Vec::new() }),
        }
    }

    /// Look up an attribute value by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.inner
            .attrs
            .iter()
            .find(|kv| kv.key == key)
            .map(|kv| &kv.value)
    }

    /// Iterate over the attributes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &KeyValue> {
        self.inner.attrs.iter()
    }

    /// Number of attributes in this resource.
    pub fn len(&self) -> usize {
        self.inner.attrs.len()
    }

    /// Whether this resource carries no attributes.
    pub fn is_empty(&self) -> bool {
        self.inner.attrs.is_empty()
    }

    /// Create a new resource combining `self` and `other`.
    ///
    /// Attributes from `other` win on key conflict.
    pub fn merge(&self, other: &Resource) -> Resource {
        let mut builder = Resource::builder().with_attributes(self.iter().cloned());
        builder = builder.with_attributes(other.iter().cloned());
        builder.build()
    }
}

/// Builder for [Resource].
#[derive(Debug, Default)]
pub struct ResourceBuilder {
    attrs: Vec<KeyValue>,
}

impl ResourceBuilder {
    /// Set the `service.name` attribute.
    pub fn with_service_name(self, name: impl Into<Value>) -> Self {
        self.with_attribute(KeyValue::new(SERVICE_NAME, name))
    }

    /// Add a single attribute. A repeated key keeps the last value.
    pub fn with_attribute(mut self, kv: KeyValue) -> Self {
        self.attrs.push(kv);
        self
    }

    /// Add a sequence of attributes.
    pub fn with_attributes(mut self, attrs: impl IntoIterator<Item = KeyValue>) -> Self {
        self.attrs.extend(attrs);
        self
    }

    /// Build the immutable [Resource], deduplicating keys (last value wins,
    /// first-seen order preserved).
    pub fn build(self) -> Resource {
        let mut deduped: Vec<KeyValue> = Vec::with_capacity(self.attrs.len());
        for kv in self.attrs {
            if let Some(existing) = deduped.iter_mut().find(|e| e.key == kv.key) {
                existing.value = kv.value;
            } else {
                deduped.push(kv);
            }
        }
        Resource {
            inner: Arc::new(ResourceInner { attrs: deduped }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_deduplicates_keys_last_wins() {
        let resource = Resource::builder()
            .with_service_name("first")
            .with_attribute(KeyValue::new("custom", 1))
            .with_service_name("second")
            .build();

        assert_eq!(resource.len(), 2);
        assert_eq!(
            resource.get(SERVICE_NAME),
            Some(&Value::String("second".into()))
        );
        // first-seen order preserved
        assert_eq!(resource.iter().next().unwrap().key, SERVICE_NAME);
    }

    #[test]
    fn merge_prefers_other() {
        let base = Resource::builder()
            .with_service_name("base")
            .with_attribute(KeyValue::new("region", "eu"))
            .build();
        let overlay = Resource::builder().with_service_name("overlay").build();

        let merged = base.merge(&overlay);
        assert_eq!(
            merged.get(SERVICE_NAME),
            Some(&Value::String("overlay".into()))
        );
        assert_eq!(merged.get("region"), Some(&Value::String("eu".into())));
    }
}
