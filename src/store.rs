//! Last-known actuator values shared between the auto-publisher and the operator.

use dashmap::DashMap;

/// Value returned for topics that were never written.
pub const DEFAULT_VALUE: &str = "0";

/// Thread-safe `topic -> value` map.
///
/// Each `get`/`set` call is atomic for its topic. Nothing orders updates of
/// different topics relative to each other; readers converge on the next scan.
#[derive(Debug, Default)]
pub struct ActuatorStore {
    values: DashMap<String, String>,
}

impl ActuatorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store pre-seeded with `(topic, value)` pairs.
    pub fn seeded<I, T, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (T, V)>,
        T: Into<String>,
        V: Into<String>,
    {
        let store = Self::new();
        for (topic, value) in entries {
            store.set(topic, value);
        }
        store
    }

    /// Returns the last written value, or [`DEFAULT_VALUE`] if unset.
    pub fn get(&self, topic: &str) -> String {
        self.values
            .get(topic)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| DEFAULT_VALUE.to_string())
    }

    /// Overwrites the value for `topic`.
    pub fn set(&self, topic: impl Into<String>, value: impl Into<String>) {
        self.values.insert(topic.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
