//! Process-wide shared state.
//!
//! String-keyed store subsystems use to publish ambient values (resolved
//! network settings, selected drivers) for other handlers to read.

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Default)]
pub struct Blackboard {
    values: DashMap<String, Value>,
}

impl Blackboard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a value. Returns the previous value, if any.
    pub fn set(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(key.into(), value)
    }

    /// Publish any serializable value.
    pub fn set_as<T: Serialize>(
        &self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<Option<Value>, serde_json::Error> {
        Ok(self.set(key, serde_json::to_value(value)?))
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).map(|v| v.value().clone())
    }

    /// Read and decode. `Ok(None)` when the key is absent.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, serde_json::Error> {
        self.get(key).map(serde_json::from_value).transpose()
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.values.remove(key).map(|(_, v)| v)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_get_remove() {
        let board = Blackboard::new();
        assert!(board.set("network.bridge", json!({"iface": "docker0"})).is_none());
        assert_eq!(board.get("network.bridge").unwrap()["iface"], "docker0");

        let prev = board.set("network.bridge", json!({"iface": "br0"}));
        assert!(prev.is_some());
        assert_eq!(board.len(), 1);

        assert!(board.remove("network.bridge").is_some());
        assert!(board.is_empty());
    }

    #[test]
    fn test_typed_access() {
        let board = Blackboard::new();
        board.set_as("mtu", &1500u32).unwrap();

        assert_eq!(board.get_as::<u32>("mtu").unwrap(), Some(1500));
        assert_eq!(board.get_as::<u32>("missing").unwrap(), None);
        assert!(board.get_as::<String>("mtu").is_err());
    }
}
