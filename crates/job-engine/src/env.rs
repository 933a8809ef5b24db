//! # Job Environment
//!
//! Ordered key/value bag carried by every job. Values are kept either as
//! plain text or as structured JSON, and typed accessors report a value that
//! cannot be coerced as an [`EnvError`], never as a missing key.
//!
//! ## Wire form
//!
//! An environment encodes to a single JSON object. Structured entries are
//! embedded as JSON, text entries as JSON strings:
//!
//! ```text
//! {"Version":"1.2.3","ApiVersion":"1.15","GitCommit":"abc123","Os":"linux"}
//! ```

use std::collections::HashMap;
use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::EnvError;

/// A stored environment value.
#[derive(Debug, Clone, PartialEq)]
pub enum EnvValue {
    Text(String),
    Json(Value),
}

impl EnvValue {
    /// Textual form. JSON values render as compact JSON.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Json(v) => v.to_string(),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Self::Text(s) => Value::String(s.clone()),
            Self::Json(v) => v.clone(),
        }
    }
}

/// Ordered key/value parameter bag.
///
/// Keys are case-sensitive and unique. Setting an existing key replaces its
/// value in place, so insertion order is stable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Env {
    entries: Vec<(String, EnvValue)>,
}

impl Env {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    /// Store a raw value. Last write wins.
    pub fn set_value(&mut self, key: impl Into<String>, value: EnvValue) {
        let key = key.into();
        match self.position(&key) {
            Some(idx) => self.entries[idx].1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.set_value(key, EnvValue::Text(value.into()));
    }

    #[must_use]
    pub fn get_value(&self, key: &str) -> Option<&EnvValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Textual value of `key`, or `None` when unset.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.get_value(key).map(EnvValue::to_text)
    }

    #[must_use]
    pub fn exists(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<EnvValue> {
        self.position(key).map(|idx| self.entries.remove(idx).1)
    }

    /// Store a boolean in canonical form (`"1"` / `"0"`).
    pub fn set_bool(&mut self, key: impl Into<String>, value: bool) {
        self.set(key, if value { "1" } else { "0" });
    }

    /// Read a boolean.
    ///
    /// Accepts `1/true/yes/on` and `0/false/no/off/none` (trimmed,
    /// case-insensitive). An empty value reads as `false`.
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, EnvError> {
        let Some(raw) = self.get(key) else {
            return Ok(None);
        };
        match parse_bool(&raw) {
            Some(b) => Ok(Some(b)),
            None => Err(EnvError::InvalidBool {
                key: key.to_string(),
                value: raw,
            }),
        }
    }

    pub fn set_int(&mut self, key: impl Into<String>, value: i64) {
        self.set(key, value.to_string());
    }

    pub fn get_int(&self, key: &str) -> Result<Option<i64>, EnvError> {
        let Some(raw) = self.get(key) else {
            return Ok(None);
        };
        match raw.trim().parse::<i64>() {
            Ok(n) => Ok(Some(n)),
            Err(_) => Err(EnvError::InvalidInt {
                key: key.to_string(),
                value: raw,
            }),
        }
    }

    /// Store any serializable value as structured JSON.
    pub fn set_json<T: Serialize + ?Sized>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<(), EnvError> {
        let key = key.into();
        let json = serde_json::to_value(value).map_err(|source| EnvError::Encode {
            key: key.clone(),
            source,
        })?;
        self.set_value(key, EnvValue::Json(json));
        Ok(())
    }

    /// Decode `key` into `T`. Text values are parsed as JSON.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, EnvError> {
        let decoded = match self.get_value(key) {
            None => return Ok(None),
            Some(EnvValue::Json(v)) => serde_json::from_value(v.clone()),
            Some(EnvValue::Text(s)) => serde_json::from_str(s),
        };
        decoded.map(Some).map_err(|source| EnvError::InvalidJson {
            key: key.to_string(),
            source,
        })
    }

    pub fn set_list<S: AsRef<str>>(&mut self, key: impl Into<String>, items: &[S]) {
        let list = items
            .iter()
            .map(|s| Value::String(s.as_ref().to_string()))
            .collect();
        self.set_value(key, EnvValue::Json(Value::Array(list)));
    }

    /// Read a list of strings. A value that is not a JSON list of strings
    /// reads back as a one-element list holding its text.
    #[must_use]
    pub fn get_list(&self, key: &str) -> Option<Vec<String>> {
        let value = self.get_value(key)?;
        let parsed = match value {
            EnvValue::Json(v) => serde_json::from_value::<Vec<String>>(v.clone()).ok(),
            EnvValue::Text(s) => serde_json::from_str::<Vec<String>>(s).ok(),
        };
        Some(parsed.unwrap_or_else(|| vec![value.to_text()]))
    }

    /// Merge every entry of `other` into `self`.
    pub fn import(&mut self, other: &Env) {
        for (key, value) in &other.entries {
            self.set_value(key.clone(), value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EnvValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.entries.iter().map(|(k, _)| k.as_str()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn to_map(&self) -> HashMap<String, String> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.to_text()))
            .collect()
    }

    /// JSON object form of the environment.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let map = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect::<serde_json::Map<_, _>>();
        Value::Object(map)
    }

    /// Write the environment as one JSON object followed by a newline.
    pub fn encode<W: Write>(&self, mut writer: W) -> Result<(), EnvError> {
        serde_json::to_writer(&mut writer, &self.to_json())?;
        writer.write_all(b"\n")?;
        Ok(())
    }

    /// Read an environment from a JSON object.
    ///
    /// String members become text entries, everything else is kept as JSON.
    pub fn decode<R: Read>(reader: R) -> Result<Self, EnvError> {
        let Value::Object(map) = serde_json::from_reader::<_, Value>(reader)? else {
            return Err(EnvError::NotAnObject);
        };
        let mut env = Env::new();
        for (key, value) in map {
            match value {
                Value::String(s) => env.set(key, s),
                other => env.set_value(key, EnvValue::Json(other)),
            }
        }
        Ok(env)
    }
}

impl<K, V> FromIterator<(K, V)> for Env
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut env = Env::new();
        for (k, v) in iter {
            env.set(k, v);
        }
        env
    }
}

/// Boolean spelling shared by every env surface. The empty string is false.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" | "none" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct PortBinding {
        host_ip: String,
        host_port: u16,
        tags: Vec<String>,
    }

    #[test]
    fn test_last_write_wins_in_place() {
        let mut env = Env::new();
        env.set("A", "1");
        env.set("B", "2");
        env.set("A", "3");

        assert_eq!(env.get("A").as_deref(), Some("3"));
        assert_eq!(env.keys(), vec!["A", "B"]);
        assert_eq!(env.len(), 2);
    }

    #[test]
    fn test_keys_are_case_sensitive() {
        let mut env = Env::new();
        env.set("Tls", "1");
        env.set("tls", "0");

        assert_eq!(env.len(), 2);
        assert_eq!(env.get_bool("Tls").unwrap(), Some(true));
        assert_eq!(env.get_bool("tls").unwrap(), Some(false));
    }

    #[test]
    fn test_unset_is_distinct_from_false_and_empty() {
        let mut env = Env::new();
        env.set_bool("Off", false);
        env.set("Empty", "");

        assert_eq!(env.get_bool("Missing").unwrap(), None);
        assert_eq!(env.get_bool("Off").unwrap(), Some(false));
        assert_eq!(env.get_bool("Empty").unwrap(), Some(false));
        assert_eq!(env.get("Empty").as_deref(), Some(""));
        assert!(env.get("Missing").is_none());
    }

    #[test]
    fn test_invalid_bool_is_an_error() {
        let mut env = Env::new();
        env.set("Logging", "maybe");

        let err = env.get_bool("Logging").unwrap_err();
        assert!(matches!(err, EnvError::InvalidBool { .. }));
    }

    #[test]
    fn test_bool_spellings() {
        let mut env = Env::new();
        for (raw, expected) in [("TRUE", true), (" yes ", true), ("0", false), ("none", false)] {
            env.set("K", raw);
            assert_eq!(env.get_bool("K").unwrap(), Some(expected), "raw={raw:?}");
        }
    }

    #[test]
    fn test_int_accessors() {
        let mut env = Env::new();
        env.set_int("Mtu", 1500);
        env.set("Bad", "fifteen");

        assert_eq!(env.get_int("Mtu").unwrap(), Some(1500));
        assert_eq!(env.get_int("Missing").unwrap(), None);
        assert!(matches!(
            env.get_int("Bad"),
            Err(EnvError::InvalidInt { .. })
        ));
    }

    #[test]
    fn test_json_structure_round_trip() {
        let binding = PortBinding {
            host_ip: "127.0.0.1".into(),
            host_port: 8080,
            tags: vec!["web".into()],
        };
        let mut env = Env::new();
        env.set_json("Binding", &binding).unwrap();

        let back: PortBinding = env.get_json("Binding").unwrap().unwrap();
        assert_eq!(back, binding);
    }

    #[test]
    fn test_json_type_mismatch_is_an_error() {
        let mut env = Env::new();
        env.set("Binding", "not json");

        let res = env.get_json::<PortBinding>("Binding");
        assert!(matches!(res, Err(EnvError::InvalidJson { .. })));
        assert!(env.get_json::<PortBinding>("Missing").unwrap().is_none());
    }

    #[test]
    fn test_list_falls_back_to_single_value() {
        let mut env = Env::new();
        env.set_list("Hosts", &["tcp://0.0.0.0:2375", "tcp://127.0.0.1:2376"]);
        env.set("Single", "unix:///var/run/dockyard.sock");

        assert_eq!(env.get_list("Hosts").unwrap().len(), 2);
        assert_eq!(
            env.get_list("Single").unwrap(),
            vec!["unix:///var/run/dockyard.sock".to_string()]
        );
        assert!(env.get_list("Missing").is_none());
    }

    #[test]
    fn test_encode_keeps_json_and_text_apart() {
        let mut env = Env::new();
        env.set_json("Version", "1.2.3").unwrap();
        env.set("GitCommit", "abc123");
        env.set("Count", "7");

        let mut buf = Vec::new();
        env.encode(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert_eq!(
            text,
            "{\"Version\":\"1.2.3\",\"GitCommit\":\"abc123\",\"Count\":\"7\"}\n"
        );
    }

    #[test]
    fn test_decode_object() {
        let env = Env::decode(&br#"{"Os":"linux","Containers":3,"Debug":false}"#[..]).unwrap();

        assert_eq!(env.get("Os").as_deref(), Some("linux"));
        assert_eq!(env.get_int("Containers").unwrap(), Some(3));
        assert_eq!(env.get_bool("Debug").unwrap(), Some(false));
    }

    #[test]
    fn test_decode_rejects_non_object() {
        assert!(matches!(
            Env::decode(&b"[1,2,3]"[..]),
            Err(EnvError::NotAnObject)
        ));
        assert!(matches!(
            Env::decode(&b"{oops"[..]),
            Err(EnvError::Malformed(_))
        ));
    }

    #[test]
    fn test_import_and_remove() {
        let mut base: Env = [("A", "1"), ("B", "2")].into_iter().collect();
        let overlay: Env = [("B", "20"), ("C", "30")].into_iter().collect();
        base.import(&overlay);

        assert_eq!(base.get("B").as_deref(), Some("20"));
        assert_eq!(base.len(), 3);
        assert!(base.remove("A").is_some());
        assert!(!base.exists("A"));
    }

    proptest! {
        #[test]
        fn prop_bool_round_trip(value in any::<bool>(), key in "[A-Za-z][A-Za-z0-9]{0,12}") {
            let mut env = Env::new();
            env.set_bool(key.clone(), value);
            prop_assert_eq!(env.get_bool(&key).unwrap(), Some(value));
        }

        #[test]
        fn prop_text_survives_encode_decode(value in ".{0,40}") {
            let mut env = Env::new();
            env.set("Value", value.clone());
            let mut buf = Vec::new();
            env.encode(&mut buf).unwrap();
            let back = Env::decode(buf.as_slice()).unwrap();
            prop_assert_eq!(back.get("Value"), Some(value));
        }
    }
}
