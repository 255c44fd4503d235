//! Attribute documents
//!
//! Source-defined metadata attached to a fact (`{property_type, tier}`,
//! `{series_id}`, or nothing). The document is part of the identity key, so
//! equality and hashing are defined on its canonical serialization: key order
//! never matters, at any nesting depth.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};

use crate::utils::json::canonicalize_json;

/// Canonicalized attribute document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(BTreeMap<String, JsonValue>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an arbitrary JSON value.
    ///
    /// `null` is the empty document; anything other than an object is an error.
    pub fn from_json(value: JsonValue) -> Result<Self, String> {
        match value {
            JsonValue::Null => Ok(Self::default()),
            JsonValue::Object(map) => Ok(Self(
                map.into_iter()
                    .map(|(k, v)| (k, canonicalize_json(v)))
                    .collect(),
            )),
            other => Err(format!(
                "attributes must be a JSON object, got {}",
                json_kind(&other)
            )),
        }
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.0.insert(key.into(), canonicalize_json(value.into()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Compact, sorted-key serialization used for identity comparison and
    /// as the bound parameter for the `jsonb` column
    pub fn canonical(&self) -> String {
        self.to_json().to_string()
    }

    pub fn to_json(&self) -> JsonValue {
        let mut map = Map::with_capacity(self.0.len());
        for (k, v) in &self.0 {
            map.insert(k.clone(), v.clone());
        }
        JsonValue::Object(map)
    }
}

impl Hash for Attributes {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical().hash(state);
    }
}

impl fmt::Display for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl Serialize for Attributes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Attributes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = JsonValue::deserialize(deserializer)?;
        Self::from_json(value).map_err(serde::de::Error::custom)
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
