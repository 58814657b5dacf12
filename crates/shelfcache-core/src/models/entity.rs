use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier of a backend record. The backend mixes numeric ids
/// (authors, books, copies) with string ids (loans, fines, users).
///
/// Equality is strict: `Int(5)` and `Text("5")` are different ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Int(i64),
    Text(String),
}

impl EntityId {
    /// Read an id out of a JSON value. Floats, booleans, objects and null
    /// are not ids.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(EntityId::Int),
            Value::String(s) => Some(EntityId::Text(s.clone())),
            _ => None,
        }
    }

    /// Parse user input: surrounding whitespace is dropped, integers become
    /// `Int`, anything else `Text`.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        input
            .parse::<i64>()
            .map(EntityId::Int)
            .unwrap_or_else(|_| EntityId::Text(input.to_string()))
    }

    /// True if `item` is a JSON object whose `id` field equals this id.
    pub fn matches(&self, item: &Value) -> bool {
        item.get("id")
            .and_then(EntityId::from_json)
            .is_some_and(|id| &id == self)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Int(n) => write!(f, "{}", n),
            EntityId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for EntityId {
    fn from(n: i64) -> Self {
        EntityId::Int(n)
    }
}

impl From<i32> for EntityId {
    fn from(n: i32) -> Self {
        EntityId::Int(n.into())
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        EntityId::Text(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        EntityId::Text(s)
    }
}

/// A record with a unique identifier. Identity is the only thing the
/// cache interprets; every other field is opaque to it.
pub trait Entity {
    fn id(&self) -> EntityId;
}
