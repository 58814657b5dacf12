use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Entity, EntityId};

/// A JSON object with a usable `id`, for namespaces that have no Rust model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Record {
    id: EntityId,
    fields: Map<String, Value>,
}

impl Record {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// All fields, including `id`.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// A short human label: the first of `name`, `title`, `userName`,
    /// `username` that is a string.
    pub fn label(&self) -> Option<&str> {
        ["name", "title", "userName", "username"]
            .iter()
            .find_map(|key| self.fields.get(*key).and_then(Value::as_str))
    }
}

impl Entity for Record {
    fn id(&self) -> EntityId {
        self.id.clone()
    }
}

impl TryFrom<Map<String, Value>> for Record {
    type Error = String;

    fn try_from(fields: Map<String, Value>) -> Result<Self, Self::Error> {
        let id = fields
            .get("id")
            .and_then(EntityId::from_json)
            .ok_or_else(|| "record has no string or integer id".to_string())?;
        Ok(Self { id, fields })
    }
}

impl From<Record> for Map<String, Value> {
    fn from(record: Record) -> Self {
        record.fields
    }
}
