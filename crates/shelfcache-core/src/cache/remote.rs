use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::models::EntityId;

/// HTTP verb of a backend call outside the collection CRUD shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Post,
    Put,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verb::Get => write!(f, "GET"),
            Verb::Post => write!(f, "POST"),
            Verb::Put => write!(f, "PUT"),
        }
    }
}

/// The backend side of a cached collection, in raw JSON.
///
/// Errors are `anyhow` errors that usually wrap an [`ApiError`]
/// (see [`crate::api::ApiError`]).
#[async_trait]
pub trait Remote: Send + Sync {
    /// Full collection, expected to be a JSON array.
    async fn fetch_all(&self, namespace: &str) -> Result<Value>;

    /// Create a record and return it as stored by the backend.
    async fn create(&self, namespace: &str, body: Value) -> Result<Value>;

    /// Update a record and return the backend's version of it.
    async fn update(&self, namespace: &str, id: &EntityId, body: Value) -> Result<Value>;

    async fn delete(&self, namespace: &str, id: &EntityId) -> Result<()>;

    /// Bodiless call to `/api/{path...}?{query}`. An empty response is
    /// `Value::Null`; a non-JSON response is returned as a JSON string.
    async fn call(&self, verb: Verb, path: &[&str], query: &[(&str, &str)]) -> Result<Value>;
}
