//! In-memory backend used by the cache and library tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use super::remote::{Remote, Verb};
use crate::api::ApiError;
use crate::models::EntityId;

pub struct FakeRemote {
    online: AtomicBool,
    items: Mutex<Value>,
    next_id: AtomicI64,
    fetches: AtomicUsize,
    responses: Mutex<HashMap<String, Value>>,
    calls: Mutex<Vec<String>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self {
            online: AtomicBool::new(true),
            items: Mutex::new(json!([])),
            next_id: AtomicI64::new(1),
            fetches: AtomicUsize::new(0),
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_items(&self, items: Value) {
        *self.items.lock().unwrap() = items;
    }

    pub fn set_next_id(&self, id: i64) {
        self.next_id.store(id, Ordering::SeqCst);
    }

    pub fn go_offline(&self) {
        self.online.store(false, Ordering::SeqCst);
    }

    pub fn go_online(&self) {
        self.online.store(true, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Answer `call`s for `"VERB a/b?k=v"` with `response`. Unregistered
    /// calls fail with `NotFound`.
    pub fn respond(&self, call: &str, response: Value) {
        self.responses.lock().unwrap().insert(call.to_string(), response);
    }

    /// Every `call` made so far, in `"VERB a/b?k=v"` form.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn check_online(&self) -> Result<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ApiError::ServerError("backend down".into()).into())
        }
    }
}

fn with_id(id: Value, body: Value) -> Value {
    let mut fields = match body {
        Value::Object(fields) => fields,
        _ => Default::default(),
    };
    fields.insert("id".into(), id);
    Value::Object(fields)
}

#[async_trait]
impl Remote for FakeRemote {
    async fn fetch_all(&self, _namespace: &str) -> Result<Value> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        Ok(self.items.lock().unwrap().clone())
    }

    async fn create(&self, _namespace: &str, body: Value) -> Result<Value> {
        self.check_online()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let created = with_id(json!(id), body);
        if let Value::Array(items) = &mut *self.items.lock().unwrap() {
            items.push(created.clone());
        }
        Ok(created)
    }

    async fn update(&self, _namespace: &str, id: &EntityId, body: Value) -> Result<Value> {
        self.check_online()?;
        Ok(with_id(serde_json::to_value(id)?, body))
    }

    async fn delete(&self, _namespace: &str, id: &EntityId) -> Result<()> {
        self.check_online()?;
        if let Value::Array(items) = &mut *self.items.lock().unwrap() {
            items.retain(|item| !id.matches(item));
        }
        Ok(())
    }

    async fn call(&self, verb: Verb, path: &[&str], query: &[(&str, &str)]) -> Result<Value> {
        let mut key = format!("{} {}", verb, path.join("/"));
        if !query.is_empty() {
            let pairs: Vec<String> = query.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            key = format!("{}?{}", key, pairs.join("&"));
        }
        self.calls.lock().unwrap().push(key.clone());
        self.check_online()?;
        self.responses
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(key).into())
    }
}
