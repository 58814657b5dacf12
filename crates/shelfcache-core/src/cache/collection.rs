use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::error::CacheError;
use super::remote::{Remote, Verb};
use super::storage::{snapshot_key, SnapshotStore};
use crate::api::ApiError;
use crate::models::{Entity, EntityId};

/// Which tier of the fallback chain served a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Remote,
    Snapshot,
    Seed,
    Empty,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Remote => write!(f, "remote"),
            Source::Snapshot => write!(f, "snapshot"),
            Source::Seed => write!(f, "seed"),
            Source::Empty => write!(f, "empty"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Loaded<T> {
    pub items: Vec<T>,
    pub source: Source,
}

/// A remote collection with a persisted local snapshot.
///
/// Reads never fail: remote, then snapshot, then bundled seed, then empty.
/// Writes go to the backend first and only touch the snapshot once the
/// backend has accepted them; a failed write leaves the snapshot as it was
/// and returns the error.
///
/// The snapshot holds the backend's JSON as received, so several views of
/// one namespace (a typed model and `Record`) can share it. Entries a view
/// cannot decode are skipped by that view and stay in the snapshot.
pub struct CachedCollection<T> {
    namespace: String,
    storage_key: String,
    remote: Arc<dyn Remote>,
    store: Arc<dyn SnapshotStore>,
    seed: Option<Vec<T>>,
}

impl<T> CachedCollection<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    pub fn new(
        namespace: impl Into<String>,
        remote: Arc<dyn Remote>,
        store: Arc<dyn SnapshotStore>,
    ) -> Self {
        let namespace = namespace.into();
        Self {
            storage_key: snapshot_key(&namespace),
            namespace,
            remote,
            store,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: Vec<T>) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub async fn get_all(&self) -> Vec<T> {
        self.get_all_with_source().await.items
    }

    pub async fn get_all_with_source(&self) -> Loaded<T> {
        match self.fetch_remote().await {
            Ok((raw, items)) => {
                self.write_snapshot(&raw);
                return Loaded {
                    items,
                    source: Source::Remote,
                };
            }
            Err(e) => {
                warn!(
                    namespace = %self.namespace,
                    kind = failure_kind(&e),
                    error = %e,
                    "Failed to fetch collection"
                );
            }
        }
        self.local()
    }

    /// Ask a dedicated backend endpoint under this namespace
    /// (`/api/{namespace}/{path...}`). If it fails, filter what the local
    /// tiers hold instead. Query results are never persisted.
    pub async fn query<F>(&self, path: &[&str], keep: F) -> Vec<T>
    where
        F: Fn(&T) -> bool,
    {
        let full_path = self.path_under_namespace(path);
        let result = self
            .remote
            .call(Verb::Get, &full_path, &[])
            .await
            .and_then(|raw| {
                Vec::<T>::deserialize(&raw)
                    .with_context(|| format!("Unexpected payload for {}", full_path.join("/")))
            });
        match result {
            Ok(items) => items,
            Err(e) => {
                warn!(
                    namespace = %self.namespace,
                    path = %full_path.join("/"),
                    kind = failure_kind(&e),
                    error = %e,
                    "Query failed, filtering local data"
                );
                self.local().items.into_iter().filter(|item| keep(item)).collect()
            }
        }
    }

    /// Bodiless backend call under this namespace. Errors propagate and the
    /// snapshot is left alone.
    pub async fn call(&self, verb: Verb, path: &[&str], query: &[(&str, &str)]) -> Result<Value> {
        let full_path = self.path_under_namespace(path);
        self.remote
            .call(verb, &full_path, query)
            .await
            .inspect_err(|e| {
                warn!(namespace = %self.namespace, path = %full_path.join("/"), error = %e, "Backend call failed")
            })
    }

    /// A backend call that answers with one entity of this collection.
    /// The entity is merged into the snapshot, or appended if it is new.
    pub async fn call_for_entity(
        &self,
        operation: &'static str,
        verb: Verb,
        path: &[&str],
        query: &[(&str, &str)],
    ) -> Result<T> {
        let value = self.call(verb, path, query).await?;
        let entity = self.decode_response(operation, &value)?;
        self.upsert_snapshot(&value);
        Ok(entity)
    }

    /// Merge `changes` into the snapshot entry with `id`, if there is one.
    /// For backend calls that change an entity without returning it.
    pub fn patch_snapshot(&self, id: &EntityId, changes: &Value) {
        let Some(mut items) = self.read_raw_snapshot() else {
            return;
        };
        let mut changed = false;
        for item in items.iter_mut().filter(|item| id.matches(item)) {
            *item = shallow_merge(item.take(), changes);
            changed = true;
        }
        if changed {
            self.write_snapshot(&items);
        }
    }

    pub async fn create<P>(&self, partial: &P) -> Result<T>
    where
        P: Serialize + Sync + ?Sized,
    {
        let body = serde_json::to_value(partial).context("Failed to encode request body")?;
        let created = self
            .remote
            .create(&self.namespace, body)
            .await
            .inspect_err(|e| warn!(namespace = %self.namespace, error = %e, "Failed to create entity"))?;
        let entity = self.decode_response("create", &created)?;

        let mut items = self.read_raw_snapshot().unwrap_or_default();
        items.push(created);
        self.write_snapshot(&items);
        Ok(entity)
    }

    pub async fn update<P>(&self, id: impl Into<EntityId>, partial: &P) -> Result<T>
    where
        P: Serialize + Sync + ?Sized,
    {
        let id = id.into();
        let body = serde_json::to_value(partial).context("Failed to encode request body")?;
        let updated = self
            .remote
            .update(&self.namespace, &id, body)
            .await
            .inspect_err(|e| {
                warn!(namespace = %self.namespace, id = %id, error = %e, "Failed to update entity")
            })?;
        let entity = self.decode_response("update", &updated)?;

        let items: Vec<Value> = self
            .read_raw_snapshot()
            .unwrap_or_default()
            .into_iter()
            .map(|item| {
                if id.matches(&item) {
                    shallow_merge(item, &updated)
                } else {
                    item
                }
            })
            .collect();
        self.write_snapshot(&items);
        Ok(entity)
    }

    pub async fn delete(&self, id: impl Into<EntityId>) -> Result<()> {
        let id = id.into();
        self.remote
            .delete(&self.namespace, &id)
            .await
            .inspect_err(|e| {
                warn!(namespace = %self.namespace, id = %id, error = %e, "Failed to delete entity")
            })?;

        let mut items = self.read_raw_snapshot().unwrap_or_default();
        items.retain(|item| !id.matches(item));
        self.write_snapshot(&items);
        Ok(())
    }

    /// Drop the persisted snapshot for this namespace.
    pub fn clear_cache(&self) {
        match self.store.remove(&self.storage_key) {
            Ok(()) => info!(namespace = %self.namespace, "Cleared cached snapshot"),
            Err(e) => warn!(namespace = %self.namespace, error = %e, "Failed to clear cached snapshot"),
        }
    }

    /// The persisted snapshot as `T`, or `None` when absent or unreadable.
    /// Entries that do not decode as `T` are left out.
    pub fn snapshot(&self) -> Option<Vec<T>> {
        self.read_raw_snapshot().map(|raw| self.decode_entries(raw))
    }

    /// Snapshot, then seed, then empty, without asking the backend.
    pub fn local(&self) -> Loaded<T> {
        let raw = self.read_raw_snapshot().filter(|raw| !raw.is_empty());
        let has_snapshot = raw.is_some();

        if let Some(raw) = raw {
            let items = self.decode_entries(raw);
            if !items.is_empty() {
                debug!(namespace = %self.namespace, key = %self.storage_key, "Serving persisted snapshot");
                return Loaded {
                    items,
                    source: Source::Snapshot,
                };
            }
        }

        if let Some(seed) = self.seed.as_ref().filter(|seed| !seed.is_empty()) {
            if has_snapshot {
                // another view's entries; keep them
                warn!(namespace = %self.namespace, "No snapshot entry matches the model, serving seed without persisting it");
            } else {
                info!(namespace = %self.namespace, "Serving bundled seed data");
                self.write_snapshot(seed);
            }
            return Loaded {
                items: seed.clone(),
                source: Source::Seed,
            };
        }

        debug!(namespace = %self.namespace, "No data available, returning empty collection");
        Loaded {
            items: Vec::new(),
            source: Source::Empty,
        }
    }

    fn path_under_namespace<'a>(&'a self, path: &[&'a str]) -> Vec<&'a str> {
        let mut full_path = Vec::with_capacity(path.len() + 1);
        full_path.push(self.namespace.as_str());
        full_path.extend_from_slice(path);
        full_path
    }

    async fn fetch_remote(&self) -> Result<(Value, Vec<T>)> {
        let raw = self.remote.fetch_all(&self.namespace).await?;
        let items = Vec::<T>::deserialize(&raw)
            .with_context(|| format!("Unexpected payload for {}", self.namespace))?;
        Ok((raw, items))
    }

    fn decode_response(&self, operation: &'static str, value: &Value) -> Result<T> {
        T::deserialize(value).map_err(|source| {
            warn!(namespace = %self.namespace, operation, error = %source, "Backend response does not match the model");
            CacheError::UnreadableResponse {
                namespace: self.namespace.clone(),
                operation,
                source,
            }
            .into()
        })
    }

    fn decode_entries(&self, raw: Vec<Value>) -> Vec<T> {
        let total = raw.len();
        let items: Vec<T> = raw
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect();
        if items.len() < total {
            warn!(
                namespace = %self.namespace,
                skipped = total - items.len(),
                "Skipping snapshot entries that do not match the model"
            );
        }
        items
    }

    /// The snapshot as a JSON array; `None` when absent, unparseable or not
    /// an array.
    fn read_raw_snapshot(&self) -> Option<Vec<Value>> {
        let bytes = match self.store.get(&self.storage_key) {
            Ok(bytes) => bytes?,
            Err(e) => {
                warn!(namespace = %self.namespace, error = %e, "Failed to read snapshot");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(items) => Some(items),
            Err(e) => {
                warn!(namespace = %self.namespace, error = %e, "Ignoring corrupt snapshot");
                None
            }
        }
    }

    fn upsert_snapshot(&self, entity: &Value) {
        let Some(id) = entity.get("id").and_then(EntityId::from_json) else {
            return;
        };
        let mut items = self.read_raw_snapshot().unwrap_or_default();
        match items.iter_mut().find(|item| id.matches(item)) {
            Some(item) => *item = shallow_merge(item.take(), entity),
            None => items.push(entity.clone()),
        }
        self.write_snapshot(&items);
    }

    /// Snapshot write failures are logged only; the remote outcome stands.
    fn write_snapshot<S: Serialize + ?Sized>(&self, items: &S) {
        let result = serde_json::to_vec(items)
            .context("Failed to encode snapshot")
            .and_then(|bytes| self.store.set(&self.storage_key, &bytes));
        if let Err(e) = result {
            warn!(namespace = %self.namespace, error = %e, "Failed to persist snapshot");
        }
    }
}

impl<T> CachedCollection<T>
where
    T: Entity + Serialize + DeserializeOwned + Clone + Send + Sync,
{
    /// Look up one entity through the same fallback chain as `get_all`.
    pub async fn find(&self, id: impl Into<EntityId>) -> Option<T> {
        let id = id.into();
        self.get_all()
            .await
            .into_iter()
            .find(|item| item.id() == id)
    }
}

/// `unreachable` when the backend could not be contacted, `error` when it
/// answered badly.
fn failure_kind(error: &anyhow::Error) -> &'static str {
    match error.downcast_ref::<ApiError>() {
        Some(api_error) if api_error.is_unreachable() => "unreachable",
        _ => "error",
    }
}

/// Fields of `update` win over `base`. A non-object update leaves `base`
/// as it was.
fn shallow_merge(base: Value, update: &Value) -> Value {
    match (base, update) {
        (Value::Object(mut fields), Value::Object(changes)) => {
            for (key, value) in changes {
                fields.insert(key.clone(), value.clone());
            }
            Value::Object(fields)
        }
        (base, _) => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::cache::storage::MemoryStore;
    use crate::cache::testing::FakeRemote;
    use crate::models::{Author, Record};
    use serde_json::json;

    fn setup<T>(namespace: &str) -> (Arc<FakeRemote>, Arc<MemoryStore>, CachedCollection<T>)
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync,
    {
        let remote = Arc::new(FakeRemote::new());
        let store = Arc::new(MemoryStore::new());
        let collection = CachedCollection::new(namespace, remote.clone(), store.clone());
        (remote, store, collection)
    }

    fn stored(store: &MemoryStore, namespace: &str) -> Option<Value> {
        store
            .get(&snapshot_key(namespace))
            .unwrap()
            .map(|bytes| serde_json::from_slice(&bytes).unwrap())
    }

    fn put(store: &MemoryStore, namespace: &str, value: Value) {
        store
            .set(&snapshot_key(namespace), &serde_json::to_vec(&value).unwrap())
            .unwrap();
    }

    #[tokio::test]
    async fn test_remote_success_returns_and_persists_verbatim() {
        let (remote, store, books) = setup::<Record>("books");
        let payload = json!([
            {"id": 1, "title": "1984", "publisherId": 3},
            {"id": 2, "title": "Emma", "unmodelled": {"nested": true}}
        ]);
        remote.set_items(payload.clone());

        let loaded = books.get_all_with_source().await;
        assert_eq!(loaded.source, Source::Remote);
        assert_eq!(serde_json::to_value(&loaded.items).unwrap(), payload);
        assert_eq!(stored(&store, "books"), Some(payload));
    }

    #[tokio::test]
    async fn test_remote_payload_keeps_unmodelled_fields_in_snapshot() {
        let (remote, store, authors) = setup::<Author>("authors");
        let payload = json!([{"id": 1, "name": "Ann", "bio": "kept"}]);
        remote.set_items(payload.clone());

        let items = authors.get_all().await;
        assert_eq!(items, vec![Author { id: 1, name: "Ann".into() }]);
        assert_eq!(stored(&store, "authors"), Some(payload));
    }

    #[tokio::test]
    async fn test_snapshot_wins_over_seed_when_remote_down() {
        let (remote, store, authors) = setup::<Record>("authors");
        let authors = authors.with_seed(vec![
            serde_json::from_value(json!({"id": 2, "name": "Bea"})).unwrap(),
        ]);
        remote.go_offline();
        put(&store, "authors", json!([{"id": 1, "name": "Ann"}]));

        let loaded = authors.get_all_with_source().await;
        assert_eq!(loaded.source, Source::Snapshot);
        assert_eq!(
            serde_json::to_value(&loaded.items).unwrap(),
            json!([{"id": 1, "name": "Ann"}])
        );
        // snapshot is returned unchanged and left as it was
        assert_eq!(stored(&store, "authors"), Some(json!([{"id": 1, "name": "Ann"}])));
    }

    #[tokio::test]
    async fn test_empty_snapshot_falls_through_to_seed_and_persists_it() {
        let (remote, store, categories) = setup::<Record>("categories");
        let categories = categories.with_seed(vec![
            serde_json::from_value(json!({"id": 9, "name": "Fiction"})).unwrap(),
        ]);
        remote.go_offline();
        put(&store, "categories", json!([]));

        let first = categories.get_all_with_source().await;
        assert_eq!(first.source, Source::Seed);
        assert_eq!(
            serde_json::to_value(&first.items).unwrap(),
            json!([{"id": 9, "name": "Fiction"}])
        );
        assert_eq!(
            stored(&store, "categories"),
            Some(json!([{"id": 9, "name": "Fiction"}]))
        );

        // the persisted seed now serves as the snapshot, same data
        let second = categories.get_all().await;
        assert_eq!(
            serde_json::to_value(&second).unwrap(),
            json!([{"id": 9, "name": "Fiction"}])
        );
    }

    #[tokio::test]
    async fn test_repeated_seed_fallback_is_idempotent() {
        let (remote, store, authors) = setup::<Author>("authors");
        let seed = vec![Author { id: 2, name: "Bea".into() }];
        let authors = authors.with_seed(seed.clone());
        remote.go_offline();

        assert_eq!(authors.get_all().await, seed);
        let after_first = stored(&store, "authors");
        put(&store, "authors", json!([]));
        assert_eq!(authors.get_all().await, seed);
        assert_eq!(stored(&store, "authors"), after_first);
    }

    #[tokio::test]
    async fn test_nothing_available_returns_empty() {
        let (remote, store, publishers) = setup::<Record>("publishers");
        remote.go_offline();

        let loaded = publishers.get_all_with_source().await;
        assert_eq!(loaded.source, Source::Empty);
        assert!(loaded.items.is_empty());
        assert_eq!(stored(&store, "publishers"), None);
    }

    #[tokio::test]
    async fn test_empty_seed_is_not_used() {
        let (remote, store, authors) = setup::<Author>("authors");
        let authors = authors.with_seed(Vec::new());
        remote.go_offline();

        assert_eq!(authors.get_all_with_source().await.source, Source::Empty);
        assert_eq!(stored(&store, "authors"), None);
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_treated_as_absent() {
        let (remote, store, authors) = setup::<Author>("authors");
        let seed = vec![Author { id: 2, name: "Bea".into() }];
        let authors = authors.with_seed(seed.clone());
        remote.go_offline();
        store.set(&snapshot_key("authors"), b"{not json").unwrap();

        assert!(authors.snapshot().is_none());
        let loaded = authors.get_all_with_source().await;
        assert_eq!(loaded.source, Source::Seed);
        assert_eq!(loaded.items, seed);
    }

    #[tokio::test]
    async fn test_undecodable_remote_payload_falls_back() {
        let (remote, store, authors) = setup::<Author>("authors");
        put(&store, "authors", json!([{"id": 1, "name": "Ann"}]));
        remote.set_items(json!({"error": "not a list"}));

        let loaded = authors.get_all_with_source().await;
        assert_eq!(loaded.source, Source::Snapshot);
        // bad payload is not persisted
        assert_eq!(stored(&store, "authors"), Some(json!([{"id": 1, "name": "Ann"}])));
    }

    #[tokio::test]
    async fn test_create_success_appends_server_entity() {
        let (remote, store, authors) = setup::<Author>("authors");
        put(&store, "authors", json!([{"id": 1, "name": "Ann"}]));
        remote.set_next_id(42);

        let created = authors.create(&json!({"name": "Cleo"})).await.unwrap();
        assert_eq!(created, Author { id: 42, name: "Cleo".into() });
        assert_eq!(
            stored(&store, "authors"),
            Some(json!([{"id": 1, "name": "Ann"}, {"id": 42, "name": "Cleo"}]))
        );
    }

    #[tokio::test]
    async fn test_create_without_snapshot_starts_new_one() {
        let (_remote, store, authors) = setup::<Author>("authors");
        let created = authors.create(&json!({"name": "Cleo"})).await.unwrap();
        assert_eq!(
            stored(&store, "authors"),
            Some(json!([{"id": created.id, "name": "Cleo"}]))
        );
    }

    #[tokio::test]
    async fn test_create_failure_leaves_snapshot_and_rejects() {
        let (remote, store, authors) = setup::<Author>("authors");
        put(&store, "authors", json!([{"id": 1, "name": "Ann"}]));
        remote.go_offline();

        let err = authors.create(&json!({"name": "Cleo"})).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ApiError>(),
            Some(ApiError::ServerError(_))
        ));
        assert_eq!(stored(&store, "authors"), Some(json!([{"id": 1, "name": "Ann"}])));
    }

    #[tokio::test]
    async fn test_update_merges_only_matching_entry() {
        let (_remote, store, authors) = setup::<Record>("authors");
        put(
            &store,
            "authors",
            json!([
                {"id": 1, "name": "Ann", "born": 1900},
                {"id": 2, "name": "Bea"}
            ]),
        );

        let updated = authors.update(1, &json!({"name": "Ann B."})).await.unwrap();
        assert_eq!(updated.get("name"), Some(&json!("Ann B.")));
        assert_eq!(
            stored(&store, "authors"),
            Some(json!([
                {"id": 1, "name": "Ann B.", "born": 1900},
                {"id": 2, "name": "Bea"}
            ]))
        );
    }

    #[tokio::test]
    async fn test_update_absent_id_does_not_insert() {
        let (_remote, store, authors) = setup::<Author>("authors");
        put(&store, "authors", json!([{"id": 1, "name": "Ann"}]));

        let updated = authors.update(7, &json!({"name": "Ghost"})).await.unwrap();
        assert_eq!(updated.id, 7);
        assert_eq!(stored(&store, "authors"), Some(json!([{"id": 1, "name": "Ann"}])));
    }

    #[tokio::test]
    async fn test_update_matches_ids_strictly() {
        let (_remote, store, fines) = setup::<Record>("fines");
        put(&store, "fines", json!([{"id": "5", "amount": 10}, {"id": 5, "amount": 20}]));

        fines.update("5", &json!({"amount": 0})).await.unwrap();
        assert_eq!(
            stored(&store, "fines"),
            Some(json!([{"id": "5", "amount": 0}, {"id": 5, "amount": 20}]))
        );
    }

    #[tokio::test]
    async fn test_update_failure_leaves_snapshot() {
        let (remote, store, authors) = setup::<Author>("authors");
        put(&store, "authors", json!([{"id": 1, "name": "Ann"}]));
        remote.go_offline();

        assert!(authors.update(1, &json!({"name": "X"})).await.is_err());
        assert_eq!(stored(&store, "authors"), Some(json!([{"id": 1, "name": "Ann"}])));
    }

    #[tokio::test]
    async fn test_delete_removes_matching_entry() {
        let (_remote, store, copies) = setup::<Record>("book-copy");
        put(&store, "book-copy", json!([{"id": 5}, {"id": 6}]));

        copies.delete(5).await.unwrap();
        assert_eq!(stored(&store, "book-copy"), Some(json!([{"id": 6}])));
    }

    #[tokio::test]
    async fn test_delete_failure_propagates() {
        let (remote, store, copies) = setup::<Record>("book-copy");
        put(&store, "book-copy", json!([{"id": 5}, {"id": 6}]));
        remote.go_offline();

        assert!(copies.delete(5).await.is_err());
        assert_eq!(stored(&store, "book-copy"), Some(json!([{"id": 5}, {"id": 6}])));
    }

    #[tokio::test]
    async fn test_find_uses_fallback_chain() {
        let (remote, _store, authors) = setup::<Author>("authors");
        let authors = authors.with_seed(vec![
            Author { id: 1, name: "Ann".into() },
            Author { id: 2, name: "Bea".into() },
        ]);
        remote.go_offline();

        assert_eq!(authors.find(2).await.map(|a| a.name), Some("Bea".to_string()));
        assert!(authors.find(3).await.is_none());
    }

    #[tokio::test]
    async fn test_clear_cache_removes_snapshot() {
        let (_remote, store, authors) = setup::<Author>("authors");
        put(&store, "authors", json!([{"id": 1, "name": "Ann"}]));

        authors.clear_cache();
        assert_eq!(stored(&store, "authors"), None);
        assert!(authors.snapshot().is_none());
    }

    #[tokio::test]
    async fn test_recovery_after_outage_returns_to_remote() {
        let (remote, store, authors) = setup::<Author>("authors");
        put(&store, "authors", json!([{"id": 1, "name": "Ann"}]));
        remote.go_offline();
        assert_eq!(authors.get_all_with_source().await.source, Source::Snapshot);

        remote.go_online();
        remote.set_items(json!([{"id": 3, "name": "Cy"}]));
        let loaded = authors.get_all_with_source().await;
        assert_eq!(loaded.source, Source::Remote);
        assert_eq!(stored(&store, "authors"), Some(json!([{"id": 3, "name": "Cy"}])));
    }

    #[tokio::test]
    async fn test_typed_view_skips_entries_it_cannot_decode() {
        let (remote, store, authors) = setup::<Author>("authors");
        let authors = authors.with_seed(vec![Author { id: 9, name: "Seed".into() }]);
        remote.go_offline();
        let shared = json!([{"id": 1, "name": "Ann"}, {"id": 2, "fullName": "Bea"}]);
        put(&store, "authors", shared.clone());

        let loaded = authors.get_all_with_source().await;
        assert_eq!(loaded.source, Source::Snapshot);
        assert_eq!(loaded.items, vec![Author { id: 1, name: "Ann".into() }]);
        assert_eq!(stored(&store, "authors"), Some(shared));
    }

    #[tokio::test]
    async fn test_seed_never_replaces_a_foreign_snapshot() {
        let (remote, store, authors) = setup::<Author>("authors");
        let seed = vec![Author { id: 9, name: "Seed".into() }];
        let authors = authors.with_seed(seed.clone());
        remote.go_offline();
        let shared = json!([{"id": 2, "fullName": "Bea"}]);
        put(&store, "authors", shared.clone());

        let loaded = authors.get_all_with_source().await;
        assert_eq!(loaded.source, Source::Seed);
        assert_eq!(loaded.items, seed);
        assert_eq!(stored(&store, "authors"), Some(shared));
    }

    #[tokio::test]
    async fn test_non_array_snapshot_is_treated_as_absent() {
        let (remote, store, authors) = setup::<Author>("authors");
        remote.go_offline();
        put(&store, "authors", json!({"id": 1, "name": "Ann"}));

        assert!(authors.snapshot().is_none());
        assert_eq!(authors.get_all_with_source().await.source, Source::Empty);
    }

    #[tokio::test]
    async fn test_writes_start_over_from_a_corrupt_snapshot() {
        let (remote, store, authors) = setup::<Author>("authors");
        remote.set_next_id(3);

        store.set(&snapshot_key("authors"), b"{not json").unwrap();
        authors.create(&json!({"name": "Cy"})).await.unwrap();
        assert_eq!(stored(&store, "authors"), Some(json!([{"id": 3, "name": "Cy"}])));

        store.set(&snapshot_key("authors"), b"{not json").unwrap();
        authors.update(3, &json!({"name": "Cyd"})).await.unwrap();
        assert_eq!(stored(&store, "authors"), Some(json!([])));

        store.set(&snapshot_key("authors"), b"{not json").unwrap();
        authors.delete(3).await.unwrap();
        assert_eq!(stored(&store, "authors"), Some(json!([])));
    }

    #[tokio::test]
    async fn test_unreadable_create_response_leaves_snapshot() {
        let (_remote, store, authors) = setup::<Author>("authors");
        put(&store, "authors", json!([{"id": 1, "name": "Ann"}]));

        let err = authors.create(&json!({"fullName": "Cleo"})).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CacheError>(),
            Some(CacheError::UnreadableResponse { operation: "create", .. })
        ));
        assert!(err.to_string().contains("accepted"));
        assert_eq!(stored(&store, "authors"), Some(json!([{"id": 1, "name": "Ann"}])));
    }

    #[tokio::test]
    async fn test_unreadable_update_response_leaves_snapshot() {
        let (_remote, store, authors) = setup::<Author>("authors");
        put(&store, "authors", json!([{"id": 1, "name": "Ann"}]));

        let err = authors.update(1, &json!({"name": 42})).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CacheError>(),
            Some(CacheError::UnreadableResponse { operation: "update", .. })
        ));
        assert_eq!(stored(&store, "authors"), Some(json!([{"id": 1, "name": "Ann"}])));
    }

    #[tokio::test]
    async fn test_query_prefers_backend_endpoint() {
        let (remote, store, authors) = setup::<Author>("authors");
        put(&store, "authors", json!([{"id": 1, "name": "Ann"}]));
        remote.respond("GET authors/search/Bea", json!([{"id": 2, "name": "Bea"}]));

        let found = authors
            .query(&["search", "Bea"], |a| a.name.contains("Bea"))
            .await;
        assert_eq!(found, vec![Author { id: 2, name: "Bea".into() }]);
        // query results are not persisted
        assert_eq!(stored(&store, "authors"), Some(json!([{"id": 1, "name": "Ann"}])));
        assert_eq!(remote.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_query_filters_local_data_when_backend_fails() {
        let (remote, store, authors) = setup::<Author>("authors");
        put(
            &store,
            "authors",
            json!([{"id": 1, "name": "Ann"}, {"id": 2, "name": "Bea"}]),
        );
        remote.go_offline();

        let found = authors.query(&["search", "Bea"], |a| a.name == "Bea").await;
        assert_eq!(found, vec![Author { id: 2, name: "Bea".into() }]);
        assert_eq!(remote.calls(), vec!["GET authors/search/Bea".to_string()]);
        assert_eq!(remote.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_call_for_entity_merges_or_appends() {
        let (remote, store, requests) = setup::<Record>("requests");
        put(&store, "requests", json!([{"id": "req-1", "status": "PENDING"}]));
        remote.respond(
            "POST requests/process/req-1/true",
            json!({"id": "req-1", "status": "ACCEPTED"}),
        );
        remote.respond(
            "POST requests/ann/new/borrow?bookCopyId=4",
            json!({"id": "req-2", "status": "PENDING"}),
        );

        requests
            .call_for_entity("approve", Verb::Post, &["process", "req-1", "true"], &[])
            .await
            .unwrap();
        let created = requests
            .call_for_entity(
                "borrow",
                Verb::Post,
                &["ann", "new", "borrow"],
                &[("bookCopyId", "4")],
            )
            .await
            .unwrap();
        assert_eq!(created.get("id"), Some(&json!("req-2")));
        assert_eq!(
            stored(&store, "requests"),
            Some(json!([
                {"id": "req-1", "status": "ACCEPTED"},
                {"id": "req-2", "status": "PENDING"}
            ]))
        );
    }

    #[tokio::test]
    async fn test_failed_call_propagates_and_leaves_snapshot() {
        let (remote, store, requests) = setup::<Record>("requests");
        put(&store, "requests", json!([{"id": "req-1", "status": "PENDING"}]));
        remote.go_offline();

        let err = requests
            .call_for_entity("approve", Verb::Post, &["process", "req-1", "true"], &[])
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<ApiError>().is_some());
        assert_eq!(
            stored(&store, "requests"),
            Some(json!([{"id": "req-1", "status": "PENDING"}]))
        );
    }

    #[test]
    fn test_patch_snapshot_touches_only_matching_entry() {
        let (_remote, store, requests) = setup::<Record>("requests");
        put(
            &store,
            "requests",
            json!([{"id": "req-1", "status": "PENDING"}, {"id": "req-2", "status": "PENDING"}]),
        );

        requests.patch_snapshot(&EntityId::from("req-2"), &json!({"status": "CANCELED"}));
        requests.patch_snapshot(&EntityId::from("req-9"), &json!({"status": "CANCELED"}));
        assert_eq!(
            stored(&store, "requests"),
            Some(json!([{"id": "req-1", "status": "PENDING"}, {"id": "req-2", "status": "CANCELED"}]))
        );
    }

    #[test]
    fn test_failure_kind() {
        let status = anyhow::Error::from(ApiError::ServerError("down".into()));
        assert_eq!(failure_kind(&status), "error");
        let other = anyhow::anyhow!("payload mismatch");
        assert_eq!(failure_kind(&other), "error");
    }

    #[tokio::test]
    async fn test_failure_kind_reports_unreachable_backend() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = crate::api::ApiClient::new(&format!("http://{}", addr)).unwrap();
        let err = client.fetch_all("authors").await.unwrap_err();
        assert_eq!(failure_kind(&err), "unreachable");
    }

    #[test]
    fn test_shallow_merge() {
        assert_eq!(
            shallow_merge(json!({"a": 1, "b": {"x": 1}}), &json!({"b": {"y": 2}, "c": 3})),
            json!({"a": 1, "b": {"y": 2}, "c": 3})
        );
        assert_eq!(shallow_merge(json!({"a": 1}), &json!(null)), json!({"a": 1}));
    }
}
