//! Seed datasets bundled into the binary.
//!
//! These are served only when the backend is unreachable and no snapshot
//! has been persisted yet.

use serde::de::DeserializeOwned;
use tracing::warn;

const SEEDS: &[(&str, &str)] = &[
    ("authors", include_str!("../../data/seeds/authors.json")),
    ("book-copy", include_str!("../../data/seeds/book-copy.json")),
    ("loaned", include_str!("../../data/seeds/loaned.json")),
    ("requests", include_str!("../../data/seeds/requests.json")),
    ("fines", include_str!("../../data/seeds/fines.json")),
    ("subscriptions", include_str!("../../data/seeds/subscriptions.json")),
    ("users", include_str!("../../data/seeds/users.json")),
];

/// Raw JSON of the bundled seed for a namespace, if one ships.
pub fn seed_json(namespace: &str) -> Option<&'static str> {
    SEEDS
        .iter()
        .find(|(ns, _)| *ns == namespace)
        .map(|(_, json)| *json)
}

/// Bundled seed for a namespace decoded as `T`.
pub fn seed<T: DeserializeOwned>(namespace: &str) -> Option<Vec<T>> {
    let json = seed_json(namespace)?;
    match serde_json::from_str(json) {
        Ok(items) => Some(items),
        Err(e) => {
            warn!(namespace, error = %e, "Bundled seed does not match model");
            None
        }
    }
}
