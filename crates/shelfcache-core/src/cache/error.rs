use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    /// The backend applied the write, so retrying it would repeat it.
    #[error("Backend accepted the {operation} on {namespace} but its response could not be read")]
    UnreadableResponse {
        namespace: String,
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
