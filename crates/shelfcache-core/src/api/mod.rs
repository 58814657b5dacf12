//! REST API client module for the library backend.
//!
//! This module provides the `ApiClient`, which implements the cache's
//! `Remote` capability over HTTP, and the `ApiError` classification of
//! failed requests.

pub mod client;
pub mod error;

pub use client::{ApiClient, DEFAULT_BASE_URL, REQUEST_TIMEOUT_SECS};
pub use error::ApiError;
