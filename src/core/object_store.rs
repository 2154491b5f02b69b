//! In-memory proof storage
//!
//! Stands in for an external bucket. Objects are kept in a `DashMap` keyed by
//! their logical key; storing the same key twice overwrites the content, which
//! makes retried uploads harmless.

use super::traits::{is_allowed_proof_mime, ObjectStore};
use crate::types::ExchangeError;
use dashmap::DashMap;

/// Stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub content: Vec<u8>,
    pub mime_type: String,
}

/// Thread-safe in-memory object store
#[derive(Debug)]
pub struct InMemoryObjectStore {
    base_url: String,
    objects: DashMap<String, StoredObject>,
}

impl InMemoryObjectStore {
    /// Create an empty store publishing URLs under `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: DashMap::new(),
        }
    }

    /// Fetch a stored object
    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.get(key).map(|entry| entry.value().clone())
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn put(&self, key: &str, content: &[u8], mime_type: &str) -> Result<String, ExchangeError> {
        if !is_allowed_proof_mime(mime_type) {
            return Err(ExchangeError::validation(format!(
                "File type '{}' not allowed; use JPG, PNG, WEBP or PDF",
                mime_type
            )));
        }

        self.objects.insert(
            key.to_string(),
            StoredObject {
                content: content.to_vec(),
                mime_type: mime_type.to_string(),
            },
        );

        Ok(format!("{}/{}", self.base_url, key))
    }
}
