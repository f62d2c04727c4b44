//! Storage contract for indexed knowledge documents.
//!
//! Consistency: a single writer at a time, any number of concurrent readers,
//! last write wins per title. Every backing store must honor this.

use parking_lot::RwLock;
use std::collections::BTreeMap;

use crate::error::{IndexWriteError, SearchError};
use crate::models::IndexedDocument;

pub trait DocumentStore: Send + Sync {
    /// Insert or replace the document stored under `doc.title`.
    fn put(&self, doc: IndexedDocument) -> Result<(), IndexWriteError>;

    fn get(&self, title: &str) -> Result<Option<IndexedDocument>, SearchError>;

    fn delete(&self, title: &str) -> Result<(), IndexWriteError>;

    /// Every stored document, in store order.
    fn scan(&self) -> Result<Vec<IndexedDocument>, SearchError>;
}

/// In-memory store, ordered by title.
#[derive(Default)]
pub struct MemoryStore {
    docs: RwLock<BTreeMap<String, IndexedDocument>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }
}

impl DocumentStore for MemoryStore {
    fn put(&self, doc: IndexedDocument) -> Result<(), IndexWriteError> {
        self.docs.write().insert(doc.title.clone(), doc);
        Ok(())
    }

    fn get(&self, title: &str) -> Result<Option<IndexedDocument>, SearchError> {
        Ok(self.docs.read().get(title).cloned())
    }

    fn delete(&self, title: &str) -> Result<(), IndexWriteError> {
        self.docs.write().remove(title);
        Ok(())
    }

    fn scan(&self) -> Result<Vec<IndexedDocument>, SearchError> {
        Ok(self.docs.read().values().cloned().collect())
    }
}
