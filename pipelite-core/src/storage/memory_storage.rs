// storage/memory_storage.rs
//! In-memory document store
//!
//! Collections live in a `HashMap<String, Vec<Document>>` behind a
//! `parking_lot::RwLock`, so one store can be shared between threads and
//! read by many pipeline runs at once. Every `fetch_all` clones the
//! collection, so a run works on a snapshot that later writes cannot touch.
//!
//! ```text
//! MemoryStorage (DocumentSource implementation)
//!      ↓
//! RwLock<HashMap<String, Vec<Document>>> (collections -> documents)
//! ```

use bson::oid::ObjectId;
use bson::{Bson, Document};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;

use crate::document::document_from_json;
use crate::error::{PipeliteError, Result};
use crate::log_debug;
use crate::storage::DocumentSource;

/// In-memory storage backend
///
/// # Examples
///
/// ```
/// use bson::doc;
/// use pipelite_core::{DocumentSource, MemoryStorage};
///
/// let storage = MemoryStorage::new();
/// storage.create_collection("expenses").unwrap();
/// storage.insert_one("expenses", doc! {"title": "Tea", "amount": 10}).unwrap();
/// assert_eq!(storage.fetch_all("expenses").unwrap().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemoryStorage {
    /// Collection name -> documents, in insertion order
    collections: RwLock<HashMap<String, Vec<Document>>>,
}

impl MemoryStorage {
    /// Create a new empty in-memory storage
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write();
        if collections.contains_key(name) {
            return Err(PipeliteError::CollectionExists(name.to_string()));
        }
        collections.insert(name.to_string(), Vec::new());
        Ok(())
    }

    /// Drop (delete) a collection
    pub fn drop_collection(&self, name: &str) -> Result<()> {
        self.collections
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| PipeliteError::CollectionNotFound(name.to_string()))
    }

    /// List all collection names, sorted
    pub fn list_collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Insert one document, returning its `_id`
    ///
    /// A document without `_id` gets a fresh `ObjectId` placed first.
    pub fn insert_one(&self, collection: &str, doc: Document) -> Result<Bson> {
        let mut collections = self.collections.write();
        let docs = collections
            .get_mut(collection)
            .ok_or_else(|| PipeliteError::CollectionNotFound(collection.to_string()))?;
        let doc = with_id(doc);
        let id = doc.get("_id").cloned().unwrap_or(Bson::Null);
        docs.push(doc);
        Ok(id)
    }

    /// Insert several documents in order, returning their `_id`s
    pub fn insert_many<I>(&self, collection: &str, docs: I) -> Result<Vec<Bson>>
    where
        I: IntoIterator<Item = Document>,
    {
        let mut collections = self.collections.write();
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| PipeliteError::CollectionNotFound(collection.to_string()))?;

        let mut ids = Vec::new();
        for doc in docs {
            let doc = with_id(doc);
            ids.push(doc.get("_id").cloned().unwrap_or(Bson::Null));
            target.push(doc);
        }
        Ok(ids)
    }

    /// Number of documents in a collection
    pub fn count(&self, collection: &str) -> Result<usize> {
        self.collections
            .read()
            .get(collection)
            .map(Vec::len)
            .ok_or_else(|| PipeliteError::CollectionNotFound(collection.to_string()))
    }

    /// Load a JSON array of extended-JSON documents into `collection`
    ///
    /// The collection is created when missing. Nothing is inserted unless
    /// every element parses. Returns the number of documents loaded.
    pub fn load_json(&self, collection: &str, json: &str) -> Result<usize> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let items = value.as_array().ok_or_else(|| {
            PipeliteError::Serialization("Fixture must be a JSON array of documents".to_string())
        })?;
        let docs = items
            .iter()
            .map(document_from_json)
            .collect::<Result<Vec<_>>>()?;
        let loaded = docs.len();

        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .extend(docs.into_iter().map(with_id));

        log_debug!("Loaded {} document(s) into '{}'", loaded, collection);
        Ok(loaded)
    }

    /// [`load_json`](Self::load_json) from a file on disk
    pub fn load_json_file<P: AsRef<Path>>(&self, collection: &str, path: P) -> Result<usize> {
        let json = std::fs::read_to_string(path.as_ref())?;
        self.load_json(collection, &json)
    }
}

impl DocumentSource for MemoryStorage {
    fn fetch_all(&self, collection: &str) -> Result<Vec<Document>> {
        self.collections
            .read()
            .get(collection)
            .cloned()
            .ok_or_else(|| PipeliteError::CollectionNotFound(collection.to_string()))
    }
}

fn with_id(doc: Document) -> Document {
    if doc.contains_key("_id") {
        return doc;
    }
    let mut with_id = Document::new();
    with_id.insert("_id", ObjectId::new());
    with_id.extend(doc);
    with_id
}
