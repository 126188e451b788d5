// src/storage/traits.rs
//! Store collaborator interface consumed by the pipeline
//!
//! The engine never talks to a concrete store. It asks a [`DocumentSource`]
//! for the full contents of one named collection at the start of a run and
//! works on that snapshot.
//!
//! ```text
//! DocumentSource (fetch_all)
//!   ├── MemoryStorage (in-memory collections, JSON fixtures)
//!   └── any embedding store that can normalise its records to Documents
//! ```

use bson::Document;

use crate::error::Result;

/// Source of documents for a pipeline run
///
/// Implementations must hand back plain documents: identifiers as
/// `ObjectId`, dates as `bson::DateTime`, no store-native wrappers.
pub trait DocumentSource: Send + Sync {
    /// Materialise every document of `collection`, in store order
    ///
    /// A collection the store does not know is a `CollectionNotFound` error.
    fn fetch_all(&self, collection: &str) -> Result<Vec<Document>>;
}

impl<S: DocumentSource + ?Sized> DocumentSource for &S {
    fn fetch_all(&self, collection: &str) -> Result<Vec<Document>> {
        (**self).fetch_all(collection)
    }
}

impl<S: DocumentSource + ?Sized> DocumentSource for std::sync::Arc<S> {
    fn fetch_all(&self, collection: &str) -> Result<Vec<Document>> {
        (**self).fetch_all(collection)
    }
}
