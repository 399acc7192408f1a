//! Storage backend abstraction for repositories.
//!
//! This module defines the boundary between repositories and the document store that actually
//! holds the data, allowing repositories to work with various backends (in-memory, MongoDB, etc.).
//!
//! # Overview
//!
//! The [`StoreBackend`] trait provides a unified async interface for every store operation a
//! repository needs: single-document writes keyed by identifier, predicate-driven reads, counts
//! and deletes, collection statistics, index administration and the optional transaction
//! lifecycle. Implementations are required to be thread-safe (`Send + Sync`).
//!
//! # Traits
//!
//! - [`StoreBackend`]: The core trait for storage backends
//! - [`StoreBackendBuilder`]: Factory trait for creating backend instances
//!
//! # Examples
//!
//! ```ignore
//! use repolayer::backend::StoreBackend;
//! use repolayer::query::{Predicate, Query};
//! use bson::doc;
//!
//! let backend = MyBackendImpl::new();
//!
//! backend.insert_one("users", doc! { "_id": backend.generate_id(), "name": "Alice" }).await?;
//!
//! let query = Query::builder().filter(Predicate::eq("name", "Alice")).build();
//! let found = backend.find("users", query).await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use bson::Document;
use std::fmt::Debug;

use crate::{
    entity::new_id,
    error::DocumentStoreResult,
    index::IndexSpec,
    query::{Predicate, Query},
};

/// Core trait for document store backends.
///
/// Documents are stored as BSON documents keyed by a string identifier under `_id`. Predicates
/// address fields by their stored names, except that the logical name `Id` must be treated as
/// `_id` (see [`document_field`](crate::query::document_field)).
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Generates an identifier for a document inserted without one.
    ///
    /// Defaults to a ULID.
    fn generate_id(&self) -> String {
        new_id()
    }

    /// Inserts one document into a collection, creating the collection if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if a document with the same `_id` exists or a unique index is violated.
    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<()>;

    /// Replaces the first document matching `predicate`.
    ///
    /// Returns the number of replaced documents (0 or 1).
    async fn replace_one(&self, collection: &str, predicate: &Predicate, document: Document) -> DocumentStoreResult<u64>;

    /// Deletes the first document matching `predicate`. Returns the number removed.
    async fn delete_one(&self, collection: &str, predicate: &Predicate) -> DocumentStoreResult<u64>;

    /// Deletes every document matching `predicate`, or every document if `None`.
    async fn delete_many(&self, collection: &str, predicate: Option<&Predicate>) -> DocumentStoreResult<u64>;

    /// Executes a query against a collection.
    ///
    /// A missing collection yields no documents.
    async fn find(&self, collection: &str, query: Query) -> DocumentStoreResult<Vec<Document>>;

    /// Counts documents matching `predicate`, or every document if `None`.
    async fn count(&self, collection: &str, predicate: Option<&Predicate>) -> DocumentStoreResult<u64>;

    /// Returns the store-reported statistics document of a collection.
    ///
    /// Repositories read `count`, `size` and `totalIndexSize` from it.
    async fn collection_stats(&self, collection: &str) -> DocumentStoreResult<Document>;

    /// Creates an index on a collection.
    async fn create_index(&self, collection: &str, spec: &IndexSpec) -> DocumentStoreResult<()>;

    /// Lists the index descriptions of a collection.
    async fn list_indexes(&self, collection: &str) -> DocumentStoreResult<Vec<Document>>;

    /// Drops a collection and its indexes. Dropping a missing collection is not an error.
    async fn drop_collection(&self, collection: &str) -> DocumentStoreResult<()>;

    /// Whether [`start_transaction`](Self::start_transaction) and friends do anything.
    fn supports_transactions(&self) -> bool {
        false
    }

    async fn start_transaction(&self) -> DocumentStoreResult<()> {
        Ok(())
    }

    async fn commit_transaction(&self) -> DocumentStoreResult<()> {
        Ok(())
    }

    async fn abort_transaction(&self) -> DocumentStoreResult<()> {
        Ok(())
    }

    /// Gracefully shuts down the backend.
    ///
    /// The default implementation does nothing and returns `Ok(())`.
    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// Blanket implementation of `StoreBackend` for references to backends.
///
/// This allows a context to borrow a backend owned elsewhere.
#[async_trait]
impl<B> StoreBackend for &B
where
    B: StoreBackend,
{
    fn generate_id(&self) -> String {
        (*self).generate_id()
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<()> {
        (*self)
            .insert_one(collection, document)
            .await
    }

    async fn replace_one(&self, collection: &str, predicate: &Predicate, document: Document) -> DocumentStoreResult<u64> {
        (*self)
            .replace_one(collection, predicate, document)
            .await
    }

    async fn delete_one(&self, collection: &str, predicate: &Predicate) -> DocumentStoreResult<u64> {
        (*self)
            .delete_one(collection, predicate)
            .await
    }

    async fn delete_many(&self, collection: &str, predicate: Option<&Predicate>) -> DocumentStoreResult<u64> {
        (*self)
            .delete_many(collection, predicate)
            .await
    }

    async fn find(&self, collection: &str, query: Query) -> DocumentStoreResult<Vec<Document>> {
        (*self).find(collection, query).await
    }

    async fn count(&self, collection: &str, predicate: Option<&Predicate>) -> DocumentStoreResult<u64> {
        (*self)
            .count(collection, predicate)
            .await
    }

    async fn collection_stats(&self, collection: &str) -> DocumentStoreResult<Document> {
        (*self).collection_stats(collection).await
    }

    async fn create_index(&self, collection: &str, spec: &IndexSpec) -> DocumentStoreResult<()> {
        (*self)
            .create_index(collection, spec)
            .await
    }

    async fn list_indexes(&self, collection: &str) -> DocumentStoreResult<Vec<Document>> {
        (*self).list_indexes(collection).await
    }

    async fn drop_collection(&self, collection: &str) -> DocumentStoreResult<()> {
        (*self).drop_collection(collection).await
    }

    fn supports_transactions(&self) -> bool {
        (*self).supports_transactions()
    }

    async fn start_transaction(&self) -> DocumentStoreResult<()> {
        (*self).start_transaction().await
    }

    async fn commit_transaction(&self) -> DocumentStoreResult<()> {
        (*self).commit_transaction().await
    }

    async fn abort_transaction(&self) -> DocumentStoreResult<()> {
        (*self).abort_transaction().await
    }
}

/// Factory trait for creating backend instances.
///
/// # Example
///
/// ```ignore
/// let backend = MongoDbStoreBuilder::new()
///     .with_uri("mongodb://localhost:27017")
///     .with_database("ophelia")
///     .build()
///     .await?;
/// ```
#[async_trait]
pub trait StoreBackendBuilder {
    /// The backend type produced by this builder.
    type Backend: StoreBackend;

    /// Builds the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be initialized (e.g. connection failure).
    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
