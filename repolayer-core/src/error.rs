//! Error types and result types for repository operations.
//!
//! Every fallible operation in this crate returns [`DocumentStoreResult<T>`]. Validation errors
//! (expression grammar, entity identity, repository initialization) are raised before the store
//! is touched; store errors are carried through unchanged in [`DocumentStoreError::Backend`].

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors raised by the repository layer.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// A query string failed the filter grammar, or an `in`/`notin` list matched neither the
    /// string-set nor the numeric-set shape. Carries the offending query string.
    #[error("Invalid filter expression: {0}")]
    InvalidExpression(String),
    /// The identifier presence of an entity contradicts its tracker state.
    /// Carries the entity type name.
    #[error("Incoherent entity state: {0}")]
    IncoherentEntityState(String),
    /// The entity type does not declare a string identifier serialized as the document key.
    #[error("Property Id not found on {0}")]
    PropertyIdNotFound(String),
    /// A repository operation was attempted before the repository was bound to a context.
    #[error("Repository context not initialized: {0}")]
    RepositoryContextNotInitialized(String),
    /// An argument was empty or otherwise unusable. Carries the argument name.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// A document with the given ID already exists in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DocumentAlreadyExists(String, String),
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// An error reported by the underlying store driver.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for repository operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}
