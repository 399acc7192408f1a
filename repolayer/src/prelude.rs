//! Convenient re-exports of commonly used types from repolayer.
//!
//! ```ignore
//! use repolayer::prelude::*;
//! ```

pub use repolayer_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    config::DbSettings,
    context::DbContext,
    entity::{Entity, EntityExt, TrackerState},
    error::{DocumentStoreError, DocumentStoreResult},
    expression::FilterExpression,
    filter::Filter,
    index::{IndexField, IndexKind, IndexSpec, TextIndexOptions},
    page::{PageRequest, ProjectionQuery, ProjectionResult},
    projection::{EntityProjection, NamingStrategy},
    query::{Comparison, Connector, Predicate, PredicateVisitor, Query, QueryBuilder, Sort, SortDirection},
    repository::{DocumentRepository, Repository},
};
pub use repolayer_macros::Entity;
pub use repolayer_memory::InMemoryStore;
