//! Main repolayer crate providing a typed repository layer over document stores.
//!
//! This crate is the primary entry point for users of the repolayer framework. It re-exports the
//! core types from the sub-crates, the `Entity` derive macro and the available storage backends.
//!
//! # Features
//!
//! - **Typed repositories** - CRUD, search and projection over Serde-serializable entities
//! - **Document repositories** - The same surface over raw BSON documents
//! - **Filter expressions** - A compact query-string grammar compiled to predicate trees
//! - **Multiple backends** - In-memory and MongoDB storage behind one backend trait
//!
//! # Quick Start
//!
//! ```ignore
//! use repolayer::{prelude::*, memory::InMemoryStore};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize, Entity)]
//! #[serde(rename_all = "PascalCase")]
//! pub struct Account {
//!     #[entity(id)]
//!     #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
//!     pub id: Option<String>,
//!     #[entity(tracker)]
//!     #[serde(skip)]
//!     pub tracker: TrackerState,
//!     pub name: String,
//!     pub age: i32,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let context = DbContext::new(InMemoryStore::builder().build().await?);
//!     let accounts = context.repository::<Account>();
//!
//!     let ana = accounts.add(Account { name: "Ana".into(), age: 31, ..Default::default() }).await?;
//!
//!     let adults = accounts
//!         .find_by(&Filter::parse(Some("Name_asc"), "Name_gteq=B&Age_in=(31,40)")?)
//!         .await?;
//!
//!     let page = accounts
//!         .project(&ProjectionQuery::new().include("Name").page(1).page_size(20))
//!         .await?;
//!
//!     accounts.delete(ana).await?;
//!     context.shutdown().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - [`mongodb`] - Persistent MongoDB backend (requires `mongodb` feature)

#[allow(unused_extern_crates)]
extern crate self as repolayer;

pub mod prelude;

pub use repolayer_core::{
    backend, config, context, entity, error, expression, filter, index, page, projection, query, repository,
};
pub use repolayer_macros::Entity;

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use repolayer_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use repolayer_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
