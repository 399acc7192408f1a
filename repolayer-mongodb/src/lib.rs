//! MongoDB backend implementation for repolayer.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait. Predicates are
//! translated to native filter documents, text leaves run against the collection's text index and
//! collection statistics come straight from `collStats`.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! repolayer = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Transactions
//!
//! Multi-document transactions need a replica set. The store reports support when the connection
//! string names one (`replicaSet=...`); otherwise the context's transaction calls are no-ops.
//!
//! # Example
//!
//! ```ignore
//! use repolayer::{backend::StoreBackendBuilder, config::DbSettings, context::DbContext, mongodb::MongoDbStoreBuilder};
//!
//! let settings = DbSettings::new("mongodb://localhost:27017/?replicaSet=rs0", "ophelia");
//! let store = MongoDbStoreBuilder::from_settings(&settings)?.build().await?;
//! let context = DbContext::new(store);
//! ```

#[allow(unused_extern_crates)]
extern crate self as repolayer_mongodb;

mod query;
pub mod store;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
