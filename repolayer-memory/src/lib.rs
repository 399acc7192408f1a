//! In-memory document store backend for repolayer.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! Collections are held as vectors of BSON documents behind an async-aware read-write lock,
//! which makes the backend a drop-in store for tests and local development.
//!
//! # Features
//!
//! - **Predicate evaluation** - Every comparison operator, AND/OR trees and array fan-out
//! - **Text search** - Token matching over the fields of a collection's text index
//! - **Unique indexes** - Duplicate `_id` values and unique index keys are rejected
//! - **Sorting, paging and projection** - The same query surface the MongoDB backend offers
//!
//! # Quick Start
//!
//! ```ignore
//! use repolayer::prelude::*;
//!
//! let context = DbContext::new(InMemoryStore::builder().build().await?);
//! let accounts = context.repository::<Account>();
//!
//! let account = accounts.add(Account { name: "Ana".into(), ..Default::default() }).await?;
//! assert!(accounts.exists(account.id.as_deref().unwrap_or_default()).await?);
//! ```

#[allow(unused_extern_crates)]
extern crate self as repolayer_memory;

mod evaluator;
pub mod store;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
