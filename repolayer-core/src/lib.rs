//! A generic repository layer over document stores.
//!
//! This crate is the core of the repolayer project and provides:
//!
//! - **Entity contract** ([`entity`]) - Identifier and change-tracking discipline for stored records
//! - **Predicates** ([`query`]) - Predicate trees, sort specifications and store queries
//! - **Filters** ([`filter`]) - Fluent AND/OR predicate accumulation per entity type
//! - **Filter expressions** ([`expression`]) - Compiler for the compact query-string grammar
//! - **Projections** ([`projection`]) - Sparse, schema-flexible containers for partial results
//! - **Paging** ([`page`]) - Paginated, field-selectable projection reads
//! - **Indexes** ([`index`]) - Index specifications and administration
//! - **Store backend abstraction** ([`backend`]) - Traits for implementing storage backends
//! - **Context** ([`context`]) - Unit-of-work session and repository factory
//! - **Repositories** ([`repository`]) - Typed and untyped CRUD and search
//! - **Configuration** ([`config`]) - Connection settings
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use repolayer::prelude::*;
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
//! }
//!
//! let context = DbContext::new(InMemoryStore::new());
//! let accounts = context.repository::<Account>();
//!
//! let account = accounts.add(Account { name: "Ana".into(), ..Default::default() }).await?;
//! let named = accounts.find_by(&Filter::parse(None, "Name_eq=Ana")?).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as repolayer_core;

pub mod backend;
pub mod config;
pub mod context;
pub mod entity;
pub mod error;
pub mod expression;
pub mod filter;
pub mod index;
pub mod page;
pub mod projection;
pub mod query;
pub mod repository;
