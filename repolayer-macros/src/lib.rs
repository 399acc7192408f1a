//! Procedural macros for the repolayer project.
//!
//! This crate provides `#[derive(Entity)]`, which implements `repolayer::entity::Entity` for a
//! struct with an `Option<String>` identifier field and a `TrackerState` field.
//!
//! ```ignore
//! #[derive(Debug, Clone, Default, Serialize, Deserialize, Entity)]
//! #[entity(collection = "accounts")]
//! pub struct Account {
//!     #[entity(id)]
//!     #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
//!     pub key: Option<String>,
//!     #[serde(skip)]
//!     pub tracker: TrackerState,
//! }
//! ```
//!
//! Without `#[entity(id)]` / `#[entity(tracker)]` the fields named `id` and `tracker` are used.
//! Without `#[entity(collection = "...")]` the collection is named after the type.

#[allow(unused_extern_crates)]
extern crate self as repolayer_macros;

use proc_macro::TokenStream;

mod entity;

#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    entity::derive_entity(input.into()).into()
}
