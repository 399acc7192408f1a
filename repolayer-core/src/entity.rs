//! Entity contract, change tracking and identity invariants.
//!
//! Every record persisted through a [`Repository`](crate::repository::Repository) implements
//! [`Entity`]. The trait exposes the string identifier and the [`TrackerState`] of an instance;
//! the repository uses both to keep the identity discipline:
//!
//! - a freshly constructed entity is [`TrackerState::New`] and has no identifier,
//! - the identifier is assigned at insert time and never changes afterwards,
//! - every successful insert or update resets the tracker to [`TrackerState::Unchanged`].
//!
//! # Example
//!
//! ```ignore
//! use repolayer::prelude::*;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize, Entity)]
//! #[entity(collection = "accounts")]
//! pub struct Account {
//!     #[entity(id)]
//!     #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
//!     pub id: Option<String>,
//!     #[entity(tracker)]
//!     #[serde(skip)]
//!     pub tracker: TrackerState,
//!     pub name: String,
//! }
//! ```

use bson::{Bson, Document, de::deserialize_from_document, ser::serialize_to_document};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::any::type_name;
use ulid::Ulid;

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Name of the document key every entity identifier is stored under.
pub const ID_FIELD: &str = "_id";

/// Lifecycle tag of an entity instance.
///
/// Only `New` and `Unchanged` are enforced by [`Entity::ensure_state`] and the repository;
/// `Modified` and `Deleted` are available to callers that track edits themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TrackerState {
    /// Constructed locally, never persisted. Must not carry an identifier.
    #[default]
    New,
    /// In sync with the store.
    Unchanged,
    /// Persisted and edited since the last write.
    Modified,
    /// Marked for removal.
    Deleted,
}

/// Core trait that all records handled by a repository must implement.
///
/// The identifier accessor pair is the compile-time capability the repository relies on; it is
/// normally generated by `#[derive(Entity)]`. The serialized form must store the identifier as a
/// string under [`ID_FIELD`]; the repository verifies this once, when it is constructed.
pub trait Entity: Serialize + DeserializeOwned + Default + Send + Sync + Clone + 'static {
    /// Returns the identifier, or `None` while the entity has not been persisted.
    fn id(&self) -> Option<&str>;

    /// Assigns the identifier. Called by the repository at insert time.
    fn set_id(&mut self, id: String);

    /// Returns the current tracker state.
    fn tracker(&self) -> TrackerState;

    /// Replaces the tracker state.
    fn set_tracker(&mut self, state: TrackerState);

    /// Returns the name of the collection this entity is stored in.
    ///
    /// Defaults to the unqualified type name.
    fn collection_name() -> &'static str {
        short_type_name::<Self>()
    }

    /// Checks that the identifier presence is coherent with the tracker state.
    ///
    /// `New` entities must have no (or a blank) identifier; every other state requires a
    /// non-blank identifier. Violations fail with
    /// [`DocumentStoreError::IncoherentEntityState`] naming the entity type.
    fn ensure_state(&self) -> DocumentStoreResult<()> {
        let has_id = self
            .id()
            .is_some_and(|id| !id.trim().is_empty());

        match (self.tracker(), has_id) {
            (TrackerState::New, false) => Ok(()),
            (TrackerState::New, true) => Err(DocumentStoreError::IncoherentEntityState(
                short_type_name::<Self>().to_string(),
            )),
            (_, true) => Ok(()),
            (_, false) => Err(DocumentStoreError::IncoherentEntityState(
                short_type_name::<Self>().to_string(),
            )),
        }
    }
}

/// Creates a new sortable unique identifier.
pub fn new_id() -> String {
    Ulid::new().to_string()
}

/// Returns the last path segment of a type name (`my_crate::models::Account` -> `Account`).
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let name = type_name::<T>();
    let base = name
        .split('<')
        .next()
        .unwrap_or(name);

    base.rsplit("::")
        .next()
        .unwrap_or(base)
}

/// Extension trait converting entities to and from BSON documents.
///
/// Automatically implemented for all [`Entity`] types.
pub trait EntityExt: Entity {
    /// Serializes this entity into a BSON document.
    fn to_document(&self) -> DocumentStoreResult<Document>;

    /// Deserializes an entity loaded from the store and marks it [`TrackerState::Unchanged`].
    fn from_document(document: Document) -> DocumentStoreResult<Self>;

    /// Returns whether an identifier is present and not blank.
    fn has_id(&self) -> bool;
}

impl<E: Entity> EntityExt for E {
    fn to_document(&self) -> DocumentStoreResult<Document> {
        Ok(serialize_to_document(self)?)
    }

    fn from_document(document: Document) -> DocumentStoreResult<Self> {
        let mut entity: E = deserialize_from_document(document)?;
        entity.set_tracker(TrackerState::Unchanged);

        Ok(entity)
    }

    fn has_id(&self) -> bool {
        self.id()
            .is_some_and(|id| !id.trim().is_empty())
    }
}

/// Whether an entity type stores a well-formed identifier field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IdField {
    Valid,
    Missing,
}

impl IdField {
    const MARKER: &'static str = "__repolayer_marker__";

    /// Serializes a default instance with a marker identifier and checks the marker comes back
    /// as a string under [`ID_FIELD`].
    pub(crate) fn inspect<E: Entity>() -> Self {
        let mut sample = E::default();
        sample.set_id(Self::MARKER.to_string());

        match serialize_to_document(&sample) {
            Ok(document) => match document.get(ID_FIELD) {
                Some(Bson::String(id)) if id == Self::MARKER => IdField::Valid,
                _ => IdField::Missing,
            },
            Err(_) => IdField::Missing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Account {
        #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(skip)]
        tracker: TrackerState,
        name: String,
    }

    impl Entity for Account {
        fn id(&self) -> Option<&str> {
            self.id.as_deref()
        }

        fn set_id(&mut self, id: String) {
            self.id = Some(id);
        }

        fn tracker(&self) -> TrackerState {
            self.tracker
        }

        fn set_tracker(&mut self, state: TrackerState) {
            self.tracker = state;
        }
    }

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Unkeyed {
        id: Option<String>,
        #[serde(skip)]
        tracker: TrackerState,
    }

    impl Entity for Unkeyed {
        fn id(&self) -> Option<&str> {
            self.id.as_deref()
        }

        fn set_id(&mut self, id: String) {
            self.id = Some(id);
        }

        fn tracker(&self) -> TrackerState {
            self.tracker
        }

        fn set_tracker(&mut self, state: TrackerState) {
            self.tracker = state;
        }
    }

    fn account(tracker: TrackerState, id: Option<&str>) -> Account {
        Account {
            id: id.map(str::to_string),
            tracker,
            name: "Ana".to_string(),
        }
    }

    #[test]
    fn new_entity_starts_without_identifier() {
        let account = Account::default();

        assert_eq!(account.tracker(), TrackerState::New);
        assert!(account.id().is_none());
        assert!(account.ensure_state().is_ok());
    }

    #[test]
    fn new_entity_with_identifier_is_incoherent() {
        let err = account(TrackerState::New, Some("01HZX"))
            .ensure_state()
            .unwrap_err();

        assert!(matches!(err, DocumentStoreError::IncoherentEntityState(name) if name == "Account"));
    }

    #[test]
    fn persisted_entity_without_identifier_is_incoherent() {
        assert!(account(TrackerState::Unchanged, None).ensure_state().is_err());
        assert!(account(TrackerState::Unchanged, Some("   ")).ensure_state().is_err());
        assert!(account(TrackerState::Modified, None).ensure_state().is_err());
    }

    #[test]
    fn coherent_states_pass() {
        assert!(account(TrackerState::New, Some("  ")).ensure_state().is_ok());
        assert!(account(TrackerState::Unchanged, Some("01HZX")).ensure_state().is_ok());
        assert!(account(TrackerState::Deleted, Some("01HZX")).ensure_state().is_ok());
    }

    #[test]
    fn loaded_entities_are_unchanged() {
        let document = bson::doc! { "_id": "01HZX", "name": "Ana" };
        let loaded = Account::from_document(document).unwrap();

        assert_eq!(loaded.tracker(), TrackerState::Unchanged);
        assert_eq!(loaded.id(), Some("01HZX"));
    }

    #[test]
    fn identifier_is_serialized_as_document_key() {
        let document = account(TrackerState::Unchanged, Some("01HZX"))
            .to_document()
            .unwrap();

        assert_eq!(document.get_str(ID_FIELD).unwrap(), "01HZX");
        assert!(!document.contains_key("tracker"));
    }

    #[test]
    fn inspection_detects_missing_document_key() {
        assert_eq!(IdField::inspect::<Account>(), IdField::Valid);
        assert_eq!(IdField::inspect::<Unkeyed>(), IdField::Missing);
    }

    #[test]
    fn collection_name_defaults_to_type_name() {
        assert_eq!(Account::collection_name(), "Account");
        assert_eq!(short_type_name::<Vec<String>>(), "Vec");
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(new_id(), new_id());
    }
}
