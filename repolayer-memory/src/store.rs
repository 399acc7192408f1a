//! In-memory storage implementation for repositories.
//!
//! This module provides a simple but complete in-memory backend that stores documents as BSON
//! documents in per-collection vectors behind an async-safe read-write lock.

use std::{cmp::Ordering, collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use mea::rwlock::RwLock;
use repolayer_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    entity::ID_FIELD,
    error::{DocumentStoreError, DocumentStoreResult},
    index::IndexSpec,
    query::{FieldSelection, Predicate, Query, SortDirection},
};
use tracing::debug;

use crate::evaluator::{Comparable, DocumentEvaluator, lookup};

/// Name reported for the implicit unique index on `_id`.
const ID_INDEX: &str = "_id_";

#[derive(Debug, Default, Clone)]
struct CollectionState {
    documents: Vec<Document>,
    indexes: Vec<IndexSpec>,
}

impl CollectionState {
    /// Fields covered by the collection's text index.
    fn text_fields(&self) -> Vec<String> {
        self.indexes
            .iter()
            .filter(|index| index.is_text())
            .flat_map(|index| index.fields.iter().map(|field| field.name.clone()))
            .collect()
    }

    fn matching(&self, predicate: Option<&Predicate>) -> DocumentStoreResult<Vec<usize>> {
        let text_fields = self.text_fields();
        let mut positions = Vec::new();

        for (position, document) in self.documents.iter().enumerate() {
            let keep = match predicate {
                Some(predicate) => DocumentEvaluator::new(document, &text_fields).evaluate(predicate)?,
                None => true,
            };
            if keep {
                positions.push(position);
            }
        }

        Ok(positions)
    }

    /// Rejects `document` if it collides with a stored document other than `skip` on `_id` or
    /// on any unique index.
    fn check_unique(&self, collection: &str, document: &Document, skip: Option<usize>) -> DocumentStoreResult<()> {
        let id = document.get(ID_FIELD);
        let others = self
            .documents
            .iter()
            .enumerate()
            .filter(|(position, _)| Some(*position) != skip)
            .map(|(_, other)| other);

        for other in others {
            if id.is_some() && other.get(ID_FIELD) == id {
                return Err(DocumentStoreError::DocumentAlreadyExists(id_string(document), collection.to_string()));
            }

            for index in self.indexes.iter().filter(|index| index.unique && !index.is_text()) {
                let same_key = index.fields.iter().all(|field| {
                    let left = lookup(document, &field.name).map(Comparable::from);
                    let right = lookup(other, &field.name).map(Comparable::from);
                    left == right
                });
                if same_key {
                    return Err(DocumentStoreError::DocumentAlreadyExists(id_string(document), collection.to_string()));
                }
            }
        }

        Ok(())
    }
}

fn id_string(document: &Document) -> String {
    match document.get(ID_FIELD) {
        Some(Bson::String(id)) => id.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn encoded_len(document: &Document) -> u64 {
    bson::serialize_to_vec(document)
        .map(|bytes| bytes.len() as u64)
        .unwrap_or(0)
}

fn compare(left: &Document, right: &Document, field: &str) -> Ordering {
    let left = lookup(left, field)
        .map(Comparable::from)
        .unwrap_or(Comparable::Null);
    let right = lookup(right, field)
        .map(Comparable::from)
        .unwrap_or(Comparable::Null);

    left.sort_cmp(&right)
}

/// Applies an include/exclude field selection the way the store's find projection does.
///
/// Selecting only `_id` returns documents holding just their key. Mixing included and excluded
/// fields other than `_id` is an error.
fn project(document: Document, selection: &[FieldSelection]) -> DocumentStoreResult<Document> {
    if selection.is_empty() {
        return Ok(document);
    }

    let keep_id = selection
        .iter()
        .find(|item| item.field == ID_FIELD)
        .is_none_or(|item| item.include);
    let fields: Vec<&FieldSelection> = selection
        .iter()
        .filter(|item| item.field != ID_FIELD)
        .collect();
    let includes = fields.iter().filter(|item| item.include).count();

    if includes > 0 && includes < fields.len() {
        return Err(DocumentStoreError::Backend(
            "cannot mix inclusion and exclusion in one projection".to_string(),
        ));
    }

    let inclusion = includes > 0 || (fields.is_empty() && keep_id);

    Ok(document
        .into_iter()
        .filter(|(key, _)| {
            if key == ID_FIELD {
                return keep_id;
            }
            let listed = fields.iter().any(|item| &item.field == key);
            if inclusion { listed } else { !listed }
        })
        .collect())
}

/// Thread-safe, in-memory implementation of [`StoreBackend`].
///
/// Cloning yields another handle to the same data.
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    collections: Arc<RwLock<HashMap<String, CollectionState>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder
    }

    /// Names of the collections currently held.
    pub async fn collection_names(&self) -> Vec<String> {
        self.collections
            .read()
            .await
            .keys()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn insert_one(&self, collection: &str, mut document: Document) -> DocumentStoreResult<()> {
        if !document.contains_key(ID_FIELD) {
            document.insert(ID_FIELD, self.generate_id());
        }

        let mut collections = self.collections.write().await;
        let state = collections
            .entry(collection.to_string())
            .or_default();

        state.check_unique(collection, &document, None)?;
        debug!(collection, id = %id_string(&document), "inserted document");
        state.documents.push(document);

        Ok(())
    }

    async fn replace_one(&self, collection: &str, predicate: &Predicate, mut document: Document) -> DocumentStoreResult<u64> {
        let mut collections = self.collections.write().await;
        let Some(state) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let Some(&position) = state.matching(Some(predicate))?.first() else {
            return Ok(0);
        };

        if let Some(id) = state.documents[position].get(ID_FIELD).cloned() {
            if document
                .get(ID_FIELD)
                .is_some_and(|replacement| replacement != &id)
            {
                return Err(DocumentStoreError::Backend("the _id field cannot be changed".to_string()));
            }
            document.insert(ID_FIELD, id);
        }

        state.check_unique(collection, &document, Some(position))?;
        state.documents[position] = document;

        Ok(1)
    }

    async fn delete_one(&self, collection: &str, predicate: &Predicate) -> DocumentStoreResult<u64> {
        let mut collections = self.collections.write().await;
        let Some(state) = collections.get_mut(collection) else {
            return Ok(0);
        };

        match state.matching(Some(predicate))?.first() {
            Some(&position) => {
                state.documents.remove(position);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_many(&self, collection: &str, predicate: Option<&Predicate>) -> DocumentStoreResult<u64> {
        let mut collections = self.collections.write().await;
        let Some(state) = collections.get_mut(collection) else {
            return Ok(0);
        };

        let positions = state.matching(predicate)?;
        for position in positions.iter().rev() {
            state.documents.remove(*position);
        }

        Ok(positions.len() as u64)
    }

    async fn find(&self, collection: &str, query: Query) -> DocumentStoreResult<Vec<Document>> {
        let collections = self.collections.read().await;
        let Some(state) = collections.get(collection) else {
            return Ok(vec![]);
        };

        let text_fields = state.text_fields();
        let mut documents = DocumentEvaluator::filter_documents(&state.documents, query.filter.as_ref(), &text_fields)?;

        if let Some(sort) = &query.sort {
            documents.sort_by(|a, b| match sort.direction {
                SortDirection::Asc => compare(a, b, &sort.field),
                SortDirection::Desc => compare(b, a, &sort.field),
            });
        }

        documents
            .into_iter()
            .skip(query.offset.unwrap_or(0) as usize)
            .take(query.limit.map_or(usize::MAX, |limit| limit as usize))
            .map(|document| project(document, &query.projection))
            .collect()
    }

    async fn count(&self, collection: &str, predicate: Option<&Predicate>) -> DocumentStoreResult<u64> {
        let collections = self.collections.read().await;

        match collections.get(collection) {
            Some(state) => Ok(state.matching(predicate)?.len() as u64),
            None => Ok(0),
        }
    }

    async fn collection_stats(&self, collection: &str) -> DocumentStoreResult<Document> {
        let collections = self.collections.read().await;
        let Some(state) = collections.get(collection) else {
            return Ok(doc! { "ns": collection, "count": 0_i64, "size": 0_i64, "totalIndexSize": 0_i64, "nindexes": 0 });
        };

        let count = state.documents.len() as i64;
        let size: u64 = state.documents.iter().map(encoded_len).sum();
        let id_index: u64 = state
            .documents
            .iter()
            .filter_map(|document| document.get(ID_FIELD))
            .map(|id| encoded_len(&doc! { ID_FIELD: id.clone() }))
            .sum();
        let secondary: u64 = state
            .indexes
            .iter()
            .flat_map(|index| {
                state.documents.iter().map(move |document| {
                    let key: Document = index
                        .fields
                        .iter()
                        .filter_map(|field| lookup(document, &field.name).map(|value| (field.name.clone(), value.clone())))
                        .collect();
                    encoded_len(&key)
                })
            })
            .sum();

        let size = size as i64;
        let average = if count > 0 { size / count } else { 0 };
        let index_size = (id_index + secondary) as i64;
        let index_count = state.indexes.len() as i32 + 1;

        Ok(doc! {
            "ns": collection,
            "count": count,
            "size": size,
            "avgObjSize": average,
            "totalIndexSize": index_size,
            "nindexes": index_count,
        })
    }

    async fn create_index(&self, collection: &str, spec: &IndexSpec) -> DocumentStoreResult<()> {
        let mut collections = self.collections.write().await;
        let state = collections
            .entry(collection.to_string())
            .or_default();

        if spec.is_text()
            && state
                .indexes
                .iter()
                .any(|index| index.is_text() && index.name != spec.name)
        {
            return Err(DocumentStoreError::Backend(format!(
                "collection {collection} already has a text index"
            )));
        }

        if spec.unique && !spec.is_text() {
            let mut staged = CollectionState {
                documents: Vec::new(),
                indexes: vec![spec.clone()],
            };
            for document in &state.documents {
                staged.check_unique(collection, document, None)?;
                staged.documents.push(document.clone());
            }
        }

        state.indexes.retain(|index| index.name != spec.name);
        state.indexes.push(spec.clone());

        Ok(())
    }

    async fn list_indexes(&self, collection: &str) -> DocumentStoreResult<Vec<Document>> {
        let collections = self.collections.read().await;
        let Some(state) = collections.get(collection) else {
            return Ok(vec![]);
        };

        let mut indexes = vec![doc! { "v": 2, "key": { ID_FIELD: 1 }, "name": ID_INDEX }];
        for index in &state.indexes {
            let mut description = doc! { "v": 2, "key": index.keys(), "name": index.name.clone() };
            if index.is_text() {
                description.insert("default_language", index.text.default_language.clone());
                description.insert("textIndexVersion", index.text.text_index_version);
            } else if index.unique {
                description.insert("unique", true);
            }
            indexes.push(description);
        }

        Ok(indexes)
    }

    async fn drop_collection(&self, collection: &str) -> DocumentStoreResult<()> {
        self.collections
            .write()
            .await
            .remove(collection);

        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryStoreBuilder;

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(InMemoryStore::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repolayer_core::index::IndexField;

    fn selection(items: &[(&str, bool)]) -> Vec<FieldSelection> {
        items
            .iter()
            .map(|(field, include)| FieldSelection { field: field.to_string(), include: *include })
            .collect()
    }

    #[test]
    fn projection_inclusion_keeps_key() {
        let document = doc! { "_id": "1", "name": "Ana", "age": 31 };

        assert_eq!(
            project(document.clone(), &selection(&[("_id", true), ("name", true)])).unwrap(),
            doc! { "_id": "1", "name": "Ana" }
        );
        assert_eq!(project(document.clone(), &selection(&[("_id", true)])).unwrap(), doc! { "_id": "1" });
        assert_eq!(
            project(document.clone(), &selection(&[("_id", true), ("age", false)])).unwrap(),
            doc! { "_id": "1", "name": "Ana" }
        );
        assert!(project(document, &selection(&[("name", true), ("age", false)])).is_err());
    }

    #[tokio::test]
    async fn duplicate_keys_are_rejected() {
        let store = InMemoryStore::new();
        store.insert_one("accounts", doc! { "_id": "1" }).await.unwrap();

        let err = store
            .insert_one("accounts", doc! { "_id": "1" })
            .await
            .unwrap_err();

        assert!(matches!(err, DocumentStoreError::DocumentAlreadyExists(id, collection) if id == "1" && collection == "accounts"));
    }

    #[tokio::test]
    async fn unique_index_is_enforced() {
        let store = InMemoryStore::new();
        let spec = IndexSpec::new("by_email", vec![IndexField::ascending("email")]).unique(true);
        store.create_index("accounts", &spec).await.unwrap();
        store.insert_one("accounts", doc! { "email": "a@x.co" }).await.unwrap();

        assert!(store.insert_one("accounts", doc! { "email": "a@x.co" }).await.is_err());
        assert!(store.insert_one("accounts", doc! { "email": "b@x.co" }).await.is_ok());
    }

    #[tokio::test]
    async fn replace_keeps_the_stored_key() {
        let store = InMemoryStore::new();
        store.insert_one("accounts", doc! { "_id": "1", "name": "Ana" }).await.unwrap();

        let replaced = store
            .replace_one("accounts", &Predicate::eq("_id", "1"), doc! { "name": "Eva" })
            .await
            .unwrap();
        let found = store.find("accounts", Query::new()).await.unwrap();

        assert_eq!(replaced, 1);
        assert_eq!(found, vec![doc! { "name": "Eva", "_id": "1" }]);
    }

    #[tokio::test]
    async fn find_sorts_then_pages() {
        let store = InMemoryStore::new();
        for (id, age) in [("a", 40), ("b", 20), ("c", 30)] {
            store.insert_one("people", doc! { "_id": id, "age": age }).await.unwrap();
        }

        let query = Query::builder()
            .sort("age", SortDirection::Desc)
            .offset(1)
            .limit(1)
            .build();
        let found = store.find("people", query).await.unwrap();

        assert_eq!(found, vec![doc! { "_id": "c", "age": 30 }]);
    }

    #[tokio::test]
    async fn missing_collections_are_empty() {
        let store = InMemoryStore::new();

        assert!(store.find("ghosts", Query::new()).await.unwrap().is_empty());
        assert_eq!(store.count("ghosts", None).await.unwrap(), 0);
        assert_eq!(store.delete_many("ghosts", None).await.unwrap(), 0);
        assert!(store.drop_collection("ghosts").await.is_ok());
    }
}
