//! Repositories: CRUD and search over one collection.
//!
//! This module provides the two repository flavours a context hands out:
//!
//! - [`Repository`] - Typed repository for one [`Entity`] type
//! - [`DocumentRepository`] - Untyped repository over raw BSON documents
//!
//! A repository starts unbound. Every store operation fails with
//! [`DocumentStoreError::RepositoryContextNotInitialized`] until
//! [`initialize`](Repository::initialize) binds it to a [`DbContext`]. Binding again simply
//! replaces the context.
//!
//! # Example
//!
//! ```ignore
//! use repolayer::prelude::*;
//!
//! let context = DbContext::new(InMemoryStore::new());
//!
//! let mut accounts = Repository::<_, Account>::new(None);
//! accounts.initialize(&context);
//!
//! let account = accounts.add(Account { name: "Ana".into(), ..Default::default() }).await?;
//! let found = accounts.find(account.id().unwrap_or_default()).await?;
//!
//! let adults = accounts.find_by(&Filter::parse(Some("name_asc"), "name_gteq=M")?).await?;
//! ```

use bson::{Bson, Document};
use std::marker::PhantomData;
use tracing::{debug, warn};

use crate::{
    backend::StoreBackend,
    context::DbContext,
    entity::{Entity, EntityExt, ID_FIELD, IdField, TrackerState, short_type_name},
    error::{DocumentStoreError, DocumentStoreResult},
    filter::Filter,
    index::IndexManager,
    page::{ProjectionQuery, ProjectionResult},
    projection::{EntityProjection, FieldNames},
    query::{Predicate, Query, Sort},
};

/// Statistics document keys read by the size accessors.
const STAT_COUNT: &str = "count";
const STAT_SIZE: &str = "size";
const STAT_INDEX_SIZE: &str = "totalIndexSize";

/// Reads a numeric statistic, defaulting to zero when it is absent or not a number.
fn stat(stats: &Document, key: &str) -> u64 {
    match stats.get(key) {
        Some(Bson::Int32(value)) => u64::try_from(*value).unwrap_or(0),
        Some(Bson::Int64(value)) => u64::try_from(*value).unwrap_or(0),
        Some(Bson::Double(value)) if *value > 0.0 => *value as u64,
        _ => 0,
    }
}

/// Collection name plus the context a repository is bound to.
#[derive(Debug)]
struct Binding<'a, B: StoreBackend> {
    collection: String,
    context: Option<&'a DbContext<B>>,
    owner: String,
}

impl<'a, B: StoreBackend> Binding<'a, B> {
    fn context(&self) -> DocumentStoreResult<&'a DbContext<B>> {
        self.context
            .ok_or_else(|| DocumentStoreError::RepositoryContextNotInitialized(self.owner.clone()))
    }

    fn backend(&self) -> DocumentStoreResult<&'a B> {
        Ok(self.context()?.backend())
    }

    async fn find(&self, query: Query) -> DocumentStoreResult<Vec<Document>> {
        self.backend()?
            .find(&self.collection, query)
            .await
    }

    async fn find_sorted(&self, predicate: Option<Predicate>, sort: Option<Sort>) -> DocumentStoreResult<Vec<Document>> {
        let query = Query::builder()
            .maybe_filter(predicate)
            .maybe_sort(sort)
            .build();

        self.find(query).await
    }

    async fn stats(&self) -> DocumentStoreResult<Document> {
        self.backend()?
            .collection_stats(&self.collection)
            .await
    }

    async fn delete_all(&self) -> DocumentStoreResult<u64> {
        let deleted = self
            .backend()?
            .delete_many(&self.collection, None)
            .await?;
        debug!(collection = %self.collection, deleted, "deleted all documents");

        Ok(deleted)
    }

    async fn drop_collection(&self) -> DocumentStoreResult<()> {
        self.backend()?
            .drop_collection(&self.collection)
            .await?;
        debug!(collection = %self.collection, "dropped collection");

        Ok(())
    }
}

macro_rules! stats_accessors {
    () => {
        /// The store-reported statistics document of the collection.
        pub async fn stats(&self) -> DocumentStoreResult<Document> {
            self.binding.stats().await
        }

        /// Number of documents, as reported by the collection statistics.
        pub async fn count(&self) -> DocumentStoreResult<u64> {
            Ok(stat(&self.stats().await?, STAT_COUNT))
        }

        /// Total size of the collection's indexes, in bytes.
        pub async fn index_size(&self) -> DocumentStoreResult<u64> {
            Ok(stat(&self.stats().await?, STAT_INDEX_SIZE))
        }

        /// Size of the stored documents, in bytes.
        pub async fn size(&self) -> DocumentStoreResult<u64> {
            Ok(stat(&self.stats().await?, STAT_SIZE))
        }

        /// Document size plus index size, in bytes.
        pub async fn total_size(&self) -> DocumentStoreResult<u64> {
            let stats = self.stats().await?;

            Ok(stat(&stats, STAT_INDEX_SIZE) + stat(&stats, STAT_SIZE))
        }

        /// Removes every document, keeping the collection and its indexes.
        pub async fn delete_all(&self) -> DocumentStoreResult<u64> {
            self.binding.delete_all().await
        }

        /// Drops the collection and its indexes.
        pub async fn drop_collection(&self) -> DocumentStoreResult<()> {
            self.binding.drop_collection().await
        }

        /// Index administration for the collection.
        pub fn indexes(&self) -> DocumentStoreResult<IndexManager<'_, B>> {
            Ok(IndexManager::new(self.binding.context()?, &self.binding.collection))
        }

        pub fn collection_name(&self) -> &str {
            &self.binding.collection
        }

        pub fn is_initialized(&self) -> bool {
            self.binding.context.is_some()
        }
    };
}

/// Typed repository for entities of type `E`.
#[derive(Debug)]
pub struct Repository<'a, B: StoreBackend, E: Entity> {
    binding: Binding<'a, B>,
    id_field: IdField,
    _entity: PhantomData<fn() -> E>,
}

impl<'a, B: StoreBackend, E: Entity> Repository<'a, B, E> {
    /// Creates an unbound repository.
    ///
    /// A missing or blank collection name falls back to [`Entity::collection_name`]. The entity's
    /// identifier field is checked here, once; writes fail with
    /// [`DocumentStoreError::PropertyIdNotFound`] if it is not a string stored under `_id`.
    pub fn new(collection: Option<&str>) -> Self {
        let collection = collection
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(E::collection_name())
            .to_string();

        Repository {
            binding: Binding {
                collection,
                context: None,
                owner: format!("Repository<{}>", short_type_name::<E>()),
            },
            id_field: IdField::inspect::<E>(),
            _entity: PhantomData,
        }
    }

    /// Creates a repository bound to `context`.
    pub fn with_context(context: &'a DbContext<B>, collection: Option<&str>) -> Self {
        Self::new(collection).bind(context)
    }

    pub(crate) fn bind(mut self, context: &'a DbContext<B>) -> Self {
        self.initialize(context);
        self
    }

    /// Binds the repository to `context`, replacing any previous binding.
    pub fn initialize(&mut self, context: &'a DbContext<B>) {
        self.binding.context = Some(context);
    }

    fn ensure_property_id(&self) -> DocumentStoreResult<()> {
        match self.id_field {
            IdField::Valid => Ok(()),
            IdField::Missing => {
                warn!(entity = short_type_name::<E>(), "entity has no string identifier under _id");
                Err(DocumentStoreError::PropertyIdNotFound(short_type_name::<E>().to_string()))
            }
        }
    }

    /// Returns the non-blank identifier of a persisted entity.
    fn persisted_id(entity: &E) -> DocumentStoreResult<String> {
        entity
            .id()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| DocumentStoreError::IncoherentEntityState(short_type_name::<E>().to_string()))
    }

    fn id_predicate(id: &str) -> DocumentStoreResult<Predicate> {
        let id = id.trim();
        if id.is_empty() {
            return Err(DocumentStoreError::InvalidArgument("id".to_string()));
        }

        Ok(Predicate::eq(ID_FIELD, id))
    }

    fn decode(documents: Vec<Document>) -> DocumentStoreResult<Vec<E>> {
        documents
            .into_iter()
            .map(E::from_document)
            .collect()
    }

    /// Inserts `entity`, assigning an identifier if it has none.
    ///
    /// # Arguments
    ///
    /// * `entity` - The entity to store; a blank identifier is replaced by a backend-generated one
    ///
    /// # Returns
    ///
    /// The stored entity, marked [`TrackerState::Unchanged`].
    ///
    /// # Errors
    ///
    /// * [`DocumentStoreError::RepositoryContextNotInitialized`] if the repository is unbound
    /// * [`DocumentStoreError::PropertyIdNotFound`] if `E` does not keep a string identifier under `_id`
    /// * [`DocumentStoreError::DocumentAlreadyExists`] if the identifier or a unique key is taken
    pub async fn add(&self, mut entity: E) -> DocumentStoreResult<E> {
        let backend = self.binding.backend()?;
        self.ensure_property_id()?;

        if !entity.has_id() {
            entity.set_id(backend.generate_id());
        }

        backend
            .insert_one(&self.binding.collection, entity.to_document()?)
            .await?;
        entity.set_tracker(TrackerState::Unchanged);
        debug!(collection = %self.binding.collection, id = entity.id().unwrap_or_default(), "added entity");

        Ok(entity)
    }

    /// Replaces the stored document that has the entity's identifier.
    ///
    /// # Returns
    ///
    /// The entity, marked [`TrackerState::Unchanged`].
    ///
    /// # Errors
    ///
    /// * [`DocumentStoreError::RepositoryContextNotInitialized`] if the repository is unbound
    /// * [`DocumentStoreError::IncoherentEntityState`] if the entity has no identifier
    pub async fn update(&self, mut entity: E) -> DocumentStoreResult<E> {
        let backend = self.binding.backend()?;
        self.ensure_property_id()?;
        let id = Self::persisted_id(&entity)?;

        let replaced = backend
            .replace_one(&self.binding.collection, &Predicate::eq(ID_FIELD, id.as_str()), entity.to_document()?)
            .await?;
        entity.set_tracker(TrackerState::Unchanged);
        debug!(collection = %self.binding.collection, id = %id, replaced, "updated entity");

        Ok(entity)
    }

    /// Removes the stored document that has the entity's identifier.
    ///
    /// # Errors
    ///
    /// Fails like [`update`](Self::update) when unbound or when the entity has no identifier.
    pub async fn delete(&self, entity: E) -> DocumentStoreResult<E> {
        let backend = self.binding.backend()?;
        self.ensure_property_id()?;
        let id = Self::persisted_id(&entity)?;

        let deleted = backend
            .delete_one(&self.binding.collection, &Predicate::eq(ID_FIELD, id.as_str()))
            .await?;
        debug!(collection = %self.binding.collection, id = %id, deleted, "deleted entity");

        Ok(entity)
    }

    /// Whether an entity with this identifier is stored.
    ///
    /// Fails with [`DocumentStoreError::InvalidArgument`] if `id` is blank.
    pub async fn exists(&self, id: &str) -> DocumentStoreResult<bool> {
        let backend = self.binding.backend()?;
        let predicate = Self::id_predicate(id)?;

        Ok(backend
            .count(&self.binding.collection, Some(&predicate))
            .await?
            > 0)
    }

    /// Looks an entity up by identifier.
    ///
    /// # Arguments
    ///
    /// * `id` - The identifier; surrounding whitespace is ignored
    ///
    /// # Returns
    ///
    /// `None` when nothing is stored under `id`.
    ///
    /// # Errors
    ///
    /// * [`DocumentStoreError::RepositoryContextNotInitialized`] if the repository is unbound
    /// * [`DocumentStoreError::InvalidArgument`] if `id` is blank
    pub async fn find(&self, id: &str) -> DocumentStoreResult<Option<E>> {
        self.binding.context()?;
        let query = Query::builder()
            .filter(Self::id_predicate(id)?)
            .limit(1)
            .build();

        self.binding
            .find(query)
            .await?
            .into_iter()
            .next()
            .map(E::from_document)
            .transpose()
    }

    /// Runs a compiled filter, applying its sort if present.
    ///
    /// A filter without a predicate yields no entities.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::RepositoryContextNotInitialized`] if the repository is
    /// unbound, or the backend's error if the predicate cannot be evaluated.
    pub async fn find_by(&self, filter: &Filter<E>) -> DocumentStoreResult<Vec<E>> {
        self.binding.context()?;
        let Some(predicate) = filter.predicate() else {
            return Ok(Vec::new());
        };

        let documents = self
            .binding
            .find_sorted(Some(predicate.clone()), filter.sort().cloned())
            .await?;

        Self::decode(documents)
    }

    /// Every stored entity.
    pub async fn list_entities(&self) -> DocumentStoreResult<Vec<E>> {
        Self::decode(self.binding.find(Query::new()).await?)
    }

    /// Every stored entity matching `predicate`.
    pub async fn list(&self, predicate: &Predicate) -> DocumentStoreResult<Vec<E>> {
        Self::decode(
            self.binding
                .find_sorted(Some(predicate.clone()), None)
                .await?,
        )
    }

    /// Reads one page of the collection, keeping only the selected fields.
    ///
    /// Every returned projection shares one name table and uses the query's naming strategy.
    pub async fn project(&self, query: &ProjectionQuery) -> DocumentStoreResult<ProjectionResult> {
        let backend = self.binding.backend()?;

        let count = backend
            .count(&self.binding.collection, None)
            .await?;
        let window = query.request().window(count);

        let mut builder = Query::builder();
        for selection in query.selection() {
            builder = builder.select(selection.field, selection.include);
        }
        if let Some(skip) = window.skip {
            builder = builder.offset(skip);
        }
        if let Some(limit) = window.limit {
            builder = builder.limit(limit);
        }

        let names = FieldNames::default();
        let result = backend
            .find(&self.binding.collection, builder.build())
            .await?
            .into_iter()
            .map(|document| EntityProjection::from_document(names.clone(), document, query.strategy()))
            .collect();

        Ok(ProjectionResult {
            count,
            page_size: window.page_size,
            page: window.page,
            result,
        })
    }

    stats_accessors!();
}

/// Untyped repository over raw BSON documents.
#[derive(Debug)]
pub struct DocumentRepository<'a, B: StoreBackend> {
    binding: Binding<'a, B>,
}

impl<'a, B: StoreBackend> DocumentRepository<'a, B> {
    /// Creates an unbound repository over `collection`.
    ///
    /// Fails with [`DocumentStoreError::InvalidArgument`] if the name is blank.
    pub fn new(collection: &str) -> DocumentStoreResult<Self> {
        let collection = collection.trim();
        if collection.is_empty() {
            return Err(DocumentStoreError::InvalidArgument("collection".to_string()));
        }

        Ok(DocumentRepository {
            binding: Binding {
                collection: collection.to_string(),
                context: None,
                owner: format!("DocumentRepository({collection})"),
            },
        })
    }

    pub(crate) fn bind(mut self, context: &'a DbContext<B>) -> Self {
        self.initialize(context);
        self
    }

    pub fn initialize(&mut self, context: &'a DbContext<B>) {
        self.binding.context = Some(context);
    }

    fn id_predicate(document: &Document) -> DocumentStoreResult<Predicate> {
        document
            .get(ID_FIELD)
            .map(|id| Predicate::eq(ID_FIELD, id.clone()))
            .ok_or_else(|| DocumentStoreError::PropertyIdNotFound("document".to_string()))
    }

    /// Inserts `document`, assigning an `_id` if it has none.
    pub async fn add(&self, mut document: Document) -> DocumentStoreResult<Document> {
        let backend = self.binding.backend()?;

        if !document.contains_key(ID_FIELD) {
            document.insert(ID_FIELD, backend.generate_id());
        }

        backend
            .insert_one(&self.binding.collection, document.clone())
            .await?;
        debug!(collection = %self.binding.collection, "added document");

        Ok(document)
    }

    /// Replaces the stored document with the same `_id`.
    ///
    /// Fails with [`DocumentStoreError::PropertyIdNotFound`] if `document` has no `_id`.
    pub async fn update(&self, document: Document) -> DocumentStoreResult<Document> {
        let backend = self.binding.backend()?;
        let predicate = Self::id_predicate(&document)?;

        backend
            .replace_one(&self.binding.collection, &predicate, document.clone())
            .await?;
        debug!(collection = %self.binding.collection, "updated document");

        Ok(document)
    }

    /// Removes the stored document with the same `_id`.
    ///
    /// Fails with [`DocumentStoreError::PropertyIdNotFound`] if `document` has no `_id`.
    pub async fn delete(&self, document: Document) -> DocumentStoreResult<Document> {
        let backend = self.binding.backend()?;
        let predicate = Self::id_predicate(&document)?;

        backend
            .delete_one(&self.binding.collection, &predicate)
            .await?;
        debug!(collection = %self.binding.collection, "deleted document");

        Ok(document)
    }

    /// Runs a compiled filter, applying its sort if present.
    ///
    /// A filter without a predicate yields no documents.
    pub async fn find_by(&self, filter: &Filter<Document>) -> DocumentStoreResult<Vec<Document>> {
        self.binding.context()?;
        let Some(predicate) = filter.predicate() else {
            return Ok(Vec::new());
        };

        self.binding
            .find_sorted(Some(predicate.clone()), filter.sort().cloned())
            .await
    }

    /// Every stored document.
    pub async fn list_all(&self) -> DocumentStoreResult<Vec<Document>> {
        self.binding.find(Query::new()).await
    }

    /// Every stored document matching `predicate`.
    pub async fn list(&self, predicate: &Predicate) -> DocumentStoreResult<Vec<Document>> {
        self.binding
            .find_sorted(Some(predicate.clone()), None)
            .await
    }

    stats_accessors!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn stats_default_to_zero() {
        let stats = doc! { "count": 3, "size": 2048_i64, "totalIndexSize": 4096.0, "avgObjSize": "n/a" };

        assert_eq!(stat(&stats, STAT_COUNT), 3);
        assert_eq!(stat(&stats, STAT_SIZE), 2048);
        assert_eq!(stat(&stats, STAT_INDEX_SIZE), 4096);
        assert_eq!(stat(&stats, "avgObjSize"), 0);
        assert_eq!(stat(&stats, "storageSize"), 0);
        assert_eq!(stat(&doc! { "count": -1 }, STAT_COUNT), 0);
    }
}
