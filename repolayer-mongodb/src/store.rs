use async_trait::async_trait;
use bson::{Bson, Document, doc, oid::ObjectId};
use futures::TryStreamExt;
use mea::mutex::Mutex;
use mongodb::{
    Client, ClientSession, Collection as MongoCollection, Database,
    error::{Error as MongoError, ErrorKind},
    options::{ClientOptions, FindOptions},
};
use repolayer_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    config::DbSettings,
    error::{DocumentStoreError, DocumentStoreResult},
    index::IndexSpec,
    query::{Predicate, Query, SortDirection, document_field},
};
use tracing::{debug, info};

use crate::query::MongoQueryTranslator;

/// Server error code for a missing namespace.
const NAMESPACE_NOT_FOUND: i32 = 26;

fn backend_error(err: MongoError) -> DocumentStoreError {
    DocumentStoreError::Backend(err.to_string())
}

fn is_namespace_not_found(err: &MongoError) -> bool {
    matches!(err.kind.as_ref(), ErrorKind::Command(command) if command.code == NAMESPACE_NOT_FOUND)
}

/// MongoDB implementation of [`StoreBackend`].
///
/// While a transaction is open every operation runs inside its session.
pub struct MongoDbStore {
    client: Client,
    database: Database,
    session: Mutex<Option<ClientSession>>,
    replica_set: bool,
}

impl std::fmt::Debug for MongoDbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoDbStore")
            .field("database", &self.database.name())
            .field("replica_set", &self.replica_set)
            .finish_non_exhaustive()
    }
}

impl MongoDbStore {
    pub fn new(client: Client, database: &str, replica_set: bool) -> Self {
        Self {
            database: client.database(database),
            client,
            session: Mutex::new(None),
            replica_set,
        }
    }

    pub fn builder(uri: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(uri, database)
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.database.collection(collection_name)
    }

    async fn run_command(&self, command: Document) -> Result<Document, MongoError> {
        let mut session = self.session.lock().await;

        match session.as_mut() {
            Some(session) => self.database.run_command(command).session(session).await,
            None => self.database.run_command(command).await,
        }
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    fn generate_id(&self) -> String {
        ObjectId::new().to_hex()
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<()> {
        let collection = self.get_collection(collection);
        let mut session = self.session.lock().await;

        match session.as_mut() {
            Some(session) => collection.insert_one(document).session(session).await,
            None => collection.insert_one(document).await,
        }
        .map_err(backend_error)?;

        Ok(())
    }

    async fn replace_one(&self, collection: &str, predicate: &Predicate, document: Document) -> DocumentStoreResult<u64> {
        let filter = MongoQueryTranslator::translate(Some(predicate))?;
        let collection = self.get_collection(collection);
        let mut session = self.session.lock().await;

        let result = match session.as_mut() {
            Some(session) => collection.replace_one(filter, document).session(session).await,
            None => collection.replace_one(filter, document).await,
        }
        .map_err(backend_error)?;

        Ok(result.matched_count)
    }

    async fn delete_one(&self, collection: &str, predicate: &Predicate) -> DocumentStoreResult<u64> {
        let filter = MongoQueryTranslator::translate(Some(predicate))?;
        let collection = self.get_collection(collection);
        let mut session = self.session.lock().await;

        let result = match session.as_mut() {
            Some(session) => collection.delete_one(filter).session(session).await,
            None => collection.delete_one(filter).await,
        }
        .map_err(backend_error)?;

        Ok(result.deleted_count)
    }

    async fn delete_many(&self, collection: &str, predicate: Option<&Predicate>) -> DocumentStoreResult<u64> {
        let filter = MongoQueryTranslator::translate(predicate)?;
        let collection = self.get_collection(collection);
        let mut session = self.session.lock().await;

        let result = match session.as_mut() {
            Some(session) => collection.delete_many(filter).session(session).await,
            None => collection.delete_many(filter).await,
        }
        .map_err(backend_error)?;

        Ok(result.deleted_count)
    }

    async fn find(&self, collection: &str, query: Query) -> DocumentStoreResult<Vec<Document>> {
        let mut options = FindOptions::default();

        if let Some(limit) = query.limit {
            options.limit = Some(limit as i64);
        }
        if let Some(skip) = query.offset {
            options.skip = Some(skip);
        }
        if let Some(sort) = &query.sort {
            options.sort = Some(doc! {
                document_field(&sort.field): match sort.direction {
                    SortDirection::Asc => 1,
                    SortDirection::Desc => -1,
                }
            });
        }
        if !query.projection.is_empty() {
            options.projection = Some(
                query
                    .projection
                    .iter()
                    .map(|item| (document_field(&item.field).to_string(), Bson::Int32(item.include as i32)))
                    .collect(),
            );
        }

        let filter = MongoQueryTranslator::translate(query.filter.as_ref())?;
        let collection = self.get_collection(collection);
        let mut session = self.session.lock().await;

        match session.as_mut() {
            Some(session) => {
                let mut cursor = collection
                    .find(filter)
                    .with_options(options)
                    .session(&mut *session)
                    .await
                    .map_err(backend_error)?;
                cursor
                    .stream(session)
                    .try_collect::<Vec<Document>>()
                    .await
                    .map_err(backend_error)
            }
            None => collection
                .find(filter)
                .with_options(options)
                .await
                .map_err(backend_error)?
                .try_collect::<Vec<Document>>()
                .await
                .map_err(backend_error),
        }
    }

    async fn count(&self, collection: &str, predicate: Option<&Predicate>) -> DocumentStoreResult<u64> {
        let filter = MongoQueryTranslator::translate(predicate)?;
        let collection = self.get_collection(collection);
        let mut session = self.session.lock().await;

        match session.as_mut() {
            Some(session) => collection.count_documents(filter).session(session).await,
            None => collection.count_documents(filter).await,
        }
        .map_err(backend_error)
    }

    async fn collection_stats(&self, collection: &str) -> DocumentStoreResult<Document> {
        match self.run_command(doc! { "collStats": collection }).await {
            Ok(stats) => Ok(stats),
            Err(err) if is_namespace_not_found(&err) => Ok(doc! { "ns": collection, "count": 0, "size": 0, "totalIndexSize": 0 }),
            Err(err) => Err(backend_error(err)),
        }
    }

    async fn create_index(&self, collection: &str, spec: &IndexSpec) -> DocumentStoreResult<()> {
        let mut index = doc! { "key": spec.keys(), "name": spec.name.clone() };

        if spec.is_text() {
            index.insert("default_language", spec.text.default_language.clone());
            index.insert("textIndexVersion", spec.text.text_index_version);
        } else if spec.unique {
            index.insert("unique", true);
        }

        self.run_command(doc! { "createIndexes": collection, "indexes": [index] })
            .await
            .map_err(backend_error)?;

        debug!(collection, index = %spec.name, "created index");

        Ok(())
    }

    async fn list_indexes(&self, collection: &str) -> DocumentStoreResult<Vec<Document>> {
        let reply = match self.run_command(doc! { "listIndexes": collection }).await {
            Ok(reply) => reply,
            Err(err) if is_namespace_not_found(&err) => return Ok(vec![]),
            Err(err) => return Err(backend_error(err)),
        };

        let batch = reply
            .get_document("cursor")
            .and_then(|cursor| cursor.get_array("firstBatch"))
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))?;

        Ok(batch
            .iter()
            .filter_map(|index| index.as_document().cloned())
            .collect())
    }

    async fn drop_collection(&self, collection: &str) -> DocumentStoreResult<()> {
        let collection = self.get_collection(collection);
        let mut session = self.session.lock().await;

        match session.as_mut() {
            Some(session) => collection.drop().session(session).await,
            None => collection.drop().await,
        }
        .map_err(backend_error)
    }

    fn supports_transactions(&self) -> bool {
        self.replica_set
    }

    async fn start_transaction(&self) -> DocumentStoreResult<()> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            return Ok(());
        }

        let mut started = self
            .client
            .start_session()
            .await
            .map_err(backend_error)?;
        started
            .start_transaction()
            .await
            .map_err(backend_error)?;
        *session = Some(started);

        Ok(())
    }

    async fn commit_transaction(&self) -> DocumentStoreResult<()> {
        if let Some(mut session) = self.session.lock().await.take() {
            session
                .commit_transaction()
                .await
                .map_err(backend_error)?;
        }

        Ok(())
    }

    async fn abort_transaction(&self) -> DocumentStoreResult<()> {
        if let Some(mut session) = self.session.lock().await.take() {
            session
                .abort_transaction()
                .await
                .map_err(backend_error)?;
        }

        Ok(())
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        let MongoDbStore { client, session, .. } = self;
        drop(session);
        client.shutdown().await;

        Ok(())
    }
}

pub struct MongoDbStoreBuilder {
    uri: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(uri: &str, database: &str) -> Self {
        Self {
            uri: uri.to_string(),
            database: database.to_string(),
        }
    }

    /// Starts from validated settings.
    pub fn from_settings(settings: &DbSettings) -> DocumentStoreResult<Self> {
        let settings = settings.validated()?;

        Ok(Self::new(&settings.connection_string, &settings.database))
    }

    pub fn with_uri(mut self, uri: &str) -> Self {
        self.uri = uri.to_string();
        self
    }

    pub fn with_database(mut self, database: &str) -> Self {
        self.database = database.to_string();
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let settings = DbSettings::new(self.uri, self.database).validated()?;
        let options = ClientOptions::parse(&settings.connection_string)
            .await
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;
        let replica_set = options.repl_set_name.is_some();
        let client = Client::with_options(options).map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        info!(database = %settings.database, replica_set, "connected to mongodb");

        Ok(MongoDbStore::new(client, &settings.database, replica_set))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_are_validated_before_connecting() {
        assert!(MongoDbStoreBuilder::from_settings(&DbSettings::new("", "ophelia")).is_err());

        let builder = MongoDbStoreBuilder::from_settings(&DbSettings::new(" mongodb://db:27017 ", "ophelia"))
            .unwrap()
            .with_database("archive");

        assert_eq!(builder.uri, "mongodb://db:27017");
        assert_eq!(builder.database, "archive");
    }
}
