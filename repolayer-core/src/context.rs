//! Data-store context: one logical session over a backend.
//!
//! A [`DbContext`] owns the backend a unit of work runs against and hands out repositories
//! bound to it. It also carries the transaction state of that unit of work; a context is not
//! meant to be shared between concurrent units of work.
//!
//! # Example
//!
//! ```ignore
//! use repolayer::prelude::*;
//!
//! let context = DbContext::new(InMemoryStore::new());
//! let accounts = context.repository::<Account>();
//!
//! context.begin_transaction().await?;
//! let account = accounts.add(Account::default()).await?;
//! context.commit_changes().await?;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

use crate::{
    backend::StoreBackend,
    entity::Entity,
    error::DocumentStoreResult,
    repository::{DocumentRepository, Repository},
};

#[derive(Debug)]
pub struct DbContext<B: StoreBackend> {
    backend: B,
    in_transaction: AtomicBool,
}

impl<B: StoreBackend> DbContext<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            in_transaction: AtomicBool::new(false),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction.load(Ordering::Acquire)
    }

    /// Starts a transaction if the backend supports them and none is active.
    ///
    /// Without backend support this is a no-op and [`in_transaction`](Self::in_transaction)
    /// stays `false`.
    ///
    /// # Errors
    ///
    /// Returns the backend's error if the session cannot be started.
    pub async fn begin_transaction(&self) -> DocumentStoreResult<()> {
        if !self.backend.supports_transactions() || self.in_transaction() {
            return Ok(());
        }

        self.backend.start_transaction().await?;
        self.in_transaction.store(true, Ordering::Release);
        info!("transaction started");

        Ok(())
    }

    /// Commits the active transaction, if any.
    pub async fn commit_changes(&self) -> DocumentStoreResult<()> {
        if !self.backend.supports_transactions() || !self.in_transaction() {
            return Ok(());
        }

        self.backend.commit_transaction().await?;
        self.in_transaction.store(false, Ordering::Release);
        info!("transaction committed");

        Ok(())
    }

    /// Aborts the active transaction, if any.
    pub async fn rollback_changes(&self) -> DocumentStoreResult<()> {
        if !self.backend.supports_transactions() || !self.in_transaction() {
            return Ok(());
        }

        self.backend.abort_transaction().await?;
        self.in_transaction.store(false, Ordering::Release);
        info!("transaction rolled back");

        Ok(())
    }

    /// Returns a repository for `E` over its default collection, bound to this context.
    pub fn repository<E: Entity>(&self) -> Repository<'_, B, E> {
        Repository::new(None).bind(self)
    }

    /// Returns a repository for `E` over the named collection, bound to this context.
    pub fn repository_named<E: Entity>(&self, collection: &str) -> Repository<'_, B, E> {
        Repository::new(Some(collection)).bind(self)
    }

    /// Returns an untyped repository over the named collection, bound to this context.
    ///
    /// # Arguments
    ///
    /// * `collection` - Collection name, trimmed
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidArgument`](crate::error::DocumentStoreError::InvalidArgument)
    /// if the name is blank.
    pub fn document_repository(&self, collection: &str) -> DocumentStoreResult<DocumentRepository<'_, B>> {
        Ok(DocumentRepository::new(collection)?.bind(self))
    }

    /// Shuts down the backend.
    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        self.backend.shutdown().await
    }
}
