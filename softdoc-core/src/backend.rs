//! Store client abstraction consumed by the soft-delete layer.
//!
//! The rewriter never talks to a database directly. It composes selectors and updates and hands
//! them to a [`StoreBackend`], which executes them with the usual document-store semantics.
//! Backends receive fully rewritten documents and know nothing about soft deletion.
//!
//! # Traits
//!
//! - [`StoreBackend`]: The store client interface
//! - [`StoreBackendBuilder`]: Factory trait for creating backend instances
//!
//! # Examples
//!
//! ```ignore
//! use softdoc::backend::StoreBackend;
//! use bson::doc;
//!
//! let backend = MyBackendImpl::new();
//! backend.insert_document(doc! { "_id": 1, "name": "Alice" }, "users").await?;
//! let info = backend.update_many(&doc! {}, &doc! { "$set": { "seen": true } }, "users").await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use std::fmt::Debug;

use crate::{change::ChangeInfo, error::DocumentStoreResult, query::Query};

/// Abstract interface for document store clients.
///
/// # Update documents
///
/// An update whose first key starts with `$` is an operator update (`$set`, `$unset`, `$inc`,
/// ...). Any other update is a full replacement that keeps the matched document's `_id`.
///
/// # Thread Safety
///
/// Implementations must be safe to share between tasks. The trait is object safe, so
/// `Box<dyn StoreBackend>` can be used when the backend is picked at runtime.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Returns the documents matching the query's filter, after sort, skip and limit.
    async fn find_documents(
        &self,
        query: &Query,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>>;

    /// Counts the documents matching `filter`.
    async fn count_documents(&self, filter: &Document, collection: &str) -> DocumentStoreResult<u64>;

    /// Updates the first document matching `selector`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::NotFound`](crate::error::DocumentStoreError::NotFound)
    /// when nothing matches, and a `Write` error when the store rejects the change.
    async fn update_one(
        &self,
        selector: &Document,
        update: &Document,
        collection: &str,
    ) -> DocumentStoreResult<ChangeInfo>;

    /// Updates every document matching `selector`. Matching nothing is not an error.
    async fn update_many(
        &self,
        selector: &Document,
        update: &Document,
        collection: &str,
    ) -> DocumentStoreResult<ChangeInfo>;

    /// Updates the first match or inserts a new document.
    ///
    /// When nothing matches, the new document is built from the equality clauses of
    /// `selector` with `update` applied on top, and its identifier is reported in
    /// [`ChangeInfo::upserted_id`].
    async fn upsert(
        &self,
        selector: &Document,
        update: &Document,
        collection: &str,
    ) -> DocumentStoreResult<ChangeInfo>;

    /// Inserts a document. The caller guarantees the `_id` field is present.
    async fn insert_document(&self, document: Document, collection: &str) -> DocumentStoreResult<()>;

    /// Physically deletes the first document matching `selector`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::NotFound`](crate::error::DocumentStoreError::NotFound)
    /// when nothing matches.
    async fn delete_one(&self, selector: &Document, collection: &str) -> DocumentStoreResult<()>;

    /// Physically deletes every document matching `selector`.
    async fn delete_many(&self, selector: &Document, collection: &str) -> DocumentStoreResult<ChangeInfo>;

    /// Generates a globally unique identifier for a new document.
    fn generate_id(&self) -> Bson {
        Bson::ObjectId(ObjectId::new())
    }

    /// Releases the backend's resources.
    ///
    /// The default implementation is a no-op; backends holding connections should override it.
    async fn close(&self) -> DocumentStoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl<B> StoreBackend for &B
where
    B: StoreBackend + ?Sized,
{
    async fn find_documents(
        &self,
        query: &Query,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>> {
        (**self).find_documents(query, collection).await
    }

    async fn count_documents(&self, filter: &Document, collection: &str) -> DocumentStoreResult<u64> {
        (**self).count_documents(filter, collection).await
    }

    async fn update_one(
        &self,
        selector: &Document,
        update: &Document,
        collection: &str,
    ) -> DocumentStoreResult<ChangeInfo> {
        (**self).update_one(selector, update, collection).await
    }

    async fn update_many(
        &self,
        selector: &Document,
        update: &Document,
        collection: &str,
    ) -> DocumentStoreResult<ChangeInfo> {
        (**self).update_many(selector, update, collection).await
    }

    async fn upsert(
        &self,
        selector: &Document,
        update: &Document,
        collection: &str,
    ) -> DocumentStoreResult<ChangeInfo> {
        (**self).upsert(selector, update, collection).await
    }

    async fn insert_document(&self, document: Document, collection: &str) -> DocumentStoreResult<()> {
        (**self).insert_document(document, collection).await
    }

    async fn delete_one(&self, selector: &Document, collection: &str) -> DocumentStoreResult<()> {
        (**self).delete_one(selector, collection).await
    }

    async fn delete_many(&self, selector: &Document, collection: &str) -> DocumentStoreResult<ChangeInfo> {
        (**self).delete_many(selector, collection).await
    }

    fn generate_id(&self) -> Bson {
        (**self).generate_id()
    }

    async fn close(&self) -> DocumentStoreResult<()> {
        (**self).close().await
    }
}

#[async_trait]
impl<B> StoreBackend for Box<B>
where
    B: StoreBackend + ?Sized,
{
    async fn find_documents(
        &self,
        query: &Query,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>> {
        (**self).find_documents(query, collection).await
    }

    async fn count_documents(&self, filter: &Document, collection: &str) -> DocumentStoreResult<u64> {
        (**self).count_documents(filter, collection).await
    }

    async fn update_one(
        &self,
        selector: &Document,
        update: &Document,
        collection: &str,
    ) -> DocumentStoreResult<ChangeInfo> {
        (**self).update_one(selector, update, collection).await
    }

    async fn update_many(
        &self,
        selector: &Document,
        update: &Document,
        collection: &str,
    ) -> DocumentStoreResult<ChangeInfo> {
        (**self).update_many(selector, update, collection).await
    }

    async fn upsert(
        &self,
        selector: &Document,
        update: &Document,
        collection: &str,
    ) -> DocumentStoreResult<ChangeInfo> {
        (**self).upsert(selector, update, collection).await
    }

    async fn insert_document(&self, document: Document, collection: &str) -> DocumentStoreResult<()> {
        (**self).insert_document(document, collection).await
    }

    async fn delete_one(&self, selector: &Document, collection: &str) -> DocumentStoreResult<()> {
        (**self).delete_one(selector, collection).await
    }

    async fn delete_many(&self, selector: &Document, collection: &str) -> DocumentStoreResult<ChangeInfo> {
        (**self).delete_many(selector, collection).await
    }

    fn generate_id(&self) -> Bson {
        (**self).generate_id()
    }

    async fn close(&self) -> DocumentStoreResult<()> {
        (**self).close().await
    }
}

#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
