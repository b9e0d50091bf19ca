//! In-memory storage implementation for document stores.
//!
//! Documents are kept per collection in insertion order behind an async-aware read-write lock.
//! Every write takes the lock once, so each backend call is atomic with respect to other calls on
//! the same store.

use std::{collections::HashMap, sync::Arc};
use async_trait::async_trait;
use mea::rwlock::RwLock;
use bson::{Bson, Document};

use softdoc_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    change::ChangeInfo,
    document::{ID_FIELD, ensure_id},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, Query},
};

use crate::{
    evaluator::{DocumentEvaluator, compare_documents},
    update,
};

type StoreMap = HashMap<String, Vec<Document>>;

/// Thread-safe in-memory document storage backend.
///
/// This struct implements the [`StoreBackend`] trait entirely in memory. It understands the
/// filter operators produced by the soft-delete layer and the `$set`, `$unset`, `$inc` and
/// `$setOnInsert` update operators.
///
/// # Thread Safety
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing
/// it to be safely shared across async tasks. Multiple clones of the same instance
/// share the same underlying data.
///
/// # Performance
///
/// Queries scan all documents in a collection (no indexing). Use the MongoDB backend for
/// anything beyond tests and small datasets.
///
/// # Example
///
/// ```ignore
/// use softdoc_memory::InMemoryStore;
/// use softdoc::backend::StoreBackend;
/// use bson::doc;
///
/// let store = InMemoryStore::new();
/// store.insert_document(doc! { "_id": 1, "name": "Alice" }, "users").await?;
/// assert_eq!(store.count_documents(&doc! {}, "users").await?, 1);
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// collection name -> documents in insertion order
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Lists the names of the collections that received at least one write.
    pub async fn list_collections(&self) -> Vec<String> {
        self.store
            .read()
            .await
            .keys()
            .cloned()
            .collect()
    }

    fn matching<'d>(documents: &'d [Document], filter: &Expr) -> impl Iterator<Item = (usize, &'d Document)> {
        documents
            .iter()
            .enumerate()
            .filter(move |(_, document)| DocumentEvaluator::matches(document, filter))
    }

    fn first_match(documents: &[Document], filter: &Expr) -> Option<usize> {
        documents
            .iter()
            .position(|document| DocumentEvaluator::matches(document, filter))
    }

    fn ensure_unique(documents: &[Document], id: Option<&Bson>, collection: &str) -> DocumentStoreResult<()> {
        match id {
            Some(id) if documents.iter().any(|d| d.get(ID_FIELD) == Some(id)) => {
                Err(DocumentStoreError::duplicate_key(id, collection))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn find_documents(&self, query: &Query, collection: &str) -> DocumentStoreResult<Vec<Document>> {
        let filter = Expr::from_document(&query.filter)?;
        let store = self.store.read().await;
        let documents = match store.get(collection) {
            Some(col) => col,
            None => return Ok(vec![]),
        };

        let mut found = Self::matching(documents, &filter)
            .map(|(_, document)| document.clone())
            .collect::<Vec<_>>();

        if !query.sort.is_empty() {
            found.sort_by(|a, b| compare_documents(a, b, &query.sort));
        }

        log::trace!("find in {}: {} of {} documents match", collection, found.len(), documents.len());

        Ok(
            found
                .into_iter()
                .skip(query.offset.unwrap_or(0) as usize)
                .take(match query.limit {
                    // a zero limit means no limit
                    None | Some(0) => usize::MAX,
                    Some(n) => usize::try_from(n).unwrap_or(usize::MAX),
                })
                .collect()
        )
    }

    async fn count_documents(&self, filter: &Document, collection: &str) -> DocumentStoreResult<u64> {
        let filter = Expr::from_document(filter)?;
        let store = self.store.read().await;

        Ok(
            store
                .get(collection)
                .map(|documents| Self::matching(documents, &filter).count() as u64)
                .unwrap_or(0)
        )
    }

    async fn update_one(&self, selector: &Document, update: &Document, collection: &str) -> DocumentStoreResult<ChangeInfo> {
        let filter = Expr::from_document(selector)?;
        let mut store = self.store.write().await;
        let not_found = || DocumentStoreError::NotFound(collection.to_string());
        let documents = store.get_mut(collection).ok_or_else(not_found)?;

        let index = Self::first_match(documents, &filter).ok_or_else(not_found)?;
        let updated = update::apply(&documents[index], update, false)?;
        let changed = updated != documents[index];

        log::trace!("update one in {}: document {} changed: {}", collection, index, changed);
        documents[index] = updated;

        Ok(ChangeInfo::updated(1, changed as u64))
    }

    async fn update_many(&self, selector: &Document, update: &Document, collection: &str) -> DocumentStoreResult<ChangeInfo> {
        let filter = Expr::from_document(selector)?;
        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(ChangeInfo::default());
        };

        let updates = Self::matching(documents, &filter)
            .map(|(index, current)| Ok((index, update::apply(current, update, false)?)))
            .collect::<DocumentStoreResult<Vec<_>>>()?;

        let matched = updates.len() as u64;
        let mut changed = 0;

        for (index, updated) in updates {
            if documents[index] != updated {
                documents[index] = updated;
                changed += 1;
            }
        }

        log::trace!("update many in {}: matched {}, changed {}", collection, matched, changed);

        Ok(ChangeInfo::updated(matched, changed))
    }

    async fn upsert(&self, selector: &Document, update: &Document, collection: &str) -> DocumentStoreResult<ChangeInfo> {
        let filter = Expr::from_document(selector)?;
        let mut store = self.store.write().await;
        let documents = store.entry(collection.to_string()).or_default();

        if let Some(index) = Self::first_match(documents, &filter) {
            let updated = update::apply(&documents[index], update, false)?;
            let changed = updated != documents[index];
            documents[index] = updated;

            return Ok(ChangeInfo::updated(1, changed as u64));
        }

        let mut inserted = update::upsert_seed(selector, update)?;
        let id = ensure_id(&mut inserted, || self.generate_id());

        Self::ensure_unique(documents, Some(&id), collection)?;
        log::trace!("upsert in {}: inserted {}", collection, id);
        documents.push(inserted);

        Ok(ChangeInfo::upserted(id))
    }

    async fn insert_document(&self, document: Document, collection: &str) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;
        let documents = store.entry(collection.to_string()).or_default();

        Self::ensure_unique(documents, document.get(ID_FIELD), collection)?;
        documents.push(document);

        Ok(())
    }

    async fn delete_one(&self, selector: &Document, collection: &str) -> DocumentStoreResult<()> {
        let filter = Expr::from_document(selector)?;
        let mut store = self.store.write().await;
        let not_found = || DocumentStoreError::NotFound(collection.to_string());
        let documents = store.get_mut(collection).ok_or_else(not_found)?;

        let index = Self::first_match(documents, &filter).ok_or_else(not_found)?;
        documents.remove(index);

        Ok(())
    }

    async fn delete_many(&self, selector: &Document, collection: &str) -> DocumentStoreResult<ChangeInfo> {
        let filter = Expr::from_document(selector)?;
        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(ChangeInfo::default());
        };

        let before = documents.len();
        documents.retain(|document| !DocumentEvaluator::matches(document, &filter));
        let removed = (before - documents.len()) as u64;

        log::trace!("delete many in {}: removed {}", collection, removed);

        Ok(ChangeInfo::removed(removed))
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// Collections can be seeded with documents, which is handy for tests.
///
/// # Example
///
/// ```ignore
/// use softdoc_memory::InMemoryStore;
/// use softdoc::backend::StoreBackendBuilder;
///
/// let store = InMemoryStore::builder()
///     .with_documents("users", vec![doc! { "_id": 1, "name": "Alice" }])
///     .build()
///     .await?;
/// ```
#[derive(Default, Debug)]
pub struct InMemoryStoreBuilder {
    seed: StoreMap,
}

impl InMemoryStoreBuilder {
    /// Adds documents to a collection of the store being built.
    pub fn with_documents(mut self, collection: &str, documents: impl IntoIterator<Item = Document>) -> Self {
        self.seed
            .entry(collection.to_string())
            .or_default()
            .extend(documents);
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    /// Builds the store.
    ///
    /// # Errors
    ///
    /// Fails with a `Write` error if a seeded collection contains duplicate identifiers.
    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let mut store = StoreMap::new();

        for (collection, seeded) in self.seed {
            let documents: &mut Vec<Document> = store.entry(collection.clone()).or_default();

            for document in seeded {
                InMemoryStore::ensure_unique(documents, document.get(ID_FIELD), &collection)?;
                documents.push(document);
            }
        }

        Ok(InMemoryStore {
            store: Arc::new(RwLock::new(store)),
        })
    }
}
