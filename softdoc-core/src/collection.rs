//! Soft-delete collection handles.
//!
//! A [`SoftCollection`] wraps one collection of a [`StoreBackend`] and rewrites every selector
//! before it is forwarded:
//!
//! - Reads (`find`, `find_by_id`, `count`) and writes (`update*`, `upsert*`, `remove*`) only ever
//!   see live documents: the normalized selector is ANDed with `{marker: {$exists: false}}`.
//! - `remove*` never deletes. It stamps the marker with the current time through the same
//!   composed selector, so a trashed document cannot be trashed twice.
//! - `*_with_trash` and `force_remove*` forward the caller's selector untouched. They are the
//!   administrative escape hatches.
//!
//! The handle does not expose the backend's own methods; everything goes through the rewriting
//! entry points below.
//!
//! # Example
//!
//! ```ignore
//! use softdoc::prelude::*;
//! use bson::doc;
//!
//! # async fn example(store: &SoftDeleteStore<impl StoreBackend>) -> DocumentStoreResult<()> {
//! let users = store.collection("users");
//! let id = users.insert(&doc! { "name": "Alice" }).await?;
//!
//! users.remove_by_id(id.clone()).await?;
//! assert!(users.find_by_id(id.clone()).one().await.unwrap_err().is_not_found());
//! assert!(users.find_by_id_with_trash(id).one().await.is_ok());
//! # Ok(()) }
//! ```

use bson::{Bson, Document, doc};
use serde::Serialize;

use crate::{
    backend::StoreBackend,
    change::ChangeInfo,
    cursor::Cursor,
    document::{ID_FIELD, ensure_id, normalize},
    error::{DocumentStoreError, DocumentStoreResult},
    softdelete::SoftDelete,
};

/// A collection handle that applies soft-delete rewriting to every operation.
///
/// # Type Parameters
///
/// * `'a` - Lifetime of the store the handle was taken from
/// * `B` - The storage backend type
#[derive(Debug)]
pub struct SoftCollection<'a, B: StoreBackend + ?Sized> {
    name: String,
    backend: &'a B,
    rules: &'a SoftDelete,
}

impl<'a, B: StoreBackend + ?Sized> SoftCollection<'a, B> {
    pub(crate) fn new(name: String, backend: &'a B, rules: &'a SoftDelete) -> Self {
        Self { name, backend, rules }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The soft-delete rules applied by this handle.
    pub fn soft_delete(&self) -> &SoftDelete {
        self.rules
    }

    fn live<Q: Serialize + ?Sized>(&self, selector: &Q) -> DocumentStoreResult<Document> {
        Ok(self.rules.compose(normalize(selector)?))
    }

    fn by_id(id: impl Into<Bson>) -> Document {
        doc! { ID_FIELD: id.into() }
    }

    // Reads

    /// Prepares a query over live documents matching `query`.
    ///
    /// `query` may be a [`Document`], an [`Expr`](crate::query::Expr), any serializable struct,
    /// or `None`/`()` to match every live document.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Serialization`] if `query` cannot be normalized.
    pub fn find<Q: Serialize + ?Sized>(&self, query: &Q) -> DocumentStoreResult<Cursor<'_, B>> {
        let filter = self.live(query)?;
        log::debug!("find in {}: {}", self.name, filter);

        Ok(Cursor::new(&self.name, self.backend, filter))
    }

    /// Prepares a query for the live document with the given `_id`.
    pub fn find_by_id(&self, id: impl Into<Bson>) -> Cursor<'_, B> {
        let filter = self.rules.compose(Self::by_id(id));
        log::debug!("find by id in {}: {}", self.name, filter);

        Cursor::new(&self.name, self.backend, filter)
    }

    /// Prepares a query over live and trashed documents. `query` is forwarded unchanged.
    pub fn find_with_trash<Q: Serialize + ?Sized>(&self, query: &Q) -> DocumentStoreResult<Cursor<'_, B>> {
        Ok(Cursor::new(&self.name, self.backend, normalize(query)?))
    }

    /// Prepares a query for the document with the given `_id`, live or trashed.
    pub fn find_by_id_with_trash(&self, id: impl Into<Bson>) -> Cursor<'_, B> {
        Cursor::new(&self.name, self.backend, Self::by_id(id))
    }

    /// Prepares a query over trashed documents only.
    pub fn find_trashed<Q: Serialize + ?Sized>(&self, query: &Q) -> DocumentStoreResult<Cursor<'_, B>> {
        let filter = self.rules.compose_trashed(normalize(query)?);
        log::debug!("find trashed in {}: {}", self.name, filter);

        Ok(Cursor::new(&self.name, self.backend, filter))
    }

    /// Counts the live documents in the collection.
    pub async fn count(&self) -> DocumentStoreResult<u64> {
        self.find(&Document::new())?.count().await
    }

    /// Counts every document in the collection, trashed ones included.
    pub async fn count_with_trash(&self) -> DocumentStoreResult<u64> {
        self.find_with_trash(&Document::new())?.count().await
    }

    // Inserts

    /// Inserts a document, generating an `_id` when it has none, and returns the identifier.
    ///
    /// # Errors
    ///
    /// Returns a `Write` error if the identifier is already taken, live or trashed.
    pub async fn insert<T: Serialize + ?Sized>(&self, document: &T) -> DocumentStoreResult<Bson> {
        let mut document = normalize(document)?;
        let id = ensure_id(&mut document, || self.backend.generate_id());

        self.backend
            .insert_document(document, &self.name)
            .await?;

        Ok(id)
    }

    // Updates

    /// Updates the first live document matching `selector`.
    ///
    /// `update` is either an operator document (`{"$set": ...}`) or a full replacement.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::NotFound`] if no live document matches.
    pub async fn update<Q, U>(&self, selector: &Q, update: &U) -> DocumentStoreResult<()>
    where
        Q: Serialize + ?Sized,
        U: Serialize + ?Sized,
    {
        let selector = self.live(selector)?;
        let update = normalize(update)?;
        log::debug!("update in {}: {} with {}", self.name, selector, update);

        self.backend
            .update_one(&selector, &update, &self.name)
            .await?;

        Ok(())
    }

    /// Updates the live document with the given `_id`.
    pub async fn update_by_id<U: Serialize + ?Sized>(&self, id: impl Into<Bson>, update: &U) -> DocumentStoreResult<()> {
        self.update(&Self::by_id(id), update).await
    }

    /// Updates every live document matching `selector`. Matching nothing is not an error.
    pub async fn update_all<Q, U>(&self, selector: &Q, update: &U) -> DocumentStoreResult<ChangeInfo>
    where
        Q: Serialize + ?Sized,
        U: Serialize + ?Sized,
    {
        let selector = self.live(selector)?;
        let update = normalize(update)?;
        log::debug!("update all in {}: {} with {}", self.name, selector, update);

        self.backend
            .update_many(&selector, &update, &self.name)
            .await
    }

    /// Merges the fields of `update` into the first live document matching `selector`.
    ///
    /// Both arguments are normalized; the update is wrapped in `$set`, so fields not mentioned
    /// are kept.
    pub async fn update_parts<Q, U>(&self, selector: &Q, update: &U) -> DocumentStoreResult<()>
    where
        Q: Serialize + ?Sized,
        U: Serialize + ?Sized,
    {
        let update = SoftDelete::merge_update(normalize(update)?);

        self.update(selector, &update).await
    }

    /// Updates the first document matching `selector`, live or trashed.
    pub async fn update_with_trash<Q, U>(&self, selector: &Q, update: &U) -> DocumentStoreResult<()>
    where
        Q: Serialize + ?Sized,
        U: Serialize + ?Sized,
    {
        self.backend
            .update_one(&normalize(selector)?, &normalize(update)?, &self.name)
            .await?;

        Ok(())
    }

    /// Updates the first live document matching `selector`, or inserts one.
    ///
    /// The soft-delete clause only takes part in matching. The inserted document follows the
    /// backend's native upsert rules and never carries the marker.
    pub async fn upsert<Q, U>(&self, selector: &Q, update: &U) -> DocumentStoreResult<ChangeInfo>
    where
        Q: Serialize + ?Sized,
        U: Serialize + ?Sized,
    {
        let selector = self.live(selector)?;
        let update = normalize(update)?;
        log::debug!("upsert in {}: {} with {}", self.name, selector, update);

        self.backend
            .upsert(&selector, &update, &self.name)
            .await
    }

    /// Upserts the live document with the given `_id`.
    pub async fn upsert_by_id<U: Serialize + ?Sized>(&self, id: impl Into<Bson>, update: &U) -> DocumentStoreResult<ChangeInfo> {
        self.upsert(&Self::by_id(id), update).await
    }

    // Soft deletes

    /// Trashes the first live document matching `selector` by stamping the marker field.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::NotFound`] if no live document matches.
    pub async fn remove<Q: Serialize + ?Sized>(&self, selector: &Q) -> DocumentStoreResult<()> {
        self.update(selector, &self.rules.trash_update()).await
    }

    /// Trashes the live document with the given `_id`.
    pub async fn remove_by_id(&self, id: impl Into<Bson>) -> DocumentStoreResult<()> {
        self.remove(&Self::by_id(id)).await
    }

    /// Trashes every live document matching `selector`.
    ///
    /// Nothing is physically deleted: `removed` is always zero and `updated` counts the
    /// documents moved to the trash.
    pub async fn remove_all<Q: Serialize + ?Sized>(&self, selector: &Q) -> DocumentStoreResult<ChangeInfo> {
        self.update_all(selector, &self.rules.trash_update()).await
    }

    /// Physically deletes the first document matching `selector`, live or trashed.
    pub async fn force_remove<Q: Serialize + ?Sized>(&self, selector: &Q) -> DocumentStoreResult<()> {
        let selector = normalize(selector)?;
        log::debug!("force remove in {}: {}", self.name, selector);

        self.backend.delete_one(&selector, &self.name).await
    }

    /// Physically deletes the document with the given `_id`.
    pub async fn force_remove_by_id(&self, id: impl Into<Bson>) -> DocumentStoreResult<()> {
        self.force_remove(&Self::by_id(id)).await
    }

    /// Physically deletes every document matching `selector`, live or trashed.
    pub async fn force_remove_all<Q: Serialize + ?Sized>(&self, selector: &Q) -> DocumentStoreResult<ChangeInfo> {
        let selector = normalize(selector)?;
        log::debug!("force remove all in {}: {}", self.name, selector);

        self.backend.delete_many(&selector, &self.name).await
    }

    /// Brings the first trashed document matching `selector` back to life.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::NotFound`] if no trashed document matches.
    pub async fn restore<Q: Serialize + ?Sized>(&self, selector: &Q) -> DocumentStoreResult<()> {
        let selector = self.rules.compose_trashed(normalize(selector)?);
        log::debug!("restore in {}: {}", self.name, selector);

        self.backend
            .update_one(&selector, &self.rules.restore_update(), &self.name)
            .await?;

        Ok(())
    }

    /// Restores the trashed document with the given `_id`.
    pub async fn restore_by_id(&self, id: impl Into<Bson>) -> DocumentStoreResult<()> {
        self.restore(&Self::by_id(id)).await
    }

    /// Restores every trashed document matching `selector`.
    pub async fn restore_all<Q: Serialize + ?Sized>(&self, selector: &Q) -> DocumentStoreResult<ChangeInfo> {
        let selector = self.rules.compose_trashed(normalize(selector)?);
        log::debug!("restore all in {}: {}", self.name, selector);

        self.backend
            .update_many(&selector, &self.rules.restore_update(), &self.name)
            .await
    }

    // Re-identifying updates
    //
    // These run several backend calls in a row and are NOT atomic. If a step after the
    // soft delete fails, the original stays in the trash and the replacement is missing or
    // only partially updated. Concurrent writers racing between the steps can lose updates or
    // leave two live copies of the same logical record. Callers that need atomicity must use the
    // database's own transactions.

    /// Replaces the first live document matching `selector` with a copy under a new `_id`,
    /// then applies `update` to the copy. Returns the new identifier.
    ///
    /// Steps: fetch the live document, trash it, insert it again with a fresh identifier,
    /// update the new document by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::NotFound`] if no live document matches. Errors from later
    /// steps are returned as-is and leave the collection partially modified (see above).
    pub async fn increment_update<Q, U>(&self, selector: &Q, update: &U) -> DocumentStoreResult<Bson>
    where
        Q: Serialize + ?Sized,
        U: Serialize + ?Sized,
    {
        let update = normalize(update)?;

        self.reissue(normalize(selector)?, update).await
    }

    /// [`increment_update`](Self::increment_update) for the live document with the given `_id`.
    pub async fn increment_update_by_id<U: Serialize + ?Sized>(&self, id: impl Into<Bson>, update: &U) -> DocumentStoreResult<Bson> {
        self.increment_update(&Self::by_id(id), update).await
    }

    /// Like [`increment_update`](Self::increment_update), but merges `update` into the copy
    /// with `$set` instead of applying it as given.
    pub async fn increment_update_parts<Q, U>(&self, selector: &Q, update: &U) -> DocumentStoreResult<Bson>
    where
        Q: Serialize + ?Sized,
        U: Serialize + ?Sized,
    {
        let update = SoftDelete::merge_update(normalize(update)?);

        self.reissue(normalize(selector)?, update).await
    }

    /// Trashes the first live document matching `selector`, if any, then inserts `document`
    /// as a new record. Returns the inserted identifier.
    ///
    /// Finding nothing to trash is not an error; the call then behaves like
    /// [`insert`](Self::insert). The new document does not inherit the old identifier.
    pub async fn increment_upsert<Q, U>(&self, selector: &Q, document: &U) -> DocumentStoreResult<Bson>
    where
        Q: Serialize + ?Sized,
        U: Serialize + ?Sized,
    {
        match self.remove(selector).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                log::debug!("increment upsert in {}: nothing to replace", self.name);
            }
            Err(err) => return Err(err),
        }

        self.insert(document)
            .await
            .inspect_err(|err| {
                log::warn!(
                    "increment upsert in {}: replacement insert failed after trashing the match: {}",
                    self.name,
                    err
                )
            })
    }

    /// [`increment_upsert`](Self::increment_upsert) for the live document with the given `_id`.
    pub async fn increment_upsert_by_id<U: Serialize + ?Sized>(&self, id: impl Into<Bson>, document: &U) -> DocumentStoreResult<Bson> {
        self.increment_upsert(&Self::by_id(id), document).await
    }

    async fn reissue(&self, selector: Document, update: Document) -> DocumentStoreResult<Bson> {
        let mut current = self.find(&selector)?.one().await?;
        let old_id = current
            .get(ID_FIELD)
            .cloned()
            .ok_or_else(|| DocumentStoreError::InvalidDocument(format!(
                "matched document in {} has no {ID_FIELD}",
                self.name
            )))?;

        self.remove_by_id(old_id.clone()).await?;

        let new_id = self.backend.generate_id();
        current.insert(ID_FIELD, new_id.clone());
        log::debug!("reissuing {} in {} as {}", old_id, self.name, new_id);

        self.backend
            .insert_document(current, &self.name)
            .await
            .inspect_err(|err| {
                log::warn!("reissue of {} in {}: insert failed, original left in trash: {}", old_id, self.name, err)
            })?;

        self.backend
            .update_one(&Self::by_id(new_id.clone()), &update, &self.name)
            .await
            .inspect_err(|err| {
                log::warn!("reissue of {} in {}: update of {} failed: {}", old_id, self.name, new_id, err)
            })?;

        Ok(new_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use async_trait::async_trait;

    use crate::query::{Filter, Query};

    /// Records what the rewriter hands to the backend.
    #[derive(Debug, Default)]
    struct RecordingBackend {
        calls: Mutex<Vec<(&'static str, Document, Option<Document>)>>,
    }

    impl RecordingBackend {
        fn record(&self, op: &'static str, selector: &Document, update: Option<&Document>) {
            self.calls
                .lock()
                .unwrap()
                .push((op, selector.clone(), update.cloned()));
        }

        fn last(&self) -> (&'static str, Document, Option<Document>) {
            self.calls.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl StoreBackend for RecordingBackend {
        async fn find_documents(&self, query: &Query, _collection: &str) -> DocumentStoreResult<Vec<Document>> {
            self.record("find", &query.filter, None);
            Ok(vec![])
        }

        async fn count_documents(&self, filter: &Document, _collection: &str) -> DocumentStoreResult<u64> {
            self.record("count", filter, None);
            Ok(0)
        }

        async fn update_one(&self, selector: &Document, update: &Document, _collection: &str) -> DocumentStoreResult<ChangeInfo> {
            self.record("update_one", selector, Some(update));
            Ok(ChangeInfo::updated(1, 1))
        }

        async fn update_many(&self, selector: &Document, update: &Document, _collection: &str) -> DocumentStoreResult<ChangeInfo> {
            self.record("update_many", selector, Some(update));
            Ok(ChangeInfo::updated(1, 1))
        }

        async fn upsert(&self, selector: &Document, update: &Document, _collection: &str) -> DocumentStoreResult<ChangeInfo> {
            self.record("upsert", selector, Some(update));
            Ok(ChangeInfo::updated(1, 1))
        }

        async fn insert_document(&self, document: Document, _collection: &str) -> DocumentStoreResult<()> {
            self.record("insert", &document, None);
            Ok(())
        }

        async fn delete_one(&self, selector: &Document, _collection: &str) -> DocumentStoreResult<()> {
            self.record("delete_one", selector, None);
            Ok(())
        }

        async fn delete_many(&self, selector: &Document, _collection: &str) -> DocumentStoreResult<ChangeInfo> {
            self.record("delete_many", selector, None);
            Ok(ChangeInfo::removed(0))
        }
    }

    fn live(selector: Document) -> Document {
        doc! { "$and": [selector, { "deletedAt": { "$exists": false } }] }
    }

    #[tokio::test]
    async fn test_remove_stamps_marker_through_composed_selector() {
        let backend = RecordingBackend::default();
        let rules = SoftDelete::default();
        let items = SoftCollection::new("items".to_string(), &backend, &rules);

        items.remove(&Filter::gt("n", 42)).await.unwrap();

        let (op, selector, update) = backend.last();
        assert_eq!(op, "update_one");
        assert_eq!(selector, live(doc! { "n": { "$gt": 42 } }));

        let update = update.unwrap();
        let set = update.get_document("$set").unwrap();
        assert!(matches!(set.get("deletedAt"), Some(Bson::DateTime(_))));
    }

    #[tokio::test]
    async fn test_reads_compose_and_trash_variants_do_not() {
        let backend = RecordingBackend::default();
        let rules = SoftDelete::default();
        let items = SoftCollection::new("items".to_string(), &backend, &rules);

        items.count().await.unwrap();
        assert_eq!(backend.last(), ("count", live(doc! {}), None));

        items.count_with_trash().await.unwrap();
        assert_eq!(backend.last(), ("count", doc! {}, None));

        items.find_by_id(5).all().await.unwrap();
        assert_eq!(backend.last(), ("find", live(doc! { "_id": 5 }), None));

        items.find_by_id_with_trash(5).all().await.unwrap();
        assert_eq!(backend.last(), ("find", doc! { "_id": 5 }, None));
    }

    #[tokio::test]
    async fn test_write_rewrites() {
        let backend = RecordingBackend::default();
        let rules = SoftDelete::new("delete_at");
        let items = SoftCollection::new("items".to_string(), &backend, &rules);
        let live = |selector: Document| doc! { "$and": [selector, { "delete_at": { "$exists": false } }] };

        items.update_parts(&doc! { "k": 1 }, &doc! { "v": 2 }).await.unwrap();
        assert_eq!(
            backend.last(),
            ("update_one", live(doc! { "k": 1 }), Some(doc! { "$set": { "v": 2 } }))
        );

        items.upsert(&doc! { "k": 1 }, &doc! { "$set": { "v": 3 } }).await.unwrap();
        assert_eq!(
            backend.last(),
            ("upsert", live(doc! { "k": 1 }), Some(doc! { "$set": { "v": 3 } }))
        );

        items.restore_all(&doc! { "k": 1 }).await.unwrap();
        assert_eq!(
            backend.last(),
            (
                "update_many",
                doc! { "$and": [{ "k": 1 }, { "delete_at": { "$exists": true } }] },
                Some(doc! { "$unset": { "delete_at": "" } })
            )
        );

        items.force_remove(&doc! { "k": 1 }).await.unwrap();
        assert_eq!(backend.last(), ("delete_one", doc! { "k": 1 }, None));
    }

    #[tokio::test]
    async fn test_insert_generates_missing_identifier() {
        let backend = RecordingBackend::default();
        let rules = SoftDelete::default();
        let items = SoftCollection::new("items".to_string(), &backend, &rules);

        let id = items.insert(&doc! { "n": 1 }).await.unwrap();
        assert!(matches!(id, Bson::ObjectId(_)));

        let (_, inserted, _) = backend.last();
        assert_eq!(inserted.get("_id"), Some(&id));
        assert_eq!(inserted.keys().next().map(String::as_str), Some("_id"));
    }
}
