//! Integration tests for the re-identifying update operations.

use std::sync::atomic::{AtomicUsize, Ordering};

use bson::{Bson, Document, doc};
use softdoc::{async_trait, change::ChangeInfo, memory::InMemoryStore, prelude::*};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn store() -> SoftDeleteStore<InMemoryStore> {
    init_logging();
    SoftDeleteStore::new(InMemoryStore::new())
}

/// Delegates to an in-memory store but can be told to reject writes.
#[derive(Debug, Default)]
struct FaultyBackend {
    inner: InMemoryStore,
    reject_inserts: bool,
    /// Number of `update_one` calls that succeed before the rest are rejected
    updates_allowed: Option<AtomicUsize>,
}

impl FaultyBackend {
    fn rejecting_inserts() -> Self {
        Self { reject_inserts: true, ..Default::default() }
    }

    fn rejecting_updates_after(allowed: usize) -> Self {
        Self { updates_allowed: Some(AtomicUsize::new(allowed)), ..Default::default() }
    }

    async fn seed(&self, document: Document) {
        self.inner
            .insert_document(document, "items")
            .await
            .expect("Failed to seed");
    }
}

fn rejected() -> DocumentStoreError {
    DocumentStoreError::Write {
        code: Some(121),
        message: "document failed validation".to_string(),
    }
}

#[async_trait]
impl StoreBackend for FaultyBackend {
    async fn find_documents(&self, query: &Query, collection: &str) -> DocumentStoreResult<Vec<Document>> {
        self.inner.find_documents(query, collection).await
    }

    async fn count_documents(&self, filter: &Document, collection: &str) -> DocumentStoreResult<u64> {
        self.inner.count_documents(filter, collection).await
    }

    async fn update_one(&self, selector: &Document, update: &Document, collection: &str) -> DocumentStoreResult<ChangeInfo> {
        if let Some(allowed) = &self.updates_allowed {
            if allowed.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_err() {
                return Err(rejected());
            }
        }

        self.inner.update_one(selector, update, collection).await
    }

    async fn update_many(&self, selector: &Document, update: &Document, collection: &str) -> DocumentStoreResult<ChangeInfo> {
        self.inner.update_many(selector, update, collection).await
    }

    async fn upsert(&self, selector: &Document, update: &Document, collection: &str) -> DocumentStoreResult<ChangeInfo> {
        self.inner.upsert(selector, update, collection).await
    }

    async fn insert_document(&self, document: Document, collection: &str) -> DocumentStoreResult<()> {
        if self.reject_inserts {
            return Err(rejected());
        }

        self.inner.insert_document(document, collection).await
    }

    async fn delete_one(&self, selector: &Document, collection: &str) -> DocumentStoreResult<()> {
        self.inner.delete_one(selector, collection).await
    }

    async fn delete_many(&self, selector: &Document, collection: &str) -> DocumentStoreResult<ChangeInfo> {
        self.inner.delete_many(selector, collection).await
    }
}

#[tokio::test]
async fn increment_update_reissues_under_a_new_identifier() {
    let store = store();
    let items = store.collection("items");

    let old_id = items.insert(&doc! { "n": 1, "label": "first" }).await.unwrap();
    let new_id = items
        .increment_update_by_id(old_id.clone(), &doc! { "$set": { "n": 2 } })
        .await
        .unwrap();

    assert_ne!(old_id, new_id);

    assert!(items.find_by_id(old_id.clone()).one().await.unwrap_err().is_not_found());
    let original = items.find_by_id_with_trash(old_id).one().await.unwrap();
    assert_eq!(original.get_i32("n").unwrap(), 1);
    assert!(original.contains_key("deletedAt"));

    let current = items.find_by_id(new_id.clone()).one().await.unwrap();
    assert_eq!(current, doc! { "_id": new_id, "n": 2, "label": "first" });

    assert_eq!(items.count().await.unwrap(), 1);
    assert_eq!(items.count_with_trash().await.unwrap(), 2);
}

#[tokio::test]
async fn increment_update_without_match_changes_nothing() {
    let store = store();
    let items = store.collection("items");
    items.insert(&doc! { "n": 1 }).await.unwrap();

    let err = items
        .increment_update(&doc! { "n": 2 }, &doc! { "$set": { "n": 3 } })
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(items.count_with_trash().await.unwrap(), 1);
}

#[tokio::test]
async fn increment_update_parts_merges_into_the_copy() {
    let store = store();
    let users = store.collection("users");
    users.insert(&doc! { "name": "Alice", "age": 30 }).await.unwrap();

    let new_id = users
        .increment_update_parts(&Filter::eq("name", "Alice"), &doc! { "age": 31 })
        .await
        .unwrap();

    let current = users.find_by_id(new_id).one().await.unwrap();
    assert_eq!(current.get_str("name").unwrap(), "Alice");
    assert_eq!(current.get_i32("age").unwrap(), 31);
}

#[tokio::test]
async fn increment_update_with_replacement_keeps_new_identifier() {
    let store = store();
    let users = store.collection("users");
    users.insert(&doc! { "name": "Alice", "age": 30 }).await.unwrap();

    let new_id = users
        .increment_update(&Filter::eq("name", "Alice"), &doc! { "name": "Bob" })
        .await
        .unwrap();

    let current = users.find(&Filter::eq("name", "Bob")).unwrap().one().await.unwrap();
    assert_eq!(current, doc! { "_id": new_id, "name": "Bob" });
}

#[tokio::test]
async fn increment_upsert_without_match_is_an_insert() {
    let store = store();
    let items = store.collection("items");

    let id = items
        .increment_upsert(&doc! { "n": 99 }, &doc! { "n": 99 })
        .await
        .unwrap();

    assert!(matches!(id, Bson::ObjectId(_)));
    assert_eq!(items.count().await.unwrap(), 1);
    assert_eq!(items.count_with_trash().await.unwrap(), 1);
}

#[tokio::test]
async fn increment_upsert_trashes_the_previous_version() {
    let store = store();
    let items = store.collection("items");

    let old_id = items.insert(&doc! { "k": 1, "v": 1 }).await.unwrap();
    let new_id = items
        .increment_upsert_by_id(old_id.clone(), &doc! { "k": 1, "v": 2 })
        .await
        .unwrap();

    assert_ne!(old_id, new_id);
    assert_eq!(items.count().await.unwrap(), 1);
    assert_eq!(items.count_with_trash().await.unwrap(), 2);

    let live = items.find(&doc! { "k": 1 }).unwrap().one().await.unwrap();
    assert_eq!(live.get_i32("v").unwrap(), 2);
}

#[tokio::test]
async fn failed_reinsert_leaves_original_in_trash() {
    init_logging();
    let backend = FaultyBackend::rejecting_inserts();
    backend.seed(doc! { "_id": 1, "n": 1 }).await;
    let store = SoftDeleteStore::new(backend);
    let items = store.collection("items");

    let err = items
        .increment_update_by_id(1, &doc! { "$set": { "n": 2 } })
        .await
        .unwrap_err();

    assert!(matches!(err, DocumentStoreError::Write { code: Some(121), .. }));
    assert_eq!(items.count().await.unwrap(), 0);
    assert!(items.find_by_id_with_trash(1).one().await.is_ok());
}

#[tokio::test]
async fn failed_final_update_leaves_copy_live_but_stale() {
    init_logging();
    // The soft delete of the original goes through; the update of the copy does not.
    let backend = FaultyBackend::rejecting_updates_after(1);
    backend.seed(doc! { "_id": 1, "n": 1 }).await;
    let store = SoftDeleteStore::new(backend);
    let items = store.collection("items");

    let err = items
        .increment_update_by_id(1, &doc! { "$set": { "n": 2 } })
        .await
        .unwrap_err();

    assert!(matches!(err, DocumentStoreError::Write { code: Some(121), .. }));
    assert!(items.find_by_id(1).one().await.unwrap_err().is_not_found());
    assert!(items.find_by_id_with_trash(1).one().await.is_ok());

    assert_eq!(items.count().await.unwrap(), 1);
    assert_eq!(items.count_with_trash().await.unwrap(), 2);

    let copy = items.find(&doc! {}).unwrap().one().await.unwrap();
    assert_ne!(copy.get("_id"), Some(&Bson::Int32(1)));
    assert_eq!(copy.get_i32("n").unwrap(), 1);
}

#[tokio::test]
async fn increment_upsert_surfaces_other_remove_errors() {
    init_logging();
    let backend = FaultyBackend::rejecting_updates_after(0);
    backend.seed(doc! { "_id": 1, "k": 1, "v": 1 }).await;
    let store = SoftDeleteStore::new(backend);
    let items = store.collection("items");

    let err = items
        .increment_upsert(&doc! { "k": 1 }, &doc! { "k": 1, "v": 2 })
        .await
        .unwrap_err();

    assert!(!err.is_not_found());
    assert!(matches!(err, DocumentStoreError::Write { code: Some(121), .. }));
    assert_eq!(items.count().await.unwrap(), 1);
    assert_eq!(items.count_with_trash().await.unwrap(), 1);

    let live = items.find(&doc! { "k": 1 }).unwrap().one().await.unwrap();
    assert_eq!(live.get_i32("v").unwrap(), 1);
}
