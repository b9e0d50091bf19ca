//! Lazy query handles returned by the `find*` family.

use bson::Document;
use serde::de::DeserializeOwned;

use crate::{
    backend::StoreBackend,
    document::decode,
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Query, Sort, SortDirection},
};

/// A lazily executed find.
///
/// Building a cursor does not touch the backend. Each terminal call ([`one`], [`all`],
/// [`count`]) issues a fresh request with the cursor's effective filter, so a cursor can be
/// run any number of times.
///
/// [`one`]: Cursor::one
/// [`all`]: Cursor::all
/// [`count`]: Cursor::count
#[derive(Debug)]
pub struct Cursor<'a, B: StoreBackend + ?Sized> {
    collection: &'a str,
    backend: &'a B,
    query: Query,
}

impl<B: StoreBackend + ?Sized> Clone for Cursor<'_, B> {
    fn clone(&self) -> Self {
        Self {
            collection: self.collection,
            backend: self.backend,
            query: self.query.clone(),
        }
    }
}

impl<'a, B: StoreBackend + ?Sized> Cursor<'a, B> {
    pub(crate) fn new(collection: &'a str, backend: &'a B, filter: Document) -> Self {
        Self {
            collection,
            backend,
            query: Query::new(filter),
        }
    }

    /// The effective filter sent to the backend, including any soft-delete clause.
    pub fn filter(&self) -> &Document {
        &self.query.filter
    }

    /// The full request this cursor will issue.
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Appends a sort key.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query.sort.push(Sort { field: field.into(), direction });
        self
    }

    /// Skips the first `n` results.
    pub fn skip(mut self, n: u64) -> Self {
        self.query.offset = Some(n);
        self
    }

    /// Returns at most `n` results.
    pub fn limit(mut self, n: u64) -> Self {
        self.query.limit = Some(n);
        self
    }

    /// Returns the first result.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::NotFound`] if nothing matches.
    pub async fn one(&self) -> DocumentStoreResult<Document> {
        let mut query = self.query.clone();
        query.limit = Some(1);

        self.backend
            .find_documents(&query, self.collection)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DocumentStoreError::NotFound(self.collection.to_string()))
    }

    /// Returns the first result decoded as `T`.
    pub async fn one_as<T: DeserializeOwned>(&self) -> DocumentStoreResult<T> {
        decode(self.one().await?)
    }

    /// Returns every result.
    pub async fn all(&self) -> DocumentStoreResult<Vec<Document>> {
        self.backend
            .find_documents(&self.query, self.collection)
            .await
    }

    /// Returns every result decoded as `T`.
    pub async fn all_as<T: DeserializeOwned>(&self) -> DocumentStoreResult<Vec<T>> {
        self.all()
            .await?
            .into_iter()
            .map(decode::<T>)
            .collect()
    }

    /// Counts the matching documents, ignoring sort, skip and limit.
    pub async fn count(&self) -> DocumentStoreResult<u64> {
        self.backend
            .count_documents(&self.query.filter, self.collection)
            .await
    }
}
