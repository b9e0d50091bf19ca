//! The soft-delete store: a backend paired with the marker configuration.
//!
//! The marker field is fixed when the store is built and shared by every collection handle taken
//! from it.
//!
//! # Example
//!
//! ```ignore
//! use softdoc::prelude::*;
//!
//! let store = SoftDeleteStore::builder(backend)
//!     .marker_field("removedOn")
//!     .build();
//! let users = store.collection("users");
//! ```

use crate::{
    backend::StoreBackend,
    collection::SoftCollection,
    document::Record,
    error::DocumentStoreResult,
    softdelete::SoftDelete,
};

/// A soft-delete store bound to a specific backend implementation.
///
/// # Type Parameters
///
/// * `B` - The backend implementation type
#[derive(Debug)]
pub struct SoftDeleteStore<B: StoreBackend> {
    backend: B,
    rules: SoftDelete,
}

/// A store whose backend is chosen at runtime.
pub type DynSoftDeleteStore = SoftDeleteStore<Box<dyn StoreBackend>>;

impl<B: StoreBackend> SoftDeleteStore<B> {
    /// Creates a store using the default marker field, `deletedAt`.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            rules: SoftDelete::default(),
        }
    }

    /// Starts building a store over `backend`.
    pub fn builder(backend: B) -> SoftDeleteStoreBuilder<B> {
        SoftDeleteStoreBuilder {
            backend,
            rules: SoftDelete::default(),
        }
    }

    /// The soft-delete rules shared by every collection of this store.
    pub fn soft_delete(&self) -> &SoftDelete {
        &self.rules
    }

    /// The name of the marker field.
    pub fn marker_field(&self) -> &str {
        self.rules.marker()
    }

    /// Direct access to the underlying backend, bypassing soft-delete rewriting.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Gets a collection handle with the given name.
    pub fn collection<'a>(&'a self, name: &str) -> SoftCollection<'a, B> {
        SoftCollection::new(name.to_string(), &self.backend, &self.rules)
    }

    /// Gets the collection handle for a record type, named by [`Record::collection_name`].
    pub fn typed_collection<'a, R: Record>(&'a self) -> SoftCollection<'a, B> {
        SoftCollection::new(R::collection_name().to_string(), &self.backend, &self.rules)
    }

    /// Closes the connection to the backend.
    pub async fn close(&self) -> DocumentStoreResult<()> {
        self.backend.close().await
    }

    /// Consumes the store and returns the backend.
    pub fn into_backend(self) -> B {
        self.backend
    }
}

impl<B: StoreBackend + 'static> SoftDeleteStore<B> {
    /// Erases the backend type.
    pub fn into_dyn(self) -> DynSoftDeleteStore {
        SoftDeleteStore {
            backend: Box::new(self.backend),
            rules: self.rules,
        }
    }
}

/// Builder for [`SoftDeleteStore`].
#[derive(Debug)]
pub struct SoftDeleteStoreBuilder<B: StoreBackend> {
    backend: B,
    rules: SoftDelete,
}

impl<B: StoreBackend> SoftDeleteStoreBuilder<B> {
    /// Sets the name of the field recording the deletion time.
    pub fn marker_field(mut self, field: impl Into<String>) -> Self {
        self.rules = SoftDelete::new(field);
        self
    }

    pub fn build(self) -> SoftDeleteStore<B> {
        SoftDeleteStore {
            backend: self.backend,
            rules: self.rules,
        }
    }
}
