//! Soft-delete query rewriting over document database clients.
//!
//! This crate is the primary entry point. It re-exports the core types from `softdoc-core` and
//! gives access to the available storage backends.
//!
//! Deleted documents are never physically removed: `remove` stamps a marker field (`deletedAt`
//! by default) with the deletion time, and every `find`, `count`, `update` and `upsert` issued
//! through a [`SoftCollection`](collection::SoftCollection) transparently skips marked documents.
//!
//! # Quick Start
//!
//! ```ignore
//! use softdoc::{prelude::*, memory::InMemoryStore};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let store = SoftDeleteStore::new(InMemoryStore::new());
//!     let items = store.collection("items");
//!
//!     for n in 40..45 {
//!         items.insert(&doc! { "n": n }).await?;
//!     }
//!
//!     // Trash everything above 42; nothing is deleted.
//!     let info = items.remove_all(&Filter::gt("n", 42)).await?;
//!     assert_eq!(info.updated, 2);
//!
//!     assert_eq!(items.count().await?, 3);
//!     assert_eq!(items.count_with_trash().await?, 5);
//!
//!     // Bring one back.
//!     items.restore(&Filter::eq("n", 43)).await?;
//!     assert!(items.find(&Filter::eq("n", 43))?.one().await.is_ok());
//!
//!     store.close().await
//! }
//! ```
//!
//! # Custom marker field
//!
//! ```ignore
//! let store = SoftDeleteStore::builder(InMemoryStore::new())
//!     .marker_field("delete_at")
//!     .build();
//! ```
//!
//! # Dynamic Dispatch
//!
//! A store can erase its backend type with [`into_dyn`](store::SoftDeleteStore::into_dyn), which
//! is useful when the backend is picked from configuration at runtime.
//!
//! ```ignore
//! let store: DynSoftDeleteStore = SoftDeleteStore::new(InMemoryStore::new()).into_dyn();
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory storage for development and testing
//! - [`mongodb`] - MongoDB backend (requires `mongodb` feature)

pub mod prelude;

pub use softdoc_core::{backend, change, collection, cursor, document, error, query, softdelete, store};
pub use softdoc_core::store::{DynSoftDeleteStore, SoftDeleteStore, SoftDeleteStoreBuilder};

// Re-export BSON types for convenience
pub use bson;
pub use async_trait::async_trait;

/// In-memory storage backend implementations.
pub mod memory {
    pub use softdoc_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use softdoc_mongodb::{DEFAULT_CONNECT_TIMEOUT, MongoDbStore, MongoDbStoreBuilder};
}
