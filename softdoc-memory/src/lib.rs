//! In-memory document storage backend for softdoc.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is meant for development and
//! testing.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Query evaluation** - `$and`, `$or`, `$nor`, `$exists`, comparisons, `$in` and `$nin`
//! - **Update operators** - `$set`, `$unset`, `$inc`, `$setOnInsert` and full replacements
//! - **Native upserts** - New documents are seeded from the selector's equality clauses
//!
//! # Quick Start
//!
//! ```ignore
//! use softdoc::{SoftDeleteStore, memory::InMemoryStore};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = SoftDeleteStore::new(InMemoryStore::new());
//!     let users = store.collection("users");
//!
//!     let id = users.insert(&doc! { "name": "Alice" }).await?;
//!     users.remove_by_id(id).await?;
//!
//!     assert_eq!(users.count().await?, 0);
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as softdoc_memory;

pub mod store;
mod evaluator;
mod update;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
