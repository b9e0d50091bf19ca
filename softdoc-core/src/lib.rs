//! Soft-delete query rewriting over document database clients.
//!
//! Applications keep calling familiar `find` / `update` / `remove` operations, but deleted
//! documents are never physically removed. Instead they carry a timestamp in a marker field
//! (`deletedAt` by default), and every read and write issued through this layer silently ignores
//! documents that carry it.
//!
//! This crate provides:
//!
//! - **Rewriting rules** ([`softdelete`]) - The marker field and the selectors/updates built on it
//! - **Collection handles** ([`collection`]) - Every operation with soft-delete semantics applied
//! - **Lazy queries** ([`cursor`]) - Sort, skip, limit and materialize composed queries
//! - **Store** ([`store`]) - A backend paired with its soft-delete configuration
//! - **Backend abstraction** ([`backend`]) - What a document database client must provide
//! - **Query and filtering API** ([`query`]) - Filter helpers and the expression tree
//! - **Documents** ([`document`]) - Normalization of caller input into BSON documents
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use softdoc_core::{store::SoftDeleteStore, query::Filter};
//! use bson::doc;
//!
//! let store = SoftDeleteStore::new(backend);
//! let items = store.collection("items");
//!
//! items.insert(&doc! { "n": 42 }).await?;
//! items.remove(&Filter::eq("n", 42)).await?;
//!
//! assert_eq!(items.count().await?, 0);
//! assert_eq!(items.count_with_trash().await?, 1);
//! ```

#[allow(unused_extern_crates)]
extern crate self as softdoc_core;

pub mod backend;
pub mod change;
pub mod collection;
pub mod cursor;
pub mod document;
pub mod error;
pub mod query;
pub mod softdelete;
pub mod store;
