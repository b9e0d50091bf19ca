//! MongoDB backend implementation for softdoc.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait. Selectors and
//! updates composed by the soft-delete layer are handed to the server unchanged, so filtering,
//! sorting and upserts follow MongoDB's own semantics.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! softdoc = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Connection
//!
//! The builder takes a connection string and a database name. The connect timeout defaults to
//! 60 seconds.
//!
//! # Example
//!
//! ```ignore
//! use softdoc::{SoftDeleteStore, backend::StoreBackendBuilder, mongodb::MongoDbStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = MongoDbStore::builder("mongodb://localhost:27017", "my_database")
//!         .build()
//!         .await?;
//!     let store = SoftDeleteStore::new(backend);
//!
//!     store.close().await?;
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as softdoc_mongodb;

pub mod store;

pub use store::{DEFAULT_CONNECT_TIMEOUT, MongoDbStore, MongoDbStoreBuilder};
