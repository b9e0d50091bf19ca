//! Error types and result types for soft-delete store operations.
//!
//! Every operation in this crate returns [`DocumentStoreResult<T>`]. Errors coming from the
//! backend are passed through unchanged so callers can always tell a [`NotFound`] (nothing live
//! matched a single-document operation) apart from a genuine failure.
//!
//! [`NotFound`]: DocumentStoreError::NotFound

use bson::error::Error as BsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with a soft-delete store.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// No document matched a single-document operation.
    /// The argument is the collection name.
    #[error("Document not found in collection {0}")]
    NotFound(String),
    /// The backend rejected a write (duplicate key, validation failure, ...).
    #[error("Write error (code {code:?}): {message}")]
    Write {
        /// Server-side error code, when the backend reports one.
        code: Option<i32>,
        /// Human readable description.
        message: String,
    },
    /// A caller-supplied value could not be normalized into a document mapping.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// The document or selector is structurally invalid (e.g. an unsupported operator).
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl DocumentStoreError {
    /// Returns `true` if this is a [`DocumentStoreError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, DocumentStoreError::NotFound(_))
    }

    /// Builds a duplicate key write error, mirroring the server's code 11000.
    pub fn duplicate_key(id: impl std::fmt::Display, collection: &str) -> Self {
        DocumentStoreError::Write {
            code: Some(DUPLICATE_KEY_CODE),
            message: format!("duplicate key {id} in collection {collection}"),
        }
    }
}

/// Server error code reported for unique index violations.
pub const DUPLICATE_KEY_CODE: i32 = 11000;

/// A specialized `Result` type for soft-delete store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<std::convert::Infallible> for DocumentStoreError {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}
