//! Document normalization and typed records.
//!
//! Every selector, update and inserted value passes through [`normalize`] before the rewriter
//! touches it. There is exactly one canonicalization path: the value is serialized to BSON and
//! must come out as a document (or as null, which stands for "match everything"). This keeps raw
//! [`bson::Document`]s, typed structs and [`Expr`](crate::query::Expr) trees on equal footing.

use bson::{Bson, Document, de::deserialize_from_bson, ser::serialize_to_bson};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Name of the identifier field.
pub const ID_FIELD: &str = "_id";

/// Core trait for typed values stored through a soft-delete collection.
///
/// # Example
///
/// ```ignore
/// use softdoc::document::Record;
/// use bson::oid::ObjectId;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct User {
///     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
///     pub id: Option<ObjectId>,
///     pub name: String,
/// }
///
/// impl Record for User {
///     fn collection_name() -> &'static str {
///         "users"
///     }
/// }
/// ```
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Returns the name of the collection this record belongs to.
    fn collection_name() -> &'static str;
}

/// Converts any serializable value into a document mapping.
///
/// A value that serializes to null (`None`, `()`) yields the empty document.
///
/// # Errors
///
/// Returns [`DocumentStoreError::Serialization`] if the value cannot be serialized or does
/// not serialize to a document.
pub fn normalize<T: Serialize + ?Sized>(value: &T) -> DocumentStoreResult<Document> {
    match serialize_to_bson(value)? {
        Bson::Document(document) => Ok(document),
        Bson::Null => Ok(Document::new()),
        other => Err(DocumentStoreError::Serialization(format!(
            "expected a document, got {other}"
        ))),
    }
}

/// Decodes a stored document into a typed value.
///
/// # Errors
///
/// Returns [`DocumentStoreError::Serialization`] if the document does not fit `T`.
pub fn decode<T: DeserializeOwned>(document: Document) -> DocumentStoreResult<T> {
    Ok(deserialize_from_bson(Bson::Document(document))?)
}

/// Returns the document's `_id`, generating and prepending one when it is absent.
pub fn ensure_id(document: &mut Document, generate: impl FnOnce() -> Bson) -> Bson {
    if let Some(id) = document.get(ID_FIELD) {
        return id.clone();
    }

    let id = generate();
    *document = Document::from_iter(
        std::iter::once((ID_FIELD.to_string(), id.clone()))
            .chain(std::mem::take(document)),
    );

    id
}

/// Returns `true` if the document's first key is an update operator such as `$set`.
pub fn is_operator_document(document: &Document) -> bool {
    document.keys().next().is_some_and(|key| key.starts_with('$'))
}
