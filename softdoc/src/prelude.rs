//! Convenient re-exports of commonly used types from softdoc.
//!
//! ```ignore
//! use softdoc::prelude::*;
//! ```

pub use softdoc_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    change::ChangeInfo,
    collection::SoftCollection,
    cursor::Cursor,
    document::{Record, decode, normalize},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, FieldOp, Filter, Query, QueryBuilder, QueryVisitor, Sort, SortDirection},
    softdelete::{DEFAULT_MARKER_FIELD, SoftDelete},
    store::{DynSoftDeleteStore, SoftDeleteStore, SoftDeleteStoreBuilder},
};
