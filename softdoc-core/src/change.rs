//! Write operation reports.

use bson::Bson;

/// The effect of a write operation.
///
/// Produced fresh by every write call and handed back to the caller unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeInfo {
    /// Number of documents matched by the selector.
    pub matched: u64,
    /// Number of documents actually modified.
    pub updated: u64,
    /// Number of documents physically deleted.
    pub removed: u64,
    /// Identifier of the document inserted by an upsert.
    pub upserted_id: Option<Bson>,
}

impl ChangeInfo {
    pub fn updated(matched: u64, updated: u64) -> Self {
        Self { matched, updated, ..Default::default() }
    }

    pub fn removed(removed: u64) -> Self {
        Self { matched: removed, removed, ..Default::default() }
    }

    pub fn upserted(id: Bson) -> Self {
        Self { upserted_id: Some(id), ..Default::default() }
    }
}
