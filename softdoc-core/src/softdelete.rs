//! Deletion marker configuration and the rewriting primitives built on it.
//!
//! [`SoftDelete`] is the only place that knows the marker field. Every predicate and mutation
//! that mentions the marker is built here, so a deployment that renames it (e.g. `delete_at`)
//! changes a single value at construction time.

use bson::{Bson, DateTime, Document, doc};
use chrono::{DateTime as ChronoDateTime, Utc};

/// Marker field used when none is configured.
pub const DEFAULT_MARKER_FIELD: &str = "deletedAt";

/// Soft-delete rules for a store.
///
/// A document without the marker field is live; a document carrying it, whatever the value,
/// is trashed. The marker is only ever set to a timestamp or removed with `$unset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftDelete {
    marker: String,
}

impl Default for SoftDelete {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER_FIELD)
    }
}

impl SoftDelete {
    /// Creates rules using `marker` as the deletion marker field.
    pub fn new(marker: impl Into<String>) -> Self {
        Self { marker: marker.into() }
    }

    /// The configured marker field name.
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// `{marker: {$exists: false}}`
    pub fn exclusion(&self) -> Document {
        doc! { self.marker.as_str(): { "$exists": false } }
    }

    /// `{marker: {$exists: true}}`
    pub fn trash_only(&self) -> Document {
        doc! { self.marker.as_str(): { "$exists": true } }
    }

    /// ANDs the selector with the exclusion clause.
    pub fn compose(&self, selector: Document) -> Document {
        doc! { "$and": [selector, self.exclusion()] }
    }

    /// ANDs the selector with the trash-only clause.
    pub fn compose_trashed(&self, selector: Document) -> Document {
        doc! { "$and": [selector, self.trash_only()] }
    }

    /// `{$set: {marker: now}}`
    pub fn trash_update(&self) -> Document {
        self.trash_update_at(Utc::now())
    }

    /// `{$set: {marker: at}}`
    pub fn trash_update_at(&self, at: ChronoDateTime<Utc>) -> Document {
        doc! { "$set": { self.marker.as_str(): DateTime::from_chrono(at) } }
    }

    /// `{$unset: {marker: ""}}`
    pub fn restore_update(&self) -> Document {
        doc! { "$unset": { self.marker.as_str(): "" } }
    }

    /// Wraps a field mapping in `$set` so it merges instead of replacing.
    pub fn merge_update(update: Document) -> Document {
        doc! { "$set": update }
    }

    /// Returns `true` if the document carries the marker.
    pub fn is_trashed(&self, document: &Document) -> bool {
        document.contains_key(&self.marker)
    }

    /// When the document was trashed, if it carries a timestamp marker.
    pub fn trashed_at(&self, document: &Document) -> Option<ChronoDateTime<Utc>> {
        match document.get(&self.marker) {
            Some(Bson::DateTime(at)) => Some(at.to_chrono()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn composes_with_the_default_marker() {
        let rules = SoftDelete::default();

        assert_eq!(
            rules.compose(doc! { "n": 42 }),
            doc! { "$and": [{ "n": 42 }, { "deletedAt": { "$exists": false } }] }
        );
        assert_eq!(
            rules.compose(doc! {}),
            doc! { "$and": [{}, { "deletedAt": { "$exists": false } }] }
        );
    }

    #[test]
    fn configured_marker_is_used_everywhere() {
        let rules = SoftDelete::new("delete_at");

        assert_eq!(rules.exclusion(), doc! { "delete_at": { "$exists": false } });
        assert_eq!(rules.trash_only(), doc! { "delete_at": { "$exists": true } });
        assert_eq!(rules.restore_update(), doc! { "$unset": { "delete_at": "" } });
        assert!(rules.trash_update().get_document("$set").unwrap().contains_key("delete_at"));
    }

    #[test]
    fn trash_update_stores_a_datetime() {
        let rules = SoftDelete::default();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let update = rules.trash_update_at(at);
        let marked = update.get_document("$set").unwrap().clone();

        assert!(rules.is_trashed(&marked));
        assert_eq!(rules.trashed_at(&marked), Some(at));
        assert_eq!(rules.trashed_at(&doc! { "n": 1 }), None);
    }

    #[test]
    fn merge_wraps_in_set() {
        assert_eq!(
            SoftDelete::merge_update(doc! { "a": 1 }),
            doc! { "$set": { "a": 1 } }
        );
    }
}
