//! Update document application for the in-memory backend.
//!
//! Supports operator updates (`$set`, `$unset`, `$inc`, `$setOnInsert`) and full replacements.
//! Updates are applied to a copy so a failing update never leaves a document half modified.

use bson::{Bson, Document};

use softdoc_core::{
    document::{ID_FIELD, is_operator_document},
    error::{DocumentStoreError, DocumentStoreResult},
};

/// Error code reported when an update would change `_id`.
const IMMUTABLE_FIELD_CODE: i32 = 66;
/// Error code reported when `$inc` meets a non-numeric value.
const TYPE_MISMATCH_CODE: i32 = 14;

/// Returns `document` with `update` applied.
///
/// `$setOnInsert` only takes effect when `inserting` is true.
pub(crate) fn apply(document: &Document, update: &Document, inserting: bool) -> DocumentStoreResult<Document> {
    let updated = if is_operator_document(update) {
        let mut updated = document.clone();
        apply_operators(&mut updated, update, inserting)?;
        updated
    } else {
        replace(document, update)
    };

    if !inserting && updated.get(ID_FIELD) != document.get(ID_FIELD) {
        return Err(DocumentStoreError::Write {
            code: Some(IMMUTABLE_FIELD_CODE),
            message: format!("performing an update would modify the immutable field {ID_FIELD}"),
        });
    }

    Ok(updated)
}

/// Builds the document inserted by an upsert that matched nothing.
///
/// Equality clauses of the selector, including those nested in `$and`, seed the document and the
/// update is applied on top. A replacement update only inherits the selector's `_id`.
pub(crate) fn upsert_seed(selector: &Document, update: &Document) -> DocumentStoreResult<Document> {
    let mut seed = Document::new();
    collect_equalities(selector, &mut seed);

    if is_operator_document(update) {
        return apply(&seed, update, true);
    }

    let mut replacement = Document::new();
    if let Some(id) = update.get(ID_FIELD).or_else(|| seed.get(ID_FIELD)) {
        replacement.insert(ID_FIELD, id.clone());
    }
    for (key, value) in update {
        if key != ID_FIELD {
            replacement.insert(key.clone(), value.clone());
        }
    }

    Ok(replacement)
}

fn collect_equalities(selector: &Document, seed: &mut Document) {
    for (key, value) in selector {
        match (key.as_str(), value) {
            ("$and", Bson::Array(clauses)) => {
                for clause in clauses {
                    if let Bson::Document(clause) = clause {
                        collect_equalities(clause, seed);
                    }
                }
            }
            (operator, _) if operator.starts_with('$') => {}
            (field, Bson::Document(ops)) if is_operator_document(ops) => {
                if let Some(value) = ops.get("$eq") {
                    set_path(seed, field, value.clone());
                }
            }
            (field, value) => set_path(seed, field, value.clone()),
        }
    }
}

fn replace(document: &Document, replacement: &Document) -> Document {
    let mut updated = Document::new();

    if let Some(id) = document.get(ID_FIELD) {
        updated.insert(ID_FIELD, id.clone());
    }
    for (key, value) in replacement {
        updated.insert(key.clone(), value.clone());
    }

    updated
}

fn apply_operators(document: &mut Document, update: &Document, inserting: bool) -> DocumentStoreResult<()> {
    for (operator, fields) in update {
        let fields = match fields {
            Bson::Document(fields) => fields,
            other => {
                return Err(DocumentStoreError::InvalidDocument(format!(
                    "{operator} expects a document, got {other}"
                )));
            }
        };

        match operator.as_str() {
            "$set" => {
                for (path, value) in fields {
                    set_path(document, path, value.clone());
                }
            }
            "$setOnInsert" => {
                if inserting {
                    for (path, value) in fields {
                        set_path(document, path, value.clone());
                    }
                }
            }
            "$unset" => {
                for path in fields.keys() {
                    unset_path(document, path);
                }
            }
            "$inc" => {
                for (path, amount) in fields {
                    increment(document, path, amount)?;
                }
            }
            other if other.starts_with('$') => {
                return Err(DocumentStoreError::InvalidDocument(format!(
                    "unsupported update operator {other}"
                )));
            }
            field => {
                return Err(DocumentStoreError::InvalidDocument(format!(
                    "update mixes operators with the plain field {field}"
                )));
            }
        }
    }

    Ok(())
}

fn set_path(document: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
        }
        Some((head, rest)) => {
            if !matches!(document.get(head), Some(Bson::Document(_))) {
                document.insert(head, Document::new());
            }
            if let Some(Bson::Document(inner)) = document.get_mut(head) {
                set_path(inner, rest, value);
            }
        }
    }
}

fn unset_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(inner)) = document.get_mut(head) {
                unset_path(inner, rest);
            }
        }
    }
}

fn get_path<'d>(document: &'d Document, path: &str) -> Option<&'d Bson> {
    match path.split_once('.') {
        None => document.get(path),
        Some((head, rest)) => match document.get(head)? {
            Bson::Document(inner) => get_path(inner, rest),
            _ => None,
        },
    }
}

fn increment(document: &mut Document, path: &str, amount: &Bson) -> DocumentStoreResult<()> {
    let mismatch = |what: &Bson| DocumentStoreError::Write {
        code: Some(TYPE_MISMATCH_CODE),
        message: format!("cannot apply $inc to {path} with value {what}"),
    };

    let value = match (get_path(document, path), amount) {
        (None, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_)) => amount.clone(),
        (Some(Bson::Int32(a)), Bson::Int32(b)) => match a.checked_add(*b) {
            Some(sum) => Bson::Int32(sum),
            None => Bson::Int64(*a as i64 + *b as i64),
        },
        (Some(Bson::Int32(a)), Bson::Int64(b)) => Bson::Int64(*a as i64 + b),
        (Some(Bson::Int64(a)), Bson::Int32(b)) => Bson::Int64(a + *b as i64),
        (Some(Bson::Int64(a)), Bson::Int64(b)) => Bson::Int64(a + b),
        (Some(Bson::Double(a)), Bson::Int32(b)) => Bson::Double(a + *b as f64),
        (Some(Bson::Double(a)), Bson::Int64(b)) => Bson::Double(a + *b as f64),
        (Some(Bson::Double(a)), Bson::Double(b)) => Bson::Double(a + b),
        (Some(Bson::Int32(a)), Bson::Double(b)) => Bson::Double(*a as f64 + b),
        (Some(Bson::Int64(a)), Bson::Double(b)) => Bson::Double(*a as f64 + b),
        (Some(current), Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_)) => return Err(mismatch(current)),
        (_, other) => return Err(mismatch(other)),
    };

    set_path(document, path, value);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_set_and_unset() {
        let document = doc! { "_id": 1, "name": "Alice", "deletedAt": "x" };

        let updated = apply(&document, &doc! { "$set": { "age": 30, "address.city": "Lima" } }, false).unwrap();
        assert_eq!(updated, doc! { "_id": 1, "name": "Alice", "deletedAt": "x", "age": 30, "address": { "city": "Lima" } });

        let restored = apply(&updated, &doc! { "$unset": { "deletedAt": "" } }, false).unwrap();
        assert!(!restored.contains_key("deletedAt"));
    }

    #[test]
    fn test_replacement_keeps_id() {
        let document = doc! { "_id": 1, "name": "Alice", "age": 30 };
        let updated = apply(&document, &doc! { "name": "Bob" }, false).unwrap();

        assert_eq!(updated, doc! { "_id": 1, "name": "Bob" });
    }

    #[test]
    fn test_changing_id_is_rejected() {
        let document = doc! { "_id": 1 };
        let err = apply(&document, &doc! { "$set": { "_id": 2 } }, false).unwrap_err();

        assert!(matches!(err, DocumentStoreError::Write { code: Some(IMMUTABLE_FIELD_CODE), .. }));
    }

    #[test]
    fn test_increment() {
        let document = doc! { "_id": 1, "n": 1 };
        let updated = apply(&document, &doc! { "$inc": { "n": 2, "m": 1.5 } }, false).unwrap();

        assert_eq!(updated.get_i32("n").unwrap(), 3);
        assert_eq!(updated.get_f64("m").unwrap(), 1.5);

        let err = apply(&doc! { "_id": 1, "n": "x" }, &doc! { "$inc": { "n": 1 } }, false).unwrap_err();
        assert!(matches!(err, DocumentStoreError::Write { code: Some(TYPE_MISMATCH_CODE), .. }));
    }

    #[test]
    fn test_mixed_update_is_invalid() {
        let err = apply(&doc! { "_id": 1 }, &doc! { "$set": { "a": 1 }, "b": 2 }, false).unwrap_err();

        assert!(matches!(err, DocumentStoreError::InvalidDocument(_)));
    }

    #[test]
    fn test_set_on_insert_only_when_inserting() {
        let update = doc! { "$set": { "a": 1 }, "$setOnInsert": { "created": true } };

        assert!(!apply(&doc! { "_id": 1 }, &update, false).unwrap().contains_key("created"));
        assert!(apply(&doc! {}, &update, true).unwrap().contains_key("created"));
    }

    #[test]
    fn test_upsert_seed_from_composed_selector() {
        let selector = doc! { "$and": [{ "n": 7, "kind": { "$eq": "a" } }, { "deletedAt": { "$exists": false } }] };
        let seeded = upsert_seed(&selector, &doc! { "$set": { "x": 1 } }).unwrap();

        assert_eq!(seeded, doc! { "n": 7, "kind": "a", "x": 1 });
    }

    #[test]
    fn test_upsert_seed_replacement_takes_selector_id() {
        let selector = doc! { "$and": [{ "_id": 5 }, { "deletedAt": { "$exists": false } }] };
        let seeded = upsert_seed(&selector, &doc! { "name": "Bob" }).unwrap();

        assert_eq!(seeded, doc! { "_id": 5, "name": "Bob" });
    }
}
