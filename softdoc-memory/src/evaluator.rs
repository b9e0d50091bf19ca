//! Query expression evaluation for in-memory document filtering.
//!
//! Filters arrive as BSON documents, are parsed into an [`Expr`] tree and evaluated against each
//! stored document with the usual document-store semantics: dotted paths reach into embedded
//! documents, an array field matches when any of its elements does, and a missing field only
//! equals `null`.

use std::cmp::Ordering;
use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};

use softdoc_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, FieldOp, QueryVisitor, Sort, SortDirection},
};

/// Type-erased, comparable representation of BSON values.
///
/// Integers compare exactly as i64; mixing with a double falls back to f64, so `Int32(1)`,
/// `Int64(1)` and `Double(1.0)` still compare equal. Embedded documents compare in field order.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Int(i64),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    ObjectId(ObjectId),
    Array(Vec<Comparable<'a>>),
    Map(Vec<(&'a str, Comparable<'a>)>),
    /// Any other BSON type, compared by exact value
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Int(*value as i64),
            Bson::Int64(value) => Comparable::Int(*value),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::Map(
                doc
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<Vec<_>>()
            ),
            other => Comparable::Other(other),
        }
    }
}

impl<'a> Comparable<'a> {
    /// Position of the value's type in the cross-type sort order.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Int(_) | Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::ObjectId(_) => 5,
            Comparable::Bool(_) => 6,
            Comparable::DateTime(_) => 7,
            Comparable::Other(_) => 8,
        }
    }

    /// Total order used for sorting; values of different types are ordered by type.
    pub(crate) fn sort_cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other)
            .unwrap_or_else(|| self.rank().cmp(&other.rank()))
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Int(a), Comparable::Int(b)) => a == b,
            (Comparable::Int(a), Comparable::Number(b)) => (*a as f64) == *b,
            (Comparable::Number(a), Comparable::Int(b)) => *a == (*b as f64),
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Int(a), Comparable::Int(b)) => a.partial_cmp(b),
            (Comparable::Int(a), Comparable::Number(b)) => (*a as f64).partial_cmp(b),
            (Comparable::Number(a), Comparable::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Resolves a possibly dotted field path inside a document.
pub(crate) fn lookup<'d>(document: &'d Document, path: &str) -> Option<&'d Bson> {
    let mut parts = path.split('.');
    let mut current = document.get(parts.next()?)?;

    for part in parts {
        current = match current {
            Bson::Document(inner) => inner.get(part)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Compares documents on the given sort keys, in order.
pub(crate) fn compare_documents(left: &Document, right: &Document, sort: &[Sort]) -> Ordering {
    for key in sort {
        let a = lookup(left, &key.field).map(Comparable::from).unwrap_or(Comparable::Null);
        let b = lookup(right, &key.field).map(Comparable::from).unwrap_or(Comparable::Null);

        let ordering = match key.direction {
            SortDirection::Asc => a.sort_cmp(&b),
            SortDirection::Desc => b.sort_cmp(&a),
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> DocumentStoreResult<bool> {
        self.visit_expr(expr)
    }

    /// Reports whether `document` matches `filter`. Evaluation errors count as no match.
    pub fn matches(document: &Document, filter: &Expr) -> bool {
        DocumentEvaluator::new(document)
            .evaluate(filter)
            .unwrap_or(false)
    }

    fn equals(field_value: Option<&Bson>, value: &Bson) -> bool {
        let expected = Comparable::from(value);

        match field_value {
            None => expected == Comparable::Null,
            Some(actual) => {
                let actual = Comparable::from(actual);
                if actual == expected {
                    return true;
                }
                match actual {
                    Comparable::Array(items) => items.iter().any(|item| item == &expected),
                    _ => false,
                }
            }
        }
    }

    fn compares(field_value: Option<&Bson>, value: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
        let Some(actual) = field_value else {
            return false;
        };
        let expected = Comparable::from(value);

        match Comparable::from(actual) {
            Comparable::Array(items) => items
                .iter()
                .any(|item| item.partial_cmp(&expected).is_some_and(&accept)),
            single => single.partial_cmp(&expected).is_some_and(accept),
        }
    }

    fn any_of(field_value: Option<&Bson>, values: &Bson) -> bool {
        match values {
            Bson::Array(candidates) => candidates
                .iter()
                .any(|candidate| Self::equals(field_value, candidate)),
            single => Self::equals(field_value, single),
        }
    }
}

impl<'a> QueryVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(lookup(self.document, field).is_some() == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let actual = lookup(self.document, field);

        Ok(match op {
            FieldOp::Eq => Self::equals(actual, value),
            FieldOp::Ne => !Self::equals(actual, value),
            FieldOp::Gt => Self::compares(actual, value, |o| o == Ordering::Greater),
            FieldOp::Gte => Self::compares(actual, value, |o| o != Ordering::Less),
            FieldOp::Lt => Self::compares(actual, value, |o| o == Ordering::Less),
            FieldOp::Lte => Self::compares(actual, value, |o| o != Ordering::Greater),
            FieldOp::AnyOf => Self::any_of(actual, value),
            FieldOp::NoneOf => !Self::any_of(actual, value),
        })
    }
}
