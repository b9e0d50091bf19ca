//! Selector construction, parsing and rendering.
//!
//! Selectors reach the rewriter either as raw [`bson::Document`]s using the usual operator
//! vocabulary (`$and`, `$gt`, `$exists`, ...) or as typed [`Expr`] trees built with [`Filter`].
//! Both forms are interchangeable: an [`Expr`] serializes to its canonical document, and
//! [`Expr::from_document`] parses a document back into an expression tree that backends can
//! walk with a [`QueryVisitor`].
//!
//! # Filter Expression API
//!
//! ```ignore
//! use softdoc::query::Filter;
//!
//! let expr = Filter::eq("status", "active")
//!     .and(Filter::gt("age", 18));
//!
//! let query = Query::builder()
//!     .filter(expr.to_document())
//!     .sort("created_at", SortDirection::Desc)
//!     .limit(10)
//!     .build();
//! ```
//!
//! Supported operators:
//!
//! - Comparison: `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`
//! - Membership: `$in`, `$nin`
//! - Existence: `$exists`
//! - Logical: `$and`, `$or`, `$nor`, field-level `$not`

use bson::{Bson, Document, doc};
use serde::{Serialize, Serializer};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

impl SortDirection {
    /// The numeric form used in sort documents.
    pub fn as_i32(&self) -> i32 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

/// Sort specification for query results.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    /// The field name to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    /// Equal to (exact match).
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// Field equals any of the values.
    AnyOf,
    /// Field equals none of the values.
    NoneOf,
}

impl FieldOp {
    /// The operator key used in selector documents.
    pub fn operator(&self) -> &'static str {
        match self {
            FieldOp::Eq => "$eq",
            FieldOp::Ne => "$ne",
            FieldOp::Gt => "$gt",
            FieldOp::Gte => "$gte",
            FieldOp::Lt => "$lt",
            FieldOp::Lte => "$lte",
            FieldOp::AnyOf => "$in",
            FieldOp::NoneOf => "$nin",
        }
    }

    /// Looks up a field operator by its document key.
    pub fn from_operator(operator: &str) -> Option<FieldOp> {
        Some(match operator {
            "$eq" => FieldOp::Eq,
            "$ne" => FieldOp::Ne,
            "$gt" => FieldOp::Gt,
            "$gte" => FieldOp::Gte,
            "$lt" => FieldOp::Lt,
            "$lte" => FieldOp::Lte,
            "$in" => FieldOp::AnyOf,
            "$nin" => FieldOp::NoneOf,
            _ => return None,
        })
    }
}

/// A filter expression for matching documents.
///
/// Expressions can be combined using logical operators (`And`, `Or`, `Not`)
/// to build complex filter predicates. An empty `And` matches every document.
///
/// # Example
///
/// ```ignore
/// use softdoc::query::{Expr, Filter};
///
/// let expr = Filter::and(vec![
///     Filter::eq("status", "active"),
///     Filter::gt("age", 18),
/// ]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Logical AND of multiple expressions (all must match).
    And(Vec<Expr>),
    /// Logical OR of multiple expressions (any must match).
    Or(Vec<Expr>),
    /// Logical NOT of an expression (inverts the result).
    Not(Box<Expr>),
    /// Checks if a field exists or doesn't exist.
    Exists(String, bool),
    /// Field comparison expression.
    Field {
        /// The field name to compare. Dotted paths address nested documents.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        value: Bson,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended
    /// to the list. Otherwise, a new AND expression is created.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    ///
    /// If this expression is already an OR, the other expression is appended
    /// to the list. Otherwise, a new OR expression is created.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    /// Negates this expression (logical NOT).
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// Renders this expression as a selector document.
    pub fn to_document(&self) -> Document {
        match DocumentRenderer.visit_expr(self) {
            Ok(document) => document,
            Err(never) => match never {},
        }
    }

    /// Parses a selector document into an expression tree.
    ///
    /// Multiple top-level keys are combined with an implicit AND, a plain value is an
    /// equality test and an empty document matches everything.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidDocument`] on unsupported operators or malformed
    /// operands (e.g. `$in` without an array).
    pub fn from_document(document: &Document) -> DocumentStoreResult<Expr> {
        let mut clauses = Vec::with_capacity(document.len());

        for (key, value) in document {
            clauses.push(match key.as_str() {
                "$and" => Expr::And(Self::parse_list(key, value)?),
                "$or" => Expr::Or(Self::parse_list(key, value)?),
                "$nor" => {
                    let mut list = Self::parse_list(key, value)?;
                    if list.len() == 1 {
                        list.remove(0).not()
                    } else {
                        Expr::Or(list).not()
                    }
                }
                op if op.starts_with('$') => {
                    return Err(DocumentStoreError::InvalidDocument(format!(
                        "unsupported query operator {op}"
                    )));
                }
                field => Self::parse_field(field, value)?,
            });
        }

        Ok(Self::collapse(clauses))
    }

    fn collapse(mut clauses: Vec<Expr>) -> Expr {
        if clauses.len() == 1 {
            clauses.remove(0)
        } else {
            Expr::And(clauses)
        }
    }

    fn parse_list(operator: &str, value: &Bson) -> DocumentStoreResult<Vec<Expr>> {
        match value {
            Bson::Array(items) => items
                .iter()
                .map(|item| match item {
                    Bson::Document(document) => Expr::from_document(document),
                    other => Err(DocumentStoreError::InvalidDocument(format!(
                        "{operator} expects documents, got {other}"
                    ))),
                })
                .collect(),
            other => Err(DocumentStoreError::InvalidDocument(format!(
                "{operator} expects an array, got {other}"
            ))),
        }
    }

    fn parse_field(field: &str, value: &Bson) -> DocumentStoreResult<Expr> {
        let operators = match value {
            Bson::Document(ops) if ops.keys().next().is_some_and(|k| k.starts_with('$')) => ops,
            _ => return Ok(Expr::field(field.to_string(), FieldOp::Eq, value.clone())),
        };

        let mut clauses = Vec::with_capacity(operators.len());

        for (operator, operand) in operators {
            clauses.push(match operator.as_str() {
                "$exists" => Expr::Exists(field.to_string(), is_truthy(operand)),
                "$not" => Self::parse_field(field, operand)?.not(),
                "$in" | "$nin" if !matches!(operand, Bson::Array(_)) => {
                    return Err(DocumentStoreError::InvalidDocument(format!(
                        "{operator} on {field} expects an array"
                    )));
                }
                other => match FieldOp::from_operator(other) {
                    Some(op) => Expr::field(field.to_string(), op, operand.clone()),
                    None => {
                        return Err(DocumentStoreError::InvalidDocument(format!(
                            "unsupported operator {other} on {field}"
                        )));
                    }
                },
            });
        }

        Ok(Self::collapse(clauses))
    }
}

fn is_truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

impl Serialize for Expr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_document().serialize(serializer)
    }
}

impl From<Expr> for Document {
    fn from(expr: Expr) -> Self {
        expr.to_document()
    }
}

/// A find request handed to a backend: the effective filter plus cursor modifiers.
///
/// Use [`QueryBuilder`] for ergonomic construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Filter document to match documents.
    pub filter: Document,
    /// Sort keys, applied in order.
    pub sort: Vec<Sort>,
    /// Number of documents to skip.
    pub offset: Option<u64>,
    /// Maximum number of documents to return.
    pub limit: Option<u64>,
}

impl Query {
    /// Creates a query with the given filter and no modifiers.
    pub fn new(filter: Document) -> Self {
        Query { filter, ..Default::default() }
    }

    /// Creates a new query builder for fluent construction.
    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }

    /// The sort keys as a sort document, if any were given.
    pub fn sort_document(&self) -> Option<Document> {
        if self.sort.is_empty() {
            return None;
        }

        Some(
            self.sort
                .iter()
                .map(|s| (s.field.clone(), Bson::Int32(s.direction.as_i32())))
                .collect(),
        )
    }
}

/// Helper struct for constructing filter expressions.
///
/// All methods accept field names and values as `Into<String>` and `Into<Bson>` for ergonomics.
pub struct Filter;

impl Filter {
    /// Matches documents whose `_id` equals `id`.
    pub fn id(id: impl Into<Bson>) -> Expr {
        Filter::eq("_id", id)
    }

    /// Matches documents where the field equals the specified value.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    /// Matches documents where the field does not equal the specified value.
    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    /// Matches documents where the field is greater than the specified value.
    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    /// Matches documents where the field is greater than or equal to the specified value.
    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    /// Matches documents where the field is less than the specified value.
    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    /// Matches documents where the field is less than or equal to the specified value.
    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    /// Matches documents where the field is present.
    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    /// Matches documents where the field is absent.
    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    /// Combines multiple expressions such that all must match.
    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    /// Combines multiple expressions such that any can match.
    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }

    /// Matches documents where the field equals any of the values.
    pub fn any_of<V: Into<Bson>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Expr {
        Expr::field(
            field.into(),
            FieldOp::AnyOf,
            Bson::Array(values.into_iter().map(Into::into).collect()),
        )
    }

    /// Matches documents where the field equals none of the values.
    pub fn none_of<V: Into<Bson>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Expr {
        Expr::field(
            field.into(),
            FieldOp::NoneOf,
            Bson::Array(values.into_iter().map(Into::into).collect()),
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    /// Creates a new query builder.
    pub fn new() -> Self {
        QueryBuilder { query: Query::default() }
    }

    /// Sets the filter document for this query.
    pub fn filter(mut self, filter: impl Into<Document>) -> Self {
        self.query.filter = filter.into();
        self
    }

    /// Sets the maximum number of documents to return.
    pub fn limit(mut self, limit: u64) -> Self {
        self.query.limit = Some(limit);
        self
    }

    /// Sets the number of documents to skip.
    pub fn offset(mut self, offset: u64) -> Self {
        self.query.offset = Some(offset);
        self
    }

    /// Appends a sort key. Earlier keys take precedence.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query.sort.push(Sort { field: field.into(), direction });
        self
    }

    /// Builds and returns the final query.
    pub fn build(self) -> Query {
        self.query
    }
}

pub trait QueryVisitor {
    type Output;
    type Error: Into<DocumentStoreError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}

/// Renders expressions into the canonical selector document form.
struct DocumentRenderer;

impl DocumentRenderer {
    fn render_all(&mut self, exprs: &[Expr]) -> Vec<Document> {
        exprs.iter().map(|expr| expr.to_document()).collect()
    }
}

impl QueryVisitor for DocumentRenderer {
    type Output = Document;
    type Error = std::convert::Infallible;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        if exprs.is_empty() {
            return Ok(Document::new());
        }

        Ok(doc! { "$and": self.render_all(exprs) })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        // An empty OR matches nothing: NOR of match-all.
        if exprs.is_empty() {
            return Ok(doc! { "$nor": [{}] });
        }

        Ok(doc! { "$or": self.render_all(exprs) })
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(doc! { "$nor": [self.visit_expr(expr)?] })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(doc! { field: { "$exists": should_exist } })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        Ok(doc! { field: { op.operator(): value.clone() } })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_composed_expression() {
        let expr = Filter::gt("n", 42).and(Filter::not_exists("deletedAt"));

        assert_eq!(
            expr.to_document(),
            doc! { "$and": [{ "n": { "$gt": 42 } }, { "deletedAt": { "$exists": false } }] }
        );
    }

    #[test]
    fn renders_not_as_nor() {
        assert_eq!(
            Filter::eq("k", 1).not().to_document(),
            doc! { "$nor": [{ "k": { "$eq": 1 } }] }
        );
        assert_eq!(Filter::and(vec![]).to_document(), doc! {});
    }

    #[test]
    fn parses_implicit_equality_and_implicit_and() {
        let expr = Expr::from_document(&doc! { "a": 1, "b": "x" }).unwrap();

        assert_eq!(expr, Filter::and(vec![Filter::eq("a", 1), Filter::eq("b", "x")]));
    }

    #[test]
    fn parses_operator_documents() {
        let expr = Expr::from_document(&doc! {
            "n": { "$gte": 1, "$lt": 5 },
            "deletedAt": { "$exists": false },
            "$or": [{ "k": { "$in": [1, 2] } }, { "k": { "$not": { "$eq": 3 } } }],
        })
        .unwrap();

        assert_eq!(
            expr,
            Filter::and(vec![
                Filter::and(vec![Filter::gte("n", 1), Filter::lt("n", 5)]),
                Filter::not_exists("deletedAt"),
                Filter::or(vec![Filter::any_of("k", [1, 2]), Filter::eq("k", 3).not()]),
            ])
        );
    }

    #[test]
    fn parses_plain_subdocument_as_equality() {
        let expr = Expr::from_document(&doc! { "meta": { "a": 1 } }).unwrap();

        assert_eq!(expr, Filter::eq("meta", doc! { "a": 1 }));
    }

    #[test]
    fn rendered_expressions_parse_back() {
        let expr = Filter::or(vec![
            Filter::eq("a", 1),
            Filter::none_of("b", ["x", "y"]).not(),
            Filter::exists("c"),
        ]);

        assert_eq!(Expr::from_document(&expr.to_document()).unwrap(), expr);
    }

    #[test]
    fn rejects_unknown_operators() {
        assert!(matches!(
            Expr::from_document(&doc! { "$where": "1" }),
            Err(DocumentStoreError::InvalidDocument(_))
        ));
        assert!(matches!(
            Expr::from_document(&doc! { "n": { "$regex": "^a" } }),
            Err(DocumentStoreError::InvalidDocument(_))
        ));
        assert!(matches!(
            Expr::from_document(&doc! { "n": { "$in": 3 } }),
            Err(DocumentStoreError::InvalidDocument(_))
        ));
    }

    #[test]
    fn builds_sort_document() {
        let query = Query::builder()
            .sort("a", SortDirection::Asc)
            .sort("b", SortDirection::Desc)
            .limit(2)
            .build();

        assert_eq!(query.sort_document(), Some(doc! { "a": 1, "b": -1 }));
        assert_eq!(Query::default().sort_document(), None);
    }
}
