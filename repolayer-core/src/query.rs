//! Predicate trees, sort specifications and store queries.
//!
//! A [`Predicate`] is a binary tree whose leaves are field comparisons, membership tests or a
//! full-text search, and whose internal nodes join two subtrees with a [`Connector`]. Trees are
//! built left to right and are never rebalanced or simplified. Callers can construct and combine
//! predicates but not take them apart again; backends translate them through a
//! [`PredicateVisitor`].
//!
//! # Example
//!
//! ```ignore
//! use repolayer::query::{Predicate, Query, SortDirection};
//!
//! let predicate = Predicate::eq("status", "active")
//!     .and(Predicate::gt("age", 18))
//!     .or(Predicate::text("premium"));
//!
//! let query = Query::builder()
//!     .filter(predicate)
//!     .sort("name", SortDirection::Asc)
//!     .limit(10)
//!     .build();
//! ```

use bson::Bson;
use std::fmt;

use crate::{entity::ID_FIELD, error::DocumentStoreError};

/// Logical field name that addresses the document key.
pub const LOGICAL_ID_FIELD: &str = "Id";

/// Maps a logical field name onto the stored document key.
///
/// `Id` addresses [`ID_FIELD`]; every other name is used as is.
pub fn document_field(field: &str) -> &str {
    if field == LOGICAL_ID_FIELD { ID_FIELD } else { field }
}

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

/// Sort specification for query results: one field and a direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    /// The field name to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

impl Sort {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Sort { field: field.into(), direction }
    }
}

/// Boolean operator joining two predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    And,
    Or,
}

impl Connector {
    /// Returns the connector written as `symbol` in a filter expression (`&` or `|`).
    pub fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            '&' => Some(Connector::And),
            '|' => Some(Connector::Or),
            _ => None,
        }
    }
}

impl fmt::Display for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connector::And => write!(f, "AND"),
            Connector::Or => write!(f, "OR"),
        }
    }
}

/// Field comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// Equal to (exact match).
    Eq,
    /// Not equal to.
    NotEq,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// Field value is one of the listed values.
    In,
    /// Field value is none of the listed values.
    NotIn,
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Comparison::Eq => "eq",
            Comparison::NotEq => "noteq",
            Comparison::Gt => "gt",
            Comparison::Gte => "gteq",
            Comparison::Lt => "lt",
            Comparison::Lte => "lteq",
            Comparison::In => "in",
            Comparison::NotIn => "notin",
        };

        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Comparison {
        field: String,
        op: Comparison,
        value: Bson,
    },
    Text(String),
    Combine {
        connector: Connector,
        left: Box<Predicate>,
        right: Box<Predicate>,
    },
}

/// A node in a predicate tree.
///
/// Leaves compare one field (or run a text search); internal nodes join two subtrees with a
/// [`Connector`]. Use [`Predicate::and`] / [`Predicate::or`] to grow a tree: the existing tree
/// becomes the left child and the new predicate the right child.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    node: Node,
}

impl Predicate {
    /// Creates a comparison leaf.
    pub fn compare(field: impl Into<String>, op: Comparison, value: impl Into<Bson>) -> Self {
        Predicate {
            node: Node::Comparison {
                field: field.into(),
                op,
                value: value.into(),
            },
        }
    }

    /// Matches documents where the field equals the value. `Bson::Null` matches null or missing.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::compare(field, Comparison::Eq, value)
    }

    /// Matches documents where the field does not equal the value.
    pub fn not_eq(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::compare(field, Comparison::NotEq, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::compare(field, Comparison::Gt, value)
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::compare(field, Comparison::Gte, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::compare(field, Comparison::Lt, value)
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::compare(field, Comparison::Lte, value)
    }

    /// Matches documents where the field holds one of `values`.
    pub fn one_of<V: Into<Bson>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self::compare(field, Comparison::In, collect_array(values))
    }

    /// Matches documents where the field holds none of `values`.
    pub fn none_of<V: Into<Bson>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self::compare(field, Comparison::NotIn, collect_array(values))
    }

    /// Full-text search over the collection's text index.
    pub fn text(search: impl Into<String>) -> Self {
        Predicate { node: Node::Text(search.into()) }
    }

    /// Joins this tree with `other`; this tree becomes the left child.
    pub fn combine(self, connector: Connector, other: Predicate) -> Self {
        Predicate {
            node: Node::Combine {
                connector,
                left: Box::new(self),
                right: Box::new(other),
            },
        }
    }

    pub fn and(self, other: Predicate) -> Self {
        self.combine(Connector::And, other)
    }

    pub fn or(self, other: Predicate) -> Self {
        self.combine(Connector::Or, other)
    }
}

fn collect_array<V: Into<Bson>>(values: impl IntoIterator<Item = V>) -> Bson {
    Bson::Array(
        values
            .into_iter()
            .map(Into::into)
            .collect(),
    )
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.node {
            Node::Comparison { field, op, value } => write!(f, "{field} {op} {value}"),
            Node::Text(search) => write!(f, "text \"{search}\""),
            Node::Combine { connector, left, right } => write!(f, "({left}) {connector} ({right})"),
        }
    }
}

/// Translates a [`Predicate`] tree into a backend-specific form.
///
/// Implementors handle the three node kinds; [`PredicateVisitor::visit_predicate`] dispatches
/// and is what callers invoke on the root.
pub trait PredicateVisitor {
    type Output;
    type Error: Into<DocumentStoreError>;

    fn visit_combine(
        &mut self,
        connector: Connector,
        left: &Predicate,
        right: &Predicate,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_comparison(
        &mut self,
        field: &str,
        op: Comparison,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_text(&mut self, search: &str) -> Result<Self::Output, Self::Error>;

    fn visit_predicate(&mut self, predicate: &Predicate) -> Result<Self::Output, Self::Error> {
        match &predicate.node {
            Node::Comparison { field, op, value } => self.visit_comparison(field, *op, value),
            Node::Text(search) => self.visit_text(search),
            Node::Combine { connector, left, right } => self.visit_combine(*connector, left, right),
        }
    }
}

/// Include (`true`) or exclude (`false`) one field from query results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSelection {
    pub field: String,
    pub include: bool,
}

/// A structured query handed to a store backend.
///
/// Use [`QueryBuilder`] for ergonomic construction.
#[derive(Debug, Clone, Default)]
pub struct Query {
    /// Optional predicate; `None` matches every document.
    pub filter: Option<Predicate>,
    /// Maximum number of documents to return.
    pub limit: Option<u64>,
    /// Number of documents to skip (for pagination).
    pub offset: Option<u64>,
    /// Sort specification for results.
    pub sort: Option<Sort>,
    /// Field selection; empty returns whole documents.
    pub projection: Vec<FieldSelection>,
}

impl Query {
    /// Creates a new empty query matching every document.
    pub fn new() -> Self {
        Query::default()
    }

    /// Creates a new query builder for fluent construction.
    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
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

    /// Sets the predicate for this query.
    pub fn filter(mut self, filter: Predicate) -> Self {
        self.query.filter = Some(filter);
        self
    }

    /// Sets the predicate if one is given, leaving the query unfiltered otherwise.
    pub fn maybe_filter(mut self, filter: Option<Predicate>) -> Self {
        self.query.filter = filter;
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

    /// Sets the sort specification for the query results.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query.sort = Some(Sort::new(field, direction));
        self
    }

    /// Sets the sort specification if one is given.
    pub fn maybe_sort(mut self, sort: Option<Sort>) -> Self {
        self.query.sort = sort;
        self
    }

    /// Adds a projected field.
    pub fn select(mut self, field: impl Into<String>, include: bool) -> Self {
        self.query.projection.push(FieldSelection { field: field.into(), include });
        self
    }

    /// Builds and returns the final query.
    pub fn build(self) -> Query {
        self.query
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Renders the shape of a tree: connectors, operators and field names.
    pub(crate) struct Shape;

    impl PredicateVisitor for Shape {
        type Output = String;
        type Error = DocumentStoreError;

        fn visit_combine(
            &mut self,
            connector: Connector,
            left: &Predicate,
            right: &Predicate,
        ) -> Result<String, DocumentStoreError> {
            let name = match connector {
                Connector::And => "and",
                Connector::Or => "or",
            };

            Ok(format!("{name}({},{})", self.visit_predicate(left)?, self.visit_predicate(right)?))
        }

        fn visit_comparison(
            &mut self,
            field: &str,
            op: Comparison,
            _value: &Bson,
        ) -> Result<String, DocumentStoreError> {
            Ok(format!("{op}:{field}"))
        }

        fn visit_text(&mut self, _search: &str) -> Result<String, DocumentStoreError> {
            Ok("text".to_string())
        }
    }

    /// Collects every comparison leaf in visiting order.
    #[derive(Default)]
    pub(crate) struct Leaves(pub(crate) Vec<(String, Comparison, Bson)>);

    impl PredicateVisitor for Leaves {
        type Output = ();
        type Error = DocumentStoreError;

        fn visit_combine(
            &mut self,
            _connector: Connector,
            left: &Predicate,
            right: &Predicate,
        ) -> Result<(), DocumentStoreError> {
            self.visit_predicate(left)?;
            self.visit_predicate(right)
        }

        fn visit_comparison(
            &mut self,
            field: &str,
            op: Comparison,
            value: &Bson,
        ) -> Result<(), DocumentStoreError> {
            self.0.push((field.to_string(), op, value.clone()));
            Ok(())
        }

        fn visit_text(&mut self, search: &str) -> Result<(), DocumentStoreError> {
            self.0.push((String::new(), Comparison::Eq, Bson::String(search.to_string())));
            Ok(())
        }
    }

    pub(crate) fn shape(predicate: &Predicate) -> String {
        Shape.visit_predicate(predicate).unwrap()
    }

    #[test]
    fn combining_grows_left_deep() {
        let predicate = Predicate::eq("a", 1)
            .and(Predicate::eq("b", 2))
            .or(Predicate::eq("c", 3));

        assert_eq!(shape(&predicate), "or(and(eq:a,eq:b),eq:c)");
    }

    #[test]
    fn membership_values_are_arrays() {
        let mut leaves = Leaves::default();
        leaves
            .visit_predicate(&Predicate::one_of("status", ["A", "B"]))
            .unwrap();

        assert_eq!(
            leaves.0,
            vec![(
                "status".to_string(),
                Comparison::In,
                Bson::Array(vec![Bson::String("A".into()), Bson::String("B".into())]),
            )]
        );
    }

    #[test]
    fn logical_id_maps_to_document_key() {
        assert_eq!(document_field("Id"), "_id");
        assert_eq!(document_field("name"), "name");
    }

    #[test]
    fn display_renders_connectors() {
        let predicate = Predicate::text("ana").or(Predicate::eq("x", "y"));

        assert_eq!(predicate.to_string(), "(text \"ana\") OR (x eq \"y\")");
    }
}
