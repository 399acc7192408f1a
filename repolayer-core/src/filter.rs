//! Fluent predicate accumulator scoped to one entity type.

use bson::Bson;
use std::{fmt, marker::PhantomData};

use crate::{
    error::DocumentStoreResult,
    expression::FilterExpression,
    query::{Comparison, Connector, Predicate, Sort},
};

/// Accumulates at most one predicate tree and at most one sort specification for `E`.
///
/// Each `and_*`/`or_*` call seeds the tree when it is still empty, whatever the connector;
/// afterwards the existing tree becomes the left child of a new root joined to the new leaf.
/// Trees are therefore left-deep in call order.
///
/// ```ignore
/// let filter = Filter::<Account>::new()
///     .and_eq("status", "active")
///     .and_gte("age", 18)
///     .or_text("premium");
/// ```
pub struct Filter<E> {
    predicate: Option<Predicate>,
    sort: Option<Sort>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Filter<E> {
    pub fn new() -> Self {
        Filter {
            predicate: None,
            sort: None,
            _entity: PhantomData,
        }
    }

    /// Wraps a predicate built elsewhere.
    pub fn from_predicate(predicate: Predicate) -> Self {
        Filter {
            predicate: Some(predicate),
            ..Self::new()
        }
    }

    /// Compiles a textual query and optional `field_direction` order-by token.
    pub fn parse(order_by: Option<&str>, query: &str) -> DocumentStoreResult<Self> {
        FilterExpression::new(order_by, query).compile()
    }

    /// Adds `leaf` to the tree with `connector`, or seeds the tree with it.
    pub fn push(mut self, connector: Connector, leaf: Predicate) -> Self {
        self.predicate = Some(match self.predicate.take() {
            Some(tree) => tree.combine(connector, leaf),
            None => leaf,
        });
        self
    }

    fn push_comparison(
        self,
        connector: Connector,
        field: impl Into<String>,
        op: Comparison,
        value: impl Into<Bson>,
    ) -> Self {
        self.push(connector, Predicate::compare(field, op, value))
    }

    pub fn and_eq(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.push_comparison(Connector::And, field, Comparison::Eq, value)
    }

    pub fn and_not_eq(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.push_comparison(Connector::And, field, Comparison::NotEq, value)
    }

    pub fn and_gt(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.push_comparison(Connector::And, field, Comparison::Gt, value)
    }

    pub fn and_gte(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.push_comparison(Connector::And, field, Comparison::Gte, value)
    }

    pub fn and_lt(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.push_comparison(Connector::And, field, Comparison::Lt, value)
    }

    pub fn and_lte(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.push_comparison(Connector::And, field, Comparison::Lte, value)
    }

    pub fn and_in<V: Into<Bson>>(self, field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        self.push(Connector::And, Predicate::one_of(field, values))
    }

    pub fn and_not_in<V: Into<Bson>>(self, field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        self.push(Connector::And, Predicate::none_of(field, values))
    }

    pub fn and_text(self, search: impl Into<String>) -> Self {
        self.push(Connector::And, Predicate::text(search))
    }

    pub fn or_eq(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.push_comparison(Connector::Or, field, Comparison::Eq, value)
    }

    pub fn or_not_eq(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.push_comparison(Connector::Or, field, Comparison::NotEq, value)
    }

    pub fn or_gt(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.push_comparison(Connector::Or, field, Comparison::Gt, value)
    }

    pub fn or_gte(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.push_comparison(Connector::Or, field, Comparison::Gte, value)
    }

    pub fn or_lt(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.push_comparison(Connector::Or, field, Comparison::Lt, value)
    }

    pub fn or_lte(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.push_comparison(Connector::Or, field, Comparison::Lte, value)
    }

    pub fn or_in<V: Into<Bson>>(self, field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        self.push(Connector::Or, Predicate::one_of(field, values))
    }

    pub fn or_not_in<V: Into<Bson>>(self, field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        self.push(Connector::Or, Predicate::none_of(field, values))
    }

    pub fn or_text(self, search: impl Into<String>) -> Self {
        self.push(Connector::Or, Predicate::text(search))
    }

    /// Replaces the sort specification.
    pub fn sort_by(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    pub fn sort(&self) -> Option<&Sort> {
        self.sort.as_ref()
    }

    /// Returns `true` when no predicate has been added.
    pub fn is_empty(&self) -> bool {
        self.predicate.is_none()
    }
}

impl<E> Default for Filter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for Filter<E> {
    fn clone(&self) -> Self {
        Filter {
            predicate: self.predicate.clone(),
            sort: self.sort.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E> fmt::Debug for Filter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("predicate", &self.predicate)
            .field("sort", &self.sort)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{
        PredicateVisitor, SortDirection,
        tests::{Leaves, shape},
    };

    struct Account;

    #[test]
    fn first_call_seeds_tree_regardless_of_connector() {
        let filter = Filter::<Account>::new().or_eq("a", 1);

        assert_eq!(shape(filter.predicate().unwrap()), "eq:a");
    }

    #[test]
    fn calls_build_left_deep_tree() {
        let filter = Filter::<Account>::new()
            .and_eq("a", 1)
            .and_gt("b", 2)
            .or_lte("c", 3)
            .and_text("ana");

        assert_eq!(shape(filter.predicate().unwrap()), "and(or(and(eq:a,gt:b),lteq:c),text)");
    }

    #[test]
    fn membership_collects_values() {
        let filter = Filter::<Account>::new()
            .and_in("status", ["A", "B"])
            .or_not_in("age", [1.0, 2.0]);

        let mut leaves = Leaves::default();
        leaves
            .visit_predicate(filter.predicate().unwrap())
            .unwrap();

        assert_eq!(leaves.0[0].1, Comparison::In);
        assert_eq!(leaves.0[1].1, Comparison::NotIn);
        assert_eq!(leaves.0[1].2, Bson::Array(vec![Bson::Double(1.0), Bson::Double(2.0)]));
    }

    #[test]
    fn empty_filter_has_no_predicate() {
        let filter = Filter::<Account>::default().sort_by(Sort::new("name", SortDirection::Desc));

        assert!(filter.is_empty());
        assert_eq!(filter.sort().unwrap().direction, SortDirection::Desc);
    }

    #[test]
    fn from_predicate_keeps_tree() {
        let filter = Filter::<Account>::from_predicate(Predicate::eq("a", 1)).and_eq("b", 2);

        assert_eq!(shape(filter.predicate().unwrap()), "and(eq:a,eq:b)");
    }
}
