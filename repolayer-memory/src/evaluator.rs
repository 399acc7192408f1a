//! Predicate evaluation for in-memory document filtering.
//!
//! This module provides the evaluation engine for predicate trees, enabling filtering,
//! sorting and comparison operations on BSON documents.

use std::{cmp::Ordering, collections::HashMap};

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};
use repolayer_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Comparison, Connector, Predicate, PredicateVisitor, document_field},
};

/// A comparable representation of BSON values for filtering and sorting.
///
/// Integers and doubles collapse into one numeric variant so `1`, `1_i64` and `1.0` compare
/// equal. Types without a useful ordering become `Null`.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    ObjectId(ObjectId),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(arr) => Comparable::Array(
                arr.iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>(),
            ),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>(),
            ),
            _ => Comparable::Null,
        }
    }
}

impl<'a> Comparable<'a> {
    /// Position of the value's type in the cross-type sort order.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::ObjectId(_) => 5,
            Comparable::Bool(_) => 6,
            Comparable::DateTime(_) => 7,
        }
    }

    /// Total order used for sorting: by type rank first, then by value.
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
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Looks a field up, following dotted paths through embedded documents.
///
/// The logical name `Id` addresses `_id`.
pub(crate) fn lookup<'a>(document: &'a Document, field: &str) -> Option<&'a Bson> {
    let mut segments = document_field(field).split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = current.as_document()?.get(segment)?;
    }

    Some(current)
}

/// Lower-cased word tokens of a text.
pub(crate) fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

/// Evaluates predicates against a single document.
pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
    text_fields: &'a [String],
}

impl<'a> DocumentEvaluator<'a> {
    /// `text_fields` are the fields covered by the collection's text index, if any.
    pub fn new(document: &'a Document, text_fields: &'a [String]) -> Self {
        Self { document, text_fields }
    }

    pub fn evaluate(&mut self, predicate: &Predicate) -> DocumentStoreResult<bool> {
        self.visit_predicate(predicate)
    }

    /// Clones every document matching `predicate`, or every document if `None`.
    ///
    /// Fails if a text search is requested on a collection without a text index.
    pub fn filter_documents(
        documents: impl IntoIterator<Item = &'a Document>,
        predicate: Option<&Predicate>,
        text_fields: &'a [String],
    ) -> DocumentStoreResult<Vec<Document>> {
        let mut matched = Vec::new();

        for document in documents {
            let keep = match predicate {
                Some(predicate) => DocumentEvaluator::new(document, text_fields).evaluate(predicate)?,
                None => true,
            };
            if keep {
                matched.push(document.clone());
            }
        }

        Ok(matched)
    }

    /// Equality with array fan-out: an array field matches if it equals the value or holds it.
    fn equals(field_value: Option<&Bson>, value: &Bson) -> bool {
        let expected = Comparable::from(value);

        let Some(field_value) = field_value else {
            return matches!(expected, Comparable::Null);
        };

        match Comparable::from(field_value) {
            actual if actual == expected => true,
            Comparable::Array(items) => items.iter().any(|item| item == &expected),
            _ => false,
        }
    }

    fn ordered(field_value: Option<&Bson>, value: &Bson, accept: fn(Ordering) -> bool) -> bool {
        let Some(field_value) = field_value else {
            return false;
        };
        let expected = Comparable::from(value);
        let check = |actual: &Comparable<'_>| {
            actual
                .partial_cmp(&expected)
                .is_some_and(accept)
        };

        match Comparable::from(field_value) {
            Comparable::Array(items) => items.iter().any(check),
            actual => check(&actual),
        }
    }

    fn one_of(field_value: Option<&Bson>, values: &Bson) -> DocumentStoreResult<bool> {
        match values {
            Bson::Array(values) => Ok(values
                .iter()
                .any(|value| Self::equals(field_value, value))),
            _ => Err(DocumentStoreError::Backend("membership test requires an array of values".to_string())),
        }
    }
}

impl<'a> PredicateVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = DocumentStoreError;

    fn visit_combine(
        &mut self,
        connector: Connector,
        left: &Predicate,
        right: &Predicate,
    ) -> Result<Self::Output, Self::Error> {
        let left = self.visit_predicate(left)?;

        match connector {
            Connector::And if !left => Ok(false),
            Connector::Or if left => Ok(true),
            _ => self.visit_predicate(right),
        }
    }

    fn visit_comparison(&mut self, field: &str, op: Comparison, value: &Bson) -> Result<Self::Output, Self::Error> {
        let field_value = lookup(self.document, field);

        Ok(match op {
            Comparison::Eq => Self::equals(field_value, value),
            Comparison::NotEq => !Self::equals(field_value, value),
            Comparison::Gt => Self::ordered(field_value, value, Ordering::is_gt),
            Comparison::Gte => Self::ordered(field_value, value, Ordering::is_ge),
            Comparison::Lt => Self::ordered(field_value, value, Ordering::is_lt),
            Comparison::Lte => Self::ordered(field_value, value, Ordering::is_le),
            Comparison::In => Self::one_of(field_value, value)?,
            Comparison::NotIn => !Self::one_of(field_value, value)?,
        })
    }

    fn visit_text(&mut self, search: &str) -> Result<Self::Output, Self::Error> {
        if self.text_fields.is_empty() {
            return Err(DocumentStoreError::Backend("text index required for text search".to_string()));
        }

        let wanted: Vec<String> = tokens(search).collect();
        let mut present = self
            .text_fields
            .iter()
            .filter_map(|field| lookup(self.document, field))
            .flat_map(|value| match value {
                Bson::String(text) => vec![text.as_str()],
                Bson::Array(items) => items
                    .iter()
                    .filter_map(Bson::as_str)
                    .collect(),
                _ => Vec::new(),
            })
            .flat_map(tokens);

        Ok(present.any(|token| wanted.contains(&token)))
    }
}
