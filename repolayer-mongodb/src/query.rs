//! Query translation from repolayer predicates to MongoDB query syntax.
//!
//! This module translates predicate trees into MongoDB BSON filter documents for execution by
//! the MongoDB query engine.

use bson::{Bson, Document, doc};

use repolayer_core::{
    error::DocumentStoreError,
    query::{Comparison, Connector, Predicate, PredicateVisitor, document_field},
};

/// Translates predicates into MongoDB filter documents.
///
/// Combinations become `$and`/`$or` over the two translated children; comparisons use the
/// matching `$` operator on the document field (the logical `Id` field addresses `_id`), and text
/// leaves become a `$text` search.
pub(crate) struct MongoQueryTranslator;

impl MongoQueryTranslator {
    pub(crate) fn translate(predicate: Option<&Predicate>) -> Result<Document, DocumentStoreError> {
        match predicate {
            Some(predicate) => MongoQueryTranslator.visit_predicate(predicate),
            None => Ok(doc! {}),
        }
    }
}

impl PredicateVisitor for MongoQueryTranslator {
    type Output = Document;
    type Error = DocumentStoreError;

    fn visit_combine(
        &mut self,
        connector: Connector,
        left: &Predicate,
        right: &Predicate,
    ) -> Result<Self::Output, Self::Error> {
        let operands = vec![self.visit_predicate(left)?, self.visit_predicate(right)?];

        Ok(match connector {
            Connector::And => doc! { "$and": operands },
            Connector::Or => doc! { "$or": operands },
        })
    }

    fn visit_comparison(&mut self, field: &str, op: Comparison, value: &Bson) -> Result<Self::Output, Self::Error> {
        let operator = match op {
            Comparison::Eq => "$eq",
            Comparison::NotEq => "$ne",
            Comparison::Gt => "$gt",
            Comparison::Gte => "$gte",
            Comparison::Lt => "$lt",
            Comparison::Lte => "$lte",
            Comparison::In => "$in",
            Comparison::NotIn => "$nin",
        };

        if matches!(op, Comparison::In | Comparison::NotIn) && !matches!(value, Bson::Array(_)) {
            return Err(DocumentStoreError::Backend(format!("{operator} requires an array value")));
        }

        Ok(doc! { document_field(field): { operator: value.clone() } })
    }

    fn visit_text(&mut self, search: &str) -> Result<Self::Output, Self::Error> {
        Ok(doc! { "$text": { "$search": search } })
    }
}
