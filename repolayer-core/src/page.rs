//! Paginated, field-selectable projection reads.
//!
//! This module provides [`ProjectionQuery`] for describing which fields and which page of a
//! collection to read, [`PageRequest`] for normalising the requested page against the number of
//! stored documents, and [`ProjectionResult`] for the page that comes back.

use serde::{Deserialize, Serialize};

use crate::{
    entity::ID_FIELD,
    projection::{EntityProjection, NamingStrategy},
    query::{FieldSelection, LOGICAL_ID_FIELD},
};

/// Query-string key selecting the page number in [`ProjectionQuery::from_pairs`].
pub const PAGE_KEY: &str = "@Page";
/// Query-string key selecting the page size in [`ProjectionQuery::from_pairs`].
pub const PAGE_SIZE_KEY: &str = "@PageSize";

/// One page of projected documents.
///
/// Serializes as `{ "count", "pageSize", "page", "result" }`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionResult {
    /// Total number of documents in the collection.
    pub count: u64,
    /// Effective page size after normalisation.
    pub page_size: u64,
    /// Effective page number after normalisation.
    pub page: u64,
    /// The projected documents of this page.
    pub result: Vec<EntityProjection>,
}

/// Requested page number and size, as received from the caller.
///
/// Values below one are meaningful: a page below one means the first page and a page size
/// below one means "everything".
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageRequest {
    pub page: i64,
    pub page_size: i64,
}

/// A [`PageRequest`] resolved against a document count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: u64,
    pub page_size: u64,
    /// Documents to skip, when the collection spans more than one page.
    pub skip: Option<u64>,
    /// Documents to return, when the collection spans more than one page.
    pub limit: Option<u64>,
}

impl PageRequest {
    pub fn new(page: i64, page_size: i64) -> Self {
        Self { page, page_size }
    }

    /// Resolves the request against `count` stored documents.
    ///
    /// ```ignore
    /// let window = PageRequest::new(2, 10).window(25);
    /// assert_eq!((window.skip, window.limit), (Some(10), Some(10)));
    ///
    /// let window = PageRequest::new(3, 50).window(25);
    /// assert_eq!((window.page, window.page_size), (1, 25));
    /// ```
    pub fn window(&self, count: u64) -> PageWindow {
        let page = u64::try_from(self.page)
            .unwrap_or(0)
            .max(1);
        let page_size = match u64::try_from(self.page_size) {
            Ok(size) if size >= 1 => size,
            _ => count,
        };

        if count > page_size {
            PageWindow {
                page,
                page_size,
                skip: Some((page - 1).saturating_mul(page_size)),
                limit: Some(page_size),
            }
        } else {
            PageWindow {
                page: 1,
                page_size: count,
                skip: None,
                limit: None,
            }
        }
    }
}

/// Describes a projection read: which fields, which page, which naming strategy.
///
/// The document key is always included.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProjectionQuery {
    fields: Vec<FieldSelection>,
    request: PageRequest,
    naming_strategy: NamingStrategy,
}

impl ProjectionQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a query from `(key, value)` pairs such as a parsed query string.
    ///
    /// [`PAGE_KEY`] and [`PAGE_SIZE_KEY`] carry integers (unparseable values are treated as
    /// field selections like any other key); a value of `1` includes the key as a field and
    /// anything else excludes it. `_id` and `Id` are skipped.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut query = Self::new();

        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref());

            match (key, value.parse::<i64>()) {
                (PAGE_KEY, Ok(page)) => {
                    query.request.page = page;
                    continue;
                }
                (PAGE_SIZE_KEY, Ok(page_size)) => {
                    query.request.page_size = page_size;
                    continue;
                }
                _ => {}
            }

            query = if value == "1" { query.include(key) } else { query.exclude(key) };
        }

        query
    }

    fn select(mut self, field: &str, include: bool) -> Self {
        if field != ID_FIELD && field != LOGICAL_ID_FIELD {
            self.fields.push(FieldSelection {
                field: field.to_string(),
                include,
            });
        }
        self
    }

    pub fn include(self, field: &str) -> Self {
        self.select(field, true)
    }

    pub fn exclude(self, field: &str) -> Self {
        self.select(field, false)
    }

    pub fn page(mut self, page: i64) -> Self {
        self.request.page = page;
        self
    }

    pub fn page_size(mut self, page_size: i64) -> Self {
        self.request.page_size = page_size;
        self
    }

    pub fn naming_strategy(mut self, strategy: NamingStrategy) -> Self {
        self.naming_strategy = strategy;
        self
    }

    pub fn request(&self) -> PageRequest {
        self.request
    }

    pub fn strategy(&self) -> NamingStrategy {
        self.naming_strategy
    }

    /// The field selection handed to the store, starting with the document key.
    pub fn selection(&self) -> Vec<FieldSelection> {
        let mut selection = vec![FieldSelection {
            field: ID_FIELD.to_string(),
            include: true,
        }];
        selection.extend(self.fields.iter().cloned());

        selection
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_pages_through_large_collections() {
        let window = PageRequest::new(2, 10).window(25);

        assert_eq!(window, PageWindow { page: 2, page_size: 10, skip: Some(10), limit: Some(10) });
    }

    #[test]
    fn window_collapses_when_everything_fits() {
        let window = PageRequest::new(3, 50).window(25);

        assert_eq!(window, PageWindow { page: 1, page_size: 25, skip: None, limit: None });
    }

    #[test]
    fn window_normalises_out_of_range_values() {
        assert_eq!(PageRequest::new(0, 0).window(7).page_size, 7);
        assert_eq!(PageRequest::new(-4, 5).window(7).skip, Some(0));
        assert_eq!(PageRequest::new(-4, 5).window(7).page, 1);
        assert_eq!(PageRequest::default().window(0), PageWindow { page: 1, page_size: 0, skip: None, limit: None });
    }

    #[test]
    fn selection_always_starts_with_document_key() {
        let query = ProjectionQuery::new()
            .include("name")
            .exclude("secret")
            .include("Id");

        assert_eq!(
            query.selection(),
            vec![
                FieldSelection { field: "_id".into(), include: true },
                FieldSelection { field: "name".into(), include: true },
                FieldSelection { field: "secret".into(), include: false },
            ]
        );
    }

    #[test]
    fn pairs_carry_paging_and_fields() {
        let query = ProjectionQuery::from_pairs([
            ("@Page", "2"),
            ("@PageSize", "abc"),
            ("name", "1"),
            ("_id", "0"),
            ("notes", "0"),
        ]);

        assert_eq!(query.request(), PageRequest::new(2, 0));
        assert_eq!(query.selection().len(), 4);
        assert_eq!(query.selection()[1], FieldSelection { field: "@PageSize".into(), include: false });
    }

    #[test]
    fn result_serializes_camel_case() {
        let result = ProjectionResult {
            count: 3,
            page_size: 3,
            page: 1,
            result: Vec::new(),
        };

        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            serde_json::json!({ "count": 3, "pageSize": 3, "page": 1, "result": [] })
        );
    }
}
