//! Compiler for the compact query-string grammar.
//!
//! A query is a sequence of terms joined by `&` (AND) or `|` (OR):
//!
//! ```text
//! query    := term (('&' | '|') term)*
//! term     := field '_' operator '=' value
//! operator := eq | noteq | gt | gteq | lt | lteq | in | notin | text
//! value    := (bare | '(' list ')')*
//! ```
//!
//! `field` is made of ASCII letters, digits and underscores; the operator is taken after the
//! last underscore and is matched case-insensitively. A `#` value denotes null for `eq`/`noteq`.
//! `in`/`notin` take a parenthesized list that is either a string set (`('a','b',#)`) or a
//! numeric set (`(1,2.5)`). The separator that follows a term decides how the next term joins
//! the accumulated tree, so `a_eq=1&b_eq=2|c_eq=3` compiles to `(a = 1 AND b = 2) OR c = 3`.
//!
//! The order-by token reads `field_asc` or `field_desc`.
//!
//! Any deviation from the grammar rejects the whole expression with
//! [`DocumentStoreError::InvalidExpression`]; nothing is compiled partially.

use bson::Bson;
use tracing::warn;

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    filter::Filter,
    query::{Connector, Predicate, Sort, SortDirection},
};

const NULL_TOKEN: &str = "#";

/// A raw order-by token and query token awaiting compilation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterExpression {
    order_by: String,
    query: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    Text,
}

impl Operator {
    fn parse(token: &str) -> Option<Self> {
        let operator = match token.to_ascii_lowercase().as_str() {
            "eq" => Operator::Eq,
            "noteq" => Operator::NotEq,
            "gt" => Operator::Gt,
            "gteq" => Operator::Gte,
            "lt" => Operator::Lt,
            "lteq" => Operator::Lte,
            "in" => Operator::In,
            "notin" => Operator::NotIn,
            "text" => Operator::Text,
            _ => return None,
        };

        Some(operator)
    }
}

#[derive(Debug)]
struct Term<'a> {
    field: &'a str,
    operator: Operator,
    value: &'a str,
    separator: Option<Connector>,
}

impl FilterExpression {
    /// Both tokens are trimmed; a missing order-by token means no sort.
    pub fn new(order_by: Option<&str>, query: &str) -> Self {
        FilterExpression {
            order_by: order_by
                .map(str::trim)
                .unwrap_or_default()
                .to_string(),
            query: query.trim().to_string(),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn order_by(&self) -> &str {
        &self.order_by
    }

    /// Compiles the expression into a filter for `E`.
    pub fn compile<E>(&self) -> DocumentStoreResult<Filter<E>> {
        let result = self.build();

        if let Err(err) = &result {
            warn!(query = %self.query, order_by = %self.order_by, error = %err, "rejected filter expression");
        }

        result
    }

    fn build<E>(&self) -> DocumentStoreResult<Filter<E>> {
        let mut filter = Filter::new();

        if !self.query.is_empty() {
            let mut connector = Connector::And;

            for term in self.scan()? {
                filter = filter.push(connector, self.predicate(&term)?);

                if let Some(separator) = term.separator {
                    connector = separator;
                }
            }
        }

        if let Some(sort) = self.sort()? {
            filter = filter.sort_by(sort);
        }

        Ok(filter)
    }

    fn invalid(&self) -> DocumentStoreError {
        DocumentStoreError::InvalidExpression(self.query.clone())
    }

    /// Validates the whole query and splits it into terms.
    fn scan(&self) -> DocumentStoreResult<Vec<Term<'_>>> {
        let query = self.query.as_str();
        let bytes = query.as_bytes();
        let mut terms = Vec::new();
        let mut pos = 0;

        loop {
            let key_start = pos;
            while pos < bytes.len() && is_key_byte(bytes[pos]) {
                pos += 1;
            }
            if pos == key_start || bytes.get(pos) != Some(&b'=') {
                return Err(self.invalid());
            }

            let key = &query[key_start..pos];
            pos += 1;

            let value_start = pos;
            pos = self.scan_value(bytes, pos)?;
            let value = &query[value_start..pos];

            let (field, operator) = key
                .rsplit_once('_')
                .filter(|(field, _)| !field.is_empty())
                .and_then(|(field, operator)| Operator::parse(operator).map(|operator| (field, operator)))
                .ok_or_else(|| self.invalid())?;

            let separator = match bytes.get(pos) {
                None => None,
                Some(&symbol) => match Connector::from_symbol(symbol as char) {
                    Some(connector) => Some(connector),
                    None => return Err(self.invalid()),
                },
            };

            terms.push(Term {
                field,
                operator,
                value,
                separator,
            });

            if separator.is_none() {
                return Ok(terms);
            }

            pos += 1;
            if pos == bytes.len() {
                return Err(self.invalid());
            }
        }
    }

    /// Consumes bare characters and parenthesized lists, returning the position after the value.
    fn scan_value(&self, bytes: &[u8], mut pos: usize) -> DocumentStoreResult<usize> {
        while pos < bytes.len() {
            match bytes[pos] {
                b'(' => {
                    let list_start = pos + 1;
                    pos = list_start;
                    while pos < bytes.len() && is_list_byte(bytes[pos]) {
                        pos += 1;
                    }
                    if pos == list_start || bytes.get(pos) != Some(&b')') {
                        return Err(self.invalid());
                    }
                    pos += 1;
                }
                byte if is_bare_byte(byte) => pos += 1,
                _ => break,
            }
        }

        Ok(pos)
    }

    fn predicate(&self, term: &Term<'_>) -> DocumentStoreResult<Predicate> {
        let field = term.field;
        let value = term.value;

        let predicate = match term.operator {
            Operator::Eq => Predicate::eq(field, nullable(value)),
            Operator::NotEq => Predicate::not_eq(field, nullable(value)),
            Operator::Gt => Predicate::gt(field, value),
            Operator::Gte => Predicate::gte(field, value),
            Operator::Lt => Predicate::lt(field, value),
            Operator::Lte => Predicate::lte(field, value),
            Operator::In => Predicate::one_of(field, self.value_set(value)?),
            Operator::NotIn => Predicate::none_of(field, self.value_set(value)?),
            Operator::Text => Predicate::text(value),
        };

        Ok(predicate)
    }

    /// Classifies a parenthesized list as a string set first and a numeric set second.
    fn value_set(&self, value: &str) -> DocumentStoreResult<Vec<Bson>> {
        let inner = value
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| self.invalid())?;

        if is_string_set(inner) {
            let values = inner
                .replace('\'', "")
                .split(',')
                .filter(|item| !item.is_empty())
                .map(nullable)
                .collect();

            return Ok(values);
        }

        if is_numeric_set(inner) {
            return inner
                .split(',')
                .filter(|item| !item.is_empty())
                .map(|item| {
                    item.parse::<f64>()
                        .map(Bson::Double)
                        .map_err(|_| self.invalid())
                })
                .collect();
        }

        Err(self.invalid())
    }

    fn sort(&self) -> DocumentStoreResult<Option<Sort>> {
        if self.order_by.is_empty() {
            return Ok(None);
        }

        let invalid = || DocumentStoreError::InvalidExpression(self.order_by.clone());
        let (field, direction) = self
            .order_by
            .rsplit_once('_')
            .filter(|(field, _)| !field.is_empty())
            .ok_or_else(invalid)?;

        let direction = if direction.eq_ignore_ascii_case("asc") {
            SortDirection::Asc
        } else if direction.eq_ignore_ascii_case("desc") {
            SortDirection::Desc
        } else {
            return Err(invalid());
        };

        Ok(Some(Sort::new(field, direction)))
    }
}

fn nullable(value: &str) -> Bson {
    if value.trim() == NULL_TOKEN {
        Bson::Null
    } else {
        Bson::String(value.to_string())
    }
}

fn is_key_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

fn is_bare_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b' ' | b'_' | b'.' | b'#' | b'-')
}

fn is_list_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b' ' | b'_' | b'\'' | b'"' | b',' | b'.' | b'#' | b'-')
}

/// `('a','b',#)`: quoted items or `#`, each followed by any number of commas.
fn is_string_set(inner: &str) -> bool {
    let mut rest = inner;
    let mut items = 0;

    while !rest.is_empty() {
        if let Some(quoted) = rest.strip_prefix('\'') {
            match quoted.find('\'') {
                Some(end) => rest = &quoted[end + 1..],
                None => return false,
            }
        } else if let Some(after) = rest.strip_prefix(NULL_TOKEN) {
            rest = after;
        } else {
            return false;
        }

        rest = rest.trim_start_matches(',');
        items += 1;
    }

    items > 0
}

/// `(1,2.5)`: decimal numbers with a period separator, each followed by any number of commas.
fn is_numeric_set(inner: &str) -> bool {
    let mut rest = inner;
    let mut items = 0;

    while !rest.is_empty() {
        let integer = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        if integer == 0 {
            return false;
        }
        rest = &rest[integer..];

        if let Some(fraction) = rest.strip_prefix('.') {
            let digits = fraction.len() - fraction.trim_start_matches(|c: char| c.is_ascii_digit()).len();
            if digits == 0 {
                return false;
            }
            rest = &fraction[digits..];
        }

        rest = rest.trim_start_matches(',');
        items += 1;
    }

    items > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{
        Comparison, PredicateVisitor,
        tests::{Leaves, shape},
    };

    struct Account;

    fn compile(query: &str) -> DocumentStoreResult<Filter<Account>> {
        FilterExpression::new(None, query).compile()
    }

    fn leaves(query: &str) -> Vec<(String, Comparison, Bson)> {
        let filter = compile(query).unwrap();
        let mut leaves = Leaves::default();
        leaves
            .visit_predicate(filter.predicate().unwrap())
            .unwrap();

        leaves.0
    }

    fn is_invalid(result: DocumentStoreResult<Filter<Account>>) -> bool {
        matches!(result, Err(DocumentStoreError::InvalidExpression(_)))
    }

    #[test]
    fn separator_after_term_governs_next_join() {
        let filter = compile("a_eq=1&b_eq=2|c_eq=3").unwrap();

        assert_eq!(shape(filter.predicate().unwrap()), "or(and(eq:a,eq:b),eq:c)");
    }

    #[test]
    fn leading_or_separator_applies_to_second_term() {
        let filter = compile("a_eq=1|b_eq=2&c_eq=3").unwrap();

        assert_eq!(shape(filter.predicate().unwrap()), "and(or(eq:a,eq:b),eq:c)");
    }

    #[test]
    fn hash_means_null_for_equality() {
        assert_eq!(leaves("deletedAt_eq=#"), vec![("deletedAt".into(), Comparison::Eq, Bson::Null)]);
        assert_eq!(leaves("deletedAt_noteq= # "), vec![("deletedAt".into(), Comparison::NotEq, Bson::Null)]);
    }

    #[test]
    fn scalar_values_stay_strings() {
        assert_eq!(
            leaves("age_gteq=18&name_lt=M"),
            vec![
                ("age".into(), Comparison::Gte, Bson::String("18".into())),
                ("name".into(), Comparison::Lt, Bson::String("M".into())),
            ]
        );
    }

    #[test]
    fn string_set_membership() {
        assert_eq!(
            leaves("status_in=('A','B')"),
            vec![(
                "status".into(),
                Comparison::In,
                Bson::Array(vec![Bson::String("A".into()), Bson::String("B".into())]),
            )]
        );
    }

    #[test]
    fn string_set_accepts_null_token() {
        assert_eq!(
            leaves("status_notin=('A',#)"),
            vec![(
                "status".into(),
                Comparison::NotIn,
                Bson::Array(vec![Bson::String("A".into()), Bson::Null]),
            )]
        );
    }

    #[test]
    fn numeric_set_membership() {
        assert_eq!(
            leaves("age_in=(1,2,3)"),
            vec![(
                "age".into(),
                Comparison::In,
                Bson::Array(vec![Bson::Double(1.0), Bson::Double(2.0), Bson::Double(3.0)]),
            )]
        );
        assert_eq!(
            leaves("ratio_notin=(0.5,12.25)")[0].2,
            Bson::Array(vec![Bson::Double(0.5), Bson::Double(12.25)])
        );
    }

    #[test]
    fn mixed_set_is_rejected() {
        assert!(is_invalid(compile("age_in=(1,'a')")));
        assert!(is_invalid(compile("age_in=(1.2.3)")));
        assert!(is_invalid(compile("age_in=abc")));
    }

    #[test]
    fn operator_follows_last_underscore() {
        assert_eq!(leaves("first_name_EQ=Ana")[0].0, "first_name");
    }

    #[test]
    fn text_term_is_a_search() {
        let filter = compile("name_text=ana maria").unwrap();

        assert_eq!(shape(filter.predicate().unwrap()), "text");
    }

    #[test]
    fn malformed_queries_are_rejected_whole() {
        for query in [
            "a_eq=1&",
            "a_eq=1&&b_eq=2",
            "a_like=1",
            "_eq=1",
            "a_eq",
            "aeq=1",
            "a_eq=1;b_eq=2",
            "a_in=()",
            "a_in=(1",
            "a_eq=ñ",
        ] {
            assert!(is_invalid(compile(query)), "{query} should be rejected");
        }
    }

    #[test]
    fn rejection_carries_the_query() {
        let err = compile(" a_like=1 ").unwrap_err();

        assert!(matches!(err, DocumentStoreError::InvalidExpression(query) if query == "a_like=1"));
    }

    #[test]
    fn empty_query_has_no_predicate() {
        let filter = FilterExpression::new(Some("name_desc"), "   ")
            .compile::<Account>()
            .unwrap();

        assert!(filter.is_empty());
        assert_eq!(filter.sort(), Some(&Sort::new("name", SortDirection::Desc)));
    }

    #[test]
    fn order_by_direction_is_case_insensitive() {
        let filter = FilterExpression::new(Some("created_at_ASC"), "a_eq=1")
            .compile::<Account>()
            .unwrap();

        assert_eq!(filter.sort(), Some(&Sort::new("created_at", SortDirection::Asc)));
    }

    #[test]
    fn unknown_order_by_direction_is_rejected() {
        for order_by in ["name_up", "name", "_asc"] {
            let err = FilterExpression::new(Some(order_by), "")
                .compile::<Account>()
                .unwrap_err();

            assert!(matches!(err, DocumentStoreError::InvalidExpression(token) if token == order_by));
        }
    }
}
