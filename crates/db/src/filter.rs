//! Query predicates and find options.

use std::cmp::Ordering;

use serde_json::Value;

use crate::{Document, ID_FIELD};

/// Predicate over top-level document fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Filter {
    #[default]
    All,
    Eq { field: String, value: Value },
    In { field: String, values: Vec<Value> },
    /// Literal, case-insensitive substring match on a string field.
    ContainsIgnoreCase { field: String, needle: String },
    /// The field is absent from the document.
    Missing { field: String },
    Or(Vec<Filter>),
    And(Vec<Filter>),
}

impl Filter {
    pub fn all() -> Self {
        Self::All
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn id(id: &str) -> Self {
        Self::eq(ID_FIELD, id)
    }

    pub fn is_in<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains_ignore_case(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::ContainsIgnoreCase {
            field: field.into(),
            needle: needle.into(),
        }
    }

    pub fn missing(field: impl Into<String>) -> Self {
        Self::Missing {
            field: field.into(),
        }
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Self::Or(filters)
    }

    /// Conjunction of `self` and `other`, flattening `All`.
    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Filter::All, other) => other,
            (this, Filter::All) => this,
            (Filter::And(mut filters), other) => {
                filters.push(other);
                Filter::And(filters)
            }
            (this, other) => Filter::And(vec![this, other]),
        }
    }

    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq { field, value } => document.get(field) == Some(value),
            Filter::In { field, values } => document
                .get(field)
                .is_some_and(|candidate| values.contains(candidate)),
            Filter::ContainsIgnoreCase { field, needle } => document
                .get(field)
                .and_then(Value::as_str)
                .is_some_and(|text| text.to_lowercase().contains(&needle.to_lowercase())),
            Filter::Missing { field } => !document.contains_key(field),
            Filter::Or(filters) => filters.iter().any(|filter| filter.matches(document)),
            Filter::And(filters) => filters.iter().all(|filter| filter.matches(document)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Options for [`crate::DocumentStore::find`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindQuery {
    pub filter: Filter,
    pub sort: Vec<(String, SortOrder)>,
    pub skip: u64,
    pub limit: Option<u64>,
}

impl FindQuery {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn sort_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort.push((field.into(), order));
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Total order used by in-process sorting: missing < null < bool < number < string.
pub(crate) fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None => 0,
            Some(Value::Null) => 1,
            Some(Value::Bool(_)) => 2,
            Some(Value::Number(_)) => 3,
            Some(Value::String(_)) => 4,
            Some(Value::Array(_)) => 5,
            Some(Value::Object(_)) => 6,
        }
    }

    match (left, right) {
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        _ => rank(left).cmp(&rank(right)),
    }
}

pub(crate) fn sort_documents(documents: &mut [Document], keys: &[(String, SortOrder)]) {
    if keys.is_empty() {
        return;
    }
    documents.sort_by(|left, right| {
        keys.iter()
            .map(|(field, order)| {
                let ordering = compare_values(left.get(field), right.get(field));
                match order {
                    SortOrder::Ascending => ordering,
                    SortOrder::Descending => ordering.reverse(),
                }
            })
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn contains_is_case_insensitive_and_literal() {
        let book = doc(json!({"title": "Dune Messiah", "author": "Frank Herbert"}));
        assert!(Filter::contains_ignore_case("title", "dUNE").matches(&book));
        assert!(Filter::contains_ignore_case("author", "k h").matches(&book));
        assert!(!Filter::contains_ignore_case("title", "d.ne").matches(&book));
        assert!(!Filter::contains_ignore_case("missing", "dune").matches(&book));
    }

    #[test]
    fn or_matches_any_branch() {
        let book = doc(json!({"title": "Emma", "author": "Austen"}));
        let filter = Filter::or(vec![
            Filter::contains_ignore_case("title", "aus"),
            Filter::contains_ignore_case("author", "aus"),
        ]);
        assert!(filter.matches(&book));
    }

    #[test]
    fn and_flattens_all() {
        let filter = Filter::all().and(Filter::eq("book", "b1"));
        assert_eq!(filter, Filter::eq("book", "b1"));

        let combined = Filter::eq("a", 1).and(Filter::eq("b", 2));
        assert!(combined.matches(&doc(json!({"a": 1, "b": 2}))));
        assert!(!combined.matches(&doc(json!({"a": 1, "b": 3}))));
    }

    #[test]
    fn missing_matches_absent_fields_only() {
        let filter = Filter::missing("version");
        assert!(filter.matches(&doc(json!({"_id": "r1"}))));
        assert!(!filter.matches(&doc(json!({"_id": "r1", "version": 1}))));
        assert!(!filter.matches(&doc(json!({"_id": "r1", "version": null}))));
    }

    #[test]
    fn in_matches_listed_values() {
        let filter = Filter::is_in("_id", ["u1", "u2"]);
        assert!(filter.matches(&doc(json!({"_id": "u2"}))));
        assert!(!filter.matches(&doc(json!({"_id": "u3"}))));
    }

    #[test]
    fn sort_orders_numbers_and_strings() {
        let mut docs = vec![
            doc(json!({"n": 3, "s": "b"})),
            doc(json!({"n": 1, "s": "c"})),
            doc(json!({"n": 2, "s": "a"})),
        ];
        sort_documents(&mut docs, &[("n".to_string(), SortOrder::Ascending)]);
        assert_eq!(docs[0]["n"], json!(1));
        sort_documents(&mut docs, &[("s".to_string(), SortOrder::Descending)]);
        assert_eq!(docs[0]["s"], json!("c"));
    }
}
