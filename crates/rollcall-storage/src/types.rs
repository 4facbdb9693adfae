//! Core types for the document store abstraction layer.

use std::cmp::Ordering;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::error::StorageError;

/// A stored document: a JSON object with an `_id` field.
pub type Document = Map<String, Value>;

/// Name of the primary-key field on every document.
pub const ID_FIELD: &str = "_id";

/// The collections known to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Students,
    Attendance,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Self::Students, Self::Attendance];

    /// Collection name as used by backends and in error messages.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Students => "students",
            Self::Attendance => "attendance",
        }
    }

    /// Fields that together must be unique across the collection.
    ///
    /// Students are unique by primary key; attendance records are unique by
    /// the (student, date) pair regardless of their generated `_id`.
    #[must_use]
    pub fn unique_key(&self) -> &'static [&'static str] {
        match self {
            Self::Students => &[ID_FIELD],
            Self::Attendance => &["student_id", "date"],
        }
    }

    /// Renders the unique key of `doc` as `a/b` for error messages.
    #[must_use]
    pub fn describe_key(&self, doc: &Document) -> String {
        self.unique_key()
            .iter()
            .map(|field| match doc.get(*field) {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A conjunction of top-level field equality conditions.
///
/// An empty filter matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter on the primary key.
    #[must_use]
    pub fn by_id(id: impl Into<String>) -> Self {
        Self::new().eq(ID_FIELD, id.into())
    }

    /// Adds an equality condition.
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    /// Adds an equality condition only when `value` is present.
    #[must_use]
    pub fn eq_opt(self, field: impl Into<String>, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(v) => self.eq(field, v),
            None => self,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn conditions(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.conditions.iter().map(|(f, v)| (f.as_str(), v))
    }

    /// Returns the value the filter pins `field` to, if any.
    #[must_use]
    pub fn value_of(&self, field: &str) -> Option<&Value> {
        self.conditions
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, v)| v)
    }

    /// Whether `doc` satisfies every condition.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions
            .iter()
            .all(|(field, value)| doc.get(field) == Some(value))
    }

    /// The filter as a JSON object (used for containment queries and as
    /// the seed of an upserted document).
    #[must_use]
    pub fn to_document(&self) -> Document {
        self.conditions.iter().cloned().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Sort by a single top-level field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub order: SortOrder,
}

impl Sort {
    #[must_use]
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Ascending,
        }
    }

    #[must_use]
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Descending,
        }
    }

    /// Compares two documents on the sort field. Missing values sort first.
    #[must_use]
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        let ord = compare_values(a.get(&self.field), b.get(&self.field));
        match self.order {
            SortOrder::Ascending => ord,
            SortOrder::Descending => ord.reverse(),
        }
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

/// Options for `find_many`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    pub sort: Option<Sort>,
    pub limit: Option<usize>,
}

impl FindOptions {
    #[must_use]
    pub fn sorted(sort: Sort) -> Self {
        Self {
            sort: Some(sort),
            limit: None,
        }
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Result of an `update` call.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// An existing document was patched; carries the new state.
    Updated(Document),
    /// No document matched and `upsert` was requested; carries the new document.
    Inserted(Document),
    /// No document matched and `upsert` was not requested.
    NotFound,
}

impl UpdateOutcome {
    /// The resulting document, if any.
    #[must_use]
    pub fn into_document(self) -> Option<Document> {
        match self {
            Self::Updated(doc) | Self::Inserted(doc) => Some(doc),
            Self::NotFound => None,
        }
    }
}

/// Serializes a value into a document.
pub fn to_document<T: Serialize>(value: &T) -> Result<Document, StorageError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(StorageError::invalid_document(format!(
            "expected a JSON object, got {other}"
        ))),
        Err(e) => Err(StorageError::invalid_document(e.to_string())),
    }
}

/// Deserializes a document into a typed value.
pub fn from_document<T: DeserializeOwned>(doc: Document) -> Result<T, StorageError> {
    serde_json::from_value(Value::Object(doc))
        .map_err(|e| StorageError::internal(format!("Malformed stored document: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_filter_matches() {
        let d = doc(json!({"_id": "1", "date": "2024-01-01", "student_id": "S1"}));
        assert!(Filter::new().matches(&d));
        assert!(Filter::new().eq("date", "2024-01-01").matches(&d));
        assert!(
            !Filter::new()
                .eq("date", "2024-01-01")
                .eq("student_id", "S2")
                .matches(&d)
        );
        assert!(!Filter::new().eq("missing", "x").matches(&d));
    }

    #[test]
    fn test_filter_eq_opt() {
        let f = Filter::new()
            .eq_opt("date", None::<String>)
            .eq_opt("student_id", Some("S1"));
        assert_eq!(f.to_document(), doc(json!({"student_id": "S1"})));
        assert_eq!(f.value_of("student_id"), Some(&json!("S1")));
    }

    #[test]
    fn test_sort_missing_first() {
        let a = doc(json!({"last_name": "B"}));
        let b = doc(json!({"last_name": "A"}));
        let c = doc(json!({}));
        let mut docs = vec![a.clone(), b.clone(), c.clone()];
        docs.sort_by(|x, y| Sort::asc("last_name").compare(x, y));
        assert_eq!(docs, vec![c.clone(), b.clone(), a.clone()]);
        docs.sort_by(|x, y| Sort::desc("last_name").compare(x, y));
        assert_eq!(docs, vec![a, b, c]);
    }

    #[test]
    fn test_describe_key() {
        let d = doc(json!({"_id": "x", "student_id": "S1", "date": "2024-01-01"}));
        assert_eq!(Collection::Attendance.describe_key(&d), "S1/2024-01-01");
        assert_eq!(Collection::Students.describe_key(&d), "x");
    }

    #[test]
    fn test_to_document_rejects_non_objects() {
        assert!(to_document(&42).is_err());
        assert!(to_document(&json!({"a": 1})).is_ok());
    }
}
