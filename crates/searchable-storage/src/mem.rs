use crate::like::like_match;
use crate::traits::Storage;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use prometheus::{register_histogram_vec, HistogramVec};
use searchable_core::{Predicate, Query, Result, SearchError};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

static QUERY_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!("search_query_seconds", "In-memory query latency", &["table"])
        .unwrap()
});

#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    // table -> rows in insertion order
    tables: HashMap<String, Vec<JsonValue>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `{ "table": [row, ...], ... }`.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let doc: HashMap<String, Vec<JsonValue>> = serde_json::from_str(s)?;
        let store = Self::new();
        for (table, rows) in doc {
            for row in rows {
                store.insert(&table, row)?;
            }
        }
        Ok(store)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}

impl Storage for InMemoryStore {
    fn insert(&self, table: &str, row: JsonValue) -> Result<()> {
        if !row.is_object() {
            return Err(SearchError::InvalidArgument(format!(
                "rows of '{table}' must be JSON objects"
            )));
        }
        self.inner
            .write()
            .tables
            .entry(table.to_string())
            .or_default()
            .push(row);
        Ok(())
    }

    fn query(&self, query: &Query<'_>) -> Result<Vec<JsonValue>> {
        let _timer = QUERY_SECONDS
            .with_label_values(&[query.table()])
            .start_timer();
        let inner = self.inner.read();
        let out: Vec<JsonValue> = inner
            .tables
            .get(query.table())
            .map(|rows| {
                rows.iter()
                    .filter(|row| matches_all(&inner, query.qualifier(), row, query.predicates()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        debug!(table = query.table(), matched = out.len(), "query evaluated");
        Ok(out)
    }

    fn len(&self, table: &str) -> usize {
        self.inner
            .read()
            .tables
            .get(table)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

// `qualifier` is the table name or alias columns of this scope are prefixed with.
fn matches_all(inner: &Inner, table: &str, row: &JsonValue, preds: &[Predicate<'_>]) -> bool {
    preds.iter().all(|p| matches(inner, table, row, p))
}

fn matches(inner: &Inner, table: &str, row: &JsonValue, pred: &Predicate<'_>) -> bool {
    match pred {
        Predicate::Like { column, pattern } => column_value(table, row, column)
            .and_then(like_text)
            .map(|text| like_match(&text, pattern))
            .unwrap_or(false),
        Predicate::JsonLike { column, pattern } => column_value(table, row, column)
            .and_then(json_values_text)
            .map(|text| like_match(&text, pattern))
            .unwrap_or(false),
        Predicate::Has {
            descriptor, query, ..
        } => {
            let (related_key, parent_key) = descriptor.join_keys();
            let Some(parent) = row.get(parent_key).filter(|v| !v.is_null()) else {
                return false;
            };
            inner
                .tables
                .get(query.table())
                .map(|rows| {
                    rows.iter().any(|related| {
                        related
                            .get(related_key)
                            .map(|k| keys_equal(k, parent))
                            .unwrap_or(false)
                            && matches_all(inner, query.qualifier(), related, query.predicates())
                    })
                })
                .unwrap_or(false)
        }
    }
}

// Own-table qualifier is stripped; a remaining dotted name is tried as a
// literal key first, then as a path into nested objects.
fn column_value<'r>(table: &str, row: &'r JsonValue, column: &str) -> Option<&'r JsonValue> {
    let column = column
        .strip_prefix(table)
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(column);
    if let Some(v) = row.get(column) {
        return Some(v);
    }
    column
        .split('.')
        .try_fold(row, |cur, seg| cur.get(seg))
}

fn like_text(v: &JsonValue) -> Option<String> {
    match v {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Bool(_) | JsonValue::Number(_) => Some(v.to_string()),
        JsonValue::Array(_) | JsonValue::Object(_) => serde_json::to_string(v).ok(),
    }
}

// Text of the JSON array holding the document's top-level values, as
// `json_extract(col, '$.*')` prints it. Strings are parsed as JSON documents
// first; anything but an object yields NULL.
fn json_values_text(v: &JsonValue) -> Option<String> {
    let parsed;
    let doc = match v {
        JsonValue::String(s) => {
            parsed = serde_json::from_str::<JsonValue>(s).ok()?;
            &parsed
        }
        other => other,
    };
    let mut members: Vec<(&String, &JsonValue)> = doc.as_object()?.iter().collect();
    members.sort_by(|a, b| key_order(a.0, b.0));
    let values: Vec<String> = members.into_iter().map(|(_, v)| json_text(v)).collect();
    Some(format!("[{}]", values.join(", ")))
}

// Object keys print shortest first, then bytewise.
fn key_order(a: &str, b: &str) -> std::cmp::Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

// JSON text with `", "` and `": "` separators.
fn json_text(v: &JsonValue) -> String {
    match v {
        JsonValue::Array(items) => {
            let items: Vec<String> = items.iter().map(json_text).collect();
            format!("[{}]", items.join(", "))
        }
        JsonValue::Object(map) => {
            let mut members: Vec<(&String, &JsonValue)> = map.iter().collect();
            members.sort_by(|a, b| key_order(a.0, b.0));
            let members: Vec<String> = members
                .into_iter()
                .map(|(k, v)| format!("{}: {}", JsonValue::String(k.clone()), json_text(v)))
                .collect();
            format!("{{{}}}", members.join(", "))
        }
        scalar => scalar.to_string(),
    }
}

fn keys_equal(a: &JsonValue, b: &JsonValue) -> bool {
    if a == b {
        return true;
    }
    match (like_text(a), like_text(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn column_lookup_strips_own_table_and_walks_nested() {
        let row = json!({"name": "Ann", "metadata": {"color": "Red"}, "a.b": 1});
        assert_eq!(column_value("users", &row, "users.name"), Some(&json!("Ann")));
        assert_eq!(
            column_value("users", &row, "metadata.color"),
            Some(&json!("Red"))
        );
        assert_eq!(column_value("users", &row, "a.b"), Some(&json!(1)));
        assert_eq!(column_value("users", &row, "users.missing"), None);
    }

    #[test]
    fn json_values_text_only_for_objects() {
        assert_eq!(
            json_values_text(&json!({"b": 2, "a": "X", "zz": [1, {"k": null}]})).as_deref(),
            Some(r#"["X", 2, [1, {"k": null}]]"#)
        );
        assert_eq!(
            json_values_text(&json!({"team": "Red", "id": 1})).as_deref(),
            Some(r#"[1, "Red"]"#)
        );
        assert_eq!(
            json_values_text(&json!(r#"{"k":"v"}"#)).as_deref(),
            Some(r#"["v"]"#)
        );
        assert_eq!(json_values_text(&json!(["a"])), None);
        assert_eq!(json_values_text(&json!("plain")), None);
    }

    #[test]
    fn join_keys_compare_across_number_and_string() {
        assert!(keys_equal(&json!(7), &json!("7")));
        assert!(!keys_equal(&json!(7), &json!(8)));
        assert!(!keys_equal(&json!(null), &json!(0)));
    }

    #[test]
    fn rejects_non_object_rows() {
        let store = InMemoryStore::new();
        assert!(store.insert("users", json!(["x"])).is_err());
        assert_eq!(store.len("users"), 0);
    }
}
