use searchable_core::{Query, Result};
use serde_json::Value as JsonValue;

/// Row storage that can evaluate composed search queries.
pub trait Storage: Send + Sync + 'static {
    fn insert(&self, table: &str, row: JsonValue) -> Result<()>;

    /// Rows of the query's table satisfying every predicate, in insertion order.
    fn query(&self, query: &Query<'_>) -> Result<Vec<JsonValue>>;

    fn len(&self, table: &str) -> usize;

    fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }
}
