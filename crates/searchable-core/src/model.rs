use crate::errors::{Result, SearchError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub type EntityName = String;
pub type RelationName = String;

fn default_local_key() -> String {
    "id".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    HasOne,
    HasMany,
    BelongsTo,
    // polymorphic; no fixed target to scope into
    MorphTo,
}

impl RelationKind {
    pub fn is_traversable(self) -> bool {
        !matches!(self, RelationKind::MorphTo)
    }
}

/// A relation declared on an entity.
///
/// For `HasOne`/`HasMany` the `foreign_key` lives on the related table and
/// points at `local_key` on the parent. For `BelongsTo` the `foreign_key`
/// lives on the parent and `local_key` is the owner key on the related table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDescriptor {
    pub kind: RelationKind,
    #[serde(default)]
    pub target: Option<EntityName>,
    #[serde(default)]
    pub foreign_key: String,
    #[serde(default = "default_local_key")]
    pub local_key: String,
}

impl RelationDescriptor {
    /// `(related_key, parent_key)`: the column on the related table and the
    /// column on the parent table that must be equal.
    pub fn join_keys(&self) -> (&str, &str) {
        match self.kind {
            RelationKind::BelongsTo => (self.local_key.as_str(), self.foreign_key.as_str()),
            _ => (self.foreign_key.as_str(), self.local_key.as_str()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntitySchema {
    pub table: String,
    #[serde(default)]
    pub relations: BTreeMap<RelationName, RelationDescriptor>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    pub entities: BTreeMap<EntityName, EntitySchema>,
}

impl Schema {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let schema: Schema = serde_json::from_str(s)?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn entity(&self, name: &str) -> Option<&EntitySchema> {
        self.entities.get(name)
    }

    pub fn relation(&self, entity: &str, name: &str) -> Option<&RelationDescriptor> {
        self.entities.get(entity)?.relations.get(name)
    }

    /// Every traversable relation must name a declared target entity and a
    /// foreign key. `MorphTo` relations are left alone.
    pub fn validate(&self) -> Result<()> {
        for (entity_name, entity) in self.entities.iter() {
            if entity.table.is_empty() {
                return Err(SearchError::Schema(format!(
                    "entity '{entity_name}' has an empty table name"
                )));
            }
            for (rel_name, rel) in entity.relations.iter() {
                if !rel.kind.is_traversable() {
                    continue;
                }
                let target = rel.target.as_deref().ok_or_else(|| {
                    SearchError::Schema(format!(
                        "relation '{entity_name}.{rel_name}' has no target"
                    ))
                })?;
                if !self.entities.contains_key(target) {
                    return Err(SearchError::Schema(format!(
                        "relation '{entity_name}.{rel_name}' targets unknown entity '{target}'"
                    )));
                }
                if rel.foreign_key.is_empty() {
                    return Err(SearchError::Schema(format!(
                        "relation '{entity_name}.{rel_name}' has no foreign key"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHOP: &str = r#"{
        "entities": {
            "user": {
                "table": "users",
                "relations": {
                    "orders": { "kind": "has_many", "target": "order", "foreign_key": "user_id" },
                    "owner": { "kind": "morph_to" }
                }
            },
            "order": {
                "table": "orders",
                "relations": {
                    "user": { "kind": "belongs_to", "target": "user", "foreign_key": "user_id" }
                }
            }
        }
    }"#;

    #[test]
    fn parses_relations_with_defaults() {
        let schema = Schema::from_json_str(SHOP).unwrap();
        let orders = schema.relation("user", "orders").unwrap();
        assert_eq!(orders.kind, RelationKind::HasMany);
        assert_eq!(orders.target.as_deref(), Some("order"));
        assert_eq!(orders.local_key, "id");
        assert!(!schema.relation("user", "owner").unwrap().kind.is_traversable());
        assert!(schema.relation("user", "missing").is_none());
    }

    #[test]
    fn rejects_unknown_target() {
        let raw = r#"{"entities":{"user":{"table":"users","relations":{
            "posts":{"kind":"has_many","target":"post","foreign_key":"user_id"}}}}}"#;
        let err = Schema::from_json_str(raw).unwrap_err();
        assert!(matches!(err, SearchError::Schema(_)));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.json");
        std::fs::write(&path, SHOP).unwrap();
        let schema = Schema::load(&path).unwrap();
        assert_eq!(schema.entity("order").unwrap().table, "orders");
    }
}
