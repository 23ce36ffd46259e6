use crate::errors::{Result, SearchError};
use crate::model::{RelationDescriptor, Schema};
use crate::util::wrap_identifier;
use crate::weights::Scope;

/// The query-building surface a search aspect mutates.
pub trait QueryContext {
    fn entity(&self) -> &str;

    fn scope(&self) -> Scope;

    /// Declared relation named `name` on the current entity, if any.
    fn relation(&self, name: &str) -> Option<&RelationDescriptor>;

    /// Columns that already carry a qualifier (contain a `.`) are returned as-is.
    fn qualify_column(&self, column: &str) -> String;

    fn where_like(&mut self, column: String, pattern: String);

    /// Matches when the JSON array of the document's top-level values,
    /// rendered as text, is LIKE `pattern`.
    fn where_json_like(&mut self, column: String, pattern: String);

    /// Constrain to rows having at least one related row along
    /// `relation_path` (dot-separated hops) that satisfies whatever `scope`
    /// adds to the nested context. Nothing is added when `scope` fails.
    fn where_has(
        &mut self,
        relation_path: &str,
        scope: &mut dyn FnMut(&mut Self) -> Result<()>,
    ) -> Result<()>
    where
        Self: Sized;
}

#[derive(Debug, Clone)]
pub enum Predicate<'s> {
    Like {
        column: String,
        pattern: String,
    },
    JsonLike {
        column: String,
        pattern: String,
    },
    Has {
        relation: String,
        descriptor: RelationDescriptor,
        parent_qualifier: String,
        query: Query<'s>,
    },
}

/// A `select *` over one entity's table with AND-ed predicates.
#[derive(Debug, Clone)]
pub struct Query<'s> {
    schema: &'s Schema,
    entity: String,
    table: String,
    // set when the table is already in scope, e.g. self relations
    alias: Option<String>,
    relation_path: Vec<String>,
    predicates: Vec<Predicate<'s>>,
}

struct Hop<'s> {
    name: String,
    descriptor: &'s RelationDescriptor,
    parent_qualifier: String,
    target_entity: String,
    target_table: String,
    alias: Option<String>,
}

impl<'s> Query<'s> {
    pub fn new(schema: &'s Schema, entity: &str) -> Result<Self> {
        let def = schema
            .entity(entity)
            .ok_or_else(|| SearchError::Schema(format!("unknown entity '{entity}'")))?;
        Ok(Self {
            schema,
            entity: entity.to_string(),
            table: def.table.clone(),
            alias: None,
            relation_path: Vec::new(),
            predicates: Vec::new(),
        })
    }

    fn nested(&self, hop: &Hop<'s>, relation_path: Vec<String>) -> Self {
        Self {
            schema: self.schema,
            entity: hop.target_entity.clone(),
            table: hop.target_table.clone(),
            alias: hop.alias.clone(),
            relation_path,
            predicates: Vec::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Name columns are qualified with: the alias if any, else the table.
    pub fn qualifier(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }

    pub fn predicates(&self) -> &[Predicate<'s>] {
        &self.predicates
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    // Resolve every hop up front so a bad path fails before anything is added.
    fn resolve_hops(&self, relation_path: &str) -> Result<Vec<Hop<'s>>> {
        let mut hops = Vec::new();
        let mut entity = self.entity.clone();
        let mut table = self.table.clone();
        let mut qualifier = self.qualifier().to_string();
        for name in relation_path.split('.') {
            if name.is_empty() {
                return Err(SearchError::Traversal(format!(
                    "empty segment in relation path '{relation_path}'"
                )));
            }
            let descriptor = self.schema.relation(&entity, name).ok_or_else(|| {
                SearchError::Traversal(format!("'{entity}' has no relation '{name}'"))
            })?;
            if !descriptor.kind.is_traversable() {
                return Err(SearchError::Traversal(format!(
                    "relation '{entity}.{name}' is {:?} and cannot be scoped",
                    descriptor.kind
                )));
            }
            let target_entity = descriptor.target.clone().ok_or_else(|| {
                SearchError::Traversal(format!("relation '{entity}.{name}' has no target"))
            })?;
            let target_table = self
                .schema
                .entity(&target_entity)
                .map(|e| e.table.clone())
                .ok_or_else(|| {
                    SearchError::Traversal(format!(
                        "relation '{entity}.{name}' targets unknown entity '{target_entity}'"
                    ))
                })?;
            let depth = self.relation_path.len() + hops.len() + 1;
            let alias = (target_table == table).then(|| format!("r{depth}"));
            let next_qualifier = alias.clone().unwrap_or_else(|| target_table.clone());
            hops.push(Hop {
                name: name.to_string(),
                descriptor,
                parent_qualifier: qualifier,
                target_entity: target_entity.clone(),
                target_table: target_table.clone(),
                alias,
            });
            entity = target_entity;
            table = target_table;
            qualifier = next_qualifier;
        }
        Ok(hops)
    }

    /// Render as SQL with `?` placeholders, returning the statement and its
    /// bindings in placeholder order.
    pub fn to_sql(&self) -> (String, Vec<String>) {
        let mut bindings = Vec::new();
        let mut sql = format!("select * from {}", wrap_identifier(&self.table));
        if !self.predicates.is_empty() {
            sql.push_str(" where ");
            sql.push_str(&self.render_predicates(&mut bindings));
        }
        (sql, bindings)
    }

    fn render_predicates(&self, bindings: &mut Vec<String>) -> String {
        self.predicates
            .iter()
            .map(|p| render_predicate(p, bindings))
            .collect::<Vec<_>>()
            .join(" and ")
    }
}

fn render_predicate(p: &Predicate<'_>, bindings: &mut Vec<String>) -> String {
    match p {
        Predicate::Like { column, pattern } => {
            bindings.push(pattern.clone());
            format!("{} like ?", wrap_identifier(column))
        }
        Predicate::JsonLike { column, pattern } => {
            bindings.push(pattern.clone());
            format!("json_extract({}, '$.*') like ?", wrap_identifier(column))
        }
        Predicate::Has {
            descriptor,
            parent_qualifier,
            query,
            ..
        } => {
            let (related_key, parent_key) = descriptor.join_keys();
            let from = match &query.alias {
                Some(alias) => format!(
                    "{} as {}",
                    wrap_identifier(&query.table),
                    wrap_identifier(alias)
                ),
                None => wrap_identifier(&query.table),
            };
            let mut sql = format!(
                "exists (select * from {} where {} = {}",
                from,
                wrap_identifier(&format!("{}.{}", query.qualifier(), related_key)),
                wrap_identifier(&format!("{parent_qualifier}.{parent_key}")),
            );
            if !query.predicates.is_empty() {
                sql.push_str(" and ");
                sql.push_str(&query.render_predicates(bindings));
            }
            sql.push(')');
            sql
        }
    }
}

impl<'s> QueryContext for Query<'s> {
    fn entity(&self) -> &str {
        &self.entity
    }

    fn scope(&self) -> Scope {
        Scope {
            entity: self.entity.clone(),
            relation_path: self.relation_path.clone(),
        }
    }

    fn relation(&self, name: &str) -> Option<&RelationDescriptor> {
        self.schema.relation(&self.entity, name)
    }

    fn qualify_column(&self, column: &str) -> String {
        if column.contains('.') {
            column.to_string()
        } else {
            format!("{}.{}", self.qualifier(), column)
        }
    }

    fn where_like(&mut self, column: String, pattern: String) {
        self.predicates.push(Predicate::Like { column, pattern });
    }

    fn where_json_like(&mut self, column: String, pattern: String) {
        self.predicates.push(Predicate::JsonLike { column, pattern });
    }

    fn where_has(
        &mut self,
        relation_path: &str,
        scope: &mut dyn FnMut(&mut Self) -> Result<()>,
    ) -> Result<()> {
        let hops = self.resolve_hops(relation_path)?;
        let mut path = self.relation_path.clone();
        path.extend(hops.iter().map(|h| h.name.clone()));

        let Some(last) = hops.last() else {
            return Err(SearchError::Traversal("empty relation path".into()));
        };
        let mut inner = self.nested(last, path.clone());
        scope(&mut inner)?;

        // fold inside-out: a.b.c => has(a, has(b, has(c, inner)))
        for (i, hop) in hops.iter().enumerate().rev() {
            let pred = Predicate::Has {
                relation: hop.name.clone(),
                descriptor: hop.descriptor.clone(),
                parent_qualifier: hop.parent_qualifier.clone(),
                query: inner,
            };
            if i == 0 {
                self.predicates.push(pred);
                return Ok(());
            }
            let parent = &hops[i - 1];
            path.pop();
            inner = self.nested(parent, path.clone());
            inner.predicates.push(pred);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::from_json_str(
            r#"{"entities":{
                "user":{"table":"users","relations":{
                    "orders":{"kind":"has_many","target":"order","foreign_key":"user_id"},
                    "subject":{"kind":"morph_to"}}},
                "order":{"table":"orders","relations":{
                    "items":{"kind":"has_many","target":"item","foreign_key":"order_id"},
                    "user":{"kind":"belongs_to","target":"user","foreign_key":"user_id"}}},
                "item":{"table":"items"}
            }}"#,
        )
        .unwrap()
    }

    #[test]
    fn qualifies_bare_columns_only() {
        let schema = schema();
        let q = Query::new(&schema, "user").unwrap();
        assert_eq!(q.qualify_column("name"), "users.name");
        assert_eq!(q.qualify_column("orders.status"), "orders.status");
    }

    #[test]
    fn renders_flat_predicates_with_bindings() {
        let schema = schema();
        let mut q = Query::new(&schema, "user").unwrap();
        q.where_like("users.name".into(), "%smith%".into());
        q.where_json_like("tags".into(), "%red%".into());
        let (sql, bindings) = q.to_sql();
        assert_eq!(
            sql,
            r#"select * from "users" where "users"."name" like ? and json_extract("tags", '$.*') like ?"#
        );
        assert_eq!(bindings, vec!["%smith%", "%red%"]);
    }

    #[test]
    fn multi_hop_where_has_nests_per_relation() {
        let schema = schema();
        let mut q = Query::new(&schema, "user").unwrap();
        q.where_has("orders.items", &mut |nested: &mut Query| {
            assert_eq!(nested.entity(), "item");
            assert_eq!(nested.scope().relation_path, vec!["orders", "items"]);
            nested.where_like("items.sku".into(), "%ab%".into());
            Ok(())
        })
        .unwrap();
        let (sql, bindings) = q.to_sql();
        assert_eq!(
            sql,
            concat!(
                r#"select * from "users" where exists (select * from "orders" where "orders"."user_id" = "users"."id" and "#,
                r#"exists (select * from "items" where "items"."order_id" = "orders"."id" and "items"."sku" like ?))"#
            )
        );
        assert_eq!(bindings, vec!["%ab%"]);
    }

    #[test]
    fn belongs_to_joins_on_parent_foreign_key() {
        let schema = schema();
        let mut q = Query::new(&schema, "order").unwrap();
        q.where_has("user", &mut |_: &mut Query| Ok(())).unwrap();
        let (sql, _) = q.to_sql();
        assert_eq!(
            sql,
            r#"select * from "orders" where exists (select * from "users" where "users"."id" = "orders"."user_id")"#
        );
    }

    #[test]
    fn failed_scope_adds_nothing() {
        let schema = schema();
        let mut q = Query::new(&schema, "user").unwrap();
        let err = q
            .where_has("orders", &mut |nested: &mut Query| {
                nested.where_like("orders.status".into(), "%x%".into());
                Err(SearchError::InvalidArgument("boom".into()))
            })
            .unwrap_err();
        assert!(matches!(err, SearchError::InvalidArgument(_)));
        assert!(q.is_empty());
    }

    #[test]
    fn unresolvable_paths_are_traversal_errors() {
        let schema = schema();
        let mut q = Query::new(&schema, "user").unwrap();
        let mut noop = |_: &mut Query<'_>| -> Result<()> { Ok(()) };
        for path in ["subject", "orders.nope", "orders..items", "missing"] {
            let err = q.where_has(path, &mut noop).unwrap_err();
            assert!(matches!(err, SearchError::Traversal(_)), "{path}");
        }
        assert!(q.is_empty());
    }

    #[test]
    fn self_relation_aliases_the_nested_table() {
        let schema = Schema::from_json_str(
            r#"{"entities":{"user":{"table":"users","relations":{
                "friends":{"kind":"has_many","target":"user","foreign_key":"friend_of"}}}}}"#,
        )
        .unwrap();
        let mut q = Query::new(&schema, "user").unwrap();
        q.where_has("friends.friends", &mut |nested: &mut Query| {
            assert_eq!(nested.qualifier(), "r2");
            let column = nested.qualify_column("name");
            nested.where_like(column, "%x%".into());
            Ok(())
        })
        .unwrap();
        let (sql, _) = q.to_sql();
        assert_eq!(
            sql,
            concat!(
                r#"select * from "users" where exists (select * from "users" as "r1" where "r1"."friend_of" = "users"."id" and "#,
                r#"exists (select * from "users" as "r2" where "r2"."friend_of" = "r1"."id" and "r2"."name" like ?))"#
            )
        );
    }
}
