use crate::errors::{Result, SearchError};
use crate::metrics::{CONDITIONS_TOTAL, REJECTED_TOTAL};
use crate::query::QueryContext;
use crate::util::{contains_pattern, normalize_term};
use crate::weights::Weights;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, warn};

pub const DEFAULT_WEIGHT: u32 = 1;

/// What to do with the weight of a condition reached through a relation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationWeights {
    /// Relation-scoped conditions never register a weight.
    #[default]
    Suppress,
    /// The leaf condition registers its nested scope once per call.
    Register,
}

impl FromStr for RelationWeights {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "suppress" => Ok(Self::Suppress),
            "register" => Ok(Self::Register),
            other => Err(SearchError::InvalidArgument(format!(
                "unknown relation weight policy '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Match against all top-level JSON values instead of the column itself.
    #[serde(default)]
    pub ignore_keys: bool,
    #[serde(default)]
    pub relation_weights: RelationWeights,
}

impl SearchOptions {
    /// Reads `SEARCHABLE_IGNORE_KEYS` and `SEARCHABLE_RELATION_WEIGHTS`,
    /// falling back to defaults for unset or unparsable values.
    pub fn from_env() -> Self {
        let ignore_keys = std::env::var("SEARCHABLE_IGNORE_KEYS")
            .ok()
            .and_then(|s| parse_flag(&s))
            .unwrap_or(false);
        let relation_weights = std::env::var("SEARCHABLE_RELATION_WEIGHTS")
            .ok()
            .and_then(|s| s.parse::<RelationWeights>().ok())
            .unwrap_or_default();
        Self {
            ignore_keys,
            relation_weights,
        }
    }
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Qualified columns touched through relation scopes during one call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trail(Vec<String>);

impl Trail {
    pub fn push(&mut self, column: String) {
        self.0.push(column);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.0
    }
}

/// Case-insensitive substring search on a (possibly JSON) property,
/// following relation paths such as `orders.items.sku`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchJson {
    options: SearchOptions,
}

impl SearchJson {
    pub fn new(ignore_keys: bool) -> Self {
        Self::with_options(SearchOptions {
            ignore_keys,
            ..SearchOptions::default()
        })
    }

    pub fn with_options(options: SearchOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> SearchOptions {
        self.options
    }

    pub fn apply_default_weight<Q: QueryContext>(
        &self,
        query: &mut Q,
        weights: &mut Weights,
        property: &str,
        term: &str,
    ) -> Result<Trail> {
        self.apply(query, weights, property, term, DEFAULT_WEIGHT)
    }

    /// Add the condition to `query`, registering `weight` in `weights` when
    /// the policy allows. Returns the relation trail of this call.
    pub fn apply<Q: QueryContext>(
        &self,
        query: &mut Q,
        weights: &mut Weights,
        property: &str,
        term: &str,
        weight: u32,
    ) -> Result<Trail> {
        if let Err(e) = validate(property, term, weight) {
            REJECTED_TOTAL.with_label_values(&["invalid_argument"]).inc();
            warn!(property, weight, "rejected search: {}", e);
            return Err(e);
        }
        let term = normalize_term(term);
        let mut trail = Trail::default();
        if let Err(e) = self.apply_term(query, weights, property, &term, weight, &mut trail) {
            REJECTED_TOTAL.with_label_values(&["traversal"]).inc();
            return Err(e);
        }
        Ok(trail)
    }

    fn apply_term<Q: QueryContext>(
        &self,
        query: &mut Q,
        weights: &mut Weights,
        property: &str,
        term: &str,
        weight: u32,
        trail: &mut Trail,
    ) -> Result<()> {
        if is_relation_property(query, property) {
            return self.with_relation_constraint(query, weights, property, term, weight, trail);
        }
        self.apply_leaf(query, weights, property, term, weight, trail)
    }

    fn apply_leaf<Q: QueryContext>(
        &self,
        query: &mut Q,
        weights: &mut Weights,
        property: &str,
        term: &str,
        weight: u32,
        trail: &Trail,
    ) -> Result<()> {
        let pattern = contains_pattern(term);
        if self.options.ignore_keys {
            debug!(entity = query.entity(), property, "json substring condition");
            query.where_json_like(property.to_string(), pattern);
            CONDITIONS_TOTAL.with_label_values(&["json"]).inc();
        } else {
            let column = query.qualify_column(property);
            debug!(entity = query.entity(), %column, "like condition");
            query.where_like(column, pattern);
            CONDITIONS_TOTAL.with_label_values(&["like"]).inc();
        }

        let register =
            trail.is_empty() || self.options.relation_weights == RelationWeights::Register;
        weights.register_if(register, query.scope(), weight);
        Ok(())
    }

    fn with_relation_constraint<Q: QueryContext>(
        &self,
        query: &mut Q,
        weights: &mut Weights,
        property: &str,
        term: &str,
        weight: u32,
        trail: &mut Trail,
    ) -> Result<()> {
        let Some((relation, leaf)) = property.rsplit_once('.') else {
            return Err(SearchError::InvalidArgument(format!(
                "'{property}' has no relation segment"
            )));
        };
        debug!(entity = query.entity(), relation, leaf, "scoping to relation");
        CONDITIONS_TOTAL.with_label_values(&["relation"]).inc();
        query.where_has(relation, &mut |nested: &mut Q| {
            let qualified = nested.qualify_column(leaf);
            trail.push(qualified.clone());
            // already qualified against `nested`; its head may collide with a relation name
            self.apply_leaf(nested, weights, &qualified, term, weight, trail)
        })
    }
}

/// True when the first segment of a dotted `property` is a declared
/// relation of the query's entity.
pub fn is_relation_property<Q: QueryContext>(query: &Q, property: &str) -> bool {
    let Some((head, _)) = property.split_once('.') else {
        return false;
    };
    query.relation(head).is_some()
}

fn validate(property: &str, term: &str, weight: u32) -> Result<()> {
    if property.trim().is_empty() {
        return Err(SearchError::InvalidArgument("property path is empty".into()));
    }
    if property.starts_with('.') || property.ends_with('.') {
        return Err(SearchError::InvalidArgument(format!(
            "property path '{property}' has an empty segment"
        )));
    }
    if term.is_empty() {
        return Err(SearchError::InvalidArgument("search term is empty".into()));
    }
    if weight == 0 {
        return Err(SearchError::InvalidArgument("weight must be positive".into()));
    }
    Ok(())
}
