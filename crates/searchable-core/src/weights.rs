use serde::{Deserialize, Serialize};

/// Identifies the query context a condition was applied to: the entity and
/// the relation path walked from the root query to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub entity: String,
    #[serde(default)]
    pub relation_path: Vec<String>,
}

impl Scope {
    pub fn root(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            relation_path: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.relation_path.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightEntry {
    pub scope: Scope,
    pub weight: u32,
}

/// Applied conditions that should contribute to a relevance score.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Weights(pub Vec<WeightEntry>);

impl Weights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, scope: Scope, weight: u32) {
        self.0.push(WeightEntry { scope, weight });
    }

    pub fn register_if(&mut self, condition: bool, scope: Scope, weight: u32) {
        if condition {
            self.register(scope, weight);
        }
    }

    pub fn entries(&self) -> &[WeightEntry] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, scope: &Scope, weight: u32) -> bool {
        self.0.iter().any(|e| &e.scope == scope && e.weight == weight)
    }

    pub fn total(&self) -> u64 {
        self.0.iter().map(|e| e.weight as u64).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_if_skips_false_condition() {
        let mut w = Weights::new();
        w.register_if(false, Scope::root("user"), 3);
        assert!(w.is_empty());
        assert!(Scope::root("user").is_root());
        w.register_if(true, Scope::root("user"), 3);
        w.register(Scope::root("order"), 2);
        assert_eq!(w.len(), 2);
        assert!(w.contains(&Scope::root("user"), 3));
        assert!(!w.contains(&Scope::root("user"), 2));
        assert_eq!(w.total(), 5);
    }
}
