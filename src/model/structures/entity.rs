use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Entities are referenced by id everywhere inside the engine; attributes
/// live in the host's catalog and are only looked up for display purposes.
pub type EntityId = i32;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntityAttributes {
    pub name: String,
    pub category: Option<String>
}

/// Filter applied when listing the population. `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct CatalogFilter {
    pub category: Option<String>
}

impl CatalogFilter {
    pub fn all() -> CatalogFilter {
        CatalogFilter::default()
    }

    pub fn category(category: &str) -> CatalogFilter {
        CatalogFilter {
            category: Some(category.to_string())
        }
    }

    fn matches(&self, attributes: &EntityAttributes) -> bool {
        match &self.category {
            Some(c) => attributes.category.as_deref() == Some(c.as_str()),
            None => true
        }
    }
}

/// Read-only entity catalog supplied by the host. The engine never mutates
/// catalog data; it resolves ids through `lookup` and scopes the candidate
/// population through `list_population`.
pub trait EntityCatalog {
    fn lookup(&self, id: EntityId) -> Option<EntityAttributes>;

    /// Ids of all entities matching the filter, in a stable order.
    fn list_population(&self, filter: &CatalogFilter) -> Vec<EntityId>;
}

/// HashMap-backed catalog. Iteration order is made deterministic by sorting
/// on id, so two sessions over the same catalog see the same population.
pub struct InMemoryCatalog {
    entries: HashMap<EntityId, EntityAttributes>
}

impl InMemoryCatalog {
    pub fn new(entries: HashMap<EntityId, EntityAttributes>) -> InMemoryCatalog {
        InMemoryCatalog { entries }
    }

    pub fn from_names<S: Into<String>>(names: Vec<(EntityId, S)>) -> InMemoryCatalog {
        let entries = names
            .into_iter()
            .map(|(id, name)| {
                (
                    id,
                    EntityAttributes {
                        name: name.into(),
                        category: None
                    }
                )
            })
            .collect();

        InMemoryCatalog { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl EntityCatalog for InMemoryCatalog {
    fn lookup(&self, id: EntityId) -> Option<EntityAttributes> {
        self.entries.get(&id).cloned()
    }

    fn list_population(&self, filter: &CatalogFilter) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self
            .entries
            .iter()
            .filter(|(_, attributes)| filter.matches(attributes))
            .map(|(id, _)| *id)
            .collect();

        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> InMemoryCatalog {
        let mut entries = HashMap::new();
        entries.insert(
            1,
            EntityAttributes {
                name: "alpha".to_string(),
                category: Some("legacy".to_string())
            }
        );
        entries.insert(
            2,
            EntityAttributes {
                name: "beta".to_string(),
                category: Some("modern".to_string())
            }
        );
        entries.insert(
            3,
            EntityAttributes {
                name: "gamma".to_string(),
                category: Some("modern".to_string())
            }
        );
        InMemoryCatalog::new(entries)
    }

    #[test]
    fn test_lookup() {
        let catalog = catalog();
        assert_eq!(catalog.lookup(1).unwrap().name, "alpha");
        assert_eq!(catalog.lookup(99), None);
    }

    #[test]
    fn test_list_population_sorted() {
        let catalog = catalog();
        assert_eq!(catalog.list_population(&CatalogFilter::all()), vec![1, 2, 3]);
    }

    #[test]
    fn test_list_population_filtered() {
        let catalog = catalog();
        assert_eq!(catalog.list_population(&CatalogFilter::category("modern")), vec![2, 3]);
    }
}
