//! Declarative table associations.
//!
//! Associations are registered per table at setup and looked up by every record of that
//! table. A relation is data, not a generated method: records resolve it through
//! [`Record::load_relation`](crate::Record::load_relation) or by name through
//! [`Record::get_related`](crate::Record::get_related).

use heck::ToUpperCamelCase;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// This row's `foreign_key` column points at `table.primary_key`.
    BelongsTo,
    /// Rows of `table` point back at this row through `table.foreign_key`.
    HasMany,
}

/// One association from the owning table to `table`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub kind: RelationKind,
    pub table: String,
    pub foreign_key: String,
    /// Parent-side key column (`id` unless overridden).
    pub primary_key: String,
}

impl Relation {
    pub fn belongs_to(table: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            kind: RelationKind::BelongsTo,
            table: table.into(),
            foreign_key: foreign_key.into(),
            primary_key: "id".to_string(),
        }
    }

    pub fn has_many(table: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            kind: RelationKind::HasMany,
            table: table.into(),
            foreign_key: foreign_key.into(),
            primary_key: "id".to_string(),
        }
    }

    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    /// Capitalized table name used in accessor names: `order_items` → `OrderItems`.
    pub fn accessor_suffix(&self) -> String {
        self.table.to_upper_camel_case()
    }

    /// Eager accessor name, e.g. `getOrderItems`.
    pub fn getter_name(&self) -> String {
        format!("get{}", self.accessor_suffix())
    }

    /// Lazy accessor name, e.g. `findOrderItems`.
    pub fn finder_name(&self) -> String {
        format!("find{}", self.accessor_suffix())
    }

    /// Column on the owning row whose value keys the lookup.
    pub fn local_key(&self) -> &str {
        match self.kind {
            RelationKind::BelongsTo => &self.foreign_key,
            RelationKind::HasMany => &self.primary_key,
        }
    }

    /// Column on the related table matched against the local key.
    pub fn remote_key(&self) -> &str {
        match self.kind {
            RelationKind::BelongsTo => &self.primary_key,
            RelationKind::HasMany => &self.foreign_key,
        }
    }

    /// Whether `name` refers to this relation: the table name, its capitalized form, or
    /// either accessor name.
    pub fn matches(&self, name: &str) -> bool {
        name == self.table
            || name == self.accessor_suffix()
            || name == self.getter_name()
            || name == self.finder_name()
    }
}

/// The association config of one table.
///
/// ```ignore
/// let assoc = Associations::new()
///     .belongs_to("protos", "proto_id")
///     .has_many("order_items", "item_id");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Associations {
    relations: Vec<Relation>,
}

impl Associations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn belongs_to(mut self, table: &str, foreign_key: &str) -> Self {
        self.relations.push(Relation::belongs_to(table, foreign_key));
        self
    }

    pub fn has_many(mut self, table: &str, foreign_key: &str) -> Self {
        self.relations.push(Relation::has_many(table, foreign_key));
        self
    }

    pub fn relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub fn find(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.matches(name))
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}

/// Process-wide table → associations map.
///
/// The first registration for a table wins; later ones are ignored.
#[derive(Debug, Default)]
pub struct AssociationRegistry {
    tables: RwLock<HashMap<String, Arc<Associations>>>,
}

impl AssociationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table's associations. Returns `false` if the table was already registered.
    pub fn register(&self, table: &str, associations: Associations) -> bool {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        if tables.contains_key(table) {
            return false;
        }
        tables.insert(table.to_string(), Arc::new(associations));
        true
    }

    pub fn get(&self, table: &str) -> Option<Arc<Associations>> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(table)
            .cloned()
    }
}
