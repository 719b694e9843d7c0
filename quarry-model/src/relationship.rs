use serde::{Deserialize, Serialize};

/// Cardinality of a relationship, seen from its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    /// The owner holds a collection of related instances.
    OneToMany,
    /// The owner holds a single reference; the mirror of `OneToMany`.
    ManyToOne,
}

/// What happens to related instances when they lose their owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadePolicy {
    /// Children outlive their parent; their foreign key is cleared.
    #[default]
    None,
    /// Children removed from the collection, or whose parent is deleted,
    /// are deleted too.
    DeleteOrphan,
}

/// A declared link between two entity types.
///
/// For `OneToMany`, `name` is the owner's collection field and
/// `back_populates` is the foreign-key column on `target` that refers back
/// to the owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipDescriptor {
    pub owner: String,
    pub name: String,
    pub target: String,
    pub cardinality: Cardinality,
    pub back_populates: String,
    #[serde(default)]
    pub cascade: CascadePolicy,
}

impl RelationshipDescriptor {
    /// A one-to-many collection named `name` of `target` instances, linked
    /// through `target.back_populates`. The owner is filled in by
    /// [`EntitySchema::relationship`](crate::EntitySchema::relationship).
    pub fn one_to_many(name: &str, target: &str, back_populates: &str) -> Self {
        Self {
            owner: String::new(),
            name: name.into(),
            target: target.into(),
            cardinality: Cardinality::OneToMany,
            back_populates: back_populates.into(),
            cascade: CascadePolicy::None,
        }
    }

    #[must_use]
    pub const fn cascade(mut self, cascade: CascadePolicy) -> Self {
        self.cascade = cascade;
        self
    }

    /// Shorthand for `cascade(CascadePolicy::DeleteOrphan)`.
    #[must_use]
    pub const fn delete_orphan(self) -> Self {
        self.cascade(CascadePolicy::DeleteOrphan)
    }

    /// The many-to-one view of this relationship from the target side.
    pub fn mirror(&self) -> Self {
        let cardinality = match self.cardinality {
            Cardinality::OneToMany => Cardinality::ManyToOne,
            Cardinality::ManyToOne => Cardinality::OneToMany,
        };
        Self {
            owner: self.target.clone(),
            name: self.back_populates.clone(),
            target: self.owner.clone(),
            cardinality,
            back_populates: self.name.clone(),
            cascade: CascadePolicy::None,
        }
    }

    pub const fn is_delete_orphan(&self) -> bool {
        matches!(self.cascade, CascadePolicy::DeleteOrphan)
    }
}
