//! In-Memory Collection
//!
//! The canonical in-memory state for one entity kind. Ordered (insertion
//! order reflects display order), with a unique-id invariant: no entity
//! id appears more than once.

use std::collections::HashSet;

use super::entity::Entity;

/// An ordered collection of entities keyed by id
#[derive(Debug, Clone)]
pub struct Collection<T: Entity> {
    entries: Vec<T>,
}

impl<T: Entity> Collection<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Build a collection from a list of entities
    ///
    /// Duplicate ids collapse to the last occurrence, preserving the
    /// position of the first.
    pub fn from_entities(entities: Vec<T>) -> Self {
        let mut collection = Self::new();
        for entity in entities {
            collection.upsert(entity);
        }
        collection
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find an entity by id
    pub fn get(&self, id: &T::Id) -> Option<&T> {
        self.entries.iter().find(|e| e.id() == *id)
    }

    /// Insert a new entity or replace the existing one with the same id
    pub fn upsert(&mut self, entity: T) {
        match self.entries.iter_mut().find(|e| e.id() == entity.id()) {
            Some(existing) => *existing = entity,
            None => self.entries.push(entity),
        }
    }

    /// Remove an entity by id, returning whether it was present
    pub fn remove(&mut self, id: &T::Id) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id() != *id);
        self.entries.len() != before
    }

    /// Replace the whole content (used by restore flows)
    pub fn replace_all(&mut self, entities: Vec<T>) {
        self.entries.clear();
        for entity in entities {
            self.upsert(entity);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// The set of ids currently held
    pub fn ids(&self) -> HashSet<T::Id> {
        self.entries.iter().map(|e| e.id()).collect()
    }

    /// A cloned snapshot of the current state, in display order
    pub fn snapshot(&self) -> Vec<T> {
        self.entries.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }
}

impl<T: Entity> Default for Collection<T> {
    fn default() -> Self {
        Self::new()
    }
}
