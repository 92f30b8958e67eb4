use crate::entity::Entity;
use crate::error::Error;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

/// Entities of a device, keyed by identifier
///
/// Filled once at startup; an identifier is never reassigned.
#[derive(Default)]
pub struct Registry {
    entities: BTreeMap<String, Entity>,
}

impl Registry {
    /// Inserts an entity, failing with [`Error::DuplicateEntity`] if its identifier is taken
    pub fn insert(&mut self, entity: Entity) -> Result<&Entity, Error> {
        match self.entities.entry(entity.identifier().to_string()) {
            Entry::Occupied(entry) => Err(Error::DuplicateEntity(entry.key().clone())),
            Entry::Vacant(entry) => Ok(entry.insert(entity)),
        }
    }

    pub fn get(&self, identifier: &str) -> Option<&Entity> {
        self.entities.get(identifier)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.entities.contains_key(identifier)
    }

    /// Identifiers of the registered entities, sorted
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl IntoIterator for Registry {
    type Item = Entity;
    type IntoIter = std::collections::btree_map::IntoValues<String, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.into_values()
    }
}
