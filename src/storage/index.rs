use std::collections::HashMap;

use crate::core::{Entity, EntityId, Result, StoreError};

/// Secondary indexes for one table: case-insensitive unique-key slots,
/// parent→children adjacency, bucket membership, and the compound
/// combination map.
///
/// Indexes track non-deleted entities only; soft delete removes an entity
/// from every index here while the primary table keeps the row.
#[derive(Debug)]
pub(crate) struct IndexSet {
    unique: HashMap<&'static str, HashMap<String, EntityId>>,
    children: HashMap<EntityId, Vec<EntityId>>,
    buckets: HashMap<String, Vec<EntityId>>,
    combos: HashMap<String, EntityId>,
}

fn norm(value: &str) -> String {
    value.trim().to_lowercase()
}

impl IndexSet {
    pub fn new() -> Self {
        Self {
            unique: HashMap::new(),
            children: HashMap::new(),
            buckets: HashMap::new(),
            combos: HashMap::new(),
        }
    }

    /// Reject the insert/update if any of the entity's keys is owned by a
    /// different entity. Checked before any index is touched, so a failure
    /// leaves everything unchanged.
    pub fn check_conflicts<T: Entity>(&self, entity: &T, ignore: Option<EntityId>) -> Result<()> {
        for (slot, value) in entity.unique_keys() {
            if let Some(owner) = self.unique.get(slot).and_then(|m| m.get(&norm(&value)))
                && Some(*owner) != ignore
            {
                return Err(StoreError::DuplicateKey { slot, value });
            }
        }
        if let Some(combo) = entity.combo_key()
            && let Some(owner) = self.combos.get(&combo)
            && Some(*owner) != ignore
        {
            return Err(StoreError::DuplicateCombination(combo));
        }
        Ok(())
    }

    /// Index a non-deleted entity. The caller must have run
    /// [`check_conflicts`](Self::check_conflicts) first.
    pub fn insert<T: Entity>(&mut self, entity: &T) {
        let id = entity.id();
        for (slot, value) in entity.unique_keys() {
            self.unique.entry(slot).or_default().insert(norm(&value), id);
        }
        if let Some(parent) = entity.parent_id() {
            self.children.entry(parent).or_default().push(id);
        }
        if let Some(bucket) = entity.bucket_key() {
            self.buckets.entry(bucket).or_default().push(id);
        }
        if let Some(combo) = entity.combo_key() {
            self.combos.insert(combo, id);
        }
    }

    /// Drop every index entry owned by this entity, using the keys of the
    /// version passed in (the stored version, for updates).
    pub fn remove<T: Entity>(&mut self, entity: &T) {
        let id = entity.id();
        for (slot, value) in entity.unique_keys() {
            if let Some(slot_map) = self.unique.get_mut(slot)
                && slot_map.get(&norm(&value)) == Some(&id)
            {
                slot_map.remove(&norm(&value));
            }
        }
        if let Some(parent) = entity.parent_id()
            && let Some(siblings) = self.children.get_mut(&parent)
        {
            siblings.retain(|child| *child != id);
            if siblings.is_empty() {
                self.children.remove(&parent);
            }
        }
        if let Some(bucket) = entity.bucket_key()
            && let Some(members) = self.buckets.get_mut(&bucket)
        {
            members.retain(|member| *member != id);
            if members.is_empty() {
                self.buckets.remove(&bucket);
            }
        }
        if let Some(combo) = entity.combo_key()
            && self.combos.get(&combo) == Some(&id)
        {
            self.combos.remove(&combo);
        }
    }

    /// Rebuild every index from scratch in one pass over the table.
    pub fn rebuild<'a, T: Entity, I: Iterator<Item = &'a T>>(&mut self, entities: I) {
        self.unique.clear();
        self.children.clear();
        self.buckets.clear();
        self.combos.clear();
        for entity in entities {
            if !entity.is_deleted() {
                self.insert(entity);
            }
        }
    }

    pub fn clear(&mut self) {
        self.unique.clear();
        self.children.clear();
        self.buckets.clear();
        self.combos.clear();
    }

    pub fn unique_owner(&self, slot: &str, key: &str) -> Option<EntityId> {
        self.unique.get(slot).and_then(|m| m.get(&norm(key))).copied()
    }

    pub fn children_of(&self, parent: EntityId) -> &[EntityId] {
        self.children.get(&parent).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn bucket(&self, key: &str) -> &[EntityId] {
        self.buckets.get(key).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Project;

    #[test]
    fn test_unique_lookup_is_case_insensitive() {
        let mut indexes = IndexSet::new();
        let project = Project::new("Billing").with_nickname("ACME");
        indexes.insert(&project);

        assert_eq!(indexes.unique_owner("nickname", "acme"), Some(project.meta.id));
        assert_eq!(indexes.unique_owner("nickname", " ACME "), Some(project.meta.id));
        assert_eq!(indexes.unique_owner("nickname", "other"), None);
    }

    #[test]
    fn test_conflict_ignores_self() {
        let mut indexes = IndexSet::new();
        let project = Project::new("Billing").with_nickname("ACME");
        indexes.insert(&project);

        assert!(indexes.check_conflicts(&project, Some(project.meta.id)).is_ok());
        let other = Project::new("Shadow").with_nickname("acme");
        assert!(indexes.check_conflicts(&other, None).is_err());
    }

    #[test]
    fn test_remove_only_drops_own_keys() {
        let mut indexes = IndexSet::new();
        let a = Project::new("A").with_nickname("ACME");
        indexes.insert(&a);

        // A stale copy of a different entity carrying the same key must not
        // evict the current owner.
        let stale = Project::new("B").with_nickname("ACME");
        indexes.remove(&stale);
        assert_eq!(indexes.unique_owner("nickname", "acme"), Some(a.meta.id));

        indexes.remove(&a);
        assert_eq!(indexes.unique_owner("nickname", "acme"), None);
    }
}
