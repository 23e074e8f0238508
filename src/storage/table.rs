use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::core::{Entity, EntityId, EntityMeta, Result, StoreError};

use super::events::{EventBus, StoreEvent, Subscription};
use super::index::IndexSet;
use super::options::StoreOptions;
use super::persist::{self, Writer};

struct TableInner<T: Entity> {
    rows: HashMap<EntityId, T>,
    indexes: IndexSet,
}

/// In-memory indexed table for one entity type, with debounced JSON
/// persistence and a change-notification bus.
///
/// One exclusive lock guards the primary table together with all secondary
/// indexes, so every reader observes a consistent snapshot and cross-index
/// consistency never needs multi-lock coordination. Stores are independent
/// of one another.
///
/// # Examples
///
/// ```no_run
/// use trackstore::{Project, Store, StoreOptions};
///
/// # fn main() -> trackstore::Result<()> {
/// let store: Store<Project> = Store::open("data/projects.json", StoreOptions::default())?;
/// let project = store.create(Project::new("Billing").with_nickname("ACME"))?;
/// assert!(store.get_by_key("nickname", "acme")?.is_some());
/// store.flush();
/// # Ok(())
/// # }
/// ```
pub struct Store<T: Entity> {
    inner: Arc<Mutex<TableInner<T>>>,
    events: EventBus<T>,
    writer: Writer,
    path: PathBuf,
}

impl<T: Entity> Store<T> {
    /// Open the store, loading the data file synchronously.
    ///
    /// An absent file is a first run and yields an empty table; a malformed
    /// file is quarantined alongside the original path and the store starts
    /// empty.
    pub fn open(path: impl Into<PathBuf>, options: StoreOptions) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let entities = persist::load_entities::<T>(&path);
        let mut table = TableInner {
            rows: HashMap::new(),
            indexes: IndexSet::new(),
        };
        for entity in entities {
            table.rows.insert(entity.id(), entity);
        }
        {
            let TableInner { rows, indexes } = &mut table;
            indexes.rebuild(rows.values());
        }

        let inner = Arc::new(Mutex::new(table));
        let snapshot_inner = inner.clone();
        let writer = Writer::spawn::<T, _>(
            path.clone(),
            options.debounce,
            options.backup_keep,
            move || {
                snapshot_inner
                    .lock()
                    .ok()
                    .map(|table| persist::stable_order(table.rows.values().cloned().collect()))
            },
        )?;

        let store = Self {
            inner,
            events: EventBus::new(),
            writer,
            path,
        };
        store.events.enqueue(StoreEvent::Reloaded);
        store.events.drain();
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Register a change listener. The returned handle is the
    /// subscription's lifetime; drop it to detach.
    pub fn subscribe(
        &self,
        callback: impl Fn(&StoreEvent<T>) + Send + Sync + 'static,
    ) -> Subscription<T> {
        self.events.subscribe(callback)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn get(&self, id: EntityId) -> Result<Option<T>> {
        let table = self.inner.lock()?;
        Ok(table.rows.get(&id).cloned())
    }

    /// Entities matching `predicate`, in display order.
    pub fn list<F>(&self, predicate: F, include_deleted: bool) -> Result<Vec<T>>
    where
        F: Fn(&T) -> bool,
    {
        let table = self.inner.lock()?;
        let mut entities: Vec<T> = table
            .rows
            .values()
            .filter(|entity| (include_deleted || !entity.is_deleted()) && predicate(entity))
            .cloned()
            .collect();
        drop(table);
        entities.sort_by(|a, b| a.display_cmp(b));
        Ok(entities)
    }

    pub fn all(&self, include_deleted: bool) -> Result<Vec<T>> {
        self.list(|_| true, include_deleted)
    }

    /// Case-insensitive unique-key lookup. Only non-deleted entities own
    /// keys, so a soft-deleted entity is never returned here.
    pub fn get_by_key(&self, slot: &str, key: &str) -> Result<Option<T>> {
        let table = self.inner.lock()?;
        Ok(table
            .indexes
            .unique_owner(slot, key)
            .and_then(|id| table.rows.get(&id).cloned()))
    }

    /// Non-deleted children of `parent`, in display order.
    pub fn children_of(&self, parent: EntityId) -> Result<Vec<T>> {
        let table = self.inner.lock()?;
        let mut entities: Vec<T> = table
            .indexes
            .children_of(parent)
            .iter()
            .filter_map(|id| table.rows.get(id))
            .cloned()
            .collect();
        drop(table);
        entities.sort_by(|a, b| a.display_cmp(b));
        Ok(entities)
    }

    /// Non-deleted members of a bucket (e.g. an ISO week), in display order.
    pub fn get_by_bucket(&self, bucket: &str) -> Result<Vec<T>> {
        let table = self.inner.lock()?;
        let mut entities: Vec<T> = table
            .indexes
            .bucket(bucket)
            .iter()
            .filter_map(|id| table.rows.get(id))
            .cloned()
            .collect();
        drop(table);
        entities.sort_by(|a, b| a.display_cmp(b));
        Ok(entities)
    }

    /// Number of non-deleted entities.
    pub fn len(&self) -> Result<usize> {
        let table = self.inner.lock()?;
        Ok(table.rows.values().filter(|entity| !entity.is_deleted()).count())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Insert a new entity. The store assigns the identifier and audit
    /// timestamps; whatever the caller put in `meta` is replaced.
    pub fn create(&self, mut entity: T) -> Result<T> {
        entity.normalize();
        entity.validate()?;
        let stored = {
            let mut table = self.inner.lock()?;
            if let Some(parent) = entity.parent_id() {
                ensure_live_parent(&table.rows, parent)?;
            }
            table.indexes.check_conflicts(&entity, None)?;
            *entity.meta_mut() = EntityMeta::new();
            table.indexes.insert(&entity);
            table.rows.insert(entity.id(), entity.clone());
            self.events.enqueue(StoreEvent::Added(entity.clone()));
            entity
        };
        self.writer.schedule();
        self.events.drain();
        Ok(stored)
    }

    /// Replace an existing entity's fields. Returns `Ok(false)` when the id
    /// is unknown, so an "already removed" race is cheap to handle.
    ///
    /// Changed unique keys are re-validated against their new values only:
    /// the old value is released and the new one acquired in the same
    /// critical section. `created_at` and the soft-delete flag are taken
    /// from the stored row; `updated_at` is bumped.
    pub fn update(&self, mut entity: T) -> Result<bool> {
        entity.normalize();
        entity.validate()?;
        let id = entity.id();
        let committed = {
            let mut table = self.inner.lock()?;
            let Some(current) = table.rows.get(&id).cloned() else {
                return Ok(false);
            };
            if entity.parent_id() != current.parent_id()
                && let Some(parent) = entity.parent_id()
            {
                ensure_live_parent(&table.rows, parent)?;
                ensure_not_descendant(&table.rows, id, parent)?;
            }
            if !current.is_deleted() {
                table.indexes.check_conflicts(&entity, Some(id))?;
            }
            {
                let current_meta = current.meta().clone();
                let meta = entity.meta_mut();
                meta.id = id;
                meta.created_at = current_meta.created_at;
                meta.deleted = current_meta.deleted;
                meta.updated_at = current_meta.updated_at;
                meta.touch();
            }
            if !current.is_deleted() {
                table.indexes.remove(&current);
                table.indexes.insert(&entity);
            }
            table.rows.insert(id, entity.clone());
            self.events.enqueue(StoreEvent::Updated(entity));
            true
        };
        self.writer.schedule();
        self.events.drain();
        Ok(committed)
    }

    /// Flag the entity and every transitive descendant as deleted,
    /// releasing their secondary-index keys. The cascade persists once,
    /// not once per descendant. One `Deleted` event per affected id,
    /// parent first.
    pub fn soft_delete(&self, id: EntityId) -> Result<bool> {
        {
            let mut table = self.inner.lock()?;
            match table.rows.get(&id) {
                Some(entity) if !entity.is_deleted() => {}
                _ => return Ok(false),
            }
            let cascade = collect_subtree(&table.rows, id, false);
            for target in &cascade {
                if let Some(entity) = table.rows.get(target).cloned() {
                    table.indexes.remove(&entity);
                }
                if let Some(entity) = table.rows.get_mut(target) {
                    entity.meta_mut().deleted = true;
                    entity.meta_mut().touch();
                }
                self.events.enqueue(StoreEvent::Deleted(*target));
            }
        }
        self.writer.schedule();
        self.events.drain();
        Ok(true)
    }

    /// Remove the entity and every transitive descendant (soft-deleted
    /// ones included) from the table and all indexes. Irreversible.
    pub fn hard_delete(&self, id: EntityId) -> Result<bool> {
        {
            let mut table = self.inner.lock()?;
            if !table.rows.contains_key(&id) {
                return Ok(false);
            }
            let cascade = collect_subtree(&table.rows, id, true);
            for target in &cascade {
                if let Some(entity) = table.rows.remove(target) {
                    table.indexes.remove(&entity);
                    self.events.enqueue(StoreEvent::Deleted(*target));
                }
            }
        }
        self.writer.schedule();
        self.events.drain();
        Ok(true)
    }

    /// Revive one soft-deleted entity. Its unique/combination keys are
    /// re-validated first: another live entity may have claimed them since
    /// the delete, in which case this fails with `DuplicateKey` and nothing
    /// changes. A deleted parent must be restored before its children.
    pub fn restore(&self, id: EntityId) -> Result<bool> {
        {
            let mut table = self.inner.lock()?;
            let Some(current) = table.rows.get(&id).cloned() else {
                return Ok(false);
            };
            if !current.is_deleted() {
                return Ok(false);
            }
            if let Some(parent) = current.parent_id() {
                ensure_live_parent(&table.rows, parent)?;
            }
            table.indexes.check_conflicts(&current, None)?;
            let mut entity = current;
            entity.meta_mut().deleted = false;
            entity.meta_mut().touch();
            table.indexes.insert(&entity);
            table.rows.insert(id, entity.clone());
            self.events.enqueue(StoreEvent::Updated(entity));
        }
        self.writer.schedule();
        self.events.drain();
        Ok(true)
    }

    /// Reset hook: truncate the table and schedule a save of the empty set.
    pub fn clear(&self) -> Result<()> {
        {
            let mut table = self.inner.lock()?;
            table.rows.clear();
            table.indexes.clear();
            self.events.enqueue(StoreEvent::Reloaded);
        }
        self.writer.schedule();
        self.events.drain();
        Ok(())
    }

    /// Re-read the data file, discarding in-memory state.
    pub fn reload(&self) -> Result<()> {
        let entities = persist::load_entities::<T>(&self.path);
        {
            let mut table = self.inner.lock()?;
            table.rows = entities.into_iter().map(|entity| (entity.id(), entity)).collect();
            let TableInner { rows, indexes } = &mut *table;
            indexes.rebuild(rows.values());
            self.events.enqueue(StoreEvent::Reloaded);
        }
        self.events.drain();
        Ok(())
    }

    /// Force a pending debounced save to disk before returning. A no-op
    /// when nothing is pending.
    pub fn flush(&self) {
        self.writer.flush();
    }
}

fn ensure_live_parent<T: Entity>(rows: &HashMap<EntityId, T>, parent: EntityId) -> Result<()> {
    match rows.get(&parent) {
        Some(entity) if !entity.is_deleted() => Ok(()),
        Some(_) => Err(StoreError::Validation(format!(
            "parent {} is deleted",
            parent
        ))),
        None => Err(StoreError::Validation(format!(
            "parent {} does not exist",
            parent
        ))),
    }
}

fn ensure_not_descendant<T: Entity>(
    rows: &HashMap<EntityId, T>,
    id: EntityId,
    new_parent: EntityId,
) -> Result<()> {
    let mut cursor = Some(new_parent);
    let mut seen = HashSet::new();
    while let Some(ancestor) = cursor {
        if ancestor == id {
            return Err(StoreError::Validation(
                "an entity cannot be moved under its own descendant".into(),
            ));
        }
        if !seen.insert(ancestor) {
            break;
        }
        cursor = rows.get(&ancestor).and_then(|entity| entity.parent_id());
    }
    Ok(())
}

/// Breadth-first subtree walk by parent reference, root first. Scans the
/// table per level; fine at single-user desktop scale.
fn collect_subtree<T: Entity>(
    rows: &HashMap<EntityId, T>,
    root: EntityId,
    include_deleted: bool,
) -> Vec<EntityId> {
    let mut ordered = vec![root];
    let mut members: HashSet<EntityId> = ordered.iter().copied().collect();
    let mut cursor = 0;
    while cursor < ordered.len() {
        let parent = ordered[cursor];
        cursor += 1;
        for entity in rows.values() {
            if entity.parent_id() == Some(parent)
                && (include_deleted || !entity.is_deleted())
                && members.insert(entity.id())
            {
                ordered.push(entity.id());
            }
        }
    }
    ordered
}
