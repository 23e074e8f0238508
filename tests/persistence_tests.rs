use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use trackstore::{Project, Store, StoreEvent, StoreOptions, Task, Tracker};

fn fast_options() -> StoreOptions {
    StoreOptions::new().debounce(Duration::from_millis(100))
}

fn backup_count(dir: &Path, file: &str) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .file_name()
                .to_string_lossy()
                .starts_with(&format!("{}.bak.", file))
        })
        .count()
}

fn wait_for_file(path: &Path, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while !path.exists() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", path.display());
        std::thread::sleep(Duration::from_millis(10));
    }
}

// ============================================================================
// Debounce coalescing
// ============================================================================

#[test]
fn test_burst_of_mutations_produces_one_write() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tasks.json");
    let store: Store<Task> =
        Store::open(&path, StoreOptions::new().debounce(Duration::from_millis(300))).unwrap();

    for i in 0..10 {
        store.create(Task::new(format!("task {}", i))).unwrap();
    }

    wait_for_file(&path, Duration::from_secs(5));
    // Give a trailing timer a chance to fire a second write if one were
    // (incorrectly) scheduled.
    std::thread::sleep(Duration::from_millis(500));

    let parsed: Vec<serde_json::Value> = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    assert_eq!(parsed.len(), 10);
    // One durable write for the whole burst: there was no earlier file, so a
    // second write would have left a backup behind.
    assert_eq!(backup_count(dir.path(), "tasks.json"), 0);
}

#[test]
fn test_flush_forces_pending_write() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("projects.json");
    // A debounce long enough that only flush can explain the file.
    let store: Store<Project> =
        Store::open(&path, StoreOptions::new().debounce(Duration::from_secs(60))).unwrap();

    store.create(Project::new("Billing")).unwrap();
    assert!(!path.exists());
    store.flush();
    assert!(path.exists());

    // Nothing pending: flush must not rewrite (a rewrite would rotate a
    // backup).
    store.flush();
    assert_eq!(backup_count(dir.path(), "projects.json"), 0);
}

#[test]
fn test_drop_flushes_pending_write() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("projects.json");
    {
        let store: Store<Project> =
            Store::open(&path, StoreOptions::new().debounce(Duration::from_secs(60))).unwrap();
        store.create(Project::new("Billing")).unwrap();
        // Dropped immediately, well inside the debounce window.
    }
    assert!(path.exists());
    let parsed: Vec<serde_json::Value> = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    assert_eq!(parsed.len(), 1);
}

// ============================================================================
// Round trip
// ============================================================================

#[test]
fn test_reopen_reproduces_entities() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tasks.json");

    let (root_id, child_id, gone_id) = {
        let store: Store<Task> = Store::open(&path, fast_options()).unwrap();
        let root = store.create(Task::new("root").with_sort_order(1)).unwrap();
        let child = store
            .create(Task::new("child").with_parent(root.meta.id).with_tags(vec!["home".into()]))
            .unwrap();
        let gone = store.create(Task::new("gone").with_sort_order(99)).unwrap();
        store.soft_delete(gone.meta.id).unwrap();
        store.flush();
        (root.meta.id, child.meta.id, gone.meta.id)
    };

    let store: Store<Task> = Store::open(&path, fast_options()).unwrap();
    assert_eq!(store.len().unwrap(), 2);
    assert_eq!(store.all(true).unwrap().len(), 3);

    let child = store.get(child_id).unwrap().unwrap();
    assert_eq!(child.parent, Some(root_id));
    assert_eq!(child.tags, vec!["home".to_string()]);
    assert!(store.get(gone_id).unwrap().unwrap().meta.deleted);

    // Indexes are rebuilt from the loaded rows.
    let children = store.children_of(root_id).unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].meta.id, child_id);
}

#[test]
fn test_unique_keys_survive_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("projects.json");
    {
        let store: Store<Project> = Store::open(&path, fast_options()).unwrap();
        store.create(Project::new("Billing").with_nickname("ACME")).unwrap();
        store.flush();
    }

    let store: Store<Project> = Store::open(&path, fast_options()).unwrap();
    assert!(store.get_by_key("nickname", "acme").unwrap().is_some());
    assert!(store.create(Project::new("Other").with_nickname("acme")).is_err());
}

// ============================================================================
// Backup rotation
// ============================================================================

#[test]
fn test_backup_retention_keeps_newest_five() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("projects.json");
    let store: Store<Project> =
        Store::open(&path, StoreOptions::new().debounce(Duration::from_secs(60))).unwrap();

    // Eight forced writes; the first has no predecessor to back up, the
    // other seven rotate one each, capped at five.
    for i in 0..8 {
        store.create(Project::new(format!("project {}", i))).unwrap();
        store.flush();
    }

    assert_eq!(backup_count(dir.path(), "projects.json"), 5);
    for n in 1..=5 {
        assert!(dir.path().join(format!("projects.json.bak.{}", n)).exists());
    }
    assert!(!dir.path().join("projects.json.bak.6").exists());

    // The newest backup is the state just before the last write: 7 projects.
    let newest: Vec<serde_json::Value> =
        serde_json::from_slice(&fs::read(dir.path().join("projects.json.bak.1")).unwrap()).unwrap();
    assert_eq!(newest.len(), 7);
}

#[test]
fn test_backups_disabled() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("projects.json");
    let store: Store<Project> = Store::open(
        &path,
        StoreOptions::new().debounce(Duration::from_secs(60)).backup_keep(0),
    )
    .unwrap();

    for i in 0..3 {
        store.create(Project::new(format!("project {}", i))).unwrap();
        store.flush();
    }
    assert_eq!(backup_count(dir.path(), "projects.json"), 0);
}

// ============================================================================
// Load failure and reload
// ============================================================================

#[test]
fn test_corrupt_file_is_quarantined_and_store_starts_empty() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tasks.json");
    fs::write(&path, b"[{\"id\": \"not-a-uuid\"").unwrap();

    let store: Store<Task> = Store::open(&path, fast_options()).unwrap();
    assert!(store.is_empty().unwrap());
    assert!(!path.exists());

    let quarantined: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("tasks.json.corrupt."))
        .collect();
    assert_eq!(quarantined.len(), 1);
    assert_eq!(fs::read(quarantined[0].path()).unwrap(), b"[{\"id\": \"not-a-uuid\"");
}

#[test]
fn test_reload_discards_unsaved_state() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("projects.json");
    let store: Store<Project> =
        Store::open(&path, StoreOptions::new().debounce(Duration::from_secs(60))).unwrap();

    let kept = store.create(Project::new("Saved")).unwrap();
    store.flush();
    store.create(Project::new("Unsaved")).unwrap();
    assert_eq!(store.len().unwrap(), 2);

    let reloads = std::sync::Arc::new(std::sync::Mutex::new(0usize));
    let reloads_clone = reloads.clone();
    let _sub = store.subscribe(move |event| {
        if matches!(event, StoreEvent::Reloaded) {
            *reloads_clone.lock().unwrap() += 1;
        }
    });

    store.reload().unwrap();
    assert_eq!(*reloads.lock().unwrap(), 1);
    assert_eq!(store.len().unwrap(), 1);
    assert_eq!(store.get(kept.meta.id).unwrap().unwrap().name, "Saved");
}

#[test]
fn test_clear_truncates_and_persists_empty_set() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("projects.json");
    let store: Store<Project> =
        Store::open(&path, StoreOptions::new().debounce(Duration::from_secs(60))).unwrap();

    store.create(Project::new("A")).unwrap();
    store.create(Project::new("B")).unwrap();
    store.flush();

    store.clear().unwrap();
    assert!(store.is_empty().unwrap());
    store.flush();

    let parsed: Vec<serde_json::Value> = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    assert!(parsed.is_empty());
}

// ============================================================================
// Context
// ============================================================================

#[test]
fn test_tracker_flush_all_persists_every_store() {
    let dir = TempDir::new().unwrap();
    let tracker = Tracker::open_with(
        dir.path(),
        StoreOptions::new().debounce(Duration::from_secs(60)),
    )
    .unwrap();

    tracker.tasks().create(Task::new("task")).unwrap();
    tracker.projects().create(Project::new("project")).unwrap();
    tracker.flush_all();

    assert!(dir.path().join("tasks.json").exists());
    assert!(dir.path().join("projects.json").exists());
    // The timesheet had no mutations, so no file was written for it.
    assert!(!dir.path().join("timesheet.json").exists());

    let reopened = Tracker::open(dir.path()).unwrap();
    assert_eq!(reopened.tasks().len().unwrap(), 1);
    assert_eq!(reopened.projects().len().unwrap(), 1);
}
