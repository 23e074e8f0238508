use std::fs;
use std::path::{Path, PathBuf};

use crate::core::Result;
use crate::model::{Project, Task, WeekEntry};
use crate::storage::{Store, StoreOptions};

/// Application context owning the three stores of the tracker.
///
/// Construct one at process start and pass it by reference to every
/// consumer. There is no ambient global instance; tests open an isolated
/// context (or a single [`Store`]) in a temp directory.
///
/// # Examples
///
/// ```no_run
/// use trackstore::{Task, Tracker};
///
/// # fn main() -> trackstore::Result<()> {
/// let tracker = Tracker::open("~/.local/share/tracker")?;
/// tracker.tasks().create(Task::new("file expense report"))?;
/// // ... on shutdown:
/// tracker.flush_all();
/// # Ok(())
/// # }
/// ```
pub struct Tracker {
    data_dir: PathBuf,
    tasks: Store<Task>,
    projects: Store<Project>,
    timesheet: Store<WeekEntry>,
}

impl Tracker {
    /// Open all stores under `data_dir` with default options, creating the
    /// directory on first run. Loading is synchronous.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with(data_dir, StoreOptions::default())
    }

    /// Open with explicit persistence options shared by all three stores.
    pub fn open_with(data_dir: impl Into<PathBuf>, options: StoreOptions) -> Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;
        let tasks = Store::open(data_dir.join("tasks.json"), options.clone())?;
        let projects = Store::open(data_dir.join("projects.json"), options.clone())?;
        let timesheet = Store::open(data_dir.join("timesheet.json"), options)?;
        Ok(Self {
            data_dir,
            tasks,
            projects,
            timesheet,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn tasks(&self) -> &Store<Task> {
        &self.tasks
    }

    pub fn projects(&self) -> &Store<Project> {
        &self.projects
    }

    pub fn timesheet(&self) -> &Store<WeekEntry> {
        &self.timesheet
    }

    /// Force any pending debounced saves to disk. Call before process
    /// teardown so the last debounce window is never lost.
    pub fn flush_all(&self) {
        self.tasks.flush();
        self.projects.flush();
        self.timesheet.flush();
    }
}
