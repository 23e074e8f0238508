// ============================================================================
// TrackStore Library
// ============================================================================

//! Embedded entity store for a personal task/project/time tracker.
//!
//! Each entity type lives in its own [`Store`]: an in-memory table plus
//! secondary indexes behind one coarse lock, persisted as a pretty-printed
//! JSON file through a debounced background writer with rotating backups.
//! Deleting a parent entity cascades to its descendants; consumers follow
//! changes through per-store [`StoreEvent`] subscriptions.
//!
//! # Examples
//!
//! ```no_run
//! use trackstore::{StoreEvent, Task, Tracker};
//!
//! # fn main() -> trackstore::Result<()> {
//! let tracker = Tracker::open("./data")?;
//!
//! let _sub = tracker.tasks().subscribe(|event| {
//!     if let StoreEvent::Added(task) = event {
//!         println!("added: {}", task.title);
//!     }
//! });
//!
//! let groceries = tracker.tasks().create(Task::new("groceries"))?;
//! tracker
//!     .tasks()
//!     .create(Task::new("milk").with_parent(groceries.meta.id))?;
//!
//! // Soft-deleting the parent cascades to "milk" as well.
//! tracker.tasks().soft_delete(groceries.meta.id)?;
//!
//! tracker.flush_all();
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod facade;
pub mod model;
pub mod storage;

// Re-export main types for convenience
pub use crate::core::{Entity, EntityId, EntityMeta, Result, StoreError, week_bucket};
pub use facade::Tracker;
pub use model::{Project, Task, TaskStatus, WeekEntry};
pub use storage::{EventBus, Store, StoreEvent, StoreOptions, Subscription};
