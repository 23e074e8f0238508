pub mod project;
pub mod task;
pub mod week;

pub use project::Project;
pub use task::{Task, TaskStatus};
pub use week::WeekEntry;
