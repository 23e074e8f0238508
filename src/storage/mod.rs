pub mod events;
mod index;
pub mod options;
mod persist;
pub mod table;

pub use events::{EventBus, StoreEvent, Subscription};
pub use options::StoreOptions;
pub use table::Store;
