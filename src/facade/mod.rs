pub mod context;

pub use context::Tracker;
