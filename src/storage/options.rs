use std::time::Duration;

/// Per-store persistence tuning.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Quiet period after the last mutation before a snapshot is written.
    /// Measured from the last mutation, not the first: a busy store defers
    /// its save until activity stops.
    pub debounce: Duration,

    /// Number of rotated backup files kept alongside the data file.
    /// Zero disables backups.
    pub backup_keep: usize,
}

impl StoreOptions {
    pub fn new() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            backup_keep: 5,
        }
    }

    /// Set the debounce window.
    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Set the backup retention count.
    pub fn backup_keep(mut self, keep: usize) -> Self {
        self.backup_keep = keep;
        self
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::new()
    }
}
