//! Debounced snapshot persistence: one writer thread per store, numbered
//! backup rotation, atomic file replacement, and the startup loader.

use chrono::Utc;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, error, warn};

use crate::core::{Entity, Result, StoreError};

pub(crate) enum WriterMsg {
    /// (Re)arm the debounce window.
    Schedule,
    /// Force a write if one is pending, then acknowledge.
    Flush(SyncSender<()>),
    Shutdown,
}

/// Handle to the background writer thread. Owned by the store; dropping it
/// flushes any pending save and joins the thread.
pub(crate) struct Writer {
    tx: Sender<WriterMsg>,
    handle: Option<JoinHandle<()>>,
}

impl Writer {
    /// Spawn the writer thread. `snapshot` copies the current entity set
    /// under the store lock (returning `None` if the lock is poisoned);
    /// serialization and disk I/O run on the writer thread, outside it.
    pub fn spawn<T, F>(path: PathBuf, debounce: Duration, backup_keep: usize, snapshot: F) -> Result<Self>
    where
        T: Entity,
        F: Fn() -> Option<Vec<T>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name(format!("{}-writer", T::kind()))
            .spawn(move || run(path, debounce, backup_keep, snapshot, rx))?;
        Ok(Self {
            tx,
            handle: Some(handle),
        })
    }

    /// Reset the debounce window. Every successful mutation calls this; the
    /// write happens once activity stops for the window's duration.
    pub fn schedule(&self) {
        let _ = self.tx.send(WriterMsg::Schedule);
    }

    /// Synchronously force a pending save to disk. A no-op when nothing is
    /// pending.
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = mpsc::sync_channel(0);
        if self.tx.send(WriterMsg::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        let _ = self.tx.send(WriterMsg::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run<T, F>(path: PathBuf, debounce: Duration, backup_keep: usize, snapshot: F, rx: Receiver<WriterMsg>)
where
    T: Entity,
    F: Fn() -> Option<Vec<T>>,
{
    let mut pending = false;
    loop {
        let msg = if pending {
            match rx.recv_timeout(debounce) {
                Ok(msg) => msg,
                Err(RecvTimeoutError::Timeout) => {
                    pending = false;
                    write_snapshot::<T, F>(&path, backup_keep, &snapshot);
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    write_snapshot::<T, F>(&path, backup_keep, &snapshot);
                    break;
                }
            }
        } else {
            match rx.recv() {
                Ok(msg) => msg,
                Err(_) => break,
            }
        };
        match msg {
            WriterMsg::Schedule => pending = true,
            WriterMsg::Flush(ack) => {
                if pending {
                    pending = false;
                    write_snapshot::<T, F>(&path, backup_keep, &snapshot);
                }
                let _ = ack.send(());
            }
            WriterMsg::Shutdown => {
                if pending {
                    write_snapshot::<T, F>(&path, backup_keep, &snapshot);
                }
                break;
            }
        }
    }
}

fn write_snapshot<T, F>(path: &Path, backup_keep: usize, snapshot: &F)
where
    T: Entity,
    F: Fn() -> Option<Vec<T>>,
{
    let Some(entities) = snapshot() else {
        error!("{} store lock poisoned, skipping save", T::kind());
        return;
    };
    let json = match serde_json::to_vec_pretty(&entities) {
        Ok(json) => json,
        Err(err) => {
            error!("failed to serialize {} snapshot: {}", T::kind(), err);
            return;
        }
    };
    rotate_backups(path, backup_keep);
    match write_atomic(path, &json) {
        Ok(()) => debug!(
            "wrote {} {} entities to {}",
            entities.len(),
            T::kind(),
            path.display()
        ),
        // Logged and swallowed: in-memory state stays authoritative and the
        // next mutation's debounce cycle tries again.
        Err(err) => error!("failed to write {}: {}", path.display(), err),
    }
}

fn backup_path(path: &Path, n: usize) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}.bak.{}", name, n))
}

/// Shift `{file}.bak.1 .. .bak.N-1` up one slot and copy the current file
/// into `.bak.1`. Best-effort: every step logs and continues on failure.
fn rotate_backups(path: &Path, keep: usize) {
    if keep == 0 || !path.exists() {
        return;
    }
    let oldest = backup_path(path, keep);
    if oldest.exists()
        && let Err(err) = fs::remove_file(&oldest)
    {
        warn!("failed to prune backup {}: {}", oldest.display(), err);
    }
    for n in (1..keep).rev() {
        let from = backup_path(path, n);
        if from.exists()
            && let Err(err) = fs::rename(&from, backup_path(path, n + 1))
        {
            warn!("failed to rotate backup {}: {}", from.display(), err);
        }
    }
    if let Err(err) = fs::copy(path, backup_path(path, 1)) {
        warn!("failed to back up {}: {}", path.display(), err);
    }
}

/// Write through a temp file in the target directory and rename over the
/// destination, so a crash mid-write never corrupts the previous snapshot.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;
    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| StoreError::Io(err.error))?;
    Ok(())
}

/// Blocking startup load. An absent file is a first run; a malformed file
/// is quarantined (bytes preserved for the operator) and the store starts
/// empty; an unreadable one is logged and left in place.
pub(crate) fn load_entities<T: Entity>(path: &Path) -> Vec<T> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!("no {} data file at {}, starting empty", T::kind(), path.display());
            return Vec::new();
        }
        Err(err) => {
            error!("failed to read {}: {}, starting empty", path.display(), err);
            return Vec::new();
        }
    };
    match serde_json::from_slice::<Vec<T>>(&bytes) {
        Ok(entities) => {
            debug!("loaded {} {} entities from {}", entities.len(), T::kind(), path.display());
            entities
        }
        Err(err) => {
            error!(
                "corrupt {} data file {}: {}; quarantining and starting empty",
                T::kind(),
                path.display(),
                err
            );
            quarantine(path);
            Vec::new()
        }
    }
}

fn quarantine(path: &Path) {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let target = path.with_file_name(format!("{}.corrupt.{}", name, stamp));
    match fs::rename(path, &target) {
        Ok(()) => warn!("quarantined corrupt data file as {}", target.display()),
        Err(err) => warn!("failed to quarantine {}: {}", path.display(), err),
    }
}

/// Entities in a stable order so successive snapshots of the same table
/// diff cleanly.
pub(crate) fn stable_order<T: Entity>(mut entities: Vec<T>) -> Vec<T> {
    entities.sort_by(|a, b| {
        a.meta()
            .created_at
            .cmp(&b.meta().created_at)
            .then_with(|| a.id().cmp(&b.id()))
    });
    entities
}
