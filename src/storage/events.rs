use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};

use crate::core::EntityId;

/// Change notification emitted by a store after a mutation commits.
#[derive(Debug, Clone)]
pub enum StoreEvent<T> {
    Added(T),
    Updated(T),
    Deleted(EntityId),
    Reloaded,
}

type Callback<T> = Arc<dyn Fn(&StoreEvent<T>) + Send + Sync + 'static>;

struct Subscribers<T> {
    entries: Vec<(u64, Callback<T>)>,
    next_id: u64,
}

/// Per-store notification bus.
///
/// Mutations enqueue events while still holding the store lock, which fixes
/// the delivery order to commit order. Dispatch happens after the lock is
/// released, on the mutating thread, through a single drainer at a time: a
/// callback that mutates the store reentrantly enqueues new events which the
/// active drainer picks up instead of deadlocking.
pub struct EventBus<T> {
    subscribers: Arc<Mutex<Subscribers<T>>>,
    queue: Mutex<VecDeque<StoreEvent<T>>>,
    dispatching: Mutex<()>,
}

impl<T: Clone> EventBus<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Subscribers {
                entries: Vec::new(),
                next_id: 0,
            })),
            queue: Mutex::new(VecDeque::new()),
            dispatching: Mutex::new(()),
        }
    }

    /// Register a callback. The returned [`Subscription`] is the
    /// subscription's lifetime: dropping it detaches the callback.
    pub fn subscribe(&self, callback: impl Fn(&StoreEvent<T>) + Send + Sync + 'static) -> Subscription<T> {
        let mut subscribers = match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let id = subscribers.next_id;
        subscribers.next_id += 1;
        subscribers.entries.push((id, Arc::new(callback)));
        Subscription {
            subscribers: Arc::downgrade(&self.subscribers),
            id,
        }
    }

    /// Queue an event for delivery. Called while the store lock is held so
    /// the queue order matches commit order.
    pub(crate) fn enqueue(&self, event: StoreEvent<T>) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(event);
        }
    }

    /// Deliver queued events in FIFO order. Called after the store lock is
    /// released. A no-op when another drainer is already active; that
    /// drainer's loop delivers whatever this call enqueued.
    pub(crate) fn drain(&self) {
        let Ok(_guard) = self.dispatching.try_lock() else {
            return;
        };
        loop {
            let event = match self.queue.lock() {
                Ok(mut queue) => queue.pop_front(),
                Err(_) => return,
            };
            let Some(event) = event else { break };
            let callbacks: Vec<Callback<T>> = match self.subscribers.lock() {
                Ok(subscribers) => subscribers.entries.iter().map(|(_, f)| f.clone()).collect(),
                Err(_) => return,
            };
            for callback in callbacks {
                callback(&event);
            }
        }
    }
}

impl<T: Clone> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for an [`EventBus`] subscription. Dropping it (or calling
/// [`cancel`](Self::cancel)) detaches the callback.
#[must_use = "dropping the subscription detaches the callback"]
pub struct Subscription<T> {
    subscribers: Weak<Mutex<Subscribers<T>>>,
    id: u64,
}

impl<T> Subscription<T> {
    pub fn cancel(self) {
        drop(self);
    }

    fn detach(&self) {
        if let Some(subscribers) = self.subscribers.upgrade()
            && let Ok(mut subscribers) = subscribers.lock()
        {
            subscribers.entries.retain(|(id, _)| *id != self.id);
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.detach();
    }
}
