//! Fan-out of icon resolution progress to live subscribers.
//!
//! Callbacks run on the publishing task.  Each subscriber carries its own
//! re-entrant gate: delivery holds it, and unsubscribing closes it under the
//! same lock, so once [`Subscription::unsubscribe`] returns no callback of that
//! subscriber is running or will run again.  Unsubscribing from inside one's own
//! callback is fine.

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IconUpdate {
    pub id: String,
    pub icon: String,
}

type UpdateFn = Box<dyn Fn(&IconUpdate) + Send + Sync>;
type DoneFn = Box<dyn Fn() + Send + Sync>;

struct Subscriber {
    open: ReentrantMutex<Cell<bool>>,
    on_update: UpdateFn,
    on_done: DoneFn,
}

impl Subscriber {
    fn deliver(&self, update: &IconUpdate) {
        let open = self.open.lock();
        if open.get() {
            (self.on_update)(update);
        }
    }

    fn complete(&self) {
        let open = self.open.lock();
        if open.replace(false) {
            (self.on_done)();
        }
    }

    fn close(&self) {
        self.open.lock().set(false);
    }
}

#[derive(Default)]
struct State {
    subscribers: HashMap<u64, Arc<Subscriber>>,
    /// Runs still publishing; subscribers complete when the last one ends.
    running: usize,
}

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    state: Mutex<State>,
}

impl Registry {
    fn snapshot(&self) -> Vec<Arc<Subscriber>> {
        self.state.lock().subscribers.values().cloned().collect()
    }
}

#[derive(Clone, Default)]
pub struct IconHub {
    registry: Arc<Registry>,
}

impl IconHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber until the returned handle is unsubscribed or
    /// dropped, or until every run in progress has ended.
    pub fn subscribe<U, D>(&self, on_update: U, on_done: D) -> Subscription
    where
        U: Fn(&IconUpdate) + Send + Sync + 'static,
        D: Fn() + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let subscriber = Arc::new(Subscriber {
            open: ReentrantMutex::new(Cell::new(true)),
            on_update: Box::new(on_update),
            on_done: Box::new(on_done),
        });
        self.registry
            .state
            .lock()
            .subscribers
            .insert(id, Arc::clone(&subscriber));

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
            subscriber,
        }
    }

    /// Starts a resolution run.  Subscribers get the terminal event once the
    /// last overlapping run is dropped.
    pub fn begin(&self) -> IconRun {
        self.registry.state.lock().running += 1;
        IconRun {
            registry: Arc::clone(&self.registry),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.state.lock().subscribers.len()
    }

    pub fn running(&self) -> usize {
        self.registry.state.lock().running
    }
}

/// One resolution run publishing into an [`IconHub`].
pub struct IconRun {
    registry: Arc<Registry>,
}

impl IconRun {
    pub fn publish(&self, update: &IconUpdate) {
        for subscriber in self.registry.snapshot() {
            subscriber.deliver(update);
        }
    }
}

impl Drop for IconRun {
    fn drop(&mut self) {
        let drained: Vec<Arc<Subscriber>> = {
            let mut state = self.registry.state.lock();
            state.running = state.running.saturating_sub(1);
            if state.running > 0 {
                return;
            }
            state.subscribers.drain().map(|(_, subscriber)| subscriber).collect()
        };
        for subscriber in drained {
            subscriber.complete();
        }
    }
}

/// Handle returned by [`IconHub::subscribe`]; dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    registry: Weak<Registry>,
    subscriber: Arc<Subscriber>,
}

impl Subscription {
    /// Once this returns, none of this subscriber's callbacks is running or
    /// will run again.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.state.lock().subscribers.remove(&self.id);
        }
        self.subscriber.close();
    }
}
