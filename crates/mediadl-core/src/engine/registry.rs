//! Driver registry - cancellation tokens keyed by task id
//!
//! Every scheduled unit of work (connection delay or progress driver) runs
//! under a child of the registry's root token. At most one registration is
//! live per task id.

use parking_lot::Mutex;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// A live registration handed to a timer or driver
#[derive(Debug, Clone)]
pub struct Registration {
    pub generation: u64,
    pub token: CancellationToken,
}

#[derive(Default)]
struct Slots {
    next_generation: u64,
    live: HashMap<Uuid, Registration>,
}

/// Registry of scheduled work, one slot per task
pub struct DriverRegistry {
    root: CancellationToken,
    slots: Mutex<Slots>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
            slots: Mutex::new(Slots::default()),
        }
    }

    /// Register new work for `id`, cancelling whatever was registered before
    pub fn register(&self, id: Uuid) -> Registration {
        let mut slots = self.slots.lock();
        slots.next_generation += 1;

        let registration = Registration {
            generation: slots.next_generation,
            token: self.root.child_token(),
        };

        if let Some(previous) = slots.live.insert(id, registration.clone()) {
            debug!(task_id = %id, generation = previous.generation, "Replacing scheduled work");
            previous.token.cancel();
        }

        registration
    }

    /// Cancel and forget the work registered for `id`
    pub fn stop(&self, id: Uuid) -> bool {
        let removed = self.slots.lock().live.remove(&id);
        match removed {
            Some(registration) => {
                registration.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Forget a registration that finished on its own.
    ///
    /// Only removes the slot if it still belongs to `generation`, so a
    /// finishing unit never unregisters its successor.
    pub fn release(&self, id: Uuid, generation: u64) {
        let mut slots = self.slots.lock();
        if slots
            .live
            .get(&id)
            .is_some_and(|r| r.generation == generation)
        {
            slots.live.remove(&id);
        }
    }

    /// Cancel every registration, present and future
    pub fn stop_all(&self) {
        self.root.cancel();
        let drained: Vec<Registration> = self.slots.lock().live.drain().map(|(_, r)| r).collect();
        for registration in drained {
            registration.token.cancel();
        }
    }

    pub fn is_live(&self, id: Uuid) -> bool {
        self.slots.lock().live.contains_key(&id)
    }

    pub fn live_count(&self) -> usize {
        self.slots.lock().live.len()
    }

    pub fn is_shutdown(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Token cancelled once the registry shuts down
    pub fn root(&self) -> &CancellationToken {
        &self.root
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}
