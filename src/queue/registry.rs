use std::sync::Arc;

use dashmap::DashSet;

use super::RateLimitedQueue;

/// Ids whose unit of work is queued or running.
#[derive(Debug, Default)]
pub struct PendingRegistry {
    ids: DashSet<String>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `id` as in flight. Returns false if it already was.
    pub fn try_acquire(&self, id: &str) -> bool {
        self.ids.insert(id.to_string())
    }

    fn release(&self, id: &str) {
        self.ids.remove(id);
    }

    /// Like `try_acquire`, but hands back a guard that releases on drop.
    pub fn acquire(self: &Arc<Self>, id: &str) -> Option<Pending> {
        if !self.try_acquire(id) {
            return None;
        }
        Some(Pending {
            registry: Arc::clone(self),
            id: id.to_string(),
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// An acquired in-flight marker. The id is released when this is dropped,
/// whichever way the unit of work that owns it ends.
#[derive(Debug)]
pub struct Pending {
    registry: Arc<PendingRegistry>,
    id: String,
}

impl Pending {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for Pending {
    fn drop(&mut self) {
        self.registry.release(&self.id);
    }
}

/// A rate-limited queue that refuses ids already in flight.
pub struct DedupQueue {
    registry: Arc<PendingRegistry>,
    queue: Arc<RateLimitedQueue<Pending>>,
}

impl DedupQueue {
    pub fn new(queue: Arc<RateLimitedQueue<Pending>>) -> Self {
        Self {
            registry: Arc::new(PendingRegistry::new()),
            queue,
        }
    }

    /// Enqueues `id` unless it is already queued or running.
    pub fn try_enqueue(&self, id: &str) -> bool {
        match self.registry.acquire(id) {
            Some(pending) => {
                self.queue.put(pending);
                true
            }
            None => {
                tracing::debug!(id, "already in flight, not enqueued");
                false
            }
        }
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.registry.contains(id)
    }

    pub fn in_flight(&self) -> usize {
        self.registry.len()
    }

    pub fn queue(&self) -> &Arc<RateLimitedQueue<Pending>> {
        &self.queue
    }
}
