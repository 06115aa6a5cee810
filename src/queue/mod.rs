//! Rate-limited work queues, in-flight tracking and the workers that drain them.

mod pool;
mod rate_limited;
mod registry;

pub use pool::{Job, WorkerPool};
pub use rate_limited::RateLimitedQueue;
pub use registry::{DedupQueue, Pending, PendingRegistry};
