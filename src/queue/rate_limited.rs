use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

struct Turnstile<T> {
    rx: mpsc::UnboundedReceiver<T>,
    last_release: Option<Instant>,
}

/// Unbounded FIFO whose `get` releases at most one item per `min_interval`,
/// measured across every consumer of the queue.
pub struct RateLimitedQueue<T> {
    tx: mpsc::UnboundedSender<T>,
    turnstile: Mutex<Turnstile<T>>,
    min_interval: Duration,
    depth: AtomicUsize,
}

impl<T: Send> RateLimitedQueue<T> {
    pub fn new(min_interval: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            turnstile: Mutex::new(Turnstile {
                rx,
                last_release: None,
            }),
            min_interval,
            depth: AtomicUsize::new(0),
        }
    }

    pub fn put(&self, item: T) {
        self.depth.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(item).is_err() {
            // receiver lives as long as self, so this only happens mid-drop
            self.depth.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Waits for the next item and for the release interval to elapse.
    ///
    /// Only one caller waits inside the turnstile at a time; the others queue
    /// on the mutex in FIFO order. Returns `None` only if the sending half is
    /// gone, which cannot happen while the queue itself is alive.
    pub async fn get(&self) -> Option<T> {
        let mut turnstile = self.turnstile.lock().await;
        let item = turnstile.rx.recv().await?;

        if let Some(last) = turnstile.last_release {
            tokio::time::sleep_until(last + self.min_interval).await;
        }
        turnstile.last_release = Some(Instant::now());
        self.depth.fetch_sub(1, Ordering::SeqCst);

        Some(item)
    }

    /// Items put but not yet released by `get`.
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}
