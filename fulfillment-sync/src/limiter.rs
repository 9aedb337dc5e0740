//! Fixed-window rate limiter for outbound provider calls
//!
//! Admissions within the current window run immediately; once the quota is
//! spent, callers queue in FIFO order and a single drain loop releases them
//! as windows roll over. Work is delayed, never dropped.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, oneshot};
use tokio::time::{Duration, Instant};

/// Rate limiter with a fixed quota per rolling window
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<LimiterInner>,
}

struct LimiterInner {
    quota: u32,
    window: Duration,
    state: Mutex<LimiterState>,
}

struct LimiterState {
    window_start: Instant,
    count: u32,
    queue: VecDeque<oneshot::Sender<()>>,
    /// True while the drain task is alive; guarantees a single drain loop
    draining: bool,
}

impl RateLimiter {
    /// Create a limiter allowing `quota` calls per `window`
    pub fn new(quota: u32, window: Duration) -> Self {
        Self {
            inner: Arc::new(LimiterInner {
                quota: quota.max(1),
                window,
                state: Mutex::new(LimiterState {
                    window_start: Instant::now(),
                    count: 0,
                    queue: VecDeque::new(),
                    draining: false,
                }),
            }),
        }
    }

    /// Run `task` once a slot in the current window is available
    pub async fn execute<T, F, Fut>(&self, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.acquire().await;
        task().await
    }

    /// Wait for an admission slot
    async fn acquire(&self) {
        let rx = {
            let mut state = self.inner.state.lock().await;

            // Roll the window if it has elapsed
            let now = Instant::now();
            if now.duration_since(state.window_start) >= self.inner.window {
                state.window_start = now;
                state.count = 0;
            }

            // While draining, new arrivals queue behind earlier waiters to
            // preserve FIFO order even if the counter has headroom
            if !state.draining && state.count < self.inner.quota {
                state.count += 1;
                return;
            }

            let (tx, rx) = oneshot::channel();
            state.queue.push_back(tx);

            if !state.draining {
                state.draining = true;
                tokio::spawn(Self::drain(Arc::clone(&self.inner)));
            }
            rx
        };

        // Sender dropped only if the drain loop died; treat as released
        let _ = rx.await;
    }

    /// Drain loop: sleep to the window boundary, reset the counter, release
    /// queued waiters up to the quota, repeat until the queue empties.
    /// Only one instance runs at a time (`draining` flag).
    async fn drain(inner: Arc<LimiterInner>) {
        loop {
            let deadline = {
                let state = inner.state.lock().await;
                state.window_start + inner.window
            };
            tokio::time::sleep_until(deadline).await;

            let mut state = inner.state.lock().await;
            state.window_start = Instant::now();
            state.count = 0;

            while state.count < inner.quota {
                match state.queue.pop_front() {
                    Some(tx) => {
                        state.count += 1;
                        // Receiver may have been dropped; slot is spent either way
                        let _ = tx.send(());
                    }
                    None => break,
                }
            }

            if state.queue.is_empty() {
                state.draining = false;
                return;
            }
        }
    }

    /// Calls admitted in the current window (diagnostic)
    pub async fn current_count(&self) -> u32 {
        self.inner.state.lock().await.count
    }
}
