//! Bounded fan-out of one polling pass.
//!
//! The queue is loaded up front and drained by a fixed set of tokio tasks.
//! Each worker checks the shared cancel flag before taking the next item;
//! an item already taken always runs to completion. The result stream ends
//! once every worker has exited.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::debug;

/// Run `handler` once per item on at most `workers` concurrent tasks.
///
/// The worker count is clamped to `1..=items.len()`. Must be called from
/// within a tokio runtime.
pub fn run_pass<I, R, F, Fut>(
    items: Vec<I>,
    workers: usize,
    cancel: Arc<AtomicBool>,
    handler: F,
) -> mpsc::UnboundedReceiver<R>
where
    I: Send + 'static,
    R: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    if items.is_empty() {
        return rx;
    }

    let workers = workers.clamp(1, items.len());
    let queue = Arc::new(Mutex::new(VecDeque::from(items)));
    let handler = Arc::new(handler);
    debug!(workers, "Starting pass");

    for worker in 0..workers {
        let queue = Arc::clone(&queue);
        let cancel = Arc::clone(&cancel);
        let handler = Arc::clone(&handler);
        let tx = tx.clone();

        tokio::spawn(async move {
            loop {
                if cancel.load(Ordering::Relaxed) {
                    debug!(worker, "Cancelled, worker exiting");
                    break;
                }
                let next = queue.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
                let Some(item) = next else {
                    break;
                };
                let result = handler(item).await;
                if tx.send(result).is_err() {
                    // nobody is listening any more
                    break;
                }
            }
        });
    }

    rx
}
