//! Single-threaded, FIFO task queue with timer support.
//!
//! Grounded on `core/include_internal/ten_utils/io/runloop.h`: a runloop owns
//! no domain objects, only drains a task queue on whichever OS thread calls
//! `run`. Cross-runloop signalling is exclusively `post_task_tail`/
//! `post_task_front`; there is no shared-memory mailbox between runloops.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

/// A unit of work posted to a runloop. Boxed so heterogeneous closures can
/// share one channel.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

enum Item {
    Task(Task),
    Timer { at: Instant, task: Task },
}

/// Handle used by other threads (or the loop's own thread) to post work.
/// Cheaply cloneable; the loop itself exits once every handle is dropped and
/// the channel is drained.
#[derive(Clone)]
pub struct RunloopHandle {
    tail: mpsc::UnboundedSender<Item>,
    front: mpsc::UnboundedSender<Item>,
    pending: std::sync::Arc<std::sync::atomic::AtomicUsize>,
}

impl RunloopHandle {
    /// Enqueue `task` at the back of the loop's queue.
    pub fn post_task_tail<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pending.fetch_add(1, std::sync::atomic::Ordering::AcqRel);
        let _ = self.tail.send(Item::Task(Box::new(task)));
    }

    /// Enqueue `task` at the front. Used only to insert the lock-mode
    /// release task ahead of already-queued work.
    pub fn post_task_front<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pending.fetch_add(1, std::sync::atomic::Ordering::AcqRel);
        let _ = self.front.send(Item::Task(Box::new(task)));
    }

    /// Schedule `task` to run no earlier than `delay` from now. Fires by
    /// posting to the same loop's tail queue once the deadline passes.
    pub fn post_timer<F>(&self, delay: Duration, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let at = Instant::now() + delay;
        self.pending.fetch_add(1, std::sync::atomic::Ordering::AcqRel);
        let _ = self.tail.send(Item::Timer { at, task: Box::new(task) });
    }
}

/// Owns the receiving half; `run` drains it until told to stop.
pub struct Runloop {
    handle: RunloopHandle,
    tail_rx: mpsc::UnboundedReceiver<Item>,
    front_rx: mpsc::UnboundedReceiver<Item>,
    stop: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl Runloop {
    pub fn new() -> Self {
        let (tail_tx, tail_rx) = mpsc::unbounded_channel();
        let (front_tx, front_rx) = mpsc::unbounded_channel();
        Self {
            handle: RunloopHandle {
                tail: tail_tx,
                front: front_tx,
                pending: std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0)),
            },
            tail_rx,
            front_rx,
            stop: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    pub fn handle(&self) -> RunloopHandle {
        self.handle.clone()
    }

    /// A handle that, when posted to, stops the loop after draining
    /// already-queued front-priority work.
    pub fn stop_flag(&self) -> std::sync::Arc<std::sync::atomic::AtomicBool> {
        self.stop.clone()
    }

    /// Drain front-queue items first (FIFO within each queue, front takes
    /// priority over tail), then the tail queue, until both are empty and
    /// `stop` is set, or the channels close.
    pub async fn run(mut self) {
        loop {
            if self.stop.load(std::sync::atomic::Ordering::Acquire)
                && self.handle.pending.load(std::sync::atomic::Ordering::Acquire) == 0
            {
                break;
            }

            tokio::select! {
                biased;
                Some(item) = self.front_rx.recv() => self.run_item(item).await,
                Some(item) = self.tail_rx.recv() => self.run_item(item).await,
                else => break,
            }
        }
    }

    async fn run_item(&self, item: Item) {
        match item {
            Item::Task(f) => f(),
            Item::Timer { at, task } => {
                tokio::time::sleep_until(at).await;
                task();
            }
        }
        self.handle.pending.fetch_sub(1, std::sync::atomic::Ordering::AcqRel);
    }
}

impl Default for Runloop {
    fn default() -> Self {
        Self::new()
    }
}
