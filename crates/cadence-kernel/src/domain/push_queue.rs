//! Bounded concurrent FIFO with a worker pool.
//!
//! Producers `put` without blocking; a full queue routes the offending item
//! to the overflow handler instead. Worker tasks run the consumer while the
//! queue is running or draining. `drain` consumes to empty and returns once
//! the last in-flight item has completed, giving callers a one-shot
//! drained barrier.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::warn;

/// Consumer invoked by queue workers, one item at a time.
#[async_trait]
pub trait QueueConsumer<T>: Send + Sync {
    /// Process one item.
    async fn consume(&self, item: T);
}

type OverflowHandler<T> = Box<dyn Fn(T) + Send + Sync>;

struct Inner<T> {
    items: VecDeque<T>,
    running: bool,
    draining: bool,
    in_flight: usize,
    closed: bool,
}

impl<T> Inner<T> {
    fn settled(&self) -> bool {
        self.items.is_empty() && self.in_flight == 0
    }
}

struct Shared<T> {
    inner: Mutex<Inner<T>>,
    capacity: usize,
    /// Wakes idle workers when items arrive or the lifecycle changes.
    work: Notify,
    /// Wakes a `drain` caller when the queue settles.
    drained: Notify,
    overflow: Mutex<Option<OverflowHandler<T>>>,
}

/// A bounded concurrent FIFO queue with `N` worker slots.
///
/// Workers are spawned at construction and live until the queue is dropped;
/// `start`/`stop` gate whether they consume. Must be created inside a Tokio
/// runtime.
pub struct PushQueue<T> {
    shared: Arc<Shared<T>>,
    workers: Vec<JoinHandle<()>>,
}

impl<T: Send + 'static> PushQueue<T> {
    /// Create a queue with `workers` consumer slots and room for
    /// `capacity` items.
    pub fn new(workers: usize, capacity: usize, consumer: Arc<dyn QueueConsumer<T>>) -> Self {
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                running: false,
                draining: false,
                in_flight: 0,
                closed: false,
            }),
            capacity,
            work: Notify::new(),
            drained: Notify::new(),
            overflow: Mutex::new(None),
        });

        let workers = (0..workers.max(1))
            .map(|_| {
                let shared = Arc::clone(&shared);
                let consumer = Arc::clone(&consumer);
                tokio::spawn(worker_loop(shared, consumer))
            })
            .collect();

        Self { shared, workers }
    }

    /// Register the overflow handler invoked with each item a full queue
    /// rejects. Without a handler, rejected items are logged and dropped.
    pub fn on_overflow(&self, handler: impl Fn(T) + Send + Sync + 'static) {
        *self.shared.overflow.lock() = Some(Box::new(handler));
    }

    /// Enqueue an item. Never blocks: a full queue hands the item to the
    /// overflow handler instead.
    pub fn put(&self, item: T) {
        let rejected = {
            let mut inner = self.shared.inner.lock();
            if inner.items.len() >= self.shared.capacity {
                Some(item)
            } else {
                inner.items.push_back(item);
                None
            }
        };
        match rejected {
            Some(item) => {
                let overflow = self.shared.overflow.lock();
                match overflow.as_ref() {
                    Some(handler) => handler(item),
                    None => warn!("push queue full, dropping item"),
                }
            }
            None => self.shared.work.notify_waiters(),
        }
    }

    /// Begin consuming queued items.
    pub fn start(&self) {
        self.shared.inner.lock().running = true;
        self.shared.work.notify_waiters();
    }

    /// Stop consuming. In-flight consumer calls complete; queued items are
    /// retained until the next `start` or `drain`.
    pub fn stop(&self) {
        self.shared.inner.lock().running = false;
    }

    /// Consume until the queue is empty and all in-flight items have
    /// completed, then return. Runs the consumer even while stopped.
    pub async fn drain(&self) {
        self.shared.inner.lock().draining = true;
        self.shared.work.notify_waiters();
        loop {
            let mut settled = std::pin::pin!(self.shared.drained.notified());
            settled.as_mut().enable();
            {
                let mut inner = self.shared.inner.lock();
                if inner.settled() {
                    inner.draining = false;
                    break;
                }
            }
            settled.await;
        }
    }

    /// Number of queued (not yet dispatched) items.
    pub fn count(&self) -> usize {
        self.shared.inner.lock().items.len()
    }
}

impl<T> Drop for PushQueue<T> {
    fn drop(&mut self) {
        // Workers observe `closed` and exit; one mid-consume finishes its
        // current item first.
        self.shared.inner.lock().closed = true;
        self.shared.work.notify_waiters();
        self.workers.clear();
    }
}

async fn worker_loop<T: Send + 'static>(
    shared: Arc<Shared<T>>,
    consumer: Arc<dyn QueueConsumer<T>>,
) {
    loop {
        // Register for wakeups before inspecting state; a notify_waiters
        // issued between the check and the await would otherwise be lost.
        let mut wake = std::pin::pin!(shared.work.notified());
        wake.as_mut().enable();
        let job = {
            let mut inner = shared.inner.lock();
            if inner.closed {
                return;
            }
            if inner.running || inner.draining {
                let item = inner.items.pop_front();
                if item.is_some() {
                    inner.in_flight += 1;
                }
                item
            } else {
                None
            }
        };
        match job {
            Some(item) => {
                consumer.consume(item).await;
                let settled = {
                    let mut inner = shared.inner.lock();
                    inner.in_flight -= 1;
                    inner.settled()
                };
                if settled {
                    shared.drained.notify_waiters();
                }
            }
            None => {
                if shared.inner.lock().settled() {
                    shared.drained.notify_waiters();
                }
                wake.await;
            }
        }
    }
}
