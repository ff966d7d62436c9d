//! Batch variant of the push queue.
//!
//! Identical contract to [`crate::domain::PushQueue`] except the consumer
//! receives up to `batch_size` items per call, in FIFO order. The kernel
//! uses it for the per-parent intake queues, where block admission is
//! batched into the blockchain callback.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::warn;

/// Consumer invoked by queue workers with batches of queued items.
#[async_trait]
pub trait BatchConsumer<T>: Send + Sync {
    /// Process one batch. Items arrive in the order they were enqueued.
    async fn consume_batch(&self, items: Vec<T>);
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
    batch_size: usize,
    work: Notify,
    drained: Notify,
    overflow: Mutex<Option<OverflowHandler<T>>>,
}

/// A bounded FIFO queue whose workers consume in batches.
///
/// Must be created inside a Tokio runtime.
pub struct PushBatchQueue<T> {
    shared: Arc<Shared<T>>,
    workers: Vec<JoinHandle<()>>,
}

impl<T: Send + 'static> PushBatchQueue<T> {
    /// Create a queue with `workers` consumer slots, room for `capacity`
    /// items, and at most `batch_size` items per consumer call.
    pub fn new(
        workers: usize,
        capacity: usize,
        batch_size: usize,
        consumer: Arc<dyn BatchConsumer<T>>,
    ) -> Self {
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                running: false,
                draining: false,
                in_flight: 0,
                closed: false,
            }),
            capacity,
            batch_size: batch_size.max(1),
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
                    None => warn!("push batch queue full, dropping item"),
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

    /// Stop consuming. The in-flight batch completes; queued items are
    /// retained until the next `start` or `drain`.
    pub fn stop(&self) {
        self.shared.inner.lock().running = false;
    }

    /// Consume until the queue is empty and the last batch has completed,
    /// then return. Runs the consumer even while stopped.
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

impl<T> Drop for PushBatchQueue<T> {
    fn drop(&mut self) {
        self.shared.inner.lock().closed = true;
        self.shared.work.notify_waiters();
        self.workers.clear();
    }
}

async fn worker_loop<T: Send + 'static>(
    shared: Arc<Shared<T>>,
    consumer: Arc<dyn BatchConsumer<T>>,
) {
    loop {
        let mut wake = std::pin::pin!(shared.work.notified());
        wake.as_mut().enable();
        let batch = {
            let mut inner = shared.inner.lock();
            if inner.closed {
                return;
            }
            if inner.running || inner.draining {
                let take = inner.items.len().min(shared.batch_size);
                if take > 0 {
                    inner.in_flight += take;
                    Some(inner.items.drain(..take).collect::<Vec<_>>())
                } else {
                    None
                }
            } else {
                None
            }
        };
        match batch {
            Some(batch) => {
                let size = batch.len();
                consumer.consume_batch(batch).await;
                let settled = {
                    let mut inner = shared.inner.lock();
                    inner.in_flight -= size;
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
