//! The kernel's network port.
//!
//! Ingress: one bounded receive queue per registered protocol; the
//! transport's inbound callback routes each message by protocol string and
//! drops unknown protocols. Egress: during a processing slice non-priority
//! broadcasts are parked in the hold mailbox and flushed when the slice
//! ends, so a message created in a cycle cannot be answered within the same
//! cycle. Priority broadcasts always go straight to the transport.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use cadence_types::{MessageProtocol, NetworkMessage};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::domain::{PushQueue, QueueConsumer};
use crate::metrics::KernelMetrics;
use crate::ports::{MessageHandler, NetworkNode};
use crate::{HOLD_FLUSH_BATCH, QUEUE_CAPACITY};

/// Bounded FIFO mailbox for outbound messages held across a processing
/// slice. Flushed by the scheduler at slice end; order of arrival is order
/// of release.
struct BroadcastMailbox {
    items: Mutex<VecDeque<NetworkMessage>>,
    capacity: usize,
}

impl BroadcastMailbox {
    fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    /// Park a message. Returns false when the mailbox is full.
    fn put(&self, message: NetworkMessage) -> bool {
        let mut items = self.items.lock();
        if items.len() >= self.capacity {
            return false;
        }
        items.push_back(message);
        true
    }

    fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Forward every held message to the transport in arrival order, in
    /// batches, until the mailbox is empty.
    fn flush(&self, node: &dyn NetworkNode, batch_size: usize) {
        loop {
            let batch: Vec<NetworkMessage> = {
                let mut items = self.items.lock();
                let take = items.len().min(batch_size);
                if take == 0 {
                    return;
                }
                items.drain(..take).collect()
            };
            node.broadcast(batch);
        }
    }

    fn clear(&self) {
        self.items.lock().clear();
    }
}

/// Runs a receive queue's registered handler, one message at a time.
struct HandlerConsumer {
    handler: MessageHandler,
}

#[async_trait]
impl QueueConsumer<NetworkMessage> for HandlerConsumer {
    async fn consume(&self, message: NetworkMessage) {
        (self.handler)(message);
    }
}

/// The network port: receive queues keyed by protocol plus broadcast
/// holding.
pub struct NetPort {
    node: Arc<dyn NetworkNode>,
    hold: BroadcastMailbox,
    hold_broadcasts: AtomicBool,
    recv_qs: RwLock<HashMap<String, Arc<PushQueue<NetworkMessage>>>>,
    receive_concurrency: usize,
}

impl NetPort {
    /// Create the port and register the inbound callback on the transport.
    pub fn new(node: Arc<dyn NetworkNode>, receive_concurrency: usize) -> Arc<Self> {
        let port = Arc::new(Self {
            node,
            hold: BroadcastMailbox::new(QUEUE_CAPACITY),
            hold_broadcasts: AtomicBool::new(false),
            recv_qs: RwLock::new(HashMap::new()),
            receive_concurrency: receive_concurrency.max(1),
        });

        let weak: Weak<NetPort> = Arc::downgrade(&port);
        port.node.on_message_received(Arc::new(move |message| {
            if let Some(port) = weak.upgrade() {
                port.dispatch(message);
            }
        }));

        port
    }

    /// Register a receive queue for `protocol`, dispatching to `handler`.
    /// Idempotent: a protocol registered twice keeps its first queue.
    pub fn register_channel(&self, protocol: &MessageProtocol, handler: MessageHandler) {
        let key = protocol.to_string();
        let mut queues = self.recv_qs.write();
        if queues.contains_key(&key) {
            return;
        }
        let queue = PushQueue::new(
            self.receive_concurrency,
            QUEUE_CAPACITY,
            Arc::new(HandlerConsumer { handler }),
        );
        let overflow_key = key.clone();
        queue.on_overflow(move |message: NetworkMessage| {
            warn!(
                protocol = %overflow_key,
                from = %message.from_short(),
                "receive queue full, dropping message"
            );
        });
        queues.insert(key, Arc::new(queue));
    }

    fn dispatch(&self, message: NetworkMessage) {
        let key = message.protocol.to_string();
        match self.recv_qs.read().get(&key) {
            Some(queue) => queue.put(message),
            None => warn!(protocol = %key, "unknown message protocol received"),
        }
    }

    /// Broadcast a message, honoring the hold flag.
    pub fn broadcast(&self, message: NetworkMessage) {
        if self.hold_broadcasts.load(Ordering::SeqCst) {
            if !self.hold.put(message) {
                warn!("broadcast hold queue full, dropping message");
            }
        } else {
            self.priority_broadcast(message);
        }
    }

    /// Broadcast straight to the transport, bypassing the hold mailbox.
    pub fn priority_broadcast(&self, message: NetworkMessage) {
        self.node.broadcast(vec![message]);
    }

    /// Suspend non-priority broadcasts for the duration of a processing
    /// slice.
    pub fn begin_proc(&self) {
        debug!("suspending non-priority message broadcasts");
        self.hold_broadcasts.store(true, Ordering::SeqCst);
    }

    /// Release held broadcasts: flush the mailbox to empty, then resume
    /// direct broadcasting.
    pub fn end_proc(&self) {
        debug!(
            held = self.hold.len(),
            "resuming message broadcasts, sending held messages"
        );
        self.hold.flush(&*self.node, HOLD_FLUSH_BATCH);
        self.hold_broadcasts.store(false, Ordering::SeqCst);
    }

    /// Start every receive queue's workers.
    pub fn start(&self) {
        for queue in self.recv_qs.read().values() {
            queue.start();
        }
    }

    /// Stop every receive queue's workers; in-flight handlers complete.
    pub fn stop(&self) {
        for queue in self.recv_qs.read().values() {
            queue.stop();
        }
    }

    /// Drop any held broadcasts. Called on cancellation.
    pub fn discard_held(&self) {
        self.hold.clear();
    }

    /// Number of messages currently held.
    pub fn held_count(&self) -> usize {
        self.hold.len()
    }

    /// This node's peer identifier.
    pub fn peer_id(&self) -> String {
        self.node.peer_id()
    }

    /// Sample every receive queue's depth. Called once per maintenance
    /// slice.
    pub fn sample_metrics(&self, metrics: &KernelMetrics) {
        for (protocol, queue) in self.recv_qs.read().iter() {
            metrics.set_recv_q_count(protocol, queue.count());
        }
    }
}
