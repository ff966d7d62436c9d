//! Per-parent block intake queues.
//!
//! Received blocks are queued by parent hash and indexed by block number.
//! At the start of each processing slice the registry is drained in
//! ascending block-number order, so parents are admitted before their
//! children within a single slice and slow parents cannot starve.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cadence_types::{Block, BlockHash, NetworkMessage};
use parking_lot::RwLock;
use tracing::warn;

use crate::domain::batch_queue::{BatchConsumer, PushBatchQueue};

/// One queued admission: the decoded block together with the message that
/// carried it, so an accepted block can be re-broadcast unchanged.
pub struct IntakeItem {
    /// The decoded block.
    pub block: Arc<dyn Block>,
    /// The network message the block arrived in.
    pub message: NetworkMessage,
}

struct ParentQueue {
    /// Block number under which this parent is indexed.
    block_number: u64,
    queue: PushBatchQueue<IntakeItem>,
}

/// Registry of per-parent intake queues.
///
/// Invariants: every parent hash indexed under a block number has a queue;
/// deleting a parent's queue removes its index entry; an empty index set is
/// treated as absent.
pub struct IntakeQueues {
    queues: RwLock<HashMap<BlockHash, Arc<ParentQueue>>>,
    by_number: RwLock<BTreeMap<u64, HashSet<BlockHash>>>,
    started: AtomicBool,
    consumer: Arc<dyn BatchConsumer<IntakeItem>>,
    capacity: usize,
    batch_size: usize,
}

impl IntakeQueues {
    /// Create an empty registry. Per-parent queues are created on first
    /// sight of a parent hash and share `consumer`.
    pub fn new(
        consumer: Arc<dyn BatchConsumer<IntakeItem>>,
        capacity: usize,
        batch_size: usize,
    ) -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
            by_number: RwLock::new(BTreeMap::new()),
            started: AtomicBool::new(false),
            consumer,
            capacity,
            batch_size,
        }
    }

    /// Queue a received block under its parent hash.
    pub fn put(&self, block: Arc<dyn Block>, message: NetworkMessage) {
        let parent = block.parent_hash();
        let existing = self.queues.read().get(&parent).cloned();
        let entry = match existing {
            Some(entry) => entry,
            None => self.register(parent, block.block_number()),
        };
        entry.queue.put(IntakeItem { block, message });
    }

    fn register(&self, parent: BlockHash, block_number: u64) -> Arc<ParentQueue> {
        let mut queues = self.queues.write();
        // Another producer may have won the race between the read check
        // and this write lock.
        if let Some(entry) = queues.get(&parent) {
            return Arc::clone(entry);
        }

        let queue = PushBatchQueue::new(1, self.capacity, self.batch_size, Arc::clone(&self.consumer));
        let overflow_parent = parent.clone();
        queue.on_overflow(move |item: IntakeItem| {
            warn!(
                parent = %overflow_parent.short(),
                block = %item.block.hash().short(),
                "block intake queue full, dropping block"
            );
        });

        let entry = Arc::new(ParentQueue {
            block_number,
            queue,
        });
        queues.insert(parent.clone(), Arc::clone(&entry));
        self.by_number
            .write()
            .entry(block_number)
            .or_default()
            .insert(parent);
        entry
    }

    /// Drain every per-parent queue once, in ascending block-number order,
    /// awaiting each queue's drained barrier before moving on. Aborts the
    /// sweep early if `stop` is called.
    pub async fn start(&self) {
        self.started.store(true, Ordering::SeqCst);

        let numbers: Vec<u64> = self.by_number.read().keys().copied().collect();
        for number in numbers {
            if !self.started.load(Ordering::SeqCst) {
                return;
            }
            let parents: Vec<BlockHash> = match self.by_number.read().get(&number) {
                Some(set) => set.iter().cloned().collect(),
                None => continue,
            };
            for parent in parents {
                if !self.started.load(Ordering::SeqCst) {
                    return;
                }
                let entry = self.queues.read().get(&parent).cloned();
                if let Some(entry) = entry {
                    entry.queue.drain().await;
                    entry.queue.stop();
                }
            }
        }
    }

    /// Halt every per-parent queue. In-flight batches complete; backlogs
    /// are retained for the next `start`.
    pub fn stop(&self) {
        self.started.store(false, Ordering::SeqCst);
        for entry in self.queues.read().values() {
            entry.queue.stop();
        }
    }

    /// Remove a parent's queue and its block-number index entry. For the
    /// embedding blockchain to call once a parent's descendants are
    /// finalized; the kernel never evicts on its own.
    pub fn delete(&self, parent: &BlockHash) {
        let removed = self.queues.write().remove(parent);
        if let Some(entry) = removed {
            let mut by_number = self.by_number.write();
            if let Some(set) = by_number.get_mut(&entry.block_number) {
                set.remove(parent);
                if set.is_empty() {
                    by_number.remove(&entry.block_number);
                }
            }
        }
    }

    /// Total queued blocks across all parents.
    pub fn count(&self) -> usize {
        self.queues.read().values().map(|e| e.queue.count()).sum()
    }
}
