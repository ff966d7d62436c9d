//! The block engine.
//!
//! Owns the intake queues, the generation trigger, and the admission
//! worker. During a processing slice it drains received blocks into the
//! blockchain and generates this node's block for the slot; during a
//! maintenance slice it runs the confirmer and the competition evaluator.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use async_trait::async_trait;
use cadence_types::{
    Block, BlockFactory, BlockHash, Competition, MessageProtocol, NetworkMessage,
};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::domain::{BatchConsumer, IntakeItem, IntakeQueues};
use crate::error::Result;
use crate::metrics::KernelMetrics;
use crate::net::NetPort;
use crate::ports::{BlockchainPort, ConsensusPort};
use crate::time::KernelTime;
use crate::{BLOCK_BATCH_SIZE, QUEUE_CAPACITY};

/// Admits drained intake batches into the blockchain and re-broadcasts the
/// accepted block. Shared by every per-parent queue.
struct AdmitWorker {
    blockchain: Arc<dyn BlockchainPort>,
    net: Arc<NetPort>,
    metrics: Arc<KernelMetrics>,
}

#[async_trait]
impl BatchConsumer<IntakeItem> for AdmitWorker {
    async fn consume_batch(&self, items: Vec<IntakeItem>) {
        let mut blocks: Vec<Arc<dyn Block>> = Vec::with_capacity(items.len());
        let mut index: HashMap<BlockHash, NetworkMessage> = HashMap::with_capacity(items.len());
        for item in items {
            index.insert(item.block.hash(), item.message);
            blocks.push(item.block);
        }

        let started = Instant::now();
        let outcome = match self.blockchain.add_blocks(blocks, false).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(error = %err, "failed to add received blocks");
                return;
            }
        };
        self.metrics
            .set_add_block_time(started.elapsed().as_nanos() as f64);

        if let Some(added) = outcome.added_block {
            match index.remove(&added.hash()) {
                Some(message) => self.net.priority_broadcast(message),
                None => warn!(
                    block = %added.hash().short(),
                    "added block has no incoming message to re-broadcast"
                ),
            }
        }
    }
}

/// The block engine.
pub struct BlockEngine {
    factory: Arc<dyn BlockFactory>,
    blockchain: Arc<dyn BlockchainPort>,
    consensus: Arc<dyn ConsensusPort>,
    net: Arc<NetPort>,
    metrics: Arc<KernelMetrics>,
    time: Arc<KernelTime>,
    intake: IntakeQueues,
    protocol: MessageProtocol,
    genesis: AtomicBool,
    gen_num: AtomicU64,
    comp: Mutex<Option<Box<dyn Competition>>>,
}

impl BlockEngine {
    /// Create the engine and register its block channel on the net port.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        blockchain_name: &str,
        factory: Arc<dyn BlockFactory>,
        blockchain: Arc<dyn BlockchainPort>,
        consensus: Arc<dyn ConsensusPort>,
        net: Arc<NetPort>,
        metrics: Arc<KernelMetrics>,
        time: Arc<KernelTime>,
        genesis: bool,
    ) -> Arc<Self> {
        let worker = Arc::new(AdmitWorker {
            blockchain: Arc::clone(&blockchain),
            net: Arc::clone(&net),
            metrics: Arc::clone(&metrics),
        });

        let protocol = MessageProtocol::for_blocks(
            blockchain_name,
            format!("{blockchain_name}-block"),
            "1",
        );

        let engine = Arc::new(Self {
            factory,
            blockchain,
            consensus,
            net: Arc::clone(&net),
            metrics,
            time,
            intake: IntakeQueues::new(worker, QUEUE_CAPACITY, BLOCK_BATCH_SIZE),
            protocol,
            genesis: AtomicBool::new(genesis),
            gen_num: AtomicU64::new(0),
            comp: Mutex::new(None),
        });

        let weak: Weak<BlockEngine> = Arc::downgrade(&engine);
        net.register_channel(
            &engine.protocol,
            Arc::new(move |message| {
                if let Some(engine) = weak.upgrade() {
                    engine.receive(message);
                }
            }),
        );

        engine
    }

    /// The number this node will generate next (the latest generated block
    /// number until the next generation round).
    pub fn block_number(&self) -> u64 {
        self.gen_num.load(Ordering::Relaxed)
    }

    /// The protocol the engine's block channel is registered under.
    pub fn protocol(&self) -> &MessageProtocol {
        &self.protocol
    }

    /// Resume intake: drain queued received blocks in ascending
    /// block-number order.
    pub async fn start(&self) {
        debug!(ktime = %self.time, "resuming new block processing");
        self.intake.start().await;
    }

    /// Suspend intake. In-flight admission batches complete.
    pub fn stop(&self) {
        debug!(ktime = %self.time, "suspending new block processing");
        self.intake.stop();
    }

    /// Maintenance round: confirm finalized blocks, re-evaluate the
    /// competition, sample the intake depth.
    pub async fn maint(&self) {
        debug!(ktime = %self.time, "running block confirmer");
        let started = Instant::now();
        self.consensus.confirm_blocks().await;
        self.metrics
            .set_conf_block_time(started.elapsed().as_nanos() as f64);

        debug!(ktime = %self.time, "running head block evaluator");
        let started = Instant::now();
        let comp = self.consensus.evaluate().await;
        self.metrics
            .set_eval_time(started.elapsed().as_nanos() as f64);
        *self.comp.lock() = comp;

        self.metrics.set_block_q_count(self.intake.count());
    }

    /// Generate this node's block for the slot, if there is anything to
    /// build on.
    pub async fn generate(&self) {
        debug!(ktime = %self.time, "initiating block generation");

        if self.genesis.load(Ordering::SeqCst) && self.gen_num.load(Ordering::SeqCst) == 0 {
            match self.blockchain.generate_genesis().await {
                Ok(block) => {
                    self.gen_num.store(1, Ordering::SeqCst);
                    self.genesis.store(false, Ordering::SeqCst);
                    self.output_new_local_block(block).await;
                }
                Err(err) => error!(error = %err, "failed to generate genesis block"),
            }
            return;
        }

        let gen_num = self.gen_num.load(Ordering::SeqCst);
        let selection = {
            let comp = self.comp.lock();
            comp.as_ref().and_then(|c| c.branch(gen_num))
        };
        let Some(selection) = selection else {
            debug!(ktime = %self.time, block = gen_num, "no competition at block");
            return;
        };
        if selection.branch.is_empty() {
            warn!(ktime = %self.time, "competition returned an empty branch");
            return;
        }
        if selection.switch_heads {
            info!(
                ktime = %self.time,
                root_id = selection.root_id,
                "switching heads for block generation"
            );
        }

        self.gen_num
            .store(selection.branch[0].block_number() + 1, Ordering::SeqCst);

        let started = Instant::now();
        let block = match self
            .blockchain
            .generate_block(selection.branch, selection.root_id)
            .await
        {
            Ok(block) => block,
            Err(err) => {
                error!(error = %err, "failed to generate block");
                return;
            }
        };
        self.metrics
            .set_gen_block_time(started.elapsed().as_nanos() as f64);

        self.output_new_local_block(block).await;
    }

    /// Admit a locally generated block (bypassing the intake queues) and
    /// broadcast it. The broadcast is priority: a freshly minted local
    /// block must reach peers within the current slot.
    async fn output_new_local_block(&self, block: Arc<dyn Block>) {
        let message = match self.make_net_msg(&block) {
            Ok(message) => message,
            Err(err) => {
                error!(error = %err, "failed to make net message from newly generated block");
                return;
            }
        };
        debug!(
            ktime = %self.time,
            block = block.block_number(),
            hash = %block.hash().short(),
            "generated local block"
        );

        match self.blockchain.add_blocks(vec![block], true).await {
            Ok(outcome) => {
                if outcome.added_block.is_some() {
                    self.net.priority_broadcast(message);
                }
            }
            Err(err) => {
                error!(error = %err, "failed to add locally-generated block to consensus");
            }
        }
    }

    /// Ingress handler for the engine's block channel: decode, verify the
    /// message hash, queue for admission.
    pub fn receive(&self, message: NetworkMessage) {
        let mut block = self.factory.make_empty_block();
        if let Err(err) = block.unmarshal(&message.data, &message.links) {
            error!(
                from = %message.from_short(),
                error = %err,
                "failed to unmarshal block message"
            );
            return;
        }
        let block: Arc<dyn Block> = Arc::from(block);

        if block.hash() != message.hash {
            error!(
                from = %message.from_short(),
                "block data does not match message hash"
            );
            return;
        }

        self.intake.put(block, message);
    }

    /// Remove a parent's intake queue once its descendants are finalized.
    pub fn delete_queue(&self, parent: &BlockHash) {
        self.intake.delete(parent);
    }

    /// Total blocks waiting in the intake queues.
    pub fn queued_blocks(&self) -> usize {
        self.intake.count()
    }

    fn make_net_msg(&self, block: &Arc<dyn Block>) -> Result<NetworkMessage> {
        let (data, links) = block.marshal()?;
        Ok(NetworkMessage {
            data,
            links,
            hash: block.hash(),
            protocol: self.protocol.clone(),
            from: self.net.peer_id(),
        })
    }
}
