//! Outbound ports (driven side).
//!
//! The kernel is domain-agnostic: blockchain rules, consensus, and the
//! network transport are supplied through these interfaces at
//! configuration time. The kernel calls them; it never implements them.

use std::sync::Arc;

use async_trait::async_trait;
use cadence_types::{Block, BlockAddOutcome, Competition, NetworkMessage};

use crate::error::Result;

/// Port: the blockchain rules.
#[async_trait]
pub trait BlockchainPort: Send + Sync {
    /// Produce the genesis block. Called at most once, and only when the
    /// node is configured as the genesis producer.
    async fn generate_genesis(&self) -> Result<Arc<dyn Block>>;

    /// Produce the next block on `branch` (head first), rooted at `root_id`.
    async fn generate_block(
        &self,
        branch: Vec<Arc<dyn Block>>,
        root_id: u64,
    ) -> Result<Arc<dyn Block>>;

    /// Admit a batch of blocks. `local` is true for blocks this node
    /// generated itself, false for blocks received from the network.
    ///
    /// The outcome's `added_block` names the block the chain accepted, if
    /// any; the kernel re-broadcasts it.
    async fn add_blocks(&self, blocks: Vec<Arc<dyn Block>>, local: bool)
        -> Result<BlockAddOutcome>;
}

/// Port: the consensus implementation.
#[async_trait]
pub trait ConsensusPort: Send + Sync {
    /// Confirm finalized blocks. Called once per maintenance slice.
    async fn confirm_blocks(&self);

    /// Evaluate competing branches. Called once per maintenance slice; the
    /// returned competition drives generation in the next processing slice.
    async fn evaluate(&self) -> Option<Box<dyn Competition>>;
}

/// Handler invoked by a receive queue for each inbound message.
pub type MessageHandler = Arc<dyn Fn(NetworkMessage) + Send + Sync>;

/// Port: the network transport.
///
/// The transport owns peer discovery and wire encoding; the kernel only
/// pushes outbound messages and registers one inbound callback.
pub trait NetworkNode: Send + Sync {
    /// This node's peer identifier.
    fn peer_id(&self) -> String;

    /// Broadcast a batch of messages to the network.
    fn broadcast(&self, messages: Vec<NetworkMessage>);

    /// Register the inbound message callback. Called once at kernel
    /// initialization.
    fn on_message_received(&self, handler: MessageHandler);
}
