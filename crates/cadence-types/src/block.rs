//! The opaque block contract.
//!
//! The kernel treats blocks as opaque values: `hash()` is the identity,
//! `parent_hash()` is the routing key for intake queues, and
//! `block_number()` orders intake admission. Everything else about a block
//! belongs to the embedding blockchain.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::CodecError;

/// An owned block hash.
///
/// Hash length is owned by the embedding blockchain (a content address, a
/// 32-byte digest, whatever the chain uses); the kernel only compares and
/// routes on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BlockHash(Vec<u8>);

impl BlockHash {
    /// Wrap raw hash bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// The raw hash bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Whether the hash is empty (an unset hash).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Short hex form for log lines (first six hex digits).
    pub fn short(&self) -> String {
        let hex = self.to_string();
        hex.chars().take(6).collect()
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<Vec<u8>> for BlockHash {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for BlockHash {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

/// A block as seen by the kernel.
///
/// `marshal` produces the transport payload plus the content links the
/// payload references; `unmarshal` is the inverse, decoding into a fresh
/// block obtained from a [`BlockFactory`].
pub trait Block: Send + Sync {
    /// Identity of the block.
    fn hash(&self) -> BlockHash;

    /// Identity of the parent block; routing key for intake.
    fn parent_hash(&self) -> BlockHash;

    /// Position of the block in its chain.
    fn block_number(&self) -> u64;

    /// Encode the block for transport: `(payload, links)`.
    fn marshal(&self) -> Result<(Vec<u8>, Vec<String>), CodecError>;

    /// Decode transport bytes into this (empty) block.
    fn unmarshal(&mut self, data: &[u8], links: &[String]) -> Result<(), CodecError>;
}

/// Factory producing fresh empty blocks for decoding.
///
/// Supplied in the kernel configuration; replaces prototype cloning so the
/// kernel never needs to know the concrete block type.
pub trait BlockFactory: Send + Sync {
    /// A fresh empty block that `Block::unmarshal` can fill.
    fn make_empty_block(&self) -> Box<dyn Block>;
}

/// Outcome of a block admission call.
#[derive(Clone, Default)]
pub struct BlockAddOutcome {
    /// The block the chain accepted out of the submitted batch, if any.
    /// An accepted block is re-broadcast by the kernel.
    pub added_block: Option<Arc<dyn Block>>,
}

impl fmt::Debug for BlockAddOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockAddOutcome")
            .field("added_block", &self.added_block.as_ref().map(|b| b.hash()))
            .finish()
    }
}
