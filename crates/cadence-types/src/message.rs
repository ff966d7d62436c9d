//! The network message envelope.

use serde::{Deserialize, Serialize};

use crate::block::BlockHash;
use crate::protocol::MessageProtocol;

/// A message exchanged with the network transport.
///
/// For block messages the kernel enforces `hash == block.hash()` at intake;
/// a mismatch drops the message before it can reach the blockchain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkMessage {
    /// Marshalled payload.
    pub data: Vec<u8>,
    /// Content links referenced by the payload.
    pub links: Vec<String>,
    /// Hash of the resource carried by the payload.
    pub hash: BlockHash,
    /// Protocol identifier used to route the message to a receive queue.
    pub protocol: MessageProtocol,
    /// Peer id of the sender.
    pub from: String,
}

impl NetworkMessage {
    /// Short sender id for log lines.
    pub fn from_short(&self) -> &str {
        match self.from.char_indices().nth(6) {
            Some((idx, _)) => &self.from[..idx],
            None => &self.from,
        }
    }
}
