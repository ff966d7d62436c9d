//! Kernel configuration.
//!
//! Every collaborator the kernel drives is supplied here. The
//! configuration is validated before any subsystem is built; a missing
//! collaborator or an out-of-range frequency is a hard initialization
//! error, never a partial boot.

use std::sync::Arc;

use cadence_types::BlockFactory;
use serde::Deserialize;

use crate::error::{KernelError, Result};
use crate::ports::{BlockchainPort, ConsensusPort, NetworkNode};
use crate::service::Kernel;

/// Hook run once after kernel initialization completes.
pub type InitHook = Box<dyn FnOnce(&Arc<Kernel>) + Send>;

/// Kernel configuration. All collaborators are required.
pub struct KernelConfig {
    /// Name of the blockchain this kernel drives; tags the block protocol.
    pub blockchain_name: String,
    /// Target block production rate in blocks per second.
    pub block_frequency_hz: f64,
    /// Factory for empty blocks to decode transport bytes into.
    pub block_factory: Option<Arc<dyn BlockFactory>>,
    /// The blockchain rules: genesis, generation, admission.
    pub blockchain: Option<Arc<dyn BlockchainPort>>,
    /// The consensus implementation: confirmation and branch evaluation.
    pub consensus: Option<Arc<dyn ConsensusPort>>,
    /// The network transport.
    pub network_node: Option<Arc<dyn NetworkNode>>,
    /// Tunable options with sensible defaults.
    pub options: KernelOptions,
    /// Hooks run once after initialization.
    pub on_init: Vec<InitHook>,
}

impl KernelConfig {
    /// A configuration with the given name and frequency and no
    /// collaborators yet.
    pub fn new(blockchain_name: impl Into<String>, block_frequency_hz: f64) -> Self {
        Self {
            blockchain_name: blockchain_name.into(),
            block_frequency_hz,
            block_factory: None,
            blockchain: None,
            consensus: None,
            network_node: None,
            options: KernelOptions::default(),
            on_init: Vec::new(),
        }
    }

    /// Check completeness. Lists every missing or invalid field in the
    /// error so a misconfigured node fails loudly and informatively.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.blockchain_name.is_empty() {
            missing.push("blockchain_name");
        }
        if !(self.block_frequency_hz.is_finite() && self.block_frequency_hz > 0.0) {
            missing.push("block_frequency_hz (must be > 0)");
        }
        if self.block_factory.is_none() {
            missing.push("block_factory");
        }
        if self.blockchain.is_none() {
            missing.push("blockchain");
        }
        if self.consensus.is_none() {
            missing.push("consensus");
        }
        if self.network_node.is_none() {
            missing.push("network_node");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(KernelError::InvalidConfig(missing.join(", ")))
        }
    }
}

/// Optional kernel settings, loadable from a configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct KernelOptions {
    /// When true and no block has been produced yet, this node produces
    /// the genesis block.
    #[serde(default)]
    pub genesis: bool,

    /// Worker count for each protocol receive queue.
    #[serde(default = "default_receive_concurrency")]
    pub receive_concurrency: usize,
}

fn default_receive_concurrency() -> usize {
    1
}

impl Default for KernelOptions {
    fn default() -> Self {
        Self {
            genesis: false,
            receive_concurrency: default_receive_concurrency(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::MessageHandler;
    use async_trait::async_trait;
    use cadence_types::{
        Block, BlockAddOutcome, BlockHash, CodecError, Competition, NetworkMessage,
    };

    struct NullBlock;

    impl Block for NullBlock {
        fn hash(&self) -> BlockHash {
            BlockHash::default()
        }
        fn parent_hash(&self) -> BlockHash {
            BlockHash::default()
        }
        fn block_number(&self) -> u64 {
            0
        }
        fn marshal(&self) -> std::result::Result<(Vec<u8>, Vec<String>), CodecError> {
            Ok((vec![], vec![]))
        }
        fn unmarshal(
            &mut self,
            _data: &[u8],
            _links: &[String],
        ) -> std::result::Result<(), CodecError> {
            Ok(())
        }
    }

    struct NullFactory;

    impl BlockFactory for NullFactory {
        fn make_empty_block(&self) -> Box<dyn Block> {
            Box::new(NullBlock)
        }
    }

    struct NullChain;

    #[async_trait]
    impl BlockchainPort for NullChain {
        async fn generate_genesis(&self) -> Result<Arc<dyn Block>> {
            Ok(Arc::new(NullBlock))
        }
        async fn generate_block(
            &self,
            _branch: Vec<Arc<dyn Block>>,
            _root_id: u64,
        ) -> Result<Arc<dyn Block>> {
            Ok(Arc::new(NullBlock))
        }
        async fn add_blocks(
            &self,
            _blocks: Vec<Arc<dyn Block>>,
            _local: bool,
        ) -> Result<BlockAddOutcome> {
            Ok(BlockAddOutcome::default())
        }
    }

    struct NullConsensus;

    #[async_trait]
    impl ConsensusPort for NullConsensus {
        async fn confirm_blocks(&self) {}
        async fn evaluate(&self) -> Option<Box<dyn Competition>> {
            None
        }
    }

    struct NullNode;

    impl NetworkNode for NullNode {
        fn peer_id(&self) -> String {
            String::new()
        }
        fn broadcast(&self, _messages: Vec<NetworkMessage>) {}
        fn on_message_received(&self, _handler: MessageHandler) {}
    }

    fn complete_config() -> KernelConfig {
        let mut config = KernelConfig::new("testchain", 10.0);
        config.block_factory = Some(Arc::new(NullFactory));
        config.blockchain = Some(Arc::new(NullChain));
        config.consensus = Some(Arc::new(NullConsensus));
        config.network_node = Some(Arc::new(NullNode));
        config
    }

    #[test]
    fn test_complete_config_is_valid() {
        assert!(complete_config().validate().is_ok());
    }

    #[test]
    fn test_missing_collaborators_are_named() {
        let config = KernelConfig::new("testchain", 10.0);
        let err = config.validate().unwrap_err();
        let text = err.to_string();
        assert!(text.contains("block_factory"));
        assert!(text.contains("network_node"));
    }

    #[test]
    fn test_zero_frequency_is_invalid() {
        let mut config = complete_config();
        config.block_frequency_hz = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: KernelOptions = serde_json::from_str("{}").unwrap();
        assert!(!options.genesis);
        assert_eq!(options.receive_concurrency, 1);

        let options: KernelOptions =
            serde_json::from_str(r#"{"genesis": true, "receive_concurrency": 4}"#).unwrap();
        assert!(options.genesis);
        assert_eq!(options.receive_concurrency, 4);
    }
}
