//! Message protocol identifiers.
//!
//! Every network message is tagged with a four-part protocol identifier.
//! The canonical string form keys the kernel's receive queues: one queue
//! per registered protocol, messages for unknown protocols are dropped.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Resource type for block messages.
pub const RESOURCE_BLOCK: &str = "block";

/// A four-part protocol identifier:
/// `<blockchain-name>/<resource-type>/<component-type>/<version>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageProtocol {
    /// Name of the blockchain the message belongs to.
    pub blockchain: String,
    /// Kind of resource carried (e.g. [`RESOURCE_BLOCK`]).
    pub resource: String,
    /// Concrete component type within the resource kind.
    pub component: String,
    /// Protocol version of the component.
    pub version: String,
}

impl MessageProtocol {
    /// Build a protocol identifier from its four parts.
    pub fn new(
        blockchain: impl Into<String>,
        resource: impl Into<String>,
        component: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            blockchain: blockchain.into(),
            resource: resource.into(),
            component: component.into(),
            version: version.into(),
        }
    }

    /// Protocol identifier for a blockchain's block messages.
    pub fn for_blocks(
        blockchain: impl Into<String>,
        component: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self::new(blockchain, RESOURCE_BLOCK, component, version)
    }

    /// All four parts are present.
    pub fn is_valid(&self) -> bool {
        !self.blockchain.is_empty()
            && !self.resource.is_empty()
            && !self.component.is_empty()
            && !self.version.is_empty()
    }
}

impl fmt::Display for MessageProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.blockchain, self.resource, self.component, self.version
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_joins_parts() {
        let protocol = MessageProtocol::for_blocks("luca", "luca-block", "1");
        assert_eq!(protocol.to_string(), "luca/block/luca-block/1");
    }

    #[test]
    fn test_validity() {
        let protocol = MessageProtocol::for_blocks("luca", "luca-block", "1");
        assert!(protocol.is_valid());

        let missing = MessageProtocol::new("luca", "", "luca-block", "1");
        assert!(!missing.is_valid());
    }

    #[test]
    fn test_round_trips_through_serde() {
        let protocol = MessageProtocol::for_blocks("luca", "luca-block", "1");
        let json = serde_json::to_string(&protocol).unwrap();
        let back: MessageProtocol = serde_json::from_str(&json).unwrap();
        assert_eq!(back, protocol);
    }
}
