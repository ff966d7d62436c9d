//! Interfaces to the kernel's external collaborators.

pub mod outbound;

pub use outbound::{BlockchainPort, ConsensusPort, MessageHandler, NetworkNode};
