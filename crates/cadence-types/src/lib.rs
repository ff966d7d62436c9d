//! # Cadence Shared Types
//!
//! Cross-boundary types for the Cadence blockchain development kit: the
//! opaque [`Block`] contract the kernel schedules around, the
//! [`NetworkMessage`] envelope exchanged with the transport, and the
//! [`Competition`] interface through which a consensus implementation offers
//! candidate branches for block generation.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every type that crosses the kernel boundary
//!   lives here, so blockchain, consensus, and transport implementations
//!   depend only on this crate.
//! - **Opaque Blocks**: the kernel never inspects block contents. It routes
//!   on `hash()` / `parent_hash()` / `block_number()` and defers everything
//!   else to the embedding blockchain.
//! - **No Reflection**: decoding goes through [`BlockFactory`], which hands
//!   out fresh empty blocks for the transport bytes to be decoded into.

pub mod block;
pub mod competition;
pub mod errors;
pub mod message;
pub mod protocol;

pub use block::{Block, BlockAddOutcome, BlockFactory, BlockHash};
pub use competition::{BranchSelection, Competition};
pub use errors::CodecError;
pub use message::NetworkMessage;
pub use protocol::{MessageProtocol, RESOURCE_BLOCK};
