//! # Cadence Kernel
//!
//! The kernel of the Cadence blockchain development kit: a single-node
//! runtime that drives block production, ingestion, validation, and
//! broadcast at a configured block frequency. The kernel is
//! domain-agnostic; the blockchain rules, the consensus evaluator, and the
//! network transport are supplied as ports in [`config::KernelConfig`].
//!
//! ## The block cycle
//!
//! Each block interval is partitioned into two slices:
//!
//! ```text
//! ┌────────────────────── one cycle = one block slot ─────────────────────┐
//! │  PROC                                   │  MAINT                      │
//! │  admit queued received blocks           │  confirm finalized blocks   │
//! │  generate the local block               │  evaluate competing branches│
//! │  hold non-priority broadcasts           │  sample queue depths        │
//! │  flush held broadcasts at slice end     │                             │
//! └───────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The processing budget is self-tuning: `block_interval - avg(maint)`,
//! clamped to zero on overrun. Holding broadcasts during processing breaks
//! intra-cycle feedback loops; a message generated in a cycle can be
//! answered in the next cycle at the earliest.
//!
//! ## Key Invariants
//!
//! 1. **Cycle monotonicity**: the cycle number increments exactly once per
//!    processing slice.
//! 2. **Slice exclusivity**: no intake batch worker runs during a
//!    maintenance slice.
//! 3. **Intake ordering**: queued blocks are admitted in ascending
//!    block-number order across parents, FIFO within a parent.
//! 4. **Hold release**: every held broadcast reaches the transport exactly
//!    once, in arrival order, before holding ends.
//! 5. **Hash integrity**: a message whose block hash does not match its
//!    envelope never reaches the blockchain.
//!
//! ## Module Structure
//!
//! - [`service`]: the [`Kernel`] value and the proc/maint cycle loop
//! - [`engine`]: block generation, local admission, intake draining
//! - [`net`]: receive queues and broadcast holding
//! - [`domain`]: push queues, intake registry, moving averages
//! - [`metrics`]: the multi-window SMA registry and snapshots
//! - [`time`]: block frequency, cycle counter, uptime
//! - [`proc`]: the supervised process table
//! - [`ports`]: interfaces to the embedding blockchain
//! - [`rpc`]: the metrics query surface

pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod net;
pub mod ports;
pub mod proc;
pub mod rpc;
pub mod service;
pub mod time;

pub use config::{InitHook, KernelConfig, KernelOptions};
pub use engine::BlockEngine;
pub use error::{KernelError, Result};
pub use metrics::KernelMetrics;
pub use net::NetPort;
pub use ports::{BlockchainPort, ConsensusPort, MessageHandler, NetworkNode};
pub use proc::{ProcTable, Process};
pub use rpc::{get_metrics, GetMetricsReply, GetMetricsRequest};
pub use service::Kernel;
pub use time::KernelTime;

/// Capacity of every kernel queue (receive, intake, hold).
pub const QUEUE_CAPACITY: usize = 100_000;

/// Blocks admitted per intake batch.
pub const BLOCK_BATCH_SIZE: usize = 100;

/// Held broadcasts flushed to the transport per batch.
pub const HOLD_FLUSH_BATCH: usize = 1_000;

/// Window sizes, in samples, of every metric series' moving averages.
pub const SMA_WINDOWS: [usize; 6] = [10, 100, 1_000, 10_000, 100_000, 1_000_000];
