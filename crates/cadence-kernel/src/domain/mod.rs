//! Pure kernel building blocks: moving averages and the queue family.

pub mod batch_queue;
pub mod intake;
pub mod push_queue;
pub mod sma;

pub use batch_queue::{BatchConsumer, PushBatchQueue};
pub use intake::{IntakeItem, IntakeQueues};
pub use push_queue::{PushQueue, QueueConsumer};
pub use sma::MultiSma;
