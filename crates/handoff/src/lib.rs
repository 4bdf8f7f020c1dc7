//! Concurrency scaffolding shared by the rover pipeline stages.
//!
//! - [`BoundedQueue`]: fixed-capacity blocking FIFO with a quit flag.
//! - [`Exchange`]: lock-guarded latest-value swap between a writer and readers.
//! - [`Worker`] / [`CancelToken`]: thread lifecycle and cooperative shutdown.

mod exchange;
mod queue;
mod worker;

pub use exchange::Exchange;
pub use queue::{BoundedQueue, TryEnqueueError};
pub use worker::{CancelToken, Worker, WorkerError, spawn_thread};
