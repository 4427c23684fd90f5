pub mod pool;

pub use pool::{DispatchResult, DispatchTicket, WorkerPool};

// Re-export crossbeam_channel for embedders wiring their own plumbing
pub use crossbeam_channel;
