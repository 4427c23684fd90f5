//! omniconv — a file-conversion job engine.
//!
//! Accepts file bytes plus a declared source/destination format pair,
//! deduplicates the upload into a content-addressed store, and converts
//! it asynchronously by walking an ordered chain of conversion
//! strategies (external tools and built-in fallbacks) until one
//! succeeds. Jobs are tracked through a `pending → converting →
//! completed | error` state machine and polled via the
//! [`engine::ConversionEngine`] facade; HTTP plumbing is left to the
//! embedding application.

pub mod broadcast;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod format;
pub mod job;
pub mod routing;
pub mod store;
pub mod strategy;
pub mod telemetry;
pub mod worker;

pub use broadcast::{JobProgressBroadcaster, JobProgressEvent};
pub use config::{default_storage_root, load_config, EngineConfig};
pub use engine::{ConversionEngine, JobStatusReport};
pub use error::{
    ConfigError, EngineError, JobError, Result, RoutingError, StoreError, StrategyError,
    WorkerError,
};
pub use format::Format;
pub use job::{JobCounts, JobRecord, JobStatus, JobStore};
pub use routing::{RoutingTable, StrategyId};
pub use store::{CleanupReport, ContentStore, StorageLifecycle, StorageReport, StoreStats};
pub use strategy::{ConversionRequest, ConversionStrategy, StrategyRegistry};
pub use worker::{DispatchResult, DispatchTicket, WorkerPool};
