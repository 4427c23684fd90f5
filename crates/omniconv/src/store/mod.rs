pub mod content;
pub mod lifecycle;

pub use content::{ContentStore, StoreStats};
pub use lifecycle::{CleanupReport, StorageLifecycle, StorageReport};
