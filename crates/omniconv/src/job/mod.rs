pub mod record;
pub mod store;

pub use record::{JobCounts, JobRecord, JobStatus};
pub use store::JobStore;
