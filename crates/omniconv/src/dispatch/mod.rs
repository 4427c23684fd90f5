pub mod progress;
pub mod runner;

pub use progress::{BroadcastProgress, NoopProgress, ProgressEvent, ProgressReporter};
pub use runner::{DispatchOutcome, Dispatcher};
