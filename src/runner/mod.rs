//! Background runs: cancellation, progress reporting and the run controller

mod context;
mod controller;

pub use context::{CancelToken, ProgressEvent, ProgressSink, RunContext, DEFAULT_BATCH_SIZE};
pub use controller::{
    GroupJob, Job, LookupJob, RunController, RunHandle, RunRequest, RunStatus, RunSummary, Tool,
};
