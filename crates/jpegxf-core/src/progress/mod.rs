//! Progress, result and exit notifications to the host.
//!
//! Every job emits zero or more progress events, at most one result event
//! and exactly one exit event, in that order. Events are flattened into
//! [`EventRecord`]s and posted through the process-wide [`ProgressChannel`].

mod channel;
mod event;
mod tracker;

pub use channel::{PortSink, ProgressChannel};
pub use event::{EventRecord, JobContext, ProgressEvent, PASS_EXIT_CODE, PASS_RESULT_POINTER};
pub use tracker::{ProgressTracker, ProgressUpdate};
