//! jpegxf Core - lossless JPEG transcoding over MozJPEG
//!
//! This crate drives the MozJPEG engine through jpegtran-style jobs: decode
//! to DCT coefficients, rotate/flip/transpose/crop/wipe them without
//! recompression, and re-encode into memory. Jobs are configured with a
//! jpegtran argument vector, report progress, results and an exit status
//! through a process-wide [`ProgressChannel`], and may run detached on their
//! own worker thread.
//!
//! # Modules
//!
//! - [`args`]: switch matching and two-pass argument parsing
//! - [`buffer`]: in-memory input sources, growable output, result handles
//! - [`progress`]: the notification channel and its event records
//! - [`pipeline`]: the transcode and compress jobs
//! - [`executor`]: detached, one-thread-per-job execution
//!
//! Fatal conditions surface as [`TranscodeError`], which maps onto the
//! [`ExitStatus`] carried by a job's exit event.

pub mod args;
pub mod buffer;
mod codec;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod progress;

#[cfg(test)]
pub(crate) mod test_support;

pub use args::{keymatch, parse_switches, CropSpec, TransformKind, TransformRequest};
pub use buffer::{release_result, result_data, result_len, InputPolicy, ResultHandle};
pub use error::{ExitStatus, TranscodeError};
pub use executor::{submit_detached, CompressJob, Executor, Job, TranscodeJob};
pub use pipeline::{
    compress, transcode, transcode_trusting_buffers, ColorSpace, CompressRequest, Transcoder,
};
pub use progress::{EventRecord, JobContext, PortSink, ProgressChannel, ProgressEvent};
