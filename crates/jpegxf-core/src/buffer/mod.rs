//! In-memory I/O in place of files.
//!
//! - [`InputSource`]: the bytes a job decodes, from a file or foreign memory
//! - [`OutputBuffer`]: the growable sink the compressor writes into
//! - result handles: how a finished buffer crosses to the host

mod input;
mod output;
mod result;

pub use input::{parse_buffer_name, ForeignBytes, ForeignRange, InputPolicy, InputSource, BUFFER_PREFIX};
pub use output::{OutputBuffer, INITIAL_CAPACITY};
pub use result::{into_result_handle, release_result, result_data, result_len, ResultHandle};
