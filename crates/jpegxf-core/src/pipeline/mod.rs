//! Job pipelines.
//!
//! - [`transcode`]: lossless transform of an existing JPEG
//! - [`compress`]: encoding raw pixel rows
//!
//! Both write into an [`crate::buffer::OutputBuffer`], report through a
//! [`crate::progress::ProgressChannel`] and end with one exit event.

mod compress;
mod transcode;

pub use compress::{compress, compress_with, ColorSpace, CompressRequest};
pub use transcode::{transcode, transcode_trusting_buffers, Stage, Transcoder};
