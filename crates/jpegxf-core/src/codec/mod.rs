//! Safe wrappers over the MozJPEG engine.
//!
//! The engine dispatches errors, progress and output through structs of
//! function pointers. Each of those is a hook object here, owned by the
//! handle it is installed in:
//!
//! - [`error_hook`]: formats messages, counts warnings, turns fatal errors
//!   into [`crate::TranscodeError`]
//! - [`progress_hook`]: scan limit on decode, percentages on encode
//! - [`destination`]: the growable output buffer
//!
//! [`handles`] ties engine instances to their hooks, and [`transform`]
//! drives the lossless transform steps.

mod destination;
mod error_hook;
mod handles;
mod progress_hook;
mod transform;

pub(crate) use handles::{Compressor, Decompressor, HandleOptions};
pub(crate) use progress_hook::Reporter;
pub(crate) use transform::{copy_markers, Transform};
