//! Command-line style job configuration.
//!
//! Transcode jobs are configured with a jpegtran-style argument vector. This
//! module turns that vector into a [`TransformRequest`]:
//!
//! - [`keymatch`]: abbreviation-aware switch matching
//! - [`CropSpec`]: the `WxH+X+Y` rectangle grammar shared by crop and wipe
//! - [`parse_switches`]: the two-pass switch scanner

mod crop;
mod keymatch;
mod parse;
mod request;

pub use crop::{CropExtent, CropOffset, CropSpec};
pub use keymatch::keymatch;
pub use parse::{
    parse_switches, program_name, usage_error, ParsePass, ParsedSwitches, DEFAULT_PROGRAM_NAME,
};
pub use request::{CopyPolicy, EncoderSettings, RestartInterval, TransformKind, TransformRequest};
