//! Two-pass switch parser.
//!
//! The argument vector is scanned twice per job. The provisional pass runs
//! before the input file is opened and only needs the file index and the
//! settings that shape decoding. The final pass runs after the source
//! parameters were copied to the destination, when destination defaults have
//! been reset and must be applied again.
//!
//! Each pass builds a fresh [`TransformRequest`]; nothing survives between
//! passes except what the caller threads through explicitly.

use std::path::PathBuf;

use super::crop::CropSpec;
use super::keymatch::keymatch;
use super::request::{CopyPolicy, RestartInterval, TransformKind, TransformRequest};
use crate::error::TranscodeError;

/// Program name used when `argv[0]` is empty.
pub const DEFAULT_PROGRAM_NAME: &str = "jpegxf";

/// Which of the two passes is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsePass {
    /// Before the input is opened.
    Provisional,
    /// After source parameters are known. `scan_script_present` reports
    /// whether the destination already carries a progressive scan script.
    Final { scan_script_present: bool },
}

/// Result of one parsing pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSwitches {
    pub request: TransformRequest,
    /// Index of the first file argument, or `args.len()` if there is none.
    pub first_file_index: usize,
    /// `-version` was seen; scanning stopped there.
    pub version_requested: bool,
}

/// Program name for diagnostics.
pub fn program_name<S: AsRef<str>>(args: &[S]) -> &str {
    match args.first().map(AsRef::as_ref) {
        Some(name) if !name.is_empty() => name,
        _ => DEFAULT_PROGRAM_NAME,
    }
}

/// Scan the switches in `args`.
///
/// `args[0]` is the program name. A non-switch token ends the scan unless its
/// index is at most `last_file_arg_seen`, in which case it was handled by an
/// earlier pass and is skipped (which also forgets any `-outfile`).
///
/// # Errors
///
/// Returns [`TranscodeError::Usage`] for unknown switches, missing or
/// malformed values and conflicting transforms. The usage text is logged
/// before returning.
pub fn parse_switches<S: AsRef<str>>(
    args: &[S],
    last_file_arg_seen: usize,
    pass: ParsePass,
) -> Result<ParsedSwitches, TranscodeError> {
    scan(args, last_file_arg_seen, pass).map_err(|err| match err {
        TranscodeError::Usage(msg) => usage_error(program_name(args), msg),
        other => other,
    })
}

/// Log the usage text and build the usage error.
pub fn usage_error(program: &str, message: impl Into<String>) -> TranscodeError {
    let message = message.into();
    log::error!("{program}: {message}");
    log_usage(program);
    TranscodeError::Usage(message)
}

fn log_usage(program: &str) {
    const SWITCHES: &[&str] = &[
        "Switches (names may be abbreviated):",
        "  -copy none     Copy no extra markers from source file",
        "  -copy comments Copy only comment markers (default)",
        "  -copy all      Copy all extra markers",
        "  -optimize      Optimize Huffman table (smaller file, but slow compression, enabled by default)",
        "  -progressive   Create progressive JPEG file (enabled by default)",
        "  -revert        Revert to standard defaults (instead of mozjpeg defaults)",
        "  -fastcrush     Disable progressive scan optimization",
        "Switches for modifying the image:",
        "  -crop WxH+X+Y  Crop to a rectangular region",
        "  -flip [horizontal|vertical]  Mirror image (left-right or top-bottom)",
        "  -grayscale     Reduce to grayscale (omit color data)",
        "  -perfect       Fail if there is non-transformable edge blocks",
        "  -rotate [90|180|270]  Rotate image (degrees clockwise)",
        "  -transpose     Transpose image",
        "  -transverse    Transverse transpose image",
        "  -trim          Drop non-transformable edge blocks",
        "  -wipe WxH+X+Y  Wipe (gray out) a rectangular region",
        "Switches for advanced users:",
        "  -restart N     Set restart interval in rows, or in blocks with B",
        "  -maxmemory N   Maximum memory to use (in kbytes)",
        "  -maxscans N    Maximum number of scans to allow in input file",
        "  -outfile name  Specify name for output file",
        "  -strict        Treat all warnings as fatal",
        "  -verbose  or  -debug   Emit debug output",
        "  -version       Print version information and exit",
    ];

    log::info!("usage: {program} [switches] inputfile");
    for line in SWITCHES {
        log::info!("{line}");
    }
}

fn scan<S: AsRef<str>>(
    args: &[S],
    last_file_arg_seen: usize,
    pass: ParsePass,
) -> Result<ParsedSwitches, TranscodeError> {
    let mut request = TransformRequest::default();
    let mut progressive = matches!(
        pass,
        ParsePass::Final {
            scan_script_present: true
        }
    );

    let mut argn = 1;
    while argn < args.len() {
        let token = args[argn].as_ref();
        let Some(arg) = token.strip_prefix('-') else {
            if argn <= last_file_arg_seen {
                // -outfile applies to one input file only
                request.outfile = None;
                argn += 1;
                continue;
            }
            break;
        };

        if keymatch(arg, "copy", 2) {
            let value = next_value(args, &mut argn)?;
            request.copy = if keymatch(value, "none", 1) {
                CopyPolicy::None
            } else if keymatch(value, "comments", 1) {
                CopyPolicy::Comments
            } else if keymatch(value, "all", 1) {
                CopyPolicy::All
            } else {
                return Err(bad_value("copy", value));
            };
        } else if keymatch(arg, "crop", 2) {
            let value = next_value(args, &mut argn)?;
            let spec = CropSpec::parse(value).ok_or_else(|| bad_value("crop", value))?;
            request
                .set_region(spec)
                .map_err(|_| bad_value("crop", value))?;
            request.prefer_smallest = false;
        } else if keymatch(arg, "debug", 1) || keymatch(arg, "verbose", 1) {
            request.trace_level += 1;
        } else if keymatch(arg, "version", 4) {
            return Ok(ParsedSwitches {
                request,
                first_file_index: argn,
                version_requested: true,
            });
        } else if keymatch(arg, "flip", 1) {
            let value = next_value(args, &mut argn)?;
            if keymatch(value, "horizontal", 1) {
                request.select_transform(TransformKind::FlipHorizontal)?;
            } else if keymatch(value, "vertical", 1) {
                request.select_transform(TransformKind::FlipVertical)?;
            } else {
                return Err(bad_value("flip", value));
            }
            request.prefer_smallest = false;
        } else if keymatch(arg, "fastcrush", 4) {
            request.encoder.fastcrush = true;
        } else if keymatch(arg, "grayscale", 1) || keymatch(arg, "greyscale", 1) {
            request.force_grayscale = true;
            request.prefer_smallest = false;
        } else if keymatch(arg, "maxmemory", 3) {
            let value = next_value(args, &mut argn)?;
            let (amount, suffix) = scan_number(value).ok_or_else(|| bad_value("maxmemory", value))?;
            let mut kb = u64::try_from(amount).map_err(|_| bad_value("maxmemory", value))?;
            if matches!(suffix, Some('m' | 'M')) {
                kb = kb.saturating_mul(1000);
            }
            request.max_memory_kb = Some(kb);
        } else if keymatch(arg, "maxscans", 4) {
            let value = next_value(args, &mut argn)?;
            let (count, _) = scan_number(value).ok_or_else(|| bad_value("maxscans", value))?;
            let count = u32::try_from(count).map_err(|_| bad_value("maxscans", value))?;
            request.max_scans = Some(count);
        } else if keymatch(arg, "optimize", 1) || keymatch(arg, "optimise", 1) {
            request.encoder.optimize = true;
        } else if keymatch(arg, "outfile", 4) {
            let value = next_value(args, &mut argn)?;
            request.outfile = Some(PathBuf::from(value));
        } else if keymatch(arg, "perfect", 2) {
            request.perfect = true;
        } else if keymatch(arg, "progressive", 2) {
            request.encoder.progressive = true;
            progressive = true;
            request.prefer_smallest = false;
        } else if keymatch(arg, "restart", 1) {
            let value = next_value(args, &mut argn)?;
            let (interval, suffix) = scan_number(value).ok_or_else(|| bad_value("restart", value))?;
            let interval = u16::try_from(interval).map_err(|_| bad_value("restart", value))?;
            request.set_restart(if matches!(suffix, Some('b' | 'B')) {
                RestartInterval::Blocks(interval)
            } else {
                RestartInterval::Rows(interval)
            });
        } else if keymatch(arg, "revert", 3) {
            request.encoder.revert = true;
            request.prefer_smallest = false;
        } else if keymatch(arg, "rotate", 2) {
            let value = next_value(args, &mut argn)?;
            if keymatch(value, "90", 2) {
                request.select_transform(TransformKind::Rotate90)?;
            } else if keymatch(value, "180", 3) {
                request.select_transform(TransformKind::Rotate180)?;
            } else if keymatch(value, "270", 3) {
                request.select_transform(TransformKind::Rotate270)?;
            } else {
                return Err(bad_value("rotate", value));
            }
            request.prefer_smallest = false;
        } else if keymatch(arg, "strict", 2) {
            request.strict = true;
        } else if keymatch(arg, "transpose", 1) {
            request.select_transform(TransformKind::Transpose)?;
            request.prefer_smallest = false;
        } else if keymatch(arg, "transverse", 6) {
            request.select_transform(TransformKind::Transverse)?;
            request.prefer_smallest = false;
        } else if keymatch(arg, "trim", 3) {
            request.trim = true;
            request.prefer_smallest = false;
        } else if keymatch(arg, "wipe", 1) {
            let value = next_value(args, &mut argn)?;
            let spec = CropSpec::parse(value).ok_or_else(|| bad_value("wipe", value))?;
            request
                .set_region(spec)
                .map_err(|_| bad_value("wipe", value))?;
            request.select_transform(TransformKind::Wipe)?;
            request.prefer_smallest = false;
        } else {
            return Err(TranscodeError::Usage(format!(
                "unknown/unsupported option: -{arg}"
            )));
        }

        argn += 1;
    }

    if let ParsePass::Final { .. } = pass {
        request.encoder.enable_progression = progressive;
    }

    Ok(ParsedSwitches {
        request,
        first_file_index: argn,
        version_requested: false,
    })
}

/// Advance to the value token of a value-bearing switch.
fn next_value<'a, S: AsRef<str>>(args: &'a [S], argn: &mut usize) -> Result<&'a str, TranscodeError> {
    let switch = args[*argn].as_ref();
    *argn += 1;
    args.get(*argn)
        .map(AsRef::as_ref)
        .ok_or_else(|| TranscodeError::Usage(format!("missing value for {switch}")))
}

fn bad_value(switch: &str, value: &str) -> TranscodeError {
    TranscodeError::Usage(format!("bogus -{switch} argument '{value}'"))
}

/// Read an optional sign, at least one decimal digit and an optional
/// one-character suffix. Anything after the suffix is ignored.
fn scan_number(text: &str) -> Option<(i64, Option<char>)> {
    let text = text.trim_start();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let len = digits.bytes().take_while(u8::is_ascii_digit).count();
    if len == 0 {
        return None;
    }
    let magnitude: i64 = digits[..len].parse().ok()?;
    let value = if negative { -magnitude } else { magnitude };
    Some((value, digits[len..].chars().next()))
}
