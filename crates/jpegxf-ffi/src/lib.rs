//! jpegxf FFI - C ABI for the host runtime
//!
//! The host registers one notification port per process, then submits jobs
//! by argument vector (transcode) or pixel buffer (compress), either blocking
//! or detached on a worker thread. Every job reports through the registered
//! port:
//!
//! - progress records `(context, pass, total, percent)`
//! - at most one result record `(context, -2, 0, handle)`
//! - exactly one exit record `(context, -1, 0, status)`, always last
//!
//! A result handle belongs to the host, which reads it with
//! [`jpegxf_result_data`] / [`jpegxf_result_len`] and must free it with
//! [`jpegxf_release_result`].
//!
//! # Safety
//!
//! Input names of the form `@buffer@:<address>,<length>` are dereferenced
//! as foreign memory. The caller guarantees such memory stays valid until the
//! job's exit record has been posted.

use std::ffi::{c_char, c_int, c_void, CStr};
use std::slice;
use std::sync::Arc;

use jpegxf_core::buffer::{ForeignBytes, InputSource};
use jpegxf_core::{
    CompressJob, CompressRequest, EventRecord, Executor, ExitStatus, JobContext, PortSink,
    ProgressChannel, ResultHandle, TranscodeJob, Transcoder,
};

mod logger;

/// Host callback receiving one event record.
pub type PostEventFn = unsafe extern "C" fn(port: i64, record: *const EventRecord) -> bool;

/// Host callback receiving one NUL-terminated log line.
pub type PostTextFn = unsafe extern "C" fn(port: i64, line: *const c_char) -> bool;

/// Sink forwarding to the host's C callbacks.
struct CallbackSink {
    post_event: PostEventFn,
    post_text: Option<PostTextFn>,
}

impl PortSink for CallbackSink {
    fn post_event(&self, port: i64, record: EventRecord) -> bool {
        // SAFETY: the host registered this callback for exactly this use.
        unsafe { (self.post_event)(port, &record) }
    }

    fn post_text(&self, port: i64, line: &str) -> bool {
        let Some(post_text) = self.post_text else {
            return false;
        };
        let mut bytes: Vec<u8> = line.bytes().filter(|&b| b != 0).collect();
        bytes.push(0);
        // SAFETY: `bytes` is NUL-terminated and outlives the call.
        unsafe { post_text(port, bytes.as_ptr().cast()) }
    }
}

/// Register the notification port. Port 0, or a null event callback,
/// unregisters.
///
/// The first registration also routes this library's log output to
/// `post_text` at info level; see [`jpegxf_set_log_level`].
///
/// # Safety
///
/// The callbacks must be callable from any thread until the port is
/// unregistered.
#[no_mangle]
pub unsafe extern "C" fn jpegxf_register_port(
    port: i64,
    post_event: Option<PostEventFn>,
    post_text: Option<PostTextFn>,
) {
    let channel = ProgressChannel::global();
    match post_event {
        Some(post_event) if port != 0 => {
            channel.register(
                port,
                Arc::new(CallbackSink {
                    post_event,
                    post_text,
                }),
            );
            logger::install(log::LevelFilter::Info);
        }
        _ => channel.unregister(),
    }
}

/// Set the forwarded log level: 0 off, 1 error, 2 warn, 3 info, 4 debug,
/// 5 trace.
#[no_mangle]
pub extern "C" fn jpegxf_set_log_level(level: c_int) {
    log::set_max_level(logger::level_from_code(level));
}

/// Copy a C argument vector. Invalid UTF-8 is replaced, null entries
/// become empty strings.
unsafe fn collect_args(argc: c_int, argv: *const *const c_char) -> Vec<String> {
    let Ok(count) = usize::try_from(argc) else {
        return Vec::new();
    };
    if argv.is_null() {
        return Vec::new();
    }
    slice::from_raw_parts(argv, count)
        .iter()
        .map(|&arg| {
            if arg.is_null() {
                String::new()
            } else {
                CStr::from_ptr(arg).to_string_lossy().into_owned()
            }
        })
        .collect()
}

fn transcoder() -> Transcoder {
    // SAFETY: foreign buffer names are covered by this crate's caller contract.
    unsafe { Transcoder::default().trusting_foreign_buffers() }
}

/// Run a transcode job on the calling thread. Returns its exit status.
///
/// # Safety
///
/// `argv` must point to `argc` pointers, each null or NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn jpegxf_transcode(
    argc: c_int,
    argv: *const *const c_char,
    context: i64,
) -> c_int {
    let args = collect_args(argc, argv);
    transcoder().run(&args, JobContext(context)).code()
}

/// Start a transcode job on its own thread.
///
/// Returns 0 once the worker started, or the spawn-failed status (-1),
/// which has then already been posted as the job's exit record.
///
/// # Safety
///
/// As [`jpegxf_transcode`]. The argument vector is copied before returning.
#[no_mangle]
pub unsafe extern "C" fn jpegxf_transcode_detached(
    argc: c_int,
    argv: *const *const c_char,
    context: i64,
) -> c_int {
    let job = TranscodeJob::new(collect_args(argc, argv), JobContext(context), transcoder());
    match Executor::new().submit_detached(job) {
        Ok(()) => 0,
        Err(err) => err.exit_status().code(),
    }
}

/// Pixel geometry of a compress job.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CompressParams {
    pub width: u32,
    pub height: u32,
    /// Bytes between row starts.
    pub stride: usize,
    /// Engine color space code (1 grayscale, 2 RGB, ...).
    pub color_space: c_int,
    pub quality: c_int,
    pub dpi: u16,
}

fn compress_request(pixels: InputSource, params: &CompressParams) -> CompressRequest {
    CompressRequest {
        pixels,
        width: params.width,
        height: params.height,
        stride: params.stride,
        color_space: params.color_space,
        quality: params.quality,
        dpi: params.dpi,
    }
}

/// Encode pixels on the calling thread. Returns the exit status.
///
/// # Safety
///
/// `pixels` must be null or readable for `len` bytes for the whole call.
#[no_mangle]
pub unsafe extern "C" fn jpegxf_compress(
    pixels: *const u8,
    len: usize,
    params: CompressParams,
    context: i64,
) -> c_int {
    let source = if pixels.is_null() {
        InputSource::Owned(Vec::new())
    } else {
        InputSource::Foreign(ForeignBytes::from_raw_parts(pixels, len))
    };
    let request = compress_request(source, &params);
    jpegxf_core::pipeline::compress(&request, JobContext(context)).code()
}

/// Encode pixels on a worker thread. The pixels are copied first.
///
/// Returns 0 once the worker started, or -1 after posting the
/// spawn-failed exit record.
///
/// # Safety
///
/// `pixels` must be null or readable for `len` bytes during this call.
#[no_mangle]
pub unsafe extern "C" fn jpegxf_compress_detached(
    pixels: *const u8,
    len: usize,
    params: CompressParams,
    context: i64,
) -> c_int {
    let owned = if pixels.is_null() {
        Vec::new()
    } else {
        slice::from_raw_parts(pixels, len).to_vec()
    };
    let request = compress_request(InputSource::Owned(owned), &params);
    let job = CompressJob::new(request, JobContext(context), ProgressChannel::global());
    match Executor::new().submit_detached(job) {
        Ok(()) => 0,
        Err(_) => ExitStatus::SpawnFailed.code(),
    }
}

/// First byte of a result buffer, or null for a null handle.
///
/// # Safety
///
/// `handle` must be null or an unreleased handle from a result record.
#[no_mangle]
pub unsafe extern "C" fn jpegxf_result_data(handle: *mut c_void) -> *const u8 {
    jpegxf_core::result_data(handle as ResultHandle)
}

/// Length of a result buffer, or `SIZE_MAX` for a null handle.
///
/// # Safety
///
/// As [`jpegxf_result_data`].
#[no_mangle]
pub unsafe extern "C" fn jpegxf_result_len(handle: *mut c_void) -> usize {
    jpegxf_core::result_len(handle as ResultHandle)
}

/// Free a result buffer. Null is a no-op; releasing twice is undefined.
///
/// # Safety
///
/// As [`jpegxf_result_data`]; the handle is invalid afterwards.
#[no_mangle]
pub unsafe extern "C" fn jpegxf_release_result(handle: *mut c_void) {
    jpegxf_core::release_result(handle as ResultHandle)
}

/// Library version as a static NUL-terminated string.
#[no_mangle]
pub extern "C" fn jpegxf_version() -> *const c_char {
    static VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");
    VERSION.as_ptr().cast()
}
