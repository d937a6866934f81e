//! Engine error hook and the guard that contains its aborts.
//!
//! The engine reports fatal errors by calling `error_exit`, which must not
//! return. Our hook unwinds with a [`TranscodeError`] payload instead; every
//! engine call runs inside [`guard`], which catches that unwind and turns it
//! back into an `Err`. The engine sources are built to tolerate unwinding
//! through them, so no unwind ever leaves a guard.

use std::any::Any;
use std::mem;
use std::os::raw::c_int;
use std::panic::{self, AssertUnwindSafe};

use mozjpeg_sys::{jpeg_common_struct, jpeg_error_mgr, jpeg_std_error};

use crate::error::TranscodeError;

/// Size of the engine's message buffer.
const MESSAGE_LEN: usize = 80;

/// Error manager installed in every engine handle.
///
/// `iface` must stay the first field: the engine only sees a pointer to it
/// and the callbacks cast that pointer back to the whole hook.
#[repr(C)]
pub(crate) struct ErrorHook {
    iface: jpeg_error_mgr,
    strict: bool,
}

impl ErrorHook {
    pub(crate) fn new() -> Box<Self> {
        // SAFETY: jpeg_error_mgr is plain data; jpeg_std_error fills it in.
        let mut hook = Box::new(Self {
            iface: unsafe { mem::zeroed() },
            strict: false,
        });
        unsafe { jpeg_std_error(&mut hook.iface) };
        hook.iface.error_exit = Some(error_exit);
        hook.iface.emit_message = Some(emit_message);
        hook.iface.output_message = Some(output_message);
        hook
    }

    pub(crate) fn iface_ptr(&mut self) -> *mut jpeg_error_mgr {
        &mut self.iface
    }

    pub(crate) fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    pub(crate) fn set_trace_level(&mut self, level: i32) {
        self.iface.trace_level = level;
    }

    /// Number of warnings the engine emitted so far.
    pub(crate) fn warnings(&self) -> u64 {
        u64::try_from(self.iface.num_warnings).unwrap_or(0)
    }
}

/// Recover the hook from the engine's view of it.
///
/// # Safety
///
/// `cinfo.err` must point at the `iface` of a live [`ErrorHook`].
unsafe fn hook(cinfo: &mut jpeg_common_struct) -> &mut ErrorHook {
    &mut *cinfo.err.cast::<ErrorHook>()
}

/// Format the engine's pending message.
fn format_message(cinfo: &mut jpeg_common_struct) -> String {
    // SAFETY: err is installed before any engine call can reach here.
    let Some(format) = (unsafe { (*cinfo.err).format_message }) else {
        return format!("engine message {}", unsafe { (*cinfo.err).msg_code });
    };
    let mut buffer = [0u8; MESSAGE_LEN];
    // The binding declares the buffer shared, but the engine writes into it.
    let format = unsafe {
        mem::transmute::<
            unsafe extern "C-unwind" fn(&mut jpeg_common_struct, &[u8; MESSAGE_LEN]),
            unsafe extern "C-unwind" fn(&mut jpeg_common_struct, &mut [u8; MESSAGE_LEN]),
        >(format)
    };
    unsafe { format(cinfo, &mut buffer) };
    let end = buffer.iter().position(|&b| b == 0).unwrap_or(buffer.len());
    String::from_utf8_lossy(&buffer[..end]).into_owned()
}

/// Abort the current guarded engine call with `err`.
pub(crate) fn abort(err: TranscodeError) -> ! {
    // resume_unwind skips the panic hook
    panic::resume_unwind(Box::new(err))
}

#[cold]
extern "C-unwind" fn error_exit(cinfo: &mut jpeg_common_struct) {
    let message = format_message(cinfo);
    log::error!("{message}");
    abort(TranscodeError::Codec(message))
}

extern "C-unwind" fn emit_message(cinfo: &mut jpeg_common_struct, msg_level: c_int) {
    // SAFETY: callbacks are only reachable through handles that installed the hook.
    let hook = unsafe { hook(cinfo) };
    if msg_level < 0 {
        let first = hook.iface.num_warnings == 0;
        let verbose = hook.iface.trace_level >= 3;
        hook.iface.num_warnings += 1;
        let strict = hook.strict;
        let message = format_message(cinfo);
        if strict {
            log::error!("{message}");
            abort(TranscodeError::StrictWarning(message));
        }
        if first || verbose {
            log::warn!("{message}");
        }
    } else if unsafe { (*cinfo.err).trace_level } >= msg_level {
        log::trace!("{}", format_message(cinfo));
    }
}

extern "C-unwind" fn output_message(cinfo: &mut jpeg_common_struct) {
    log::debug!("{}", format_message(cinfo));
}

/// Run engine calls, turning an abort into `Err`.
///
/// A plain Rust panic inside `f` is also contained and reported as a codec
/// failure.
pub(crate) fn guard<T>(f: impl FnOnce() -> T) -> Result<T, TranscodeError> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(into_transcode_error)
}

fn into_transcode_error(payload: Box<dyn Any + Send>) -> TranscodeError {
    match payload.downcast::<TranscodeError>() {
        Ok(err) => *err,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            TranscodeError::Codec(format!("internal error: {message}"))
        }
    }
}
