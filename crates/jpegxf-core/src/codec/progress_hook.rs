//! Engine progress monitor.
//!
//! On a decompressor the monitor enforces the scan limit while coefficients
//! are read. On a compressor it feeds the [`ProgressTracker`] and forwards
//! deduplicated percentages to the channel.

use std::mem;

use mozjpeg_sys::{jpeg_common_struct, jpeg_decompress_struct, jpeg_progress_mgr};

use super::error_hook::abort;
use crate::error::TranscodeError;
use crate::progress::{JobContext, ProgressChannel, ProgressTracker};

/// Where a compressor's progress goes.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Reporter {
    pub channel: &'static ProgressChannel,
    pub context: JobContext,
}

/// `iface` must stay first; the engine holds a pointer to it.
#[repr(C)]
pub(crate) struct ProgressHook {
    iface: jpeg_progress_mgr,
    max_scans: Option<u32>,
    reporter: Option<Reporter>,
    tracker: ProgressTracker,
}

impl ProgressHook {
    pub(crate) fn new() -> Box<Self> {
        Box::new(Self {
            // SAFETY: plain counters and an optional callback
            iface: unsafe { mem::zeroed() },
            max_scans: None,
            reporter: None,
            tracker: ProgressTracker::new(),
        })
        .with_monitor()
    }

    fn with_monitor(mut self: Box<Self>) -> Box<Self> {
        self.iface.progress_monitor = Some(progress_monitor);
        self
    }

    pub(crate) fn iface_ptr(&mut self) -> *mut jpeg_progress_mgr {
        &mut self.iface
    }

    pub(crate) fn set_max_scans(&mut self, max_scans: Option<u32>) {
        self.max_scans = max_scans;
    }

    pub(crate) fn set_reporter(&mut self, reporter: Reporter) {
        self.reporter = Some(reporter);
    }

    pub(crate) fn tracker_mut(&mut self) -> &mut ProgressTracker {
        &mut self.tracker
    }
}

extern "C-unwind" fn progress_monitor(cinfo: &mut jpeg_common_struct) {
    // SAFETY: only installed through ProgressHook::iface_ptr.
    let hook = unsafe { &mut *cinfo.progress.cast::<ProgressHook>() };

    if cinfo.is_decompressor != 0 {
        if let Some(max) = hook.max_scans {
            // SAFETY: is_decompressor guarantees the enclosing struct type.
            let scan = unsafe {
                (*(cinfo as *mut jpeg_common_struct).cast::<jpeg_decompress_struct>())
                    .input_scan_number
            };
            if max != 0 && i64::from(scan) > i64::from(max) {
                log::error!("scan number {scan} exceeds maximum scans ({max})");
                abort(TranscodeError::TooManyScans { scan, max });
            }
        }
    }

    let Some(reporter) = hook.reporter else {
        return;
    };
    let update = hook.tracker.update(
        i64::from(hook.iface.pass_counter),
        i64::from(hook.iface.pass_limit),
        hook.iface.completed_passes,
        hook.iface.total_passes,
    );
    if let Some(update) = update {
        reporter
            .channel
            .report(reporter.context, update.pass, update.total, update.percent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_hook_has_monitor() {
        let mut hook = ProgressHook::new();
        assert!(hook.iface.progress_monitor.is_some());
        assert!(!hook.iface_ptr().is_null());
        assert!(hook.reporter.is_none());
        assert!(hook.max_scans.is_none());
    }

    #[test]
    fn test_settings() {
        let mut hook = ProgressHook::new();
        hook.set_max_scans(Some(4));
        hook.tracker_mut().add_extra_passes(1);
        assert_eq!(hook.max_scans, Some(4));
    }
}
