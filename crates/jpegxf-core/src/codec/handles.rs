//! Owning handles over engine instances.
//!
//! Each handle boxes the engine struct together with the hooks it points at,
//! so every address handed to the engine stays put for the handle's whole
//! life. Dropping a handle destroys the engine instance before the hooks go
//! away. Every engine call goes through [`guard`].

use std::marker::PhantomData;
use std::mem;
use std::os::raw::{c_int, c_long, c_ulong};
use std::ptr;

use mozjpeg_sys::{
    jcopy_markers_setup, jpeg_c_set_bool_param, jpeg_c_set_int_param, jpeg_common_struct,
    jpeg_compress_struct, jpeg_copy_critical_parameters, jpeg_create_compress,
    jpeg_create_decompress, jpeg_decompress_struct, jpeg_destroy_compress,
    jpeg_destroy_decompress, jpeg_finish_compress, jpeg_finish_decompress, jpeg_mem_src,
    jpeg_read_coefficients, jpeg_read_header, jpeg_set_defaults, jpeg_set_quality,
    jpeg_simple_progression, jpeg_start_compress, jpeg_write_coefficients, jpeg_write_scanlines,
    jvirt_barray_ptr, JSAMPROW, J_COLOR_SPACE, JBOOLEAN_OPTIMIZE_SCANS, JCOPY_OPTION, JCP_FASTEST,
    JCP_MAX_COMPRESSION, JINT_COMPRESS_PROFILE,
};

use super::destination::DestinationHook;
use super::error_hook::{guard, ErrorHook};
use super::progress_hook::{ProgressHook, Reporter};
use crate::args::{EncoderSettings, RestartInterval};
use crate::buffer::OutputBuffer;
use crate::error::TranscodeError;
use crate::progress::ProgressTracker;

/// Per-handle diagnostics and limits.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct HandleOptions {
    pub trace_level: i32,
    pub strict: bool,
    pub max_memory_bytes: Option<u64>,
}

/// Coefficient array set owned by a decompressor's memory pool.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CoefArrays(pub(crate) *mut jvirt_barray_ptr);

/// Decoder bound to an in-memory source that must outlive it.
pub(crate) struct Decompressor<'src> {
    cinfo: Box<jpeg_decompress_struct>,
    err: Box<ErrorHook>,
    progress: Box<ProgressHook>,
    _source: PhantomData<&'src [u8]>,
}

impl<'src> Decompressor<'src> {
    pub(crate) fn new(source: &'src [u8], options: HandleOptions) -> Result<Self, TranscodeError> {
        let mut err = ErrorHook::new();
        err.set_trace_level(options.trace_level);
        err.set_strict(options.strict);

        // SAFETY: all-zero is the state the engine expects before creation.
        let mut cinfo: Box<jpeg_decompress_struct> = Box::new(unsafe { mem::zeroed() });
        cinfo.common.err = err.iface_ptr();

        let mut handle = Self {
            cinfo,
            err,
            progress: ProgressHook::new(),
            _source: PhantomData,
        };
        guard(|| unsafe { jpeg_create_decompress(&mut *handle.cinfo) })?;
        // creation clears everything but the error manager
        handle.cinfo.common.progress = handle.progress.iface_ptr();
        set_max_memory(&mut handle.cinfo.common, options.max_memory_bytes);

        let len = c_ulong::try_from(source.len())
            .map_err(|_| TranscodeError::Codec("input too large".into()))?;
        guard(|| unsafe { jpeg_mem_src(&mut handle.cinfo, source.as_ptr(), len) })?;
        Ok(handle)
    }

    pub(crate) fn set_max_scans(&mut self, max_scans: Option<u32>) {
        self.progress.set_max_scans(max_scans);
    }

    /// Ask the engine to keep the markers `option` will copy.
    pub(crate) fn save_markers(&mut self, option: JCOPY_OPTION) -> Result<(), TranscodeError> {
        let cinfo: *mut jpeg_decompress_struct = &mut *self.cinfo;
        guard(|| unsafe { jcopy_markers_setup(cinfo, option) })
    }

    pub(crate) fn read_header(&mut self) -> Result<(), TranscodeError> {
        guard(|| unsafe { jpeg_read_header(&mut self.cinfo, 1) }).map(|_| ())
    }

    /// Decode every coefficient block without going to pixels.
    pub(crate) fn read_coefficients(&mut self) -> Result<CoefArrays, TranscodeError> {
        let arrays = guard(|| unsafe { jpeg_read_coefficients(&mut self.cinfo) })?;
        if arrays.is_null() {
            return Err(TranscodeError::Codec("no coefficient arrays".into()));
        }
        Ok(CoefArrays(arrays))
    }

    pub(crate) fn finish(&mut self) -> Result<(), TranscodeError> {
        guard(|| unsafe { jpeg_finish_decompress(&mut self.cinfo) }).map(|_| ())
    }

    pub(crate) fn warnings(&self) -> u64 {
        self.err.warnings()
    }

    pub(crate) fn raw(&mut self) -> *mut jpeg_decompress_struct {
        &mut *self.cinfo
    }
}

impl Drop for Decompressor<'_> {
    fn drop(&mut self) {
        if guard(|| unsafe { jpeg_destroy_decompress(&mut self.cinfo) }).is_err() {
            log::warn!("failed to release decompressor");
        }
    }
}

/// Encoder writing into a growable in-memory buffer.
pub(crate) struct Compressor {
    cinfo: Box<jpeg_compress_struct>,
    err: Box<ErrorHook>,
    progress: Box<ProgressHook>,
    dest: Option<Box<DestinationHook>>,
}

impl Compressor {
    pub(crate) fn new(options: HandleOptions) -> Result<Self, TranscodeError> {
        let mut err = ErrorHook::new();
        err.set_trace_level(options.trace_level);
        err.set_strict(options.strict);

        // SAFETY: all-zero is the state the engine expects before creation.
        let mut cinfo: Box<jpeg_compress_struct> = Box::new(unsafe { mem::zeroed() });
        cinfo.common.err = err.iface_ptr();

        let mut handle = Self {
            cinfo,
            err,
            progress: ProgressHook::new(),
            dest: None,
        };
        guard(|| unsafe { jpeg_create_compress(&mut *handle.cinfo) })?;
        handle.cinfo.common.progress = handle.progress.iface_ptr();
        set_max_memory(&mut handle.cinfo.common, options.max_memory_bytes);
        Ok(handle)
    }

    /// Send this compressor's progress to the channel.
    pub(crate) fn set_reporter(&mut self, reporter: Reporter) {
        self.progress.set_reporter(reporter);
    }

    pub(crate) fn tracker_mut(&mut self) -> &mut ProgressTracker {
        self.progress.tracker_mut()
    }

    /// Apply the encoding switches of one parsing pass.
    pub(crate) fn apply_settings(&mut self, settings: &EncoderSettings) -> Result<(), TranscodeError> {
        let cinfo = &mut *self.cinfo;
        guard(|| unsafe {
            if settings.revert {
                jpeg_c_set_int_param(cinfo, JINT_COMPRESS_PROFILE, JCP_FASTEST as c_int);
            }
            if settings.fastcrush {
                jpeg_c_set_bool_param(cinfo, JBOOLEAN_OPTIMIZE_SCANS, 0);
            }
            if settings.optimize {
                cinfo.optimize_coding = 1;
            }
            match settings.restart {
                Some(RestartInterval::Blocks(n)) => {
                    cinfo.restart_interval = u32::from(n);
                    cinfo.restart_in_rows = 0;
                }
                Some(RestartInterval::Rows(n)) => cinfo.restart_in_rows = c_int::from(n),
                None => {}
            }
            if settings.enable_progression {
                jpeg_simple_progression(cinfo);
            }
        })
    }

    /// Whether the current parameters already carry a scan script.
    pub(crate) fn has_scan_script(&self) -> bool {
        self.cinfo.num_scans != 0
    }

    pub(crate) fn copy_critical_parameters(&mut self, src: &Decompressor<'_>) -> Result<(), TranscodeError> {
        guard(|| unsafe { jpeg_copy_critical_parameters(&src.cinfo, &mut self.cinfo) })
    }

    /// Install the growable destination.
    ///
    /// # Errors
    ///
    /// Binding a second destination is a codec error.
    pub(crate) fn bind_destination(&mut self, buffer: OutputBuffer) -> Result<(), TranscodeError> {
        if self.dest.is_some() || !self.cinfo.dest.is_null() {
            return Err(TranscodeError::Codec(
                "destination already bound to this compressor".into(),
            ));
        }
        let mut hook = DestinationHook::new(buffer);
        self.cinfo.dest = hook.iface_ptr();
        self.dest = Some(hook);
        Ok(())
    }

    pub(crate) fn write_coefficients(&mut self, arrays: CoefArrays) -> Result<(), TranscodeError> {
        guard(|| unsafe { jpeg_write_coefficients(&mut self.cinfo, arrays.0) })
    }

    pub(crate) fn finish(&mut self) -> Result<(), TranscodeError> {
        guard(|| unsafe { jpeg_finish_compress(&mut self.cinfo) })
    }

    /// Detach the destination and take the bytes written into it.
    pub(crate) fn take_output(&mut self) -> Result<Vec<u8>, TranscodeError> {
        let hook = self
            .dest
            .take()
            .ok_or_else(|| TranscodeError::Codec("no destination bound".into()))?;
        self.cinfo.dest = ptr::null_mut();
        Ok(hook.into_buffer().into_bytes())
    }

    /// Describe raw pixel input for a fresh encode.
    pub(crate) fn set_input(&mut self, width: u32, height: u32, components: i32, color_space: J_COLOR_SPACE) {
        self.cinfo.image_width = width;
        self.cinfo.image_height = height;
        self.cinfo.input_components = components;
        self.cinfo.in_color_space = color_space;
    }

    /// Select the max-compression profile, reset defaults and apply quality
    /// and JFIF density in dots per inch.
    pub(crate) fn set_pixel_defaults(&mut self, quality: i32, dpi: u16) -> Result<(), TranscodeError> {
        let cinfo = &mut *self.cinfo;
        guard(|| unsafe {
            jpeg_c_set_int_param(cinfo, JINT_COMPRESS_PROFILE, JCP_MAX_COMPRESSION as c_int);
            jpeg_set_defaults(cinfo);
            jpeg_set_quality(cinfo, quality, 0);
            cinfo.density_unit = 1;
            cinfo.X_density = dpi;
            cinfo.Y_density = dpi;
            cinfo.write_JFIF_header = 1;
            cinfo.write_Adobe_marker = 0;
        })
    }

    pub(crate) fn start(&mut self) -> Result<(), TranscodeError> {
        guard(|| unsafe { jpeg_start_compress(&mut self.cinfo, 1) })
    }

    /// Feed scanlines; `pixels` holds `height` rows `stride` bytes apart.
    ///
    /// The buffer is expected to be validated against the geometry already;
    /// a short buffer feeds fewer rows and the engine fails at finish.
    pub(crate) fn write_rows(&mut self, pixels: &[u8], stride: usize, height: u32) -> Result<(), TranscodeError> {
        if stride == 0 {
            return Err(TranscodeError::InvalidPixels("row stride is zero".into()));
        }
        let cinfo = &mut *self.cinfo;
        guard(|| {
            for line in pixels.chunks(stride).take(height as usize) {
                let row: JSAMPROW = line.as_ptr();
                unsafe { jpeg_write_scanlines(cinfo, &row, 1) };
            }
        })
    }

    pub(crate) fn warnings(&self) -> u64 {
        self.err.warnings()
    }

    pub(crate) fn raw(&mut self) -> *mut jpeg_compress_struct {
        &mut *self.cinfo
    }
}

impl Drop for Compressor {
    fn drop(&mut self) {
        if guard(|| unsafe { jpeg_destroy_compress(&mut self.cinfo) }).is_err() {
            log::warn!("failed to release compressor");
        }
        self.cinfo.dest = ptr::null_mut();
    }
}

fn set_max_memory(common: &mut jpeg_common_struct, bytes: Option<u64>) {
    let Some(bytes) = bytes else {
        return;
    };
    if common.mem.is_null() {
        return;
    }
    let limit = c_long::try_from(bytes).unwrap_or(c_long::MAX);
    // SAFETY: mem is allocated by the create call and lives until destroy.
    unsafe { (*common.mem).max_memory_to_use = limit };
}
