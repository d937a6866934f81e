//! Raw pixel compression.
//!
//! Encodes pixel rows to JPEG with MozJPEG's max-compression profile, writing
//! into the same growable buffer and reporting through the same channel as a
//! transcode job.

use mozjpeg_sys::J_COLOR_SPACE;

use crate::buffer::{InputSource, OutputBuffer};
use crate::codec::{Compressor, HandleOptions, Reporter};
use crate::error::{ExitStatus, TranscodeError};
use crate::progress::{JobContext, ProgressChannel};

/// Input color space, numbered as the engine numbers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ColorSpace {
    Grayscale = 1,
    Rgb = 2,
    YCbCr = 3,
    Cmyk = 4,
    Ycck = 5,
    ExtRgb = 6,
    ExtRgbx = 7,
    ExtBgr = 8,
    ExtBgrx = 9,
    ExtXbgr = 10,
    ExtXrgb = 11,
    ExtRgba = 12,
    ExtBgra = 13,
    ExtAbgr = 14,
    ExtArgb = 15,
}

impl ColorSpace {
    /// Look up an engine color space code.
    ///
    /// Code 16 (RGB565) is an output-only layout and is not accepted.
    pub fn from_code(code: i32) -> Option<Self> {
        use ColorSpace::*;
        Some(match code {
            1 => Grayscale,
            2 => Rgb,
            3 => YCbCr,
            4 => Cmyk,
            5 => Ycck,
            6 => ExtRgb,
            7 => ExtRgbx,
            8 => ExtBgr,
            9 => ExtBgrx,
            10 => ExtXbgr,
            11 => ExtXrgb,
            12 => ExtRgba,
            13 => ExtBgra,
            14 => ExtAbgr,
            15 => ExtArgb,
            _ => return None,
        })
    }

    /// Bytes per pixel.
    pub fn components(self) -> usize {
        use ColorSpace::*;
        match self {
            Grayscale => 1,
            Rgb | YCbCr | ExtRgb | ExtBgr => 3,
            Cmyk | Ycck | ExtRgbx | ExtBgrx | ExtXbgr | ExtXrgb | ExtRgba | ExtBgra | ExtAbgr
            | ExtArgb => 4,
        }
    }

    fn engine(self) -> J_COLOR_SPACE {
        use ColorSpace::*;
        match self {
            Grayscale => J_COLOR_SPACE::JCS_GRAYSCALE,
            Rgb => J_COLOR_SPACE::JCS_RGB,
            YCbCr => J_COLOR_SPACE::JCS_YCbCr,
            Cmyk => J_COLOR_SPACE::JCS_CMYK,
            Ycck => J_COLOR_SPACE::JCS_YCCK,
            ExtRgb => J_COLOR_SPACE::JCS_EXT_RGB,
            ExtRgbx => J_COLOR_SPACE::JCS_EXT_RGBX,
            ExtBgr => J_COLOR_SPACE::JCS_EXT_BGR,
            ExtBgrx => J_COLOR_SPACE::JCS_EXT_BGRX,
            ExtXbgr => J_COLOR_SPACE::JCS_EXT_XBGR,
            ExtXrgb => J_COLOR_SPACE::JCS_EXT_XRGB,
            ExtRgba => J_COLOR_SPACE::JCS_EXT_RGBA,
            ExtBgra => J_COLOR_SPACE::JCS_EXT_BGRA,
            ExtAbgr => J_COLOR_SPACE::JCS_EXT_ABGR,
            ExtArgb => J_COLOR_SPACE::JCS_EXT_ARGB,
        }
    }
}

/// Raw pixels and how to encode them.
#[derive(Debug)]
pub struct CompressRequest {
    /// Rows of pixels, `stride` bytes apart.
    pub pixels: InputSource,
    pub width: u32,
    pub height: u32,
    /// Distance between row starts in bytes.
    pub stride: usize,
    /// Engine color space code, see [`ColorSpace::from_code`].
    pub color_space: i32,
    /// JPEG quality, clamped to 1..=100.
    pub quality: i32,
    /// JFIF density in dots per inch.
    pub dpi: u16,
}

impl CompressRequest {
    /// Check the geometry against the pixel buffer.
    ///
    /// # Errors
    ///
    /// [`TranscodeError::InvalidPixels`] for zero dimensions, an unknown
    /// color space, a stride shorter than one row or a short buffer.
    pub fn validate(&self) -> Result<ColorSpace, TranscodeError> {
        if self.width == 0 || self.height == 0 {
            return Err(TranscodeError::InvalidPixels(format!(
                "dimensions must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        let color = ColorSpace::from_code(self.color_space).ok_or_else(|| {
            TranscodeError::InvalidPixels(format!("unsupported color space {}", self.color_space))
        })?;

        let row_bytes = (self.width as usize)
            .checked_mul(color.components())
            .ok_or_else(|| TranscodeError::InvalidPixels("row size overflows".into()))?;
        if self.stride < row_bytes {
            return Err(TranscodeError::InvalidPixels(format!(
                "stride {} is shorter than a row of {row_bytes} bytes",
                self.stride
            )));
        }
        let needed = self
            .stride
            .checked_mul(self.height as usize - 1)
            .and_then(|n| n.checked_add(row_bytes))
            .ok_or_else(|| TranscodeError::InvalidPixels("image size overflows".into()))?;
        if self.pixels.len() < needed {
            return Err(TranscodeError::InvalidPixels(format!(
                "expected at least {needed} bytes, got {}",
                self.pixels.len()
            )));
        }
        Ok(color)
    }
}

/// Run a compress job and report its result and exit status on `channel`.
pub fn compress_with(
    channel: &'static ProgressChannel,
    request: &CompressRequest,
    context: JobContext,
) -> ExitStatus {
    let status = match encode(channel, request, context) {
        Ok((bytes, warnings)) => {
            log::debug!("job {}: encoded {} bytes", context.0, bytes.len());
            channel.report_result(context, bytes);
            if warnings > 0 {
                ExitStatus::Warnings
            } else {
                ExitStatus::Success
            }
        }
        Err(err) => {
            log::error!("job {}: {err}", context.0);
            err.exit_status()
        }
    };
    channel.report_exit(context, status);
    status
}

/// [`compress_with`] on the process-wide channel.
pub fn compress(request: &CompressRequest, context: JobContext) -> ExitStatus {
    compress_with(ProgressChannel::global(), request, context)
}

fn encode(
    channel: &'static ProgressChannel,
    request: &CompressRequest,
    context: JobContext,
) -> Result<(Vec<u8>, u64), TranscodeError> {
    let color = request.validate()?;
    let quality = request.quality.clamp(1, 100);
    log::debug!(
        "job {}: compressing {}x{} {color:?} at quality {quality}",
        context.0,
        request.width,
        request.height
    );

    let mut compressor = Compressor::new(HandleOptions::default())?;
    compressor.set_reporter(Reporter { channel, context });
    compressor.bind_destination(OutputBuffer::new())?;
    compressor.set_input(
        request.width,
        request.height,
        color.components() as i32,
        color.engine(),
    );
    compressor.set_pixel_defaults(quality, request.dpi)?;
    compressor.start()?;
    compressor.write_rows(request.pixels.as_bytes(), request.stride, request.height)?;
    compressor.finish()?;
    Ok((compressor.take_output()?, compressor.warnings()))
}
