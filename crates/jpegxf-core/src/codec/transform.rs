//! Lossless transform driver.
//!
//! Wraps the engine's transform options and runs its workspace, parameter
//! and execution steps against a decompressor/compressor pair. Crop and wipe
//! share the rectangle fields; the engine widens a wipe to whole iMCUs and
//! zeroes those coefficients during execution.

use std::mem;
use std::os::raw::c_int;

use mozjpeg_sys::{
    boolean, j_decompress_ptr, jcopy_markers_execute, jpeg_transform_info,
    jtransform_adjust_parameters, jtransform_execute_transform, jtransform_request_workspace,
    jvirt_barray_ptr, JCROP_CODE, JDIMENSION, JXFORM_CODE,
};

use super::error_hook::guard;
use super::handles::{CoefArrays, Compressor, Decompressor};
use crate::args::{CopyPolicy, TransformKind, TransformRequest};
use crate::error::TranscodeError;

/// Transform parameters as laid out by the compiled engine.
///
/// The generated `jpeg_transform_info` lacks the drop/wipe fields the
/// vendored sources declare, so the engine calls get this struct cast to
/// that type.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
#[allow(dead_code)] // several fields exist only for the engine to write
struct TransformInfo {
    transform: JXFORM_CODE,
    perfect: boolean,
    trim: boolean,
    force_grayscale: boolean,
    crop: boolean,
    slow_hflip: boolean,

    crop_width: JDIMENSION,
    crop_width_set: JCROP_CODE,
    crop_height: JDIMENSION,
    crop_height_set: JCROP_CODE,
    crop_xoffset: JDIMENSION,
    crop_xoffset_set: JCROP_CODE,
    crop_yoffset: JDIMENSION,
    crop_yoffset_set: JCROP_CODE,

    drop_ptr: j_decompress_ptr,
    drop_coef_arrays: *mut jvirt_barray_ptr,

    num_components: c_int,
    workspace_coef_arrays: *mut jvirt_barray_ptr,
    output_width: JDIMENSION,
    output_height: JDIMENSION,
    x_crop_offset: JDIMENSION,
    y_crop_offset: JDIMENSION,
    drop_width: JDIMENSION,
    drop_height: JDIMENSION,
    imcu_sample_width: c_int,
    imcu_sample_height: c_int,
}

/// Transform options for one job.
pub(crate) struct Transform {
    info: TransformInfo,
    kind: TransformKind,
}

impl Transform {
    pub(crate) fn new(request: &TransformRequest) -> Self {
        // SAFETY: plain options and null pointers; the engine fills in the rest.
        let mut info: TransformInfo = unsafe { mem::zeroed() };
        info.transform = request.transform.engine_code();
        info.perfect = request.perfect.into();
        info.trim = request.trim.into();
        info.force_grayscale = request.force_grayscale.into();

        if let Some(region) = &request.region {
            info.crop = 1;
            (info.crop_width, info.crop_width_set) = region.width.code();
            (info.crop_height, info.crop_height_set) = region.height.code();
            (info.crop_xoffset, info.crop_xoffset_set) = region.x_offset.code();
            (info.crop_yoffset, info.crop_yoffset_set) = region.y_offset.code();
        }

        Self {
            info,
            kind: request.transform,
        }
    }

    fn info_ptr(&mut self) -> *mut jpeg_transform_info {
        (&mut self.info as *mut TransformInfo).cast()
    }

    /// Whether executing this transform is a pass of its own.
    pub(crate) fn runs_extra_pass(&self) -> bool {
        self.kind != TransformKind::None
    }

    /// Size the transform workspace for `src`'s header.
    ///
    /// # Errors
    ///
    /// [`TranscodeError::TransformInfeasible`] when `-perfect` was requested
    /// and the image edges do not fall on whole blocks;
    /// [`TranscodeError::Codec`] when the crop or wipe rectangle does not fit
    /// the image.
    pub(crate) fn request_workspace(&mut self, src: &mut Decompressor<'_>) -> Result<(), TranscodeError> {
        let raw = src.raw();
        let info = self.info_ptr();
        let feasible = guard(|| unsafe { jtransform_request_workspace(raw, info) })?;
        if feasible == 0 {
            log::error!("transformation is not perfect");
            return Err(TranscodeError::TransformInfeasible);
        }
        if self.kind == TransformKind::Wipe {
            log::debug!(
                "wiping {}x{} iMCUs at iMCU {},{}",
                self.info.drop_width,
                self.info.drop_height,
                self.info.x_crop_offset,
                self.info.y_crop_offset
            );
        }
        Ok(())
    }

    /// Adjust the destination parameters and pick the array set to write.
    pub(crate) fn adjust_parameters(
        &mut self,
        src: &mut Decompressor<'_>,
        dst: &mut Compressor,
        arrays: CoefArrays,
    ) -> Result<CoefArrays, TranscodeError> {
        let (raw_src, raw_dst) = (src.raw(), dst.raw());
        let info = self.info_ptr();
        let chosen = guard(|| unsafe { jtransform_adjust_parameters(raw_src, raw_dst, arrays.0, info) })?;
        if chosen.is_null() {
            return Err(TranscodeError::Codec("transform produced no coefficient arrays".into()));
        }
        Ok(CoefArrays(chosen))
    }

    /// Run the transform over the source arrays.
    ///
    /// Must come after the destination has taken its arrays and before it
    /// finishes; the encoder reads the coefficients only when finishing.
    pub(crate) fn execute(
        &mut self,
        src: &mut Decompressor<'_>,
        dst: &mut Compressor,
        arrays: CoefArrays,
    ) -> Result<(), TranscodeError> {
        let (raw_src, raw_dst) = (src.raw(), dst.raw());
        let info = self.info_ptr();
        guard(|| unsafe { jtransform_execute_transform(raw_src, raw_dst, arrays.0, info) })
    }
}

/// Copy the markers saved under `policy` from `src` into `dst`'s output.
pub(crate) fn copy_markers(
    src: &mut Decompressor<'_>,
    dst: &mut Compressor,
    policy: CopyPolicy,
) -> Result<(), TranscodeError> {
    let (raw_src, raw_dst) = (src.raw(), dst.raw());
    guard(|| unsafe { jcopy_markers_execute(raw_src, raw_dst, policy.engine_code()) })
}
