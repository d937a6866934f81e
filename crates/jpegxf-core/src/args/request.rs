//! Parsed configuration for one transcode job.
//!
//! A [`TransformRequest`] is built incrementally by the switch parser and is
//! read-only once the pipeline starts writing. The setters here enforce the
//! request invariants:
//!
//! - at most one transform kind (repeating the same one is accepted)
//! - at most one crop/wipe rectangle
//! - a block-based restart interval wins over a row-based one

use std::path::PathBuf;

use mozjpeg_sys::{
    JCOPY_OPTION, JCOPY_OPTION_JCOPYOPT_ALL, JCOPY_OPTION_JCOPYOPT_COMMENTS,
    JCOPY_OPTION_JCOPYOPT_NONE, JXFORM_CODE, JXFORM_CODE_JXFORM_FLIP_H, JXFORM_CODE_JXFORM_FLIP_V,
    JXFORM_CODE_JXFORM_NONE, JXFORM_CODE_JXFORM_ROT_180, JXFORM_CODE_JXFORM_ROT_270,
    JXFORM_CODE_JXFORM_ROT_90, JXFORM_CODE_JXFORM_TRANSPOSE, JXFORM_CODE_JXFORM_TRANSVERSE,
};

use super::crop::CropSpec;
use crate::error::TranscodeError;

/// Engine wipe transform. The vendored transform sources implement it, the
/// generated bindings stop at `JXFORM_ROT_270`.
pub(crate) const JXFORM_CODE_JXFORM_WIPE: JXFORM_CODE = 8;

/// Geometric operation applied to the coefficient arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransformKind {
    #[default]
    None,
    FlipHorizontal,
    FlipVertical,
    Rotate90,
    Rotate180,
    Rotate270,
    /// Mirror across the upper-left to lower-right diagonal.
    Transpose,
    /// Mirror across the upper-right to lower-left diagonal.
    Transverse,
    /// Gray out a rectangle, leaving the geometry untouched.
    Wipe,
}

impl TransformKind {
    /// Transform code handed to the engine.
    pub(crate) fn engine_code(self) -> JXFORM_CODE {
        match self {
            TransformKind::None => JXFORM_CODE_JXFORM_NONE,
            TransformKind::FlipHorizontal => JXFORM_CODE_JXFORM_FLIP_H,
            TransformKind::FlipVertical => JXFORM_CODE_JXFORM_FLIP_V,
            TransformKind::Rotate90 => JXFORM_CODE_JXFORM_ROT_90,
            TransformKind::Rotate180 => JXFORM_CODE_JXFORM_ROT_180,
            TransformKind::Rotate270 => JXFORM_CODE_JXFORM_ROT_270,
            TransformKind::Transpose => JXFORM_CODE_JXFORM_TRANSPOSE,
            TransformKind::Transverse => JXFORM_CODE_JXFORM_TRANSVERSE,
            TransformKind::Wipe => JXFORM_CODE_JXFORM_WIPE,
        }
    }

    /// Returns true when the output width and height are swapped.
    pub fn swaps_dimensions(self) -> bool {
        matches!(
            self,
            TransformKind::Rotate90
                | TransformKind::Rotate270
                | TransformKind::Transpose
                | TransformKind::Transverse
        )
    }
}

/// Which auxiliary markers are carried over to the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CopyPolicy {
    None,
    /// COM markers only.
    #[default]
    Comments,
    All,
}

impl CopyPolicy {
    pub(crate) fn engine_code(self) -> JCOPY_OPTION {
        match self {
            CopyPolicy::None => JCOPY_OPTION_JCOPYOPT_NONE,
            CopyPolicy::Comments => JCOPY_OPTION_JCOPYOPT_COMMENTS,
            CopyPolicy::All => JCOPY_OPTION_JCOPYOPT_ALL,
        }
    }
}

/// Restart marker spacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartInterval {
    /// Every N MCU rows.
    Rows(u16),
    /// Every N MCU blocks.
    Blocks(u16),
}

/// Options that only affect how the destination is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncoderSettings {
    /// `-optimize`: optimize Huffman tables.
    pub optimize: bool,
    /// `-progressive` was given.
    pub progressive: bool,
    /// Resolved on the final pass: emit a simple progressive scan script.
    pub enable_progression: bool,
    /// `-revert`: fall back to the libjpeg default profile.
    pub revert: bool,
    /// `-fastcrush`: skip progressive scan optimization.
    pub fastcrush: bool,
    pub restart: Option<RestartInterval>,
}

/// Everything one transcode job was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformRequest {
    pub transform: TransformKind,
    /// Crop rectangle, or the wipe rectangle when `transform` is `Wipe`.
    pub region: Option<CropSpec>,
    /// Fail when edge blocks cannot be transformed.
    pub perfect: bool,
    /// Drop edge blocks that cannot be transformed.
    pub trim: bool,
    pub force_grayscale: bool,
    /// Treat codec warnings as fatal.
    pub strict: bool,
    /// Hand back the input unchanged if re-encoding made it bigger.
    pub prefer_smallest: bool,
    pub copy: CopyPolicy,
    /// Engine memory limit in kilobytes (1000 bytes).
    pub max_memory_kb: Option<u64>,
    /// Reject inputs with more scans than this.
    pub max_scans: Option<u32>,
    pub encoder: EncoderSettings,
    /// Codec trace verbosity, one per `-debug`.
    pub trace_level: i32,
    pub outfile: Option<PathBuf>,
}

impl Default for TransformRequest {
    fn default() -> Self {
        Self {
            transform: TransformKind::None,
            region: None,
            perfect: false,
            trim: false,
            force_grayscale: false,
            strict: false,
            prefer_smallest: true,
            copy: CopyPolicy::Comments,
            max_memory_kb: None,
            max_scans: None,
            encoder: EncoderSettings::default(),
            trace_level: 0,
            outfile: None,
        }
    }
}

impl TransformRequest {
    /// Select the transform kind.
    ///
    /// # Errors
    ///
    /// Returns a usage error if a different transform was already selected.
    pub fn select_transform(&mut self, kind: TransformKind) -> Result<(), TranscodeError> {
        if self.transform == TransformKind::None || self.transform == kind {
            self.transform = kind;
            Ok(())
        } else {
            Err(TranscodeError::Usage(
                "can only do one image transformation at a time".into(),
            ))
        }
    }

    /// Record the crop or wipe rectangle.
    ///
    /// # Errors
    ///
    /// Returns a usage error if a rectangle was already given.
    pub fn set_region(&mut self, region: CropSpec) -> Result<(), TranscodeError> {
        if self.region.is_some() {
            return Err(TranscodeError::Usage(
                "only one crop or wipe region per request".into(),
            ));
        }
        self.region = Some(region);
        Ok(())
    }

    /// Record a restart interval. A block interval is never replaced by a
    /// row interval.
    pub fn set_restart(&mut self, interval: RestartInterval) {
        if matches!(
            (self.encoder.restart, interval),
            (Some(RestartInterval::Blocks(_)), RestartInterval::Rows(_))
        ) {
            return;
        }
        self.encoder.restart = Some(interval);
    }

    /// The crop rectangle, if this request crops.
    pub fn crop(&self) -> Option<&CropSpec> {
        match self.transform {
            TransformKind::Wipe => None,
            _ => self.region.as_ref(),
        }
    }

    /// The wipe rectangle, if this request wipes.
    pub fn wipe(&self) -> Option<&CropSpec> {
        match self.transform {
            TransformKind::Wipe => self.region.as_ref(),
            _ => None,
        }
    }

    /// Engine memory limit in bytes.
    pub fn max_memory_bytes(&self) -> Option<u64> {
        self.max_memory_kb.map(|kb| kb.saturating_mul(1000))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let request = TransformRequest::default();
        assert_eq!(request.transform, TransformKind::None);
        assert!(request.prefer_smallest);
        assert_eq!(request.copy, CopyPolicy::Comments);
        assert!(request.region.is_none());
        assert_eq!(request.trace_level, 0);
    }

    #[test]
    fn test_select_same_transform_twice() {
        let mut request = TransformRequest::default();
        request.select_transform(TransformKind::Rotate90).unwrap();
        request.select_transform(TransformKind::Rotate90).unwrap();
        assert_eq!(request.transform, TransformKind::Rotate90);
    }

    #[test]
    fn test_conflicting_transforms_rejected() {
        let mut request = TransformRequest::default();
        request.select_transform(TransformKind::Rotate90).unwrap();
        let err = request
            .select_transform(TransformKind::Rotate180)
            .unwrap_err();
        assert!(matches!(err, TranscodeError::Usage(_)));
        assert_eq!(request.transform, TransformKind::Rotate90);
    }

    #[test]
    fn test_second_region_rejected() {
        let mut request = TransformRequest::default();
        request.set_region(CropSpec::default()).unwrap();
        assert!(request.set_region(CropSpec::default()).is_err());
    }

    #[test]
    fn test_region_role_follows_transform() {
        let mut request = TransformRequest::default();
        request.set_region(CropSpec::default()).unwrap();
        assert!(request.crop().is_some());
        assert!(request.wipe().is_none());

        request.select_transform(TransformKind::Wipe).unwrap();
        assert!(request.crop().is_none());
        assert!(request.wipe().is_some());
    }

    #[test]
    fn test_restart_block_precedence() {
        let mut request = TransformRequest::default();
        request.set_restart(RestartInterval::Blocks(4));
        request.set_restart(RestartInterval::Rows(2));
        assert_eq!(request.encoder.restart, Some(RestartInterval::Blocks(4)));

        let mut request = TransformRequest::default();
        request.set_restart(RestartInterval::Rows(2));
        request.set_restart(RestartInterval::Blocks(4));
        assert_eq!(request.encoder.restart, Some(RestartInterval::Blocks(4)));

        request.set_restart(RestartInterval::Blocks(8));
        assert_eq!(request.encoder.restart, Some(RestartInterval::Blocks(8)));
    }

    #[test]
    fn test_max_memory_bytes() {
        let mut request = TransformRequest::default();
        assert_eq!(request.max_memory_bytes(), None);
        request.max_memory_kb = Some(64);
        assert_eq!(request.max_memory_bytes(), Some(64_000));
    }

    #[test]
    fn test_swaps_dimensions() {
        assert!(TransformKind::Rotate90.swaps_dimensions());
        assert!(TransformKind::Transverse.swaps_dimensions());
        assert!(!TransformKind::Rotate180.swaps_dimensions());
        assert!(!TransformKind::Wipe.swaps_dimensions());
    }

    #[test]
    fn test_engine_codes() {
        assert_eq!(TransformKind::Wipe.engine_code(), JXFORM_CODE_JXFORM_WIPE);
        assert_eq!(
            TransformKind::Rotate270.engine_code(),
            JXFORM_CODE_JXFORM_ROT_270
        );
    }
}
