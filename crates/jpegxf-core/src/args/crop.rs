//! Crop/wipe rectangle specification (`WxH+X+Y`).
//!
//! The grammar is `[W[f]][xH[f]][{+|-}X[{+|-}Y]]`. Every part is optional;
//! a trailing `f` forces the given size, and a `-` offset counts from the
//! right or bottom edge instead of the top-left corner.

use mozjpeg_sys::{
    JCROP_CODE, JCROP_CODE_JCROP_FORCE, JCROP_CODE_JCROP_NEG, JCROP_CODE_JCROP_POS,
    JCROP_CODE_JCROP_UNSET,
};

/// Requested width or height of the rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CropExtent {
    /// Extend to the image edge.
    #[default]
    Unset,
    /// Use this size, possibly adjusted to block boundaries.
    Exact(u32),
    /// Use exactly this size (`f` suffix).
    Forced(u32),
}

impl CropExtent {
    /// The numeric value, if one was given.
    pub fn value(self) -> Option<u32> {
        match self {
            CropExtent::Unset => None,
            CropExtent::Exact(v) | CropExtent::Forced(v) => Some(v),
        }
    }

    pub(crate) fn code(self) -> (u32, JCROP_CODE) {
        match self {
            CropExtent::Unset => (0, JCROP_CODE_JCROP_UNSET),
            CropExtent::Exact(v) => (v, JCROP_CODE_JCROP_POS),
            CropExtent::Forced(v) => (v, JCROP_CODE_JCROP_FORCE),
        }
    }
}

/// Requested horizontal or vertical offset of the rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CropOffset {
    /// Start at the top/left edge.
    #[default]
    Unset,
    /// Distance from the top/left edge (`+N`).
    FromStart(u32),
    /// Distance from the bottom/right edge (`-N`).
    FromEnd(u32),
}

impl CropOffset {
    pub(crate) fn code(self) -> (u32, JCROP_CODE) {
        match self {
            CropOffset::Unset => (0, JCROP_CODE_JCROP_UNSET),
            CropOffset::FromStart(v) => (v, JCROP_CODE_JCROP_POS),
            CropOffset::FromEnd(v) => (v, JCROP_CODE_JCROP_NEG),
        }
    }
}

/// A parsed `WxH+X+Y` rectangle, relative to an image not yet known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CropSpec {
    pub width: CropExtent,
    pub height: CropExtent,
    pub x_offset: CropOffset,
    pub y_offset: CropOffset,
}

impl CropSpec {
    /// Parse a crop specification. Returns `None` for malformed input.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let spec = CropSpec::parse("64x32+8-0").unwrap();
    /// assert_eq!(spec.width, CropExtent::Exact(64));
    /// ```
    pub fn parse(spec: &str) -> Option<CropSpec> {
        let mut rest = spec.as_bytes();
        let mut parsed = CropSpec::default();

        if rest.first().is_some_and(u8::is_ascii_digit) {
            let (value, tail) = read_integer(rest)?;
            let (forced, tail) = read_force_flag(tail);
            parsed.width = extent(value, forced);
            rest = tail;
        }

        if let Some((b'x' | b'X', tail)) = rest.split_first() {
            let (value, tail) = read_integer(tail)?;
            let (forced, tail) = read_force_flag(tail);
            parsed.height = extent(value, forced);
            rest = tail;
        }

        if let Some((sign @ (b'+' | b'-'), tail)) = rest.split_first() {
            let (value, tail) = read_integer(tail)?;
            parsed.x_offset = offset(*sign, value);
            rest = tail;
        }

        if let Some((sign @ (b'+' | b'-'), tail)) = rest.split_first() {
            let (value, tail) = read_integer(tail)?;
            parsed.y_offset = offset(*sign, value);
            rest = tail;
        }

        rest.is_empty().then_some(parsed)
    }

}

fn extent(value: u32, forced: bool) -> CropExtent {
    if forced {
        CropExtent::Forced(value)
    } else {
        CropExtent::Exact(value)
    }
}

fn offset(sign: u8, value: u32) -> CropOffset {
    if sign == b'-' {
        CropOffset::FromEnd(value)
    } else {
        CropOffset::FromStart(value)
    }
}

fn read_force_flag(input: &[u8]) -> (bool, &[u8]) {
    match input.split_first() {
        Some((b'f' | b'F', tail)) => (true, tail),
        _ => (false, input),
    }
}

/// Read an unsigned decimal that fits in `u32`; at least one digit.
fn read_integer(input: &[u8]) -> Option<(u32, &[u8])> {
    let digits = input.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let mut value: u32 = 0;
    for &b in &input[..digits] {
        value = value.checked_mul(10)?.checked_add(u32::from(b - b'0'))?;
    }
    Some((value, &input[digits..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_spec() {
        let spec = CropSpec::parse("64x32+8+16").unwrap();
        assert_eq!(spec.width, CropExtent::Exact(64));
        assert_eq!(spec.height, CropExtent::Exact(32));
        assert_eq!(spec.x_offset, CropOffset::FromStart(8));
        assert_eq!(spec.y_offset, CropOffset::FromStart(16));
    }

    #[test]
    fn test_parse_forced_and_negative() {
        let spec = CropSpec::parse("10fx20F-3-4").unwrap();
        assert_eq!(spec.width, CropExtent::Forced(10));
        assert_eq!(spec.height, CropExtent::Forced(20));
        assert_eq!(spec.x_offset, CropOffset::FromEnd(3));
        assert_eq!(spec.y_offset, CropOffset::FromEnd(4));
    }

    #[test]
    fn test_parse_partial_specs() {
        let spec = CropSpec::parse("x20").unwrap();
        assert_eq!(spec.width, CropExtent::Unset);
        assert_eq!(spec.height, CropExtent::Exact(20));

        let spec = CropSpec::parse("+5+6").unwrap();
        assert_eq!(spec.width, CropExtent::Unset);
        assert_eq!(spec.x_offset, CropOffset::FromStart(5));
        assert_eq!(spec.y_offset, CropOffset::FromStart(6));

        assert_eq!(CropSpec::parse("").unwrap(), CropSpec::default());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(CropSpec::parse("64x").is_none());
        assert!(CropSpec::parse("64x32+").is_none());
        assert!(CropSpec::parse("64x32+1+2+3").is_none());
        assert!(CropSpec::parse("64y32").is_none());
        assert!(CropSpec::parse("abc").is_none());
        assert!(CropSpec::parse("99999999999x1").is_none());
    }

}

// ============================================================================
// Property-Based Tests
// ============================================================================
