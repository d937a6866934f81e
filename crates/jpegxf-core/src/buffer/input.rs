//! Input side of the buffer adapter.
//!
//! A job's input is either a file read fully into memory or, for trusted
//! callers, a range of foreign memory named `@buffer@:<address>,<length>`.

use std::fs::File;
use std::io::Read;
use std::slice;

use crate::error::TranscodeError;

/// Reserved filename prefix that addresses foreign memory.
pub const BUFFER_PREFIX: &str = "@buffer@:";

/// An address/length pair parsed from a `@buffer@:` name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignRange {
    pub address: usize,
    pub len: usize,
}

/// Parse `@buffer@:<address>,<length>`.
///
/// Both numbers must be plain decimal, non-zero and below the all-ones
/// sentinel. Returns `None` for anything else, in which case the name is
/// treated as an ordinary path.
pub fn parse_buffer_name(name: &str) -> Option<ForeignRange> {
    let rest = name.strip_prefix(BUFFER_PREFIX)?;
    let (address, len) = rest.split_once(',')?;
    Some(ForeignRange {
        address: parse_sentinel_checked(address)?,
        len: parse_sentinel_checked(len)?,
    })
}

fn parse_sentinel_checked(text: &str) -> Option<usize> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: u64 = text.parse().ok()?;
    if value == 0 || value == u64::MAX {
        return None;
    }
    usize::try_from(value).ok()
}

/// Whether `@buffer@:` names may be dereferenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputPolicy {
    foreign_buffers: bool,
}

impl InputPolicy {
    /// Treat every name as a filesystem path.
    pub const fn files_only() -> Self {
        Self {
            foreign_buffers: false,
        }
    }

    /// Honor `@buffer@:` names.
    ///
    /// # Safety
    ///
    /// Every `@buffer@:` name given to a job under this policy must describe
    /// memory that is readable for its whole length and stays valid and
    /// unmodified until the job has reported its terminal event.
    pub const unsafe fn trusting_foreign_buffers() -> Self {
        Self {
            foreign_buffers: true,
        }
    }

    pub fn allows_foreign_buffers(&self) -> bool {
        self.foreign_buffers
    }
}

impl Default for InputPolicy {
    fn default() -> Self {
        Self::files_only()
    }
}

/// Read-only view over caller-owned memory. Never resized or freed here.
#[derive(Debug)]
pub struct ForeignBytes {
    ptr: *const u8,
    len: usize,
}

// The memory is owned by the caller, who promised it outlives the job.
unsafe impl Send for ForeignBytes {}

impl ForeignBytes {
    /// # Safety
    ///
    /// `ptr` must be valid for reads of `len` bytes for the lifetime of the
    /// returned value.
    pub unsafe fn from_raw_parts(ptr: *const u8, len: usize) -> Self {
        Self { ptr, len }
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: guaranteed by the constructor's contract.
        unsafe { slice::from_raw_parts(self.ptr, self.len) }
    }
}

/// The bytes a transcode job decodes from.
#[derive(Debug)]
pub enum InputSource {
    /// File contents read into memory.
    Owned(Vec<u8>),
    /// Zero-copy view over foreign memory.
    Foreign(ForeignBytes),
}

impl InputSource {
    /// Resolve an input name.
    ///
    /// # Errors
    ///
    /// Returns [`TranscodeError::Io`] naming the path if it cannot be opened,
    /// inspected or read.
    pub fn open(name: &str, policy: InputPolicy) -> Result<Self, TranscodeError> {
        if policy.allows_foreign_buffers() {
            if let Some(range) = parse_buffer_name(name) {
                log::debug!("binding foreign input {:#x}+{}", range.address, range.len);
                // SAFETY: the policy was built with `trusting_foreign_buffers`,
                // whose caller vouched for every buffer name.
                let bytes = unsafe { ForeignBytes::from_raw_parts(range.address as *const u8, range.len) };
                return Ok(InputSource::Foreign(bytes));
            }
        }
        read_file(name).map(InputSource::Owned)
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            InputSource::Owned(bytes) => bytes,
            InputSource::Foreign(bytes) => bytes.as_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_foreign(&self) -> bool {
        matches!(self, InputSource::Foreign(_))
    }
}

fn read_file(path: &str) -> Result<Vec<u8>, TranscodeError> {
    let mut file =
        File::open(path).map_err(|e| TranscodeError::io("can't open for reading", path, e))?;
    let size = file
        .metadata()
        .map_err(|e| TranscodeError::io("can't stat", path, e))?
        .len();
    let mut bytes = Vec::with_capacity(usize::try_from(size).unwrap_or(0));
    file.read_to_end(&mut bytes)
        .map_err(|e| TranscodeError::io("can't read from", path, e))?;
    Ok(bytes)
}
