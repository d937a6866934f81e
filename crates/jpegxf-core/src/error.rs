//! Fatal-error signal and job exit statuses.
//!
//! Every fatal condition in a job, whatever component raises it, ends up as a
//! [`TranscodeError`]. The pipeline is the single place that catches it: it
//! releases the codec handles and reports [`TranscodeError::exit_status`] as
//! the job's terminal event.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Terminal status of a job, as reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ExitStatus {
    /// The job finished without diagnostics.
    Success = 0,
    /// The codec engine hit a fatal fault (corrupt data, internal error).
    CodecFailure = 1,
    /// The job finished, but the codec emitted non-fatal warnings.
    Warnings = 2,
    /// Malformed, unknown or conflicting switches.
    Usage = 3,
    /// Opening, reading or writing a file failed.
    Io = 4,
    /// `-perfect` was requested but the image cannot be transformed perfectly.
    TransformInfeasible = 5,
    /// The input declared more scans than `-maxscans` allows.
    TooManyScans = 6,
    /// A warning was promoted to a fatal error by `-strict`.
    StrictWarning = 7,
    /// The worker thread could not be created.
    SpawnFailed = -1,
}

impl ExitStatus {
    /// The integer code carried by the terminal event.
    #[inline]
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Returns true for the two statuses that mean the job produced a result.
    #[inline]
    pub fn is_success(self) -> bool {
        matches!(self, ExitStatus::Success | ExitStatus::Warnings)
    }

    /// Map an integer code back to a status, if it is one of ours.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ExitStatus::Success),
            1 => Some(ExitStatus::CodecFailure),
            2 => Some(ExitStatus::Warnings),
            3 => Some(ExitStatus::Usage),
            4 => Some(ExitStatus::Io),
            5 => Some(ExitStatus::TransformInfeasible),
            6 => Some(ExitStatus::TooManyScans),
            7 => Some(ExitStatus::StrictWarning),
            -1 => Some(ExitStatus::SpawnFailed),
            _ => None,
        }
    }
}

/// Fatal conditions that abort a job.
#[derive(Debug, Error)]
pub enum TranscodeError {
    /// Bad command line: unknown switch, missing value, conflicting transforms.
    #[error("bad usage: {0}")]
    Usage(String),

    /// A file could not be opened, inspected, read or written.
    #[error("{action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The codec engine signalled a fatal error.
    #[error("codec error: {0}")]
    Codec(String),

    /// `-perfect` cannot be honored for this image geometry.
    #[error("transformation is not perfect")]
    TransformInfeasible,

    /// The input stream has more scans than allowed.
    #[error("scan number {scan} exceeds maximum scans ({max})")]
    TooManyScans { scan: i32, max: u32 },

    /// A codec warning escalated to fatal because strict mode is on.
    #[error("warning treated as fatal: {0}")]
    StrictWarning(String),

    /// Pixel input for a compress job does not match its declared geometry.
    #[error("invalid pixel input: {0}")]
    InvalidPixels(String),

    /// The worker thread for a detached job could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),
}

impl TranscodeError {
    /// Build an I/O error that names the offending path.
    pub fn io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        TranscodeError::Io {
            action,
            path: path.into(),
            source,
        }
    }

    /// The status reported in the job's terminal event.
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            TranscodeError::Usage(_) | TranscodeError::InvalidPixels(_) => ExitStatus::Usage,
            TranscodeError::Io { .. } => ExitStatus::Io,
            TranscodeError::Codec(_) => ExitStatus::CodecFailure,
            TranscodeError::TransformInfeasible => ExitStatus::TransformInfeasible,
            TranscodeError::TooManyScans { .. } => ExitStatus::TooManyScans,
            TranscodeError::StrictWarning(_) => ExitStatus::StrictWarning,
            TranscodeError::Spawn(_) => ExitStatus::SpawnFailed,
        }
    }

    /// True when this abort is a warning promoted by strict mode, as opposed
    /// to an ordinary fatal condition.
    #[inline]
    pub fn is_escalated_warning(&self) -> bool {
        matches!(self, TranscodeError::StrictWarning(_))
    }
}
