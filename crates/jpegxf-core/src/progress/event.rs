//! Progress event shapes and their wire record.

use crate::error::ExitStatus;

/// `field1` sentinel: the record carries the terminal status.
pub const PASS_EXIT_CODE: i32 = -1;

/// `field1` sentinel: the record carries a result handle address.
pub const PASS_RESULT_POINTER: i32 = -2;

/// Caller-chosen token identifying a job in every event it emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct JobContext(pub i64);

/// One notification about a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Percentage through pass `pass` (1-based) of `total`.
    Progress { pass: i32, total: i32, percent: i64 },
    /// A result buffer is ready; `address` is its handle.
    Result { address: usize },
    /// The job ended. Always the last event of a job.
    Exit { status: i32 },
}

/// Flat 4-field record posted to the host.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRecord {
    pub context: i64,
    pub field1: i32,
    pub field2: i32,
    pub field3: i64,
}

impl EventRecord {
    pub fn new(context: JobContext, event: ProgressEvent) -> Self {
        let (field1, field2, field3) = match event {
            ProgressEvent::Progress {
                pass,
                total,
                percent,
            } => (pass, total, percent),
            ProgressEvent::Result { address } => (PASS_RESULT_POINTER, 0, address as i64),
            ProgressEvent::Exit { status } => (PASS_EXIT_CODE, 0, i64::from(status)),
        };
        Self {
            context: context.0,
            field1,
            field2,
            field3,
        }
    }

    pub fn job(&self) -> JobContext {
        JobContext(self.context)
    }

    /// Decode the record back into its event shape.
    pub fn event(&self) -> ProgressEvent {
        match self.field1 {
            PASS_EXIT_CODE => ProgressEvent::Exit {
                status: self.field3 as i32,
            },
            PASS_RESULT_POINTER => ProgressEvent::Result {
                address: self.field3 as usize,
            },
            pass => ProgressEvent::Progress {
                pass,
                total: self.field2,
                percent: self.field3,
            },
        }
    }

    /// Terminal status, if this is the exit record.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        match self.event() {
            ProgressEvent::Exit { status } => ExitStatus::from_code(status),
            _ => None,
        }
    }
}
