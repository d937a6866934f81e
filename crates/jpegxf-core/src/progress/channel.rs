//! Process-wide notification endpoint.
//!
//! The host registers one `(port, sink)` pair per process. Workers on any
//! thread post records through it; ordering and delivery into the host's
//! event loop are the sink's business. Without a registered endpoint every
//! report is dropped.

use std::sync::{Arc, PoisonError, RwLock};

use super::event::{EventRecord, JobContext, ProgressEvent};
use crate::buffer::{into_result_handle, release_result};
use crate::error::ExitStatus;

/// Receiving side of the channel, implemented by the host bindings.
pub trait PortSink: Send + Sync {
    /// Deliver one record to `port`. Returns false if it was not accepted.
    fn post_event(&self, port: i64, record: EventRecord) -> bool;

    /// Deliver one line of diagnostic text to `port`.
    fn post_text(&self, _port: i64, _line: &str) -> bool {
        false
    }
}

#[derive(Clone)]
struct Endpoint {
    port: i64,
    sink: Arc<dyn PortSink>,
}

/// Outbound progress/result/exit notifications.
pub struct ProgressChannel {
    endpoint: RwLock<Option<Endpoint>>,
}

static GLOBAL: ProgressChannel = ProgressChannel::new();

impl Default for ProgressChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProgressChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressChannel")
            .field("port", &self.port())
            .finish()
    }
}

impl ProgressChannel {
    pub const fn new() -> Self {
        Self {
            endpoint: RwLock::new(None),
        }
    }

    /// The channel shared by the whole process.
    pub fn global() -> &'static ProgressChannel {
        &GLOBAL
    }

    /// Register the endpoint. Port 0 unregisters.
    pub fn register(&self, port: i64, sink: Arc<dyn PortSink>) {
        let endpoint = (port != 0).then_some(Endpoint { port, sink });
        *self.endpoint.write().unwrap_or_else(PoisonError::into_inner) = endpoint;
    }

    pub fn unregister(&self) {
        *self.endpoint.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Registered port, if any.
    pub fn port(&self) -> Option<i64> {
        self.endpoint().map(|e| e.port)
    }

    pub fn is_registered(&self) -> bool {
        self.port().is_some()
    }

    fn endpoint(&self) -> Option<Endpoint> {
        self.endpoint
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn post(&self, context: JobContext, event: ProgressEvent) -> bool {
        match self.endpoint() {
            Some(endpoint) => endpoint
                .sink
                .post_event(endpoint.port, EventRecord::new(context, event)),
            None => false,
        }
    }

    /// Report progress within a pass. Callers deduplicate percentages.
    pub fn report(&self, context: JobContext, pass: i32, total: i32, percent: i64) {
        self.post(
            context,
            ProgressEvent::Progress {
                pass,
                total,
                percent,
            },
        );
    }

    /// Hand a finished buffer to the host.
    ///
    /// Returns true if the host took ownership. Otherwise the buffer is
    /// released here and never reaches the host.
    pub fn report_result(&self, context: JobContext, bytes: Vec<u8>) -> bool {
        if !self.is_registered() {
            log::debug!("no endpoint registered; dropping {} byte result", bytes.len());
            return false;
        }
        let handle = into_result_handle(bytes);
        let accepted = self.post(
            context,
            ProgressEvent::Result {
                address: handle as usize,
            },
        );
        if !accepted {
            log::warn!("result for job {} refused by endpoint", context.0);
            // SAFETY: the handle was just created and never reached the host.
            unsafe { release_result(handle) };
        }
        accepted
    }

    /// Report the terminal status. Exactly once per job, after cleanup.
    pub fn report_exit(&self, context: JobContext, status: ExitStatus) {
        self.post(
            context,
            ProgressEvent::Exit {
                status: status.code(),
            },
        );
    }

    /// Forward one diagnostic line.
    pub fn post_text(&self, line: &str) -> bool {
        match self.endpoint() {
            Some(endpoint) => endpoint.sink.post_text(endpoint.port, line),
            None => false,
        }
    }
}
