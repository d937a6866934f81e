//! Fire-and-forget job execution.
//!
//! Each submitted job moves into its own named OS thread and runs to its
//! exit event there. Nothing is shared between jobs and the join handle is
//! dropped, so the submitter never waits.

use std::io;
use std::thread;

use crate::buffer::InputPolicy;
use crate::error::{ExitStatus, TranscodeError};
use crate::pipeline::{compress_with, CompressRequest, Transcoder};
use crate::progress::{JobContext, ProgressChannel};

/// A unit of work that owns everything it needs.
pub trait Job: Send + 'static {
    fn context(&self) -> JobContext;

    /// Where the job reports; used for the spawn-failure exit event.
    fn channel(&self) -> &'static ProgressChannel;

    /// Run to completion, reporting the exit event on [`Job::channel`].
    fn run(self) -> ExitStatus;
}

/// A transcode job over an owned argument vector.
#[derive(Debug, Clone)]
pub struct TranscodeJob {
    args: Vec<String>,
    context: JobContext,
    transcoder: Transcoder,
}

impl TranscodeJob {
    pub fn new(args: Vec<String>, context: JobContext, transcoder: Transcoder) -> Self {
        Self {
            args,
            context,
            transcoder,
        }
    }

    /// Whether `@buffer@:` input names will be dereferenced.
    pub fn input_policy(&self) -> InputPolicy {
        self.transcoder.input_policy()
    }
}

impl Job for TranscodeJob {
    fn context(&self) -> JobContext {
        self.context
    }

    fn channel(&self) -> &'static ProgressChannel {
        self.transcoder.channel()
    }

    fn run(self) -> ExitStatus {
        self.transcoder.run(&self.args, self.context)
    }
}

/// A pixel compression job.
#[derive(Debug)]
pub struct CompressJob {
    request: CompressRequest,
    context: JobContext,
    channel: &'static ProgressChannel,
}

impl CompressJob {
    pub fn new(request: CompressRequest, context: JobContext, channel: &'static ProgressChannel) -> Self {
        Self {
            request,
            context,
            channel,
        }
    }
}

impl Job for CompressJob {
    fn context(&self) -> JobContext {
        self.context
    }

    fn channel(&self) -> &'static ProgressChannel {
        self.channel
    }

    fn run(self) -> ExitStatus {
        compress_with(self.channel, &self.request, self.context)
    }
}

/// Starts worker threads.
pub trait Spawner {
    fn spawn(&self, name: String, task: Box<dyn FnOnce() + Send + 'static>) -> io::Result<()>;
}

/// Spawns detached OS threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSpawner;

impl Spawner for ThreadSpawner {
    fn spawn(&self, name: String, task: Box<dyn FnOnce() + Send + 'static>) -> io::Result<()> {
        thread::Builder::new().name(name).spawn(task).map(drop)
    }
}

/// Runs every job on a fresh worker.
#[derive(Debug, Clone, Copy, Default)]
pub struct Executor<S = ThreadSpawner> {
    spawner: S,
}

impl Executor<ThreadSpawner> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S: Spawner> Executor<S> {
    pub fn with_spawner(spawner: S) -> Self {
        Self { spawner }
    }

    /// Move `job` to a new worker thread and return without waiting.
    ///
    /// # Errors
    ///
    /// [`TranscodeError::Spawn`] if no thread could be started. The job's
    /// exit event ([`ExitStatus::SpawnFailed`]) has then already been
    /// reported from the calling thread.
    pub fn submit_detached<J: Job>(&self, job: J) -> Result<(), TranscodeError> {
        let context = job.context();
        let channel = job.channel();
        let name = format!("jpegxf-job-{}", context.0);
        log::debug!("job {}: spawning {name}", context.0);

        self.spawner
            .spawn(
                name,
                Box::new(move || {
                    job.run();
                }),
            )
            .map_err(|err| {
                log::error!("job {}: failed to spawn worker: {err}", context.0);
                channel.report_exit(context, ExitStatus::SpawnFailed);
                TranscodeError::Spawn(err)
            })
    }
}

/// Submit `job` on a detached OS thread.
pub fn submit_detached<J: Job>(job: J) -> Result<(), TranscodeError> {
    Executor::new().submit_detached(job)
}
