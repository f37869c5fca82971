//! Single-slot background job runner.
//!
//! [`JobManager`] owns at most one job. Starting a job hands the pipeline to
//! the blocking thread pool and returns immediately; the caller then polls
//! for output without ever waiting on the job.
//!
//! Output travels through an unbounded queue owned by the job: the pipeline
//! is the only producer, [`JobManager::poll`] the only consumer. State
//! transitions are published on a watch channel strictly after the lines
//! that precede them were queued, so draining once more after observing a
//! terminal state yields everything.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::{SetupError, SetupResult};
use crate::pipeline::{Pipeline, PipelineOutcome, STATUS_FAILED};
use crate::protocol::{OutputSink, ProgressEvent, decode_line};

/// Opaque job identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl JobId {
    pub fn as_u64(self) -> u64 {
        self.0
    }

    #[cfg(test)]
    pub(crate) fn for_tests(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Stopped
        )
    }

    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }
}

/// Lifecycle state plus the captured error of a failed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSnapshot {
    pub state: JobState,
    pub error: Option<String>,
}

impl JobSnapshot {
    fn new(state: JobState) -> Self {
        Self { state, error: None }
    }
}

struct ActiveJob {
    id: JobId,
    output: mpsc::UnboundedReceiver<String>,
    status: watch::Receiver<JobSnapshot>,
    stop: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl fmt::Debug for ActiveJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveJob")
            .field("id", &self.id)
            .field("status", &*self.status.borrow())
            .finish_non_exhaustive()
    }
}

/// Owner of the single job slot.
#[derive(Debug)]
pub struct JobManager {
    runtime: tokio::runtime::Handle,
    slot: Option<ActiveJob>,
    next_id: u64,
}

impl JobManager {
    pub fn new(runtime: tokio::runtime::Handle) -> Self {
        Self {
            runtime,
            slot: None,
            next_id: 1,
        }
    }

    /// Manager bound to the ambient Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }

    /// Id of the job currently holding the slot, if any.
    pub fn current_job(&self) -> Option<JobId> {
        self.slot.as_ref().map(|job| job.id)
    }

    /// Start a job for `pipeline`.
    ///
    /// Fails with [`SetupError::Conflict`] while any job holds the slot,
    /// including a finished job that has not been released yet.
    pub fn start(&mut self, pipeline: Pipeline) -> SetupResult<JobId> {
        if let Some(active) = &self.slot {
            return Err(SetupError::Conflict {
                active: active.id.as_u64(),
            });
        }

        let id = JobId(self.next_id);
        self.next_id += 1;

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(JobSnapshot::new(JobState::Pending));
        let stop = Arc::new(AtomicBool::new(false));

        let sink = OutputSink::new(out_tx);
        let stop_flag = Arc::clone(&stop);
        let task = self.runtime.spawn_blocking(move || {
            run_job(id, pipeline, sink, stop_flag, status_tx);
        });

        info!(job = %id, "job started");
        self.slot = Some(ActiveJob {
            id,
            output: out_rx,
            status: status_rx,
            stop,
            task,
        });
        Ok(id)
    }

    /// Drain every event queued since the previous poll, in order.
    ///
    /// Never blocks. Returns nothing for an unknown or released id.
    pub fn poll(&mut self, id: JobId) -> Vec<ProgressEvent> {
        let Some(job) = self.slot.as_mut().filter(|job| job.id == id) else {
            return Vec::new();
        };

        let mut events = Vec::new();
        while let Ok(line) = job.output.try_recv() {
            if let Some(event) = decode_line(&line) {
                events.push(event);
            }
        }
        events
    }

    pub fn state(&self, id: JobId) -> Option<JobState> {
        self.snapshot(id).map(|snapshot| snapshot.state)
    }

    pub fn snapshot(&self, id: JobId) -> Option<JobSnapshot> {
        let job = self.slot.as_ref().filter(|job| job.id == id)?;
        // Read `finished` first: a worker that finished has already published.
        let finished = job.task.is_finished();
        let snapshot = job.status.borrow().clone();
        if snapshot.state.is_active() && finished {
            // Worker gone without publishing. Panics are caught in `run_job`, so
            // this only covers a cancelled blocking task.
            return Some(JobSnapshot {
                state: JobState::Failed,
                error: Some("setup job ended unexpectedly".to_string()),
            });
        }
        Some(snapshot)
    }

    /// Ask the job not to start further steps. Returns whether a job was signalled.
    pub fn stop(&self, id: JobId) -> bool {
        match self.slot.as_ref().filter(|job| job.id == id) {
            Some(job) => {
                info!(job = %id, "stop requested");
                job.stop.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// Discard a finished job and free the slot.
    ///
    /// Refuses (returns `None`) while the job is still pending or running.
    pub fn release(&mut self, id: JobId) -> Option<JobSnapshot> {
        let snapshot = self.snapshot(id)?;
        if snapshot.state.is_active() {
            warn!(job = %id, "refusing to release an active job");
            return None;
        }
        self.slot = None;
        info!(job = %id, state = ?snapshot.state, "job released");
        Some(snapshot)
    }
}

fn run_job(
    id: JobId,
    pipeline: Pipeline,
    sink: OutputSink,
    stop: Arc<AtomicBool>,
    status: watch::Sender<JobSnapshot>,
) {
    status.send_replace(JobSnapshot::new(JobState::Running));

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| pipeline.execute(&sink, &stop)));
    let snapshot = match outcome {
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(job = %id, %message, "setup job panicked");
            sink.log(format!("ERROR: setup job panicked: {message}"));
            sink.progress(100.0, STATUS_FAILED);
            JobSnapshot {
                state: JobState::Failed,
                error: Some(format!("setup job panicked: {message}")),
            }
        }
        Ok(PipelineOutcome::Completed) => JobSnapshot::new(JobState::Completed),
        Ok(PipelineOutcome::Stopped { next }) => {
            info!(job = %id, next = next.name(), "job stopped");
            JobSnapshot::new(JobState::Stopped)
        }
        Ok(PipelineOutcome::Failed { step, error }) => {
            let error = SetupError::Step {
                step: step.name(),
                source: error,
            };
            JobSnapshot {
                state: JobState::Failed,
                error: Some(format!("{:#}", anyhow::Error::new(error))),
            }
        }
    };

    info!(job = %id, state = ?snapshot.state, "job finished");
    status.send_replace(snapshot);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}
