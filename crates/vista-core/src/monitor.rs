//! Job monitor: folds job output into caller-visible progress.
//!
//! The monitor is the only component that polls a job. Each tick performs one
//! bounded, non-blocking drain and folds the events into a [`MonitorView`]:
//! the latest observed percent and status plus an append-only log. When the
//! job reaches a terminal state the monitor drains one last time, pins the
//! percent at 100, records the outcome and releases the job slot.

use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::job::{JobId, JobManager, JobState};
use crate::pipeline::{STATUS_COMPLETED, STATUS_FAILED, STATUS_STOPPED};
use crate::protocol::{ProgressEvent, clamp_percent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed,
    Stopped,
}

impl Outcome {
    pub fn status_text(self) -> &'static str {
        match self {
            Outcome::Completed => STATUS_COMPLETED,
            Outcome::Failed => STATUS_FAILED,
            Outcome::Stopped => STATUS_STOPPED,
        }
    }
}

/// What the caller renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitorView {
    /// Latest observed percent, always within `[0, 100]`.
    pub percent: f64,
    pub status: String,
    pub log: Vec<String>,
    pub outcome: Option<Outcome>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Running,
    Finished(Outcome),
}

#[derive(Debug)]
pub struct Monitor {
    job: JobId,
    view: MonitorView,
}

impl Monitor {
    pub fn new(job: JobId) -> Self {
        Self {
            job,
            view: MonitorView::default(),
        }
    }

    pub fn job(&self) -> JobId {
        self.job
    }

    pub fn view(&self) -> &MonitorView {
        &self.view
    }

    pub fn into_view(self) -> MonitorView {
        self.view
    }

    /// Fold one event into the view.
    pub fn apply(&mut self, event: &ProgressEvent) {
        match event {
            ProgressEvent::LogLine { text } => self.view.log.push(text.clone()),
            ProgressEvent::Progress { percent, status } => {
                self.view.percent = clamp_percent(*percent);
                self.view.status = status.clone();
            }
        }
    }

    /// One poll-and-fold cycle. Returns the events folded in this tick.
    pub fn tick(&mut self, manager: &mut JobManager) -> (Tick, Vec<ProgressEvent>) {
        let snapshot = manager.snapshot(self.job);
        let mut events = manager.poll(self.job);
        for event in &events {
            self.apply(event);
        }

        let (outcome, error) = match snapshot {
            Some(snapshot) => match snapshot.state {
                JobState::Pending | JobState::Running => return (Tick::Running, events),
                JobState::Completed => (Outcome::Completed, None),
                JobState::Failed => (Outcome::Failed, snapshot.error),
                JobState::Stopped => (Outcome::Stopped, None),
            },
            None => (
                Outcome::Failed,
                Some(format!("job {} is no longer available", self.job)),
            ),
        };

        let tail = manager.poll(self.job);
        for event in &tail {
            self.apply(event);
        }
        events.extend(tail);

        self.view.percent = 100.0;
        self.view.status = outcome.status_text().to_string();
        self.view.outcome = Some(outcome);
        self.view.error = error;
        manager.release(self.job);
        debug!(job = %self.job, ?outcome, "monitor finished");

        (Tick::Finished(outcome), events)
    }
}

/// Drive a monitor on a fixed interval until the job ends.
///
/// `on_update` sees the events of every tick together with the updated view.
/// When `stop` resolves, the job is asked to stop; the monitor keeps polling
/// until the job actually reaches a terminal state.
pub async fn run_monitor<S, F>(
    manager: &mut JobManager,
    job: JobId,
    interval: Duration,
    stop: S,
    mut on_update: F,
) -> MonitorView
where
    S: Future<Output = ()>,
    F: FnMut(&[ProgressEvent], &MonitorView),
{
    let mut monitor = Monitor::new(job);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tokio::pin!(stop);
    let mut stop_sent = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let (tick, events) = monitor.tick(manager);
                on_update(&events, monitor.view());
                if let Tick::Finished(_) = tick {
                    return monitor.into_view();
                }
            }
            _ = &mut stop, if !stop_sent => {
                stop_sent = true;
                manager.stop(job);
            }
        }
    }
}
