#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use vista_core::config::SetupSettings;
use vista_core::job::{JobId, JobManager, JobSnapshot};
use vista_core::pipeline::Pipeline;
use vista_core::protocol::{OutputSink, ProgressEvent};
use vista_core::runtime::{CommandOutcome, CommandRunner, RunnerSpec, venv_python};
use vista_core::types::InstallRequest;

/// Stands in for python/pip/npm. Records every invocation.
#[derive(Debug, Default)]
pub struct FakeRunner {
    calls: Mutex<Vec<RunnerSpec>>,
    failures: Vec<(String, i32)>,
    skip_venv_python: bool,
    delay: Option<Duration>,
    panic_on: Option<String>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exit with `code` for any command line containing `needle`.
    pub fn failing_on(mut self, needle: &str, code: i32) -> Self {
        self.failures.push((needle.to_string(), code));
        self
    }

    /// Let `-m venv` succeed without producing an interpreter.
    pub fn without_venv_python(mut self) -> Self {
        self.skip_venv_python = true;
        self
    }

    /// Panic inside the job for any command line containing `needle`.
    pub fn panicking_on(mut self, needle: &str) -> Self {
        self.panic_on = Some(needle.to_string());
        self
    }

    /// Sleep in every command, to keep a job busy.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<RunnerSpec> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called_with(&self, needle: &str) -> bool {
        self.calls().iter().any(|spec| spec.display().contains(needle))
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, spec: &RunnerSpec, output: &OutputSink) -> anyhow::Result<CommandOutcome> {
        self.calls.lock().unwrap().push(spec.clone());
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        let line = spec.display();
        output.line(format!("fake: {line}"));
        if let Some(needle) = &self.panic_on
            && line.contains(needle.as_str())
        {
            panic!("fake runner blew up on `{line}`");
        }

        if spec.args.iter().any(|a| a == "venv") && !self.skip_venv_python {
            let venv_dir = PathBuf::from(spec.args.last().expect("venv dir argument"));
            let python = venv_python(&venv_dir);
            std::fs::create_dir_all(python.parent().unwrap())?;
            std::fs::write(&python, "")?;
        }

        if let Some((_, code)) = self.failures.iter().find(|(n, _)| line.contains(n.as_str())) {
            output.line("simulated failure");
            return Ok(CommandOutcome { code: Some(*code) });
        }
        Ok(CommandOutcome { code: Some(0) })
    }
}

/// A throwaway project with one source root holding `A` and `B`.
pub struct Fixture {
    pub tmp: TempDir,
    pub project: PathBuf,
    pub shows: PathBuf,
    pub aggregation: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().expect("tempdir should succeed");
        let project = tmp.path().join("project");
        let shows = tmp.path().join("lib").join("Shows");
        std::fs::create_dir_all(&project).expect("create project");
        std::fs::create_dir_all(shows.join("A")).expect("create A");
        std::fs::create_dir_all(shows.join("B")).expect("create B");
        let aggregation = tmp.path().join("media");
        Self {
            tmp,
            project,
            shows,
            aggregation,
        }
    }

    pub fn request(&self) -> InstallRequest {
        self.request_with_roots(vec![self.shows.clone()])
    }

    pub fn request_with_roots(&self, roots: Vec<PathBuf>) -> InstallRequest {
        InstallRequest::new(
            roots,
            self.aggregation.clone(),
            "python3".to_string(),
            self.project.clone(),
        )
    }

    pub fn pipeline(&self, runner: Arc<FakeRunner>) -> Pipeline {
        Pipeline::new(self.request(), SetupSettings::default(), runner)
    }

    pub fn write_requirements(&self) {
        std::fs::write(self.project.join("requirements.txt"), "express-ish==1.0\n")
            .expect("write requirements");
    }
}

pub fn make_dirs(root: &Path, names: &[&str]) {
    for name in names {
        std::fs::create_dir_all(root.join(name)).expect("create_dir_all should succeed");
    }
}

/// Poll until the job is terminal, collecting every event.
pub async fn wait_for_terminal(
    manager: &mut JobManager,
    id: JobId,
) -> (Vec<ProgressEvent>, JobSnapshot) {
    let mut events = Vec::new();
    for _ in 0..1000 {
        let snapshot = manager.snapshot(id).expect("job should still be in the slot");
        events.extend(manager.poll(id));
        if snapshot.state.is_terminal() {
            events.extend(manager.poll(id));
            return (events, snapshot);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} did not finish in time");
}

pub fn log_lines(events: &[ProgressEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            ProgressEvent::LogLine { text } => Some(text.clone()),
            ProgressEvent::Progress { .. } => None,
        })
        .collect()
}

pub fn last_progress(events: &[ProgressEvent]) -> Option<(f64, String)> {
    events.iter().rev().find_map(|event| match event {
        ProgressEvent::Progress { percent, status } => Some((*percent, status.clone())),
        ProgressEvent::LogLine { .. } => None,
    })
}
