//! Runtime resolution and external process execution.
//!
//! This module turns the caller's interpreter invocation string into a
//! concrete command, locates the entry point of an isolated environment, and
//! runs external commands while forwarding their output into a job's stream.
//!
//! ## Design
//!
//! - [`Interpreter`] is a parsed invocation (`python3`, `py -3`, or a path)
//! - [`RunnerSpec`] is the final executable specification with command, args, cwd and env
//! - [`CommandRunner`] is the seam pipeline steps use to run a `RunnerSpec`;
//!   [`SystemRunner`] is the real implementation

mod process;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub use process::SystemRunner;

use crate::protocol::OutputSink;

/// Commands probed on `PATH` when no interpreter is given.
pub const INTERPRETER_CANDIDATES: &[&str] = &["python3", "python", "py"];

/// A parsed interpreter invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpreter {
    pub command: String,
    pub args: Vec<String>,
}

impl Interpreter {
    /// Parse an invocation string.
    ///
    /// An existing file path is taken whole so paths with spaces survive;
    /// otherwise the string is split on whitespace (`py -3`).
    pub fn parse(invocation: &str) -> Option<Self> {
        let trimmed = invocation.trim();
        if trimmed.is_empty() {
            return None;
        }
        if Path::new(trimmed).is_file() {
            return Some(Self {
                command: trimmed.to_string(),
                args: Vec::new(),
            });
        }

        let mut parts = trimmed.split_whitespace().map(str::to_string);
        let command = parts.next()?;
        Some(Self {
            command,
            args: parts.collect(),
        })
    }

    /// Build a spec running this interpreter with extra arguments.
    pub fn spec<I, S>(&self, args: I) -> RunnerSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut all = self.args.clone();
        all.extend(args.into_iter().map(Into::into));
        RunnerSpec::new(self.command.clone(), all)
    }
}

/// Resolve the interpreter invocation for a run.
///
/// An explicit, non-blank invocation wins. Otherwise the first of
/// [`INTERPRETER_CANDIDATES`] found on `PATH` is used.
pub fn resolve_interpreter(explicit: Option<&str>) -> Option<String> {
    if let Some(explicit) = explicit.map(str::trim).filter(|s| !s.is_empty()) {
        return Some(explicit.to_string());
    }

    INTERPRETER_CANDIDATES.iter().find_map(|candidate| {
        which::which(candidate)
            .ok()
            .map(|path| path.to_string_lossy().into_owned())
    })
}

/// Location of the interpreter inside an isolated environment.
pub fn venv_python(venv_dir: &Path) -> PathBuf {
    if cfg!(windows) {
        venv_dir.join("Scripts").join("python.exe")
    } else {
        venv_dir.join("bin").join("python")
    }
}

/// Executable specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerSpec {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: HashMap<String, String>,
}

impl RunnerSpec {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            cwd: None,
            env: HashMap::new(),
        }
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Human-readable command line for logs.
    pub fn display(&self) -> String {
        let mut out = self.command.clone();
        for arg in &self.args {
            out.push(' ');
            if arg.contains(char::is_whitespace) {
                out.push('"');
                out.push_str(arg);
                out.push('"');
            } else {
                out.push_str(arg);
            }
        }
        out
    }
}

/// How an external command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Exit code; `None` when terminated by a signal.
    pub code: Option<i32>,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs external commands for pipeline steps.
///
/// Implementations forward every stdout/stderr line into `output` as it is
/// produced and block until the command exits. `Err` means the command could
/// not be started or waited on; a non-zero exit is an `Ok` outcome.
pub trait CommandRunner: Send + Sync + std::fmt::Debug {
    fn run(&self, spec: &RunnerSpec, output: &OutputSink) -> anyhow::Result<CommandOutcome>;
}

/// Run a command and turn a non-zero exit into an error.
pub fn run_checked(
    runner: &dyn CommandRunner,
    spec: &RunnerSpec,
    output: &OutputSink,
) -> anyhow::Result<()> {
    let outcome = runner.run(spec, output)?;
    if !outcome.success() {
        match outcome.code {
            Some(code) => anyhow::bail!("`{}` exited with code {}", spec.display(), code),
            None => anyhow::bail!("`{}` was terminated by a signal", spec.display()),
        }
    }
    Ok(())
}
