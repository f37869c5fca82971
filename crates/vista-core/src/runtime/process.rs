//! External process execution with line forwarding.

use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::thread;

use anyhow::Context;
use tracing::debug;

use super::{CommandOutcome, CommandRunner, RunnerSpec};
use crate::protocol::OutputSink;

/// Runs commands as child processes of this one.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &RunnerSpec, output: &OutputSink) -> anyhow::Result<CommandOutcome> {
        debug!(command = %spec.display(), cwd = ?spec.cwd, "spawning process");

        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }
        detach_from_terminal(&mut cmd);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to start `{}`", spec.display()))?;

        // stderr is drained on its own thread.
        let stderr = child.stderr.take().map(|stderr| {
            let sink = output.clone();
            thread::spawn(move || forward_lines(stderr, &sink))
        });

        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, output);
        }
        if let Some(handle) = stderr {
            let _ = handle.join();
        }

        let status = child
            .wait()
            .with_context(|| format!("Failed to wait for `{}`", spec.display()))?;

        debug!(command = %spec.command, code = ?status.code(), "process exited");
        Ok(CommandOutcome {
            code: status.code(),
        })
    }
}

/// Own process group: a terminal Ctrl-C reaches only the installer.
#[cfg(unix)]
fn detach_from_terminal(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(windows)]
fn detach_from_terminal(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
}

#[cfg(not(any(unix, windows)))]
fn detach_from_terminal(_cmd: &mut Command) {}

fn forward_lines<R: Read>(reader: R, sink: &OutputSink) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                // Child output is not guaranteed to be UTF-8 (Windows code pages).
                let line = String::from_utf8_lossy(&buf);
                sink.line(line.trim_end_matches(['\r', '\n']));
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn forwards_stdout_and_reports_exit_code() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink = OutputSink::new(tx);
        let spec = RunnerSpec::new(
            "sh",
            vec!["-c".into(), "echo one; echo two; exit 3".into()],
        );

        let outcome = SystemRunner::new().run(&spec, &sink).unwrap();

        assert_eq!(outcome.code, Some(3));
        assert!(!outcome.success());
        assert_eq!(rx.try_recv().ok().as_deref(), Some("one"));
        assert_eq!(rx.try_recv().ok().as_deref(), Some("two"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn child_leads_its_own_process_group() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink = OutputSink::new(tx);
        // Field 5 of /proc/<pid>/stat is the process group id.
        let spec = RunnerSpec::new(
            "sh",
            vec![
                "-c".into(),
                "echo $$; cut -d' ' -f5 /proc/$$/stat".into(),
            ],
        );

        let outcome = SystemRunner::new().run(&spec, &sink).unwrap();

        assert!(outcome.success());
        let pid = rx.try_recv().unwrap();
        let pgid = rx.try_recv().unwrap();
        assert_eq!(pid.trim(), pgid.trim());
        let own = std::fs::read_to_string("/proc/self/stat").unwrap();
        let own_pgid = own.rsplit(") ").next().unwrap().split(' ').nth(2).unwrap();
        assert_ne!(pgid.trim(), own_pgid);
    }

    #[test]
    fn missing_command_is_an_error() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let sink = OutputSink::new(tx);
        let spec = RunnerSpec::new("vista-definitely-not-a-command", vec![]);

        let err = SystemRunner::new().run(&spec, &sink).unwrap_err();
        assert!(err.to_string().contains("Failed to start"));
    }
}
