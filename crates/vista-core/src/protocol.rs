//! Progress line protocol.
//!
//! A job has exactly one output stream. Structured progress and free-text log
//! lines share it; progress lines are tagged with a reserved token:
//!
//! ```text
//! PROGRESS|62|Installing dependencies...
//! ```
//!
//! Everything else that is not blank is an opaque log line. Decoding is total:
//! any input either maps to one [`ProgressEvent`] or, when blank, to nothing.

use tokio::sync::mpsc::UnboundedSender;

/// Reserved token that opens a progress line.
pub const PROGRESS_TOKEN: &str = "PROGRESS";

/// Field delimiter of a progress line.
pub const DELIMITER: char = '|';

/// One decoded output line.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    LogLine { text: String },
    Progress { percent: f64, status: String },
}

impl ProgressEvent {
    pub fn log(text: impl Into<String>) -> Self {
        ProgressEvent::LogLine { text: text.into() }
    }

    pub fn progress(percent: f64, status: impl Into<String>) -> Self {
        ProgressEvent::Progress {
            percent,
            status: status.into(),
        }
    }
}

/// Decode one raw output line.
///
/// Returns `None` for blank lines. A malformed percent decodes as `0` instead
/// of failing; the percent is otherwise passed through unclamped.
pub fn decode_line(raw: &str) -> Option<ProgressEvent> {
    let line = raw.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }

    let Some(rest) = line
        .strip_prefix(PROGRESS_TOKEN)
        .and_then(|rest| rest.strip_prefix(DELIMITER))
    else {
        return Some(ProgressEvent::log(line));
    };

    let (percent, status) = match rest.split_once(DELIMITER) {
        Some((percent, status)) => (percent, status),
        None => (rest, ""),
    };

    Some(ProgressEvent::progress(
        parse_percent(percent),
        status.trim(),
    ))
}

/// Encode a progress update as a protocol line.
pub fn encode_progress(percent: f64, status: &str) -> String {
    // Status text may not contain line breaks; everything after the second
    // delimiter is status, so embedded delimiters are fine.
    let status = status.replace(['\r', '\n'], " ");
    format!("{PROGRESS_TOKEN}{DELIMITER}{percent}{DELIMITER}{status}")
}

/// Clamp a percent into `[0, 100]`. NaN becomes `0`.
pub fn clamp_percent(percent: f64) -> f64 {
    if percent.is_nan() {
        return 0.0;
    }
    percent.clamp(0.0, 100.0)
}

fn parse_percent(field: &str) -> f64 {
    match field.trim().parse::<f64>() {
        Ok(value) if !value.is_nan() => value,
        _ => 0.0,
    }
}

/// Producer side of a job's output stream.
///
/// Cheap to clone; every clone appends to the same ordered queue. Sends after
/// the consumer has been released are dropped.
#[derive(Debug, Clone)]
pub struct OutputSink {
    tx: UnboundedSender<String>,
}

impl OutputSink {
    pub fn new(tx: UnboundedSender<String>) -> Self {
        Self { tx }
    }

    /// Append a raw line exactly as produced (e.g. child process output).
    pub fn line(&self, raw: impl Into<String>) {
        let _ = self.tx.send(raw.into());
    }

    /// Append log text; multi-line text becomes one line per event.
    pub fn log(&self, text: impl AsRef<str>) {
        for line in text.as_ref().lines() {
            self.line(line);
        }
    }

    pub fn progress(&self, percent: f64, status: &str) {
        self.line(encode_progress(percent, status));
    }
}
