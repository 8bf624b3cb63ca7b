//! Ingestion progress reporting.
//!
//! Progress is emitted on **stderr** so stdout stays parseable for scripts.
//! The ingestor reports a [`IngestProgressEvent::Phase`] on every state
//! transition, an `Embedding` event after every concurrency window, and an
//! `Uploaded` event after every super-batch upsert.

use std::io::Write;

use crate::ingest::IngestPhase;

#[derive(Clone, Debug, PartialEq)]
pub enum IngestProgressEvent {
    /// The ingestor entered a new phase.
    Phase(IngestPhase),
    /// `n` of `total` chunks embedded.
    Embedding { n: u64, total: u64 },
    /// `n` of `total` points durably stored.
    Uploaded { n: u64, total: u64 },
}

pub trait IngestProgressReporter: Send + Sync {
    fn report(&self, event: IngestProgressEvent);
}

const BAR_WIDTH: usize = 30;

/// Human-friendly progress on stderr:
/// `ingest  embedding  [#########.....]  1,234 / 5,000 chunks`.
pub struct StderrProgress;

impl IngestProgressReporter for StderrProgress {
    fn report(&self, event: IngestProgressEvent) {
        let line = match &event {
            IngestProgressEvent::Phase(phase) => format!("ingest  {}\n", phase),
            IngestProgressEvent::Embedding { n, total } => format!(
                "ingest  embedding  {}  {} / {} chunks\n",
                progress_bar(*n, *total),
                format_number(*n),
                format_number(*total)
            ),
            IngestProgressEvent::Uploaded { n, total } => format!(
                "ingest  uploaded   {}  {} / {} points\n",
                progress_bar(*n, *total),
                format_number(*n),
                format_number(*total)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// One JSON object per line on stderr.
pub struct JsonProgress;

impl IngestProgressReporter for JsonProgress {
    fn report(&self, event: IngestProgressEvent) {
        let obj = match &event {
            IngestProgressEvent::Phase(phase) => serde_json::json!({
                "event": "phase",
                "phase": phase.to_string(),
            }),
            IngestProgressEvent::Embedding { n, total } => serde_json::json!({
                "event": "progress",
                "stage": "embedding",
                "n": n,
                "total": total,
            }),
            IngestProgressEvent::Uploaded { n, total } => serde_json::json!({
                "event": "progress",
                "stage": "uploaded",
                "n": n,
                "total": total,
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

pub struct NoProgress;

impl IngestProgressReporter for NoProgress {
    fn report(&self, _event: IngestProgressEvent) {}
}

fn progress_bar(n: u64, total: u64) -> String {
    let filled = if total == 0 {
        BAR_WIDTH
    } else {
        ((n.min(total) as f64 / total as f64) * BAR_WIDTH as f64).round() as usize
    };
    format!("[{}{}]", "#".repeat(filled), ".".repeat(BAR_WIDTH - filled))
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut out = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn IngestProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(12_345), "12,345");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn test_progress_bar_bounds() {
        assert_eq!(progress_bar(0, 10), format!("[{}]", ".".repeat(BAR_WIDTH)));
        assert_eq!(progress_bar(10, 10), format!("[{}]", "#".repeat(BAR_WIDTH)));
        assert_eq!(progress_bar(50, 10), format!("[{}]", "#".repeat(BAR_WIDTH)));
        assert_eq!(progress_bar(0, 0), format!("[{}]", "#".repeat(BAR_WIDTH)));
        assert_eq!(progress_bar(5, 10).matches('#').count(), BAR_WIDTH / 2);
    }
}
