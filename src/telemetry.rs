use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

use crate::progress::{FileStage, StatusLine};

#[derive(Debug, Clone, Serialize)]
pub struct Note {
    pub name: String,
    pub payload: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub file: String,
    pub stage: FileStage,
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub found: usize,
    pub skipped: usize,
    pub captioned: usize,
    pub failed: usize,
    pub failures: Vec<FileOutcome>,
    pub transient_retries: usize,
    pub rate_limit_waits: usize,
    pub started: Option<String>,
    pub elapsed_sec: f64,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} found, {} skipped, {} captioned, {} failed ({} retries, {} rate-limit waits, {:.1}s)",
            self.found,
            self.skipped,
            self.captioned,
            self.failed,
            self.transient_retries,
            self.rate_limit_waits,
            self.elapsed_sec
        )
    }
}

#[derive(Default)]
struct RunState {
    notes: Vec<Note>,
    outcomes: Vec<FileOutcome>,
    found: usize,
    skipped: usize,
    started: Option<OffsetDateTime>,
}

/// Shared record of one run: retry notes, per-file outcomes and the
/// terminal status line.
#[derive(Clone)]
pub struct RunMonitor {
    inner: Arc<Mutex<RunState>>,
    status: StatusLine,
}

impl RunMonitor {
    pub fn new(status: StatusLine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RunState {
                started: Some(OffsetDateTime::now_utc()),
                ..RunState::default()
            })),
            status,
        }
    }

    pub fn quiet() -> Self {
        Self::new(StatusLine::hidden())
    }

    pub fn status(&self) -> &StatusLine {
        &self.status
    }

    fn state(&self) -> MutexGuard<'_, RunState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn note_event(&self, name: &str, payload: serde_json::Value) {
        self.state().notes.push(Note {
            name: name.to_string(),
            payload,
            timestamp: OffsetDateTime::now_utc(),
        });
    }

    pub fn record_found(&self, count: usize) {
        self.state().found = count;
    }

    pub fn record_skip(&self) {
        self.state().skipped += 1;
    }

    pub fn record_outcome(&self, file: &str, stage: FileStage, error: Option<String>) {
        self.state().outcomes.push(FileOutcome {
            file: file.to_string(),
            stage,
            error,
        });
    }

    pub fn summarize(&self) -> RunSummary {
        let state = self.state();
        let count_notes = |name: &str| state.notes.iter().filter(|n| n.name == name).count();
        let failures: Vec<FileOutcome> = state
            .outcomes
            .iter()
            .filter(|o| o.stage == FileStage::Failed)
            .cloned()
            .collect();
        let elapsed = state
            .started
            .map(|start| (OffsetDateTime::now_utc() - start).max(Duration::ZERO))
            .unwrap_or(Duration::ZERO);
        RunSummary {
            found: state.found,
            skipped: state.skipped,
            captioned: state
                .outcomes
                .iter()
                .filter(|o| o.stage == FileStage::Recorded)
                .count(),
            failed: failures.len(),
            failures,
            transient_retries: count_notes("retry.transient"),
            rate_limit_waits: count_notes("retry.rate_limited"),
            started: state.started.and_then(|t| t.format(&Rfc3339).ok()),
            elapsed_sec: elapsed.as_seconds_f64(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn summary_counts_outcomes_and_retries() {
        let monitor = RunMonitor::quiet();
        monitor.record_found(4);
        monitor.record_skip();
        monitor.record_outcome("a.mp4", FileStage::Recorded, None);
        monitor.record_outcome("b.mp4", FileStage::Failed, Some("boom".into()));
        monitor.record_outcome("c.mp4", FileStage::Recorded, None);
        monitor.note_event("retry.transient", json!({"attempt": 1}));
        monitor.note_event("retry.rate_limited", json!({"wait": 1}));
        monitor.note_event("retry.rate_limited", json!({"wait": 2}));

        let summary = monitor.summarize();
        assert_eq!(summary.found, 4);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.captioned, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].file, "b.mp4");
        assert_eq!(summary.transient_retries, 1);
        assert_eq!(summary.rate_limit_waits, 2);
        assert!(summary.started.is_some());
    }
}
