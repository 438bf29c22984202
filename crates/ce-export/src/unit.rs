//! Per-page unit lifecycle.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use ce_convert::ConversionWarning;
use tracing::{debug, error};

use crate::error::{ErrorKind, ExportError};

/// Phase of one page in a run.
///
/// `Pending → Fetching → Converting → Writing → Succeeded`, with `Failed`
/// reachable from every working phase and `Skipped` only from `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitPhase {
    Pending,
    Fetching,
    Converting,
    Writing,
    Succeeded,
    Failed,
    /// Not dispatched before the run deadline.
    Skipped,
}

impl UnitPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }

    /// Whether `next` may follow this phase.
    pub fn allows(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Fetching | Self::Skipped)
                | (Self::Fetching, Self::Converting | Self::Failed)
                | (Self::Converting, Self::Writing | Self::Failed)
                | (Self::Writing, Self::Succeeded | Self::Failed)
        )
    }
}

/// A file produced by a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    pub path: PathBuf,
    pub bytes: u64,
}

/// Result of converting and writing one page.
#[derive(Debug, Clone)]
pub struct ExportUnit {
    pub page_id: String,
    pub title: String,
    pub markdown: String,
    pub files: Vec<WrittenFile>,
    /// Attachment file names referenced by the page.
    pub attachments: Vec<String>,
    /// Referenced attachments that could not be downloaded.
    pub missing_attachments: Vec<String>,
    pub warnings: Vec<ConversionWarning>,
    pub elapsed: Duration,
}

/// Final status of a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitStatus {
    Succeeded,
    Failed { kind: ErrorKind, message: String },
    Skipped,
}

/// Report entry for one page.
#[derive(Debug, Clone)]
pub struct UnitReport {
    pub page_id: String,
    pub title: Option<String>,
    /// Distance from the run's root page; 0 outside hierarchy runs.
    pub depth: usize,
    pub status: UnitStatus,
    /// Fetch attempts made, retries included.
    pub attempts: u32,
    pub files: Vec<WrittenFile>,
    pub attachments: Vec<String>,
    pub missing_attachments: Vec<String>,
    pub warnings: Vec<ConversionWarning>,
    pub elapsed: Duration,
}

impl UnitReport {
    fn empty(page_id: &str, depth: usize, status: UnitStatus) -> Self {
        Self {
            page_id: page_id.to_owned(),
            title: None,
            depth,
            status,
            attempts: 0,
            files: Vec::new(),
            attachments: Vec::new(),
            missing_attachments: Vec::new(),
            warnings: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    pub(crate) fn skipped(page_id: &str, depth: usize) -> Self {
        debug!(page_id, "Unit not dispatched before deadline");
        Self::empty(page_id, depth, UnitStatus::Skipped)
    }

    pub(crate) fn succeeded(unit: ExportUnit, depth: usize, attempts: u32) -> Self {
        Self {
            page_id: unit.page_id,
            title: Some(unit.title),
            depth,
            status: UnitStatus::Succeeded,
            attempts,
            files: unit.files,
            attachments: unit.attachments,
            missing_attachments: unit.missing_attachments,
            warnings: unit.warnings,
            elapsed: unit.elapsed,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == UnitStatus::Succeeded
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match &self.status {
            UnitStatus::Failed { kind, .. } => Some(*kind),
            UnitStatus::Succeeded | UnitStatus::Skipped => None,
        }
    }

    /// Bytes written for this unit.
    pub fn bytes(&self) -> u64 {
        self.files.iter().map(|f| f.bytes).sum()
    }

    /// Contained macro failures that the report taxonomy classifies.
    pub fn recursion_warnings(&self) -> impl Iterator<Item = (ErrorKind, &ConversionWarning)> {
        self.warnings
            .iter()
            .filter_map(|w| ErrorKind::from_macro(w.kind).map(|kind| (kind, w)))
    }
}

/// Tracks one unit through its phases.
#[derive(Debug)]
pub(crate) struct UnitTrace {
    page_id: String,
    depth: usize,
    phase: UnitPhase,
    started: Instant,
}

impl UnitTrace {
    pub(crate) fn new(page_id: &str, depth: usize) -> Self {
        Self {
            page_id: page_id.to_owned(),
            depth,
            phase: UnitPhase::Pending,
            started: Instant::now(),
        }
    }

    pub(crate) fn enter(&mut self, next: UnitPhase) {
        debug_assert!(
            self.phase.allows(next),
            "invalid unit transition {:?} -> {next:?}",
            self.phase
        );
        debug!(page_id = %self.page_id, from = ?self.phase, to = ?next, "Unit phase");
        self.phase = next;
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Move to `Failed` and build the report entry.
    pub(crate) fn fail(
        mut self,
        title: Option<String>,
        attempts: u32,
        err: &ExportError,
    ) -> UnitReport {
        let kind = err.kind();
        error!(
            page_id = %self.page_id,
            phase = ?self.phase,
            kind = %kind,
            error = %err,
            "Unit failed"
        );
        self.enter(UnitPhase::Failed);
        let mut report = UnitReport::empty(
            &self.page_id,
            self.depth,
            UnitStatus::Failed {
                kind,
                message: err.to_string(),
            },
        );
        report.title = title;
        report.attempts = attempts;
        report.elapsed = self.elapsed();
        report
    }
}

#[cfg(test)]
mod tests {
    use ce_source::SourceError;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_allowed_transitions() {
        assert!(UnitPhase::Pending.allows(UnitPhase::Fetching));
        assert!(UnitPhase::Pending.allows(UnitPhase::Skipped));
        assert!(UnitPhase::Fetching.allows(UnitPhase::Failed));
        assert!(UnitPhase::Writing.allows(UnitPhase::Succeeded));
        assert!(!UnitPhase::Fetching.allows(UnitPhase::Skipped));
        assert!(!UnitPhase::Pending.allows(UnitPhase::Writing));
        assert!(!UnitPhase::Succeeded.allows(UnitPhase::Failed));
    }

    #[test]
    fn test_terminal_phases() {
        assert!(UnitPhase::Skipped.is_terminal());
        assert!(!UnitPhase::Converting.is_terminal());
    }

    #[test]
    fn test_fail_builds_report() {
        let mut trace = UnitTrace::new("42", 1);
        trace.enter(UnitPhase::Fetching);
        let err = ExportError::from(SourceError::not_found("42"));
        let report = trace.fail(None, 1, &err);
        assert_eq!(report.page_id, "42");
        assert_eq!(report.depth, 1);
        assert_eq!(report.error_kind(), Some(ErrorKind::PageNotFound));
        assert!(!report.is_success());
    }
}
