//! Run reports.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tracing::info;
use uuid::Uuid;

use crate::memory;
use crate::unit::{UnitReport, UnitStatus, WrittenFile};

/// Orchestration call that produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Page,
    Hierarchy,
    Batch,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Hierarchy => "hierarchy",
            Self::Batch => "batch",
        }
    }
}

/// Outcome of one orchestration call.
///
/// Returned for every run that passed parameter validation, including runs
/// where every unit failed.
#[derive(Debug, Clone)]
pub struct ExportReport {
    /// Correlation id of the run.
    pub run_id: Uuid,
    pub operation: Operation,
    /// Per-unit entries in submission order.
    pub units: Vec<UnitReport>,
    /// Units that were dispatched (`succeeded + failed`).
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub files_written: usize,
    pub total_bytes: u64,
    pub elapsed: Duration,
    pub concurrency: usize,
    /// Resident set size before the run, where the platform reports it.
    pub memory_before: Option<u64>,
    pub memory_after: Option<u64>,
}

impl ExportReport {
    /// Failed units.
    pub fn failures(&self) -> impl Iterator<Item = &UnitReport> {
        self.units
            .iter()
            .filter(|u| matches!(u.status, UnitStatus::Failed { .. }))
    }

    /// Report entry for `page_id`.
    pub fn unit(&self, page_id: &str) -> Option<&UnitReport> {
        self.units.iter().find(|u| u.page_id == page_id)
    }

    /// Change in resident memory over the run, in bytes.
    #[allow(clippy::cast_possible_wrap)]
    pub fn memory_delta(&self) -> Option<i64> {
        Some(self.memory_after? as i64 - self.memory_before? as i64)
    }

    /// Whether every unit succeeded.
    pub fn is_complete_success(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

/// Shared counters updated by workers as files land on disk.
#[derive(Debug, Default)]
pub(crate) struct Progress {
    files: AtomicUsize,
    bytes: AtomicU64,
}

impl Progress {
    pub(crate) fn record(&self, file: &WrittenFile) {
        self.files.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(file.bytes, Ordering::Relaxed);
    }

    pub(crate) fn files(&self) -> usize {
        self.files.load(Ordering::Relaxed)
    }

    pub(crate) fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

/// Collects unit reports for one run.
#[derive(Debug)]
pub(crate) struct ReportBuilder {
    run_id: Uuid,
    operation: Operation,
    concurrency: usize,
    started: Instant,
    memory_before: Option<u64>,
    units: Vec<UnitReport>,
}

impl ReportBuilder {
    pub(crate) fn new(operation: Operation, concurrency: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            operation,
            concurrency,
            started: Instant::now(),
            memory_before: memory::resident_bytes(),
            units: Vec::new(),
        }
    }

    pub(crate) fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub(crate) fn extend(&mut self, units: impl IntoIterator<Item = UnitReport>) {
        self.units.extend(units);
    }

    pub(crate) fn finish(self, progress: &Progress) -> ExportReport {
        let count = |f: fn(&UnitStatus) -> bool| self.units.iter().filter(|u| f(&u.status)).count();
        let succeeded = count(|s| matches!(s, UnitStatus::Succeeded));
        let failed = count(|s| matches!(s, UnitStatus::Failed { .. }));
        let skipped = count(|s| matches!(s, UnitStatus::Skipped));

        let report = ExportReport {
            run_id: self.run_id,
            operation: self.operation,
            attempted: succeeded + failed,
            succeeded,
            failed,
            skipped,
            files_written: progress.files(),
            total_bytes: progress.bytes(),
            elapsed: self.started.elapsed(),
            concurrency: self.concurrency,
            memory_before: self.memory_before,
            memory_after: memory::resident_bytes(),
            units: self.units,
        };
        info!(
            run = %report.run_id,
            operation = report.operation.as_str(),
            succeeded,
            failed,
            skipped,
            files = report.files_written,
            bytes = report.total_bytes,
            elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
            "Export finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::ErrorKind;

    fn unit(id: &str, status: UnitStatus) -> UnitReport {
        UnitReport {
            page_id: id.to_owned(),
            title: None,
            depth: 0,
            status,
            attempts: 1,
            files: Vec::new(),
            attachments: Vec::new(),
            missing_attachments: Vec::new(),
            warnings: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    #[test]
    fn test_counts() {
        let progress = Progress::default();
        progress.record(&WrittenFile {
            path: PathBuf::from("a.md"),
            bytes: 10,
        });
        progress.record(&WrittenFile {
            path: PathBuf::from("b.md"),
            bytes: 5,
        });

        let mut builder = ReportBuilder::new(Operation::Batch, 3);
        builder.extend([
            unit("1", UnitStatus::Succeeded),
            unit(
                "2",
                UnitStatus::Failed {
                    kind: ErrorKind::PageNotFound,
                    message: "gone".to_owned(),
                },
            ),
            unit("3", UnitStatus::Skipped),
        ]);
        let report = builder.finish(&progress);

        assert_eq!(report.attempted, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.files_written, 2);
        assert_eq!(report.total_bytes, 15);
        assert_eq!(report.failures().count(), 1);
        assert_eq!(report.unit("2").and_then(UnitReport::error_kind), Some(ErrorKind::PageNotFound));
        assert!(!report.is_complete_success());
    }
}
