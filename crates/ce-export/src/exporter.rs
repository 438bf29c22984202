//! Export orchestration.
//!
//! Every run goes through the same three steps per batch of units:
//!
//! 1. fetch pages (and child lists) on the worker pool, with retries
//! 2. claim output names sequentially in submission order
//! 3. convert and write on the worker pool
//!
//! Hierarchy runs repeat this once per tree level.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ce_chapters::{ChapterSplitter, INDEX_FILE, SplitResult};
use ce_config::ExportConfig;
use ce_convert::{ContentConverter, Conversion, PageInfo};
use ce_source::{Page, PageRef, PageSource};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::error::ExportError;
use crate::metadata::FrontMatter;
use crate::report::{ExportReport, Operation, Progress, ReportBuilder};
use crate::resolver::SourceResolver;
use crate::retry::{Deadline, RetryPolicy};
use crate::unit::{ExportUnit, UnitPhase, UnitReport, UnitTrace, WrittenFile};
use crate::writer::{OutputWriter, PageLayout};

/// Worker stack size. Included pages are rendered inside the including
/// page's walk, so nesting can reach several parser limits deep.
const WORKER_STACK_BYTES: usize = 16 * 1024 * 1024;

/// Exports pages from a [`PageSource`] as Markdown files.
///
/// Orchestration calls return `Err` only for rejected parameters, before any
/// I/O. Everything after that is reported per unit in the [`ExportReport`].
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
///
/// use ce_config::ExportConfig;
/// use ce_convert::ContentConverter;
/// use ce_export::Exporter;
///
/// let exporter = Exporter::new(source, Arc::new(ContentConverter::with_defaults()));
/// let report = exporter.export_hierarchy("12345", &ExportConfig::default())?;
/// println!("{} pages written", report.succeeded);
/// ```
pub struct Exporter {
    source: Arc<dyn PageSource>,
    converter: Arc<ContentConverter>,
}

impl Exporter {
    pub fn new(source: Arc<dyn PageSource>, converter: Arc<ContentConverter>) -> Self {
        Self { source, converter }
    }

    pub fn source(&self) -> &dyn PageSource {
        self.source.as_ref()
    }

    pub fn converter(&self) -> &ContentConverter {
        &self.converter
    }

    /// Convert a fetched page, resolving includes through the page source.
    ///
    /// Attachment links are prefixed with `attachment_prefix`; when it is
    /// empty they point at the wiki's download URLs.
    ///
    /// # Errors
    ///
    /// Fails only when the page body cannot be parsed.
    pub fn convert_page(
        &self,
        page: &Page,
        attachment_prefix: &str,
    ) -> Result<Conversion, ExportError> {
        let resolver = SourceResolver::new(self.source.as_ref(), page.space.as_deref());
        self.convert_with(page, attachment_prefix, &resolver)
    }

    fn convert_with(
        &self,
        page: &Page,
        attachment_prefix: &str,
        resolver: &SourceResolver<'_>,
    ) -> Result<Conversion, ExportError> {
        let mut info = PageInfo::new(&page.id).with_attachment_prefix(attachment_prefix);
        if let Some(space) = &page.space {
            info = info.with_space(space);
        }
        if let Some(base_url) = self.source.base_url() {
            info = info.with_base_url(base_url);
        }
        Ok(self
            .converter
            .convert_with(&page.body, &info, Some(resolver))?)
    }

    /// Export one page, or its whole subtree with `include_children`.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::InvalidParameters`] for invalid options or an
    /// empty page reference.
    pub fn export_page(
        &self,
        page: &PageRef,
        options: &ExportConfig,
    ) -> Result<ExportReport, ExportError> {
        let blank = match page {
            PageRef::Id(id) => id.trim().is_empty(),
            PageRef::Title { space, title } => space.trim().is_empty() || title.trim().is_empty(),
        };
        if blank {
            return Err(ExportError::InvalidParameters(
                "page reference cannot be empty".to_owned(),
            ));
        }
        let operation = if options.include_children {
            Operation::Hierarchy
        } else {
            Operation::Page
        };
        let mut run = Run::new(options, operation)?;
        info!(run = %run.report.run_id(), page = %page, "Exporting page");

        let (resolved, attempts) = run
            .retry
            .run(run.deadline, &page.to_string(), || self.source.resolve(page));
        let id = match resolved {
            Ok(id) => id,
            Err(err) => {
                let mut trace = UnitTrace::new(&page.to_string(), 0);
                trace.enter(UnitPhase::Fetching);
                run.report.extend([trace.fail(None, attempts, &err.into())]);
                return Ok(run.finish());
            }
        };

        if options.include_children {
            Ok(self.traverse(run, id))
        } else {
            let jobs = vec![Job::new(id, 0, run.writer.root())];
            let level = self.run_jobs(&run, jobs, false);
            run.report.extend(level.reports);
            Ok(run.finish())
        }
    }

    /// Export a page tree, mirroring it as directories.
    ///
    /// A page `P` is written to `P.md` and its children under `P/`. Pages
    /// deeper than `max_depth` (the root is depth 0) are not fetched.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::InvalidParameters`] for invalid options or an
    /// empty root id.
    pub fn export_hierarchy(
        &self,
        root_id: &str,
        options: &ExportConfig,
    ) -> Result<ExportReport, ExportError> {
        if root_id.trim().is_empty() {
            return Err(ExportError::InvalidParameters(
                "root page id cannot be empty".to_owned(),
            ));
        }
        let run = Run::new(options, Operation::Hierarchy)?;
        info!(run = %run.report.run_id(), root_id, max_depth = options.max_depth, "Exporting hierarchy");
        Ok(self.traverse(run, root_id.trim().to_owned()))
    }

    /// Export independent pages side by side into the output directory.
    ///
    /// A failing page never aborts the batch.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::InvalidParameters`] for invalid options or an
    /// empty page id.
    pub fn batch_export(
        &self,
        page_ids: &[String],
        options: &ExportConfig,
    ) -> Result<ExportReport, ExportError> {
        if let Some(pos) = page_ids.iter().position(|id| id.trim().is_empty()) {
            return Err(ExportError::InvalidParameters(format!(
                "page id at position {pos} is empty"
            )));
        }
        let mut run = Run::new(options, Operation::Batch)?;
        info!(
            run = %run.report.run_id(),
            pages = page_ids.len(),
            concurrency = options.concurrency,
            "Exporting batch"
        );
        let jobs = page_ids
            .iter()
            .map(|id| Job::new(id.trim().to_owned(), 0, run.writer.root()))
            .collect();
        let level = self.run_jobs(&run, jobs, false);
        run.report.extend(level.reports);
        Ok(run.finish())
    }

    /// Breadth-first walk from `root_id`, one level per dispatch.
    fn traverse(&self, mut run: Run<'_>, root_id: String) -> ExportReport {
        let mut visited = HashSet::from([root_id.clone()]);
        let mut jobs = vec![Job::new(root_id, 0, run.writer.root())];
        while !jobs.is_empty() {
            let level = self.run_jobs(&run, jobs, true);
            run.report.extend(level.reports);
            jobs = Vec::new();
            for children in level.children {
                for id in children.ids {
                    if visited.insert(id.clone()) {
                        jobs.push(Job::new(id, children.depth, &children.dir));
                    } else {
                        warn!(page_id = %id, "Page already visited, skipping");
                    }
                }
            }
        }
        run.finish()
    }

    /// Fetch, name, convert and write one set of units.
    fn run_jobs(&self, run: &Run<'_>, jobs: Vec<Job>, list_children: bool) -> Level {
        let fetched: Vec<Fetch> = run.pool.install(|| {
            jobs.into_par_iter()
                .map(|job| self.fetch(run, job, list_children))
                .collect()
        });

        let split = run.splitter.is_some();
        let staged: Vec<Staged> = fetched
            .into_iter()
            .map(|fetch| match fetch {
                Fetch::Done(report) => Staged::Done(report),
                Fetch::Ready(unit) => {
                    let layout = run.writer.claim_page(&unit.job.dir, &unit.page.title, split);
                    Staged::Ready(unit, layout)
                }
            })
            .collect();

        let written: Vec<(UnitReport, Option<Children>)> = run.pool.install(|| {
            staged
                .into_par_iter()
                .map(|staged| match staged {
                    Staged::Done(report) => (report, None),
                    Staged::Ready(unit, layout) => self.write_unit(run, unit, &layout),
                })
                .collect()
        });

        let mut level = Level::default();
        for (report, children) in written {
            level.reports.push(report);
            level.children.extend(children);
        }
        level
    }

    fn fetch(&self, run: &Run<'_>, job: Job, list_children: bool) -> Fetch {
        if run.deadline.expired() {
            return Fetch::Done(UnitReport::skipped(&job.page_id, job.depth));
        }
        let mut trace = UnitTrace::new(&job.page_id, job.depth);
        trace.enter(UnitPhase::Fetching);

        let (page, attempts) = run
            .retry
            .run(run.deadline, &job.page_id, || self.source.fetch_page(&job.page_id));
        let page = match page {
            Ok(page) => page,
            Err(err) => return Fetch::Done(trace.fail(None, attempts, &err.into())),
        };

        let mut children = Vec::new();
        if list_children && job.depth < run.options.max_depth {
            let (listed, _) = run.retry.run(run.deadline, &job.page_id, || {
                self.source.fetch_children(&job.page_id)
            });
            match listed {
                Ok(ids) => children = ids,
                Err(err) => {
                    return Fetch::Done(trace.fail(Some(page.title), attempts, &err.into()));
                }
            }
        }

        Fetch::Ready(Fetched {
            job,
            trace,
            attempts,
            page,
            children,
        })
    }

    fn write_unit(
        &self,
        run: &Run<'_>,
        unit: Fetched,
        layout: &PageLayout,
    ) -> (UnitReport, Option<Children>) {
        let Fetched {
            job,
            mut trace,
            attempts,
            page,
            children,
        } = unit;

        trace.enter(UnitPhase::Converting);
        let prefix = if run.options.preserve_attachments {
            layout.asset_prefix()
        } else {
            String::new()
        };
        let resolver = SourceResolver::new(self.source.as_ref(), page.space.as_deref())
            .with_retry(run.retry, run.deadline);
        let conversion = match self.convert_with(&page, &prefix, &resolver) {
            Ok(conversion) => conversion,
            Err(err) => return (trace.fail(Some(page.title), attempts, &err), None),
        };

        trace.enter(UnitPhase::Writing);
        let (files, missing) = match self.write_page(run, &page, layout, &conversion) {
            Ok(written) => written,
            Err(err) => return (trace.fail(Some(page.title), attempts, &err), None),
        };
        trace.enter(UnitPhase::Succeeded);

        info!(
            page_id = %page.id,
            title = %page.title,
            depth = job.depth,
            files = files.len(),
            warnings = conversion.warnings.len(),
            "Exported page"
        );
        let children = (!children.is_empty()).then(|| Children {
            dir: layout.children_dir().to_owned(),
            depth: job.depth + 1,
            ids: children,
        });
        let unit = ExportUnit {
            page_id: page.id,
            title: page.title,
            markdown: conversion.markdown,
            files,
            attachments: conversion.attachments,
            missing_attachments: missing,
            warnings: conversion.warnings,
            elapsed: trace.elapsed(),
        };
        (UnitReport::succeeded(unit, job.depth, attempts), children)
    }

    /// Write the Markdown (or chapter set) and attachments of one page.
    fn write_page(
        &self,
        run: &Run<'_>,
        page: &Page,
        layout: &PageLayout,
        conversion: &Conversion,
    ) -> Result<(Vec<WrittenFile>, Vec<String>), ExportError> {
        let front = run
            .options
            .include_metadata
            .then(|| FrontMatter::new(page, self.source.base_url()));
        let with_front = |markdown: &str| -> Result<String, ExportError> {
            match &front {
                Some(front) => Ok(front.apply(markdown)?),
                None => Ok(markdown.to_owned()),
            }
        };

        let mut files = Vec::new();
        let chapters = run
            .splitter
            .map(|splitter| splitter.split(&conversion.markdown));
        if let Some(SplitResult::Split(set)) = chapters {
            for (name, content) in set.files() {
                let content = if name == INDEX_FILE {
                    with_front(content)?
                } else {
                    content.to_owned()
                };
                files.push(run.write(&layout.content_dir().join(name), content.as_bytes())?);
            }
        } else {
            let markdown = with_front(&conversion.markdown)?;
            files.push(run.write(&layout.markdown_path(), markdown.as_bytes())?);
        }

        let mut missing = Vec::new();
        if run.options.preserve_attachments {
            let dir = layout.assets_dir();
            for name in &conversion.attachments {
                if !is_plain_file_name(name) {
                    warn!(page_id = %page.id, attachment = %name, "Attachment name is not a plain file name");
                    missing.push(name.clone());
                    continue;
                }
                let (data, _) = run.retry.run(run.deadline, &page.id, || {
                    self.source.fetch_attachment(&page.id, name)
                });
                match data {
                    Ok(data) => files.push(run.write(&dir.join(name), &data)?),
                    Err(err) => {
                        warn!(page_id = %page.id, attachment = %name, error = %err, "Attachment unavailable");
                        missing.push(name.clone());
                    }
                }
            }
        }
        Ok((files, missing))
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.chars().any(char::is_control)
}

/// Shared state of one orchestration call.
struct Run<'o> {
    options: &'o ExportConfig,
    writer: OutputWriter,
    progress: Progress,
    retry: RetryPolicy,
    deadline: Deadline,
    splitter: Option<ChapterSplitter>,
    pool: rayon::ThreadPool,
    report: ReportBuilder,
}

impl<'o> Run<'o> {
    /// Validate options and set up the run. Performs no I/O.
    fn new(options: &'o ExportConfig, operation: Operation) -> Result<Self, ExportError> {
        options.validate()?;
        let splitter = if options.split_chapters {
            Some(
                ChapterSplitter::new(options.chapter_level)
                    .map_err(|e| ExportError::InvalidParameters(e.to_string()))?,
            )
        } else {
            None
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.concurrency)
            .thread_name(|i| format!("ce-export-{i}"))
            .stack_size(WORKER_STACK_BYTES)
            .build()
            .map_err(|e| {
                ExportError::InvalidParameters(format!("cannot start worker pool: {e}"))
            })?;
        Ok(Self {
            options,
            writer: OutputWriter::new(&options.output_dir, options.overwrite),
            progress: Progress::default(),
            retry: RetryPolicy::from_config(options),
            deadline: Deadline::after(options.timeout_secs.map(Duration::from_secs)),
            splitter,
            pool,
            report: ReportBuilder::new(operation, options.concurrency),
        })
    }

    fn write(&self, path: &Path, data: &[u8]) -> Result<WrittenFile, ExportError> {
        let file = self.writer.write(path, data)?;
        self.progress.record(&file);
        Ok(file)
    }

    fn finish(self) -> ExportReport {
        self.report.finish(&self.progress)
    }
}

/// A page queued for export.
struct Job {
    page_id: String,
    depth: usize,
    /// Directory the page's files go into.
    dir: PathBuf,
}

impl Job {
    fn new(page_id: String, depth: usize, dir: &Path) -> Self {
        Self {
            page_id,
            depth,
            dir: dir.to_owned(),
        }
    }
}

struct Fetched {
    job: Job,
    trace: UnitTrace,
    attempts: u32,
    page: Page,
    children: Vec<String>,
}

enum Fetch {
    Done(UnitReport),
    Ready(Fetched),
}

enum Staged {
    Done(UnitReport),
    Ready(Fetched, PageLayout),
}

/// Children of an exported page, queued for the next level.
struct Children {
    dir: PathBuf,
    depth: usize,
    ids: Vec<String>,
}

#[derive(Default)]
struct Level {
    reports: Vec<UnitReport>,
    children: Vec<Children>,
}

#[cfg(test)]
mod tests {
    use ce_source::MockSource;
    use pretty_assertions::assert_eq;

    use super::*;

    fn exporter(source: MockSource) -> Exporter {
        Exporter::new(
            Arc::new(source),
            Arc::new(ContentConverter::with_defaults()),
        )
    }

    #[test]
    fn test_plain_file_names() {
        assert!(is_plain_file_name("diagram v2.png"));
        assert!(!is_plain_file_name("../etc/passwd"));
        assert!(!is_plain_file_name(".."));
        assert!(!is_plain_file_name("a\\b"));
        assert!(!is_plain_file_name(""));
    }

    #[test]
    fn test_convert_page_resolves_includes() {
        let exporter = exporter(
            MockSource::new()
                .with_space("DOC")
                .with_page("2", "Shared", "<p>shared text</p>"),
        );
        let page = Page {
            id: "1".to_owned(),
            title: "Main".to_owned(),
            body: r#"<ac:structured-macro ac:name="include"><ac:parameter ac:name=""><ac:link><ri:page ri:content-title="Shared"/></ac:link></ac:parameter></ac:structured-macro>"#.to_owned(),
            space: Some("DOC".to_owned()),
            ..Page::default()
        };
        let conversion = exporter.convert_page(&page, "").unwrap();
        assert_eq!(conversion.markdown, "shared text\n");
        assert!(conversion.warnings.is_empty());
    }

    #[test]
    fn test_blank_references_rejected() {
        let exporter = exporter(MockSource::new());
        let options = ExportConfig::default();
        let err = exporter
            .export_page(&PageRef::Id("  ".to_owned()), &options)
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidParameters);
        assert!(exporter.export_hierarchy("", &options).is_err());
        assert!(
            exporter
                .batch_export(&["1".to_owned(), String::new()], &options)
                .is_err()
        );
    }
}
