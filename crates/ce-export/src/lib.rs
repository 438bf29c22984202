//! Export orchestration for Confluence pages.
//!
//! [`Exporter`] fetches pages through a [`PageSource`](ce_source::PageSource),
//! converts them with a [`ContentConverter`](ce_convert::ContentConverter)
//! and writes Markdown files under an output directory:
//!
//! - [`Exporter::export_page`]: one page, optionally with its subtree
//! - [`Exporter::export_hierarchy`]: a page tree mirrored as directories
//! - [`Exporter::batch_export`]: independent pages on a bounded worker pool
//!
//! Each call returns an [`ExportReport`] with one [`UnitReport`] per page in
//! submission order. Failures are classified by [`ErrorKind`] and never abort
//! sibling pages.

mod error;
mod exporter;
mod memory;
mod metadata;
mod report;
mod resolver;
mod retry;
mod unit;
mod writer;

pub use error::{ErrorKind, ExportError};
pub use exporter::Exporter;
pub use metadata::FrontMatter;
pub use report::{ExportReport, Operation};
pub use unit::{ExportUnit, UnitPhase, UnitReport, UnitStatus, WrittenFile};
pub use writer::{OutputWriter, PageLayout, sanitize_name};
