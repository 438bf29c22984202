//! Chapter splitting for converted Markdown.
//!
//! A document is split on headings of one level (1 to 3). Each heading starts
//! a chapter file `{NN}-{slug}.md`; content before the first split heading
//! becomes the preamble of `index.md`, which also lists the chapters.
//! In-document links are rewritten so they keep working across files.
//!
//! Headings inside code fences, block quotes and lists never split.
//!
//! # Example
//!
//! ```
//! use ce_chapters::{ChapterSplitter, SplitResult};
//!
//! let splitter = ChapterSplitter::new(2).unwrap();
//! let markdown = "# Guide\n\n## Install\n\nRun it.\n\n## Usage\n\nUse it.\n";
//! let SplitResult::Split(set) = splitter.split(markdown) else {
//!     panic!("expected chapters");
//! };
//! assert_eq!(set.chapters.len(), 2);
//! assert_eq!(set.chapters[0].file_name, "01-install.md");
//! ```

mod links;
mod splitter;

pub use splitter::{Chapter, ChapterSet, ChapterSplitter, INDEX_FILE, SplitResult};

/// Lowest heading level accepted for splitting.
pub const MIN_LEVEL: u8 = 1;
/// Highest heading level accepted for splitting.
pub const MAX_LEVEL: u8 = 3;

/// Chapter splitting error.
#[derive(Debug, thiserror::Error)]
pub enum ChapterError {
    /// Split level outside 1-3.
    #[error("chapter level {0} is out of range {MIN_LEVEL}-{MAX_LEVEL}")]
    InvalidLevel(u8),
}
