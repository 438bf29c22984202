//! Heading-based document splitting.

use std::collections::HashMap;

use ce_convert::slugify;
use tracing::debug;

use crate::links::{outline, rewrite_anchor_links};
use crate::{ChapterError, MAX_LEVEL, MIN_LEVEL};

/// File name of the generated index.
pub const INDEX_FILE: &str = "index.md";

/// One output section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    /// 1-based position in the source document.
    pub number: usize,
    /// Plain text of the splitting heading.
    pub title: String,
    /// `{NN}-{slug}.md`.
    pub file_name: String,
    /// Markdown of the chapter, starting with its heading.
    pub content: String,
}

impl Chapter {
    /// Size of the chapter in bytes.
    pub fn size(&self) -> usize {
        self.content.len()
    }
}

/// Chapters plus the index that links them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterSet {
    /// Contents of [`INDEX_FILE`]: the preamble followed by the chapter list.
    pub index: String,
    pub chapters: Vec<Chapter>,
}

impl ChapterSet {
    /// File name and content of every output document, index first.
    pub fn files(&self) -> impl Iterator<Item = (&str, &str)> {
        std::iter::once((INDEX_FILE, self.index.as_str())).chain(
            self.chapters
                .iter()
                .map(|c| (c.file_name.as_str(), c.content.as_str())),
        )
    }
}

/// Outcome of [`ChapterSplitter::split`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitResult {
    /// No heading of the split level; the document is returned as is.
    Unsplit(String),
    Split(ChapterSet),
}

/// Splits Markdown into chapters on headings of one level.
#[derive(Debug, Clone, Copy)]
pub struct ChapterSplitter {
    level: u8,
}

impl ChapterSplitter {
    /// Create a splitter for heading `level`.
    pub fn new(level: u8) -> Result<Self, ChapterError> {
        if !(MIN_LEVEL..=MAX_LEVEL).contains(&level) {
            return Err(ChapterError::InvalidLevel(level));
        }
        Ok(Self { level })
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    /// Split `markdown` into chapters.
    pub fn split(&self, markdown: &str) -> SplitResult {
        let outline = outline(markdown);
        let starts: Vec<_> = outline
            .headings
            .iter()
            .filter(|h| h.level == self.level && h.top_level)
            .collect();
        if starts.is_empty() {
            debug!(level = self.level, "No chapter headings, document left whole");
            return SplitResult::Unsplit(markdown.to_owned());
        }

        let offsets: Vec<usize> = starts.iter().map(|h| h.start).collect();
        let files: Vec<String> = starts
            .iter()
            .enumerate()
            .map(|(i, h)| chapter_file_name(i + 1, &h.title))
            .collect();

        // Document 0 is the index, document k is chapter k.
        let mut anchor_docs: HashMap<&str, usize> = HashMap::new();
        for (anchor, offset) in &outline.anchors {
            let doc = offsets.partition_point(|&start| start <= *offset);
            anchor_docs.entry(anchor.as_str()).or_insert(doc);
        }
        let file_of = |doc: usize| {
            if doc == 0 {
                INDEX_FILE.to_owned()
            } else {
                files[doc - 1].clone()
            }
        };

        let mut bounds = Vec::with_capacity(offsets.len() + 2);
        bounds.push(0);
        bounds.extend(&offsets);
        bounds.push(markdown.len());
        let documents: Vec<String> = bounds
            .windows(2)
            .enumerate()
            .map(|(doc, range)| {
                let text = &markdown[range[0]..range[1]];
                rewrite_anchor_links(text, |anchor| match anchor_docs.get(anchor) {
                    Some(&target) if target != doc => Some(file_of(target)),
                    _ => None,
                })
            })
            .collect();

        let chapters: Vec<Chapter> = starts
            .iter()
            .zip(files)
            .enumerate()
            .map(|(i, (heading, file_name))| Chapter {
                number: i + 1,
                title: heading.title.clone(),
                file_name,
                content: finish(&documents[i + 1]),
            })
            .collect();
        let index = build_index(&documents[0], &chapters);
        debug!(
            level = self.level,
            chapters = chapters.len(),
            "Document split into chapters"
        );
        SplitResult::Split(ChapterSet { index, chapters })
    }
}

fn chapter_file_name(number: usize, title: &str) -> String {
    let slug = slugify(title);
    let slug = if slug.is_empty() { "chapter" } else { &slug };
    format!("{number:02}-{slug}.md")
}

fn finish(text: &str) -> String {
    let text = text.trim_matches('\n');
    if text.trim().is_empty() {
        String::new()
    } else {
        format!("{text}\n")
    }
}

fn build_index(preamble: &str, chapters: &[Chapter]) -> String {
    let mut index = String::new();
    let preamble = preamble.trim_matches('\n');
    if !preamble.trim().is_empty() {
        index.push_str(preamble);
        index.push_str("\n\n");
    }
    for chapter in chapters {
        let title = chapter.title.replace('[', "\\[").replace(']', "\\]");
        index.push_str(&format!(
            "- [{title}]({}) ({})\n",
            chapter.file_name,
            format_size(chapter.size())
        ));
    }
    index
}

#[allow(clippy::cast_precision_loss)]
fn format_size(bytes: usize) -> String {
    const KB: usize = 1024;
    if bytes < KB {
        format!("{bytes} B")
    } else if bytes < KB * KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{:.1} MB", bytes as f64 / (KB * KB) as f64)
    }
}
