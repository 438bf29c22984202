//! Output layout: name sanitization, collision handling and atomic writes.

use std::collections::HashSet;
use std::ffi::OsString;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ce_chapters::INDEX_FILE;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use tracing::debug;

use crate::error::ExportError;
use crate::unit::WrittenFile;

/// Longest file name stem produced by [`sanitize_name`], in characters.
const MAX_NAME_CHARS: usize = 120;

/// Characters escaped in relative asset links.
const ASSET_PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'(')
    .add(b')');

/// Turn a page title into a portable file name stem.
///
/// Path separators, reserved characters and control characters become `-`,
/// whitespace runs collapse to one space and leading or trailing dots and
/// spaces are dropped. Empty results become `untitled`.
pub fn sanitize_name(title: &str) -> String {
    let mut name = String::with_capacity(title.len());
    let mut space = false;
    for c in title.chars() {
        if c.is_whitespace() {
            space = true;
            continue;
        }
        if space && !name.is_empty() {
            name.push(' ');
        }
        space = false;
        if matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || c.is_control() {
            name.push('-');
        } else {
            name.push(c);
        }
    }
    let name: String = name
        .trim_matches(|c| c == '.' || c == ' ')
        .chars()
        .take(MAX_NAME_CHARS)
        .collect();
    let name = name.trim_end_matches(['.', ' ']);
    if name.is_empty() {
        "untitled".to_owned()
    } else {
        name.to_owned()
    }
}

/// Where one page's files go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLayout {
    /// `{dir}/{stem}`, without extension.
    base: PathBuf,
    /// Page is written as a directory with chapter files.
    split: bool,
}

impl PageLayout {
    fn stem(&self) -> String {
        self.base
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// `{stem}.md`, or `{stem}/index.md` for split pages.
    pub fn markdown_path(&self) -> PathBuf {
        if self.split {
            self.base.join(INDEX_FILE)
        } else {
            with_suffix(&self.base, ".md")
        }
    }

    /// Directory holding chapter files of a split page.
    pub fn content_dir(&self) -> &Path {
        &self.base
    }

    /// Directory holding the page's children in a hierarchy run.
    pub fn children_dir(&self) -> &Path {
        &self.base
    }

    /// Directory holding downloaded attachments.
    pub fn assets_dir(&self) -> PathBuf {
        if self.split {
            self.base.join("assets")
        } else {
            with_suffix(&self.base, ".assets")
        }
    }

    /// Link prefix for attachments, relative to the Markdown files.
    pub fn asset_prefix(&self) -> String {
        if self.split {
            "assets/".to_owned()
        } else {
            format!("{}.assets/", utf8_percent_encode(&self.stem(), ASSET_PATH))
        }
    }
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    // Titles may contain dots, so `with_extension` would cut them.
    let mut path = OsString::from(base.as_os_str());
    path.push(suffix);
    PathBuf::from(path)
}

/// Writes files under an output root and hands out collision-free names.
///
/// Names are claimed before anything is written so concurrent units never
/// pick the same path.
#[derive(Debug)]
pub struct OutputWriter {
    root: PathBuf,
    overwrite: bool,
    claimed: Mutex<HashSet<PathBuf>>,
}

impl OutputWriter {
    pub fn new(root: impl Into<PathBuf>, overwrite: bool) -> Self {
        Self {
            root: root.into(),
            overwrite,
            claimed: Mutex::new(HashSet::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Claim a layout for a page titled `title` in `dir`.
    ///
    /// Tries `{name}`, `{name}-1`, `{name}-2`, … until a candidate is neither
    /// claimed in this run nor, without overwrite, present on disk.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn claim_page(&self, dir: &Path, title: &str, split: bool) -> PageLayout {
        let name = sanitize_name(title);
        let mut claimed = self.claimed.lock().unwrap();
        for n in 0.. {
            let stem = if n == 0 {
                name.clone()
            } else {
                format!("{name}-{n}")
            };
            let layout = PageLayout {
                base: dir.join(&stem),
                split,
            };
            let file = with_suffix(&layout.base, ".md");
            if claimed.contains(&layout.base) || claimed.contains(&file) {
                continue;
            }
            if !self.overwrite && layout.markdown_path().exists() {
                continue;
            }
            if n > 0 {
                debug!(title, name = %stem, "Name taken, using suffix");
            }
            claimed.insert(layout.base.clone());
            claimed.insert(file);
            return layout;
        }
        unreachable!("unbounded candidate range")
    }

    /// Write `data` to `path` atomically, creating parent directories.
    pub fn write(&self, path: &Path, data: &[u8]) -> Result<WrittenFile, ExportError> {
        let wrap = |source| ExportError::Write {
            path: path.to_owned(),
            source,
        };
        let parent = path.parent().unwrap_or(&self.root);
        std::fs::create_dir_all(parent).map_err(wrap)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(wrap)?;
        tmp.write_all(data).map_err(wrap)?;
        tmp.persist(path).map_err(|e| wrap(e.error))?;
        debug!(path = %path.display(), bytes = data.len(), "Wrote file");
        Ok(WrittenFile {
            path: path.to_owned(),
            bytes: data.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Setup / Install"), "Setup - Install");
        assert_eq!(sanitize_name("a:b*c?\"d\"<e>|f\\g"), "a-b-c--d--e--f-g");
        assert_eq!(sanitize_name("  many   spaces\there "), "many spaces here");
        assert_eq!(sanitize_name("..hidden."), "hidden");
        assert_eq!(sanitize_name("v1.2 notes"), "v1.2 notes");
        assert_eq!(sanitize_name(" ... "), "untitled");
        assert_eq!(sanitize_name(""), "untitled");
        assert_eq!(sanitize_name(&"x".repeat(300)).len(), MAX_NAME_CHARS);
    }

    #[test]
    fn test_layout_paths() {
        let writer = OutputWriter::new("/out", true);
        let page = writer.claim_page(Path::new("/out"), "v1.2 Notes", false);
        assert_eq!(page.markdown_path(), PathBuf::from("/out/v1.2 Notes.md"));
        assert_eq!(page.assets_dir(), PathBuf::from("/out/v1.2 Notes.assets"));
        assert_eq!(page.asset_prefix(), "v1.2%20Notes.assets/");
        assert_eq!(page.children_dir(), Path::new("/out/v1.2 Notes"));

        let split = writer.claim_page(Path::new("/out"), "Guide", true);
        assert_eq!(split.markdown_path(), PathBuf::from("/out/Guide/index.md"));
        assert_eq!(split.assets_dir(), PathBuf::from("/out/Guide/assets"));
        assert_eq!(split.asset_prefix(), "assets/");
    }

    #[test]
    fn test_claimed_names_get_suffix() {
        let writer = OutputWriter::new("/out", true);
        let dir = Path::new("/out");
        let a = writer.claim_page(dir, "Notes", false);
        let b = writer.claim_page(dir, "Notes", true);
        let c = writer.claim_page(dir, "Notes", false);
        assert_eq!(a.markdown_path(), PathBuf::from("/out/Notes.md"));
        assert_eq!(b.markdown_path(), PathBuf::from("/out/Notes-1/index.md"));
        assert_eq!(c.markdown_path(), PathBuf::from("/out/Notes-2.md"));
    }

    #[test]
    fn test_existing_file_without_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Notes.md"), "old").unwrap();

        let writer = OutputWriter::new(dir.path(), false);
        let layout = writer.claim_page(dir.path(), "Notes", false);
        assert_eq!(layout.markdown_path(), dir.path().join("Notes-1.md"));

        let writer = OutputWriter::new(dir.path(), true);
        let layout = writer.claim_page(dir.path(), "Notes", false);
        assert_eq!(layout.markdown_path(), dir.path().join("Notes.md"));
    }

    #[test]
    fn test_write_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(dir.path(), false);
        let path = dir.path().join("a/b/page.md");
        let file = writer.write(&path, b"# Page\n").unwrap();
        assert_eq!(file.bytes, 7);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# Page\n");
    }
}
