//! Macro-aware conversion of Confluence storage format to Markdown.
//!
//! A [`ContentConverter`] parses a storage body into a [`StorageNode`] tree,
//! walks it depth-first and converts structural elements directly. Macro
//! elements are dispatched through a [`ProcessorRegistry`] to
//! [`ContentProcessor`]s.
//!
//! # Architecture
//!
//! - [`ProcessorRegistry`]: type id to processor bindings with priorities,
//!   blacklist and enabled/disabled policy, read through immutable snapshots
//! - [`ContentProcessor`]: produces Markdown, or storage markup that is
//!   converted again one level deeper (includes)
//! - recursion guard and depth limit stop include cycles and runaway nesting
//! - [`FallbackStrategy`] decides what a failing macro turns into; failures
//!   are never fatal for the document
//!
//! # Example
//!
//! ```
//! use ce_convert::{ContentConverter, PageInfo};
//!
//! let converter = ContentConverter::with_defaults();
//! let storage = r#"<h1>Setup</h1><ac:structured-macro ac:name="info"><ac:rich-text-body><p>Read first.</p></ac:rich-text-body></ac:structured-macro>"#;
//! let result = converter.convert(storage, &PageInfo::new("42")).unwrap();
//!
//! assert_eq!(result.markdown, "# Setup\n\n> [!NOTE]\n> Read first.\n");
//! assert!(result.warnings.is_empty());
//! ```

mod cleanup;
mod context;
mod converter;
mod element;
mod entities;
mod error;
mod fence;
mod parser;
mod processor;
pub mod processors;
mod registry;
mod serializer;
mod text;
mod tree;

pub use ce_config::FallbackStrategy;
pub use cleanup::clean_document;
pub use context::{ConversionWarning, IncludeResolver, IncludeTarget, PageInfo};
pub use converter::{ContentConverter, Conversion};
pub use element::{MacroBody, MacroElement, MacroParam, OutputMode, ParamValue};
pub use error::{ConvertError, MacroError, MacroErrorKind};
pub use parser::{MAX_NESTING, parse_storage};
pub use processor::{ContentProcessor, ProcessContext, ProcessorOutput};
pub use registry::{
    DEFAULT_PRIORITY, ProcessorRegistry, Registration, RegistrySnapshot, RegistryState,
};
pub use serializer::{serialize_children, serialize_node};
pub use text::slugify;
pub use tree::StorageNode;
