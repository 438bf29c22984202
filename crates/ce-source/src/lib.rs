//! Page source abstraction for Confluence export.
//!
//! The exporter reads pages through the [`PageSource`] trait, so it can run
//! against the REST client or, in tests, against an in-memory source.
//!
//! The crate provides:
//! - [`PageSource`] with page, child, title lookup and attachment reads
//! - [`SourceError`] classified by [`SourceErrorKind`] with retry guidance
//! - [`MockSource`] for testing (behind `mock` feature flag)

mod error;
#[cfg(feature = "mock")]
mod mock;
mod source;

pub use error::{ErrorStatus, SourceError, SourceErrorKind};
#[cfg(feature = "mock")]
pub use mock::MockSource;
pub use source::{Page, PageRef, PageSource};
