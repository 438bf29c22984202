//! CLI command implementations.

pub(crate) mod convert;
pub(crate) mod export;

use std::sync::Arc;

use ce_config::Config;
use ce_convert::{ContentConverter, ProcessorRegistry};

pub(crate) use convert::ConvertArgs;
pub(crate) use export::ExportCommand;

/// Converter built from the `[convert]` section.
pub(crate) fn converter(config: &Config) -> ContentConverter {
    ContentConverter::new(
        Arc::new(ProcessorRegistry::from_config(&config.convert)),
        config.convert.clone(),
    )
}
