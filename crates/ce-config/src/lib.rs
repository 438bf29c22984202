//! Configuration management for the Confluence export engine.
//!
//! Parses `ce.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `confluence.base_url`
//! - `confluence.token`
//! - `confluence.username`
//! - `export.output_dir`

mod expand;

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "ce.toml";

/// Upper bound for the batch worker pool.
pub const MAX_CONCURRENCY: usize = 16;

/// Upper bound for hierarchy traversal depth.
pub const MAX_HIERARCHY_DEPTH: usize = 20;

/// Upper bound for macro-in-macro nesting.
pub const MAX_MACRO_DEPTH: usize = 32;

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override output directory.
    pub output_dir: Option<PathBuf>,
    /// Override the overwrite flag.
    pub overwrite: Option<bool>,
    /// Override the metadata preamble flag.
    pub include_metadata: Option<bool>,
    /// Override the attachment download flag.
    pub preserve_attachments: Option<bool>,
    /// Override chapter splitting.
    pub split_chapters: Option<bool>,
    /// Override chapter heading level.
    pub chapter_level: Option<u8>,
    /// Override max hierarchy depth.
    pub max_depth: Option<usize>,
    /// Override include-children flag.
    pub include_children: Option<bool>,
    /// Override batch concurrency.
    pub concurrency: Option<usize>,
    /// Override overall run timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Override macro fallback strategy.
    pub fallback: Option<FallbackStrategy>,
}

/// Application configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Confluence connection (optional section, required for export commands).
    pub confluence: Option<ConfluenceConfig>,
    /// Content conversion settings.
    pub convert: ConvertConfig,
    /// Export settings.
    pub export: ExportConfig,

    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

/// Confluence connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfluenceConfig {
    /// Confluence server base URL.
    pub base_url: String,
    /// Personal access token, or API token when `username` is set.
    pub token: String,
    /// Username for basic authentication (Confluence Cloud).
    #[serde(default)]
    pub username: Option<String>,
    /// HTTP timeout in seconds.
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

fn default_http_timeout() -> u64 {
    30
}

impl ConfluenceConfig {
    /// Validate that all required fields are properly set.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any field is empty or has invalid format.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.base_url, "confluence.base_url")?;
        require_http_url(&self.base_url, "confluence.base_url")?;
        require_non_empty(&self.token, "confluence.token")?;
        if let Some(username) = &self.username {
            require_non_empty(username, "confluence.username")?;
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "confluence.timeout_secs must be greater than 0".to_owned(),
            ));
        }
        Ok(())
    }
}

/// What to emit when a macro cannot be converted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Emit the macro's original storage markup unchanged.
    PreserveRaw,
    /// Emit the macro's flattened text content.
    #[default]
    ConvertToText,
    /// Emit an HTML comment naming the macro and the failure.
    AnnotateAndSkip,
    /// Emit nothing.
    Skip,
}

impl std::str::FromStr for FallbackStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.replace('-', "_").as_str() {
            "preserve_raw" => Ok(Self::PreserveRaw),
            "convert_to_text" => Ok(Self::ConvertToText),
            "annotate_and_skip" => Ok(Self::AnnotateAndSkip),
            "skip" => Ok(Self::Skip),
            other => Err(ConfigError::Validation(format!(
                "unknown fallback strategy '{other}'"
            ))),
        }
    }
}

/// Content conversion configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    /// Strategy applied to unsupported or failing macros.
    pub fallback: FallbackStrategy,
    /// Maximum macro-in-macro nesting depth.
    pub max_macro_depth: usize,
    /// Macro types that are never registered or invoked.
    pub blacklist: Vec<String>,
    /// When set, only these macro types may be registered.
    pub enabled: Option<Vec<String>>,
    /// Macro types that may not be registered.
    pub disabled: Vec<String>,
    /// Width of a tab stop when expanding tabs in embedded markdown.
    pub tab_width: usize,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            fallback: FallbackStrategy::default(),
            max_macro_depth: 4,
            blacklist: Vec::new(),
            enabled: None,
            disabled: Vec::new(),
            tab_width: 4,
        }
    }
}

impl ConvertConfig {
    /// Validate conversion settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if a bound is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_macro_depth == 0 || self.max_macro_depth > MAX_MACRO_DEPTH {
            return Err(ConfigError::Validation(format!(
                "convert.max_macro_depth must be between 1 and {MAX_MACRO_DEPTH}"
            )));
        }
        if self.tab_width == 0 || self.tab_width > 16 {
            return Err(ConfigError::Validation(
                "convert.tab_width must be between 1 and 16".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Export configuration.
///
/// Each field has a default; operations only consult the fields relevant to them.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Root directory for exported files.
    pub output_dir: PathBuf,
    /// Replace existing files instead of picking a new name.
    pub overwrite: bool,
    /// Emit a YAML front matter block with page metadata.
    pub include_metadata: bool,
    /// Download referenced attachments next to the markdown.
    pub preserve_attachments: bool,
    /// Split each page into chapter files.
    pub split_chapters: bool,
    /// Heading level used for chapter splitting (1-3).
    pub chapter_level: u8,
    /// Maximum hierarchy depth (root is depth 0).
    pub max_depth: usize,
    /// Export descendants when exporting a single page.
    pub include_children: bool,
    /// Number of pages processed in parallel.
    pub concurrency: usize,
    /// Retries for transient fetch failures.
    pub max_retries: u32,
    /// Base delay between retries in milliseconds (doubles per attempt).
    pub retry_delay_ms: u64,
    /// Overall run timeout in seconds.
    pub timeout_secs: Option<u64>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("export"),
            overwrite: false,
            include_metadata: false,
            preserve_attachments: false,
            split_chapters: false,
            chapter_level: 2,
            max_depth: 5,
            include_children: false,
            concurrency: 3,
            max_retries: 2,
            retry_delay_ms: 500,
            timeout_secs: None,
        }
    }
}

impl ExportConfig {
    /// Validate export settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` naming the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "export.output_dir cannot be empty".to_owned(),
            ));
        }
        if !(1..=3).contains(&self.chapter_level) {
            return Err(ConfigError::Validation(
                "export.chapter_level must be between 1 and 3".to_owned(),
            ));
        }
        if self.max_depth > MAX_HIERARCHY_DEPTH {
            return Err(ConfigError::Validation(format!(
                "export.max_depth cannot exceed {MAX_HIERARCHY_DEPTH}"
            )));
        }
        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            return Err(ConfigError::Validation(format!(
                "export.concurrency must be between 1 and {MAX_CONCURRENCY}"
            )));
        }
        if self.max_retries > 10 {
            return Err(ConfigError::Validation(
                "export.max_retries cannot exceed 10".to_owned(),
            ));
        }
        if self.timeout_secs == Some(0) {
            return Err(ConfigError::Validation(
                "export.timeout_secs must be greater than 0".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`confluence.token`").
        field: String,
        /// Error message (e.g., "${`CONFLUENCE_TOKEN`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Require a URL field to use http:// or https:// scheme.
fn require_http_url(url: &str, field: &str) -> Result<(), ConfigError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "{field} must start with http:// or https://"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `ce.toml` in current directory and parents.
    /// CLI settings are applied last and take precedence over file values.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails,
    /// or the merged configuration is invalid.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }

        config.validate()?;
        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        let export = &mut self.export;
        if let Some(dir) = &settings.output_dir {
            export.output_dir.clone_from(dir);
        }
        if let Some(v) = settings.overwrite {
            export.overwrite = v;
        }
        if let Some(v) = settings.include_metadata {
            export.include_metadata = v;
        }
        if let Some(v) = settings.preserve_attachments {
            export.preserve_attachments = v;
        }
        if let Some(v) = settings.split_chapters {
            export.split_chapters = v;
        }
        if let Some(v) = settings.chapter_level {
            export.chapter_level = v;
        }
        if let Some(v) = settings.max_depth {
            export.max_depth = v;
        }
        if let Some(v) = settings.include_children {
            export.include_children = v;
        }
        if let Some(v) = settings.concurrency {
            export.concurrency = v;
        }
        if let Some(v) = settings.timeout_secs {
            export.timeout_secs = Some(v);
        }
        if let Some(v) = settings.fallback {
            self.convert.fallback = v;
        }
    }

    /// Get validated Confluence configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if the section is missing or invalid.
    pub fn require_confluence(&self) -> Result<&ConfluenceConfig, ConfigError> {
        let conf = self.confluence.as_ref().ok_or_else(|| {
            ConfigError::Validation("[confluence] section required in config".into())
        })?;
        conf.validate()?;
        Ok(conf)
    }

    /// Validate configuration values.
    ///
    /// The `[confluence]` section is validated lazily by
    /// [`require_confluence`](Self::require_confluence).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.convert.validate()?;
        self.export.validate()?;
        Ok(())
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        if let Some(ref mut confluence) = self.confluence {
            confluence.base_url = expand::expand_env(&confluence.base_url, "confluence.base_url")?;
            confluence.token = expand::expand_env(&confluence.token, "confluence.token")?;
            expand::expand_opt(&mut confluence.username, "confluence.username")?;
        }

        let output_dir = self.export.output_dir.to_string_lossy().into_owned();
        self.export.output_dir = PathBuf::from(expand::expand_env(&output_dir, "export.output_dir")?);

        Ok(())
    }

    /// Resolve a relative output directory against the config file location.
    fn resolve_paths(&mut self, config_dir: &Path) {
        if self.export.output_dir.is_relative() {
            self.export.output_dir = config_dir.join(&self.export.output_dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.confluence.is_none());
        assert_eq!(config.convert.fallback, FallbackStrategy::ConvertToText);
        assert_eq!(config.convert.max_macro_depth, 4);
        assert_eq!(config.export.output_dir, PathBuf::from("export"));
        assert_eq!(config.export.chapter_level, 2);
        assert_eq!(config.export.max_depth, 5);
        assert_eq!(config.export.concurrency, 3);
        assert_eq!(config.export.max_retries, 2);
        assert!(!config.export.overwrite);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_minimal_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.export.concurrency, 3);
        assert!(config.convert.blacklist.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[confluence]
base_url = "https://wiki.example.com"
token = "secret"
username = "bot@example.com"

[convert]
fallback = "annotate_and_skip"
max_macro_depth = 6
blacklist = ["jira", "gadget"]
enabled = ["code", "markdown"]

[export]
output_dir = "out"
overwrite = true
split_chapters = true
chapter_level = 3
concurrency = 5
timeout_secs = 120
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let confluence = config.confluence.as_ref().unwrap();
        assert_eq!(confluence.base_url, "https://wiki.example.com");
        assert_eq!(confluence.username.as_deref(), Some("bot@example.com"));
        assert_eq!(confluence.timeout_secs, 30);
        assert_eq!(config.convert.fallback, FallbackStrategy::AnnotateAndSkip);
        assert_eq!(config.convert.max_macro_depth, 6);
        assert_eq!(config.convert.blacklist, vec!["jira", "gadget"]);
        assert_eq!(
            config.convert.enabled,
            Some(vec!["code".to_owned(), "markdown".to_owned()])
        );
        assert!(config.export.overwrite);
        assert!(config.export.split_chapters);
        assert_eq!(config.export.chapter_level, 3);
        assert_eq!(config.export.concurrency, 5);
        assert_eq!(config.export.timeout_secs, Some(120));
    }

    #[test]
    fn test_fallback_from_str_accepts_kebab_case() {
        assert_eq!(
            "preserve-raw".parse::<FallbackStrategy>().unwrap(),
            FallbackStrategy::PreserveRaw
        );
        assert_eq!(
            "skip".parse::<FallbackStrategy>().unwrap(),
            FallbackStrategy::Skip
        );
        assert!("explode".parse::<FallbackStrategy>().is_err());
    }

    #[test]
    fn test_load_resolves_output_dir_relative_to_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ce.toml");
        std::fs::write(&path, "[export]\noutput_dir = \"pages\"\n").unwrap();

        let config = Config::load(Some(&path), None).unwrap();
        assert_eq!(config.export.output_dir, dir.path().join("pages"));
        assert_eq!(config.config_path, Some(path));
    }

    #[test]
    fn test_load_missing_explicit_path() {
        let err = Config::load(Some(Path::new("/nonexistent/ce.toml")), None).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ce.toml");
        std::fs::write(&path, "[export]\nconcurrency = 0\n").unwrap();

        let err = Config::load(Some(&path), None).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("concurrency"));
    }

    #[test]
    fn test_apply_cli_settings_overrides_export() {
        let mut config = Config::default();
        let settings = CliSettings {
            output_dir: Some(PathBuf::from("/tmp/site")),
            split_chapters: Some(true),
            chapter_level: Some(1),
            concurrency: Some(8),
            fallback: Some(FallbackStrategy::Skip),
            ..Default::default()
        };

        config.apply_cli_settings(&settings);

        assert_eq!(config.export.output_dir, PathBuf::from("/tmp/site"));
        assert!(config.export.split_chapters);
        assert_eq!(config.export.chapter_level, 1);
        assert_eq!(config.export.concurrency, 8);
        assert_eq!(config.convert.fallback, FallbackStrategy::Skip);
        assert_eq!(config.export.max_depth, 5); // Unchanged
    }

    #[test]
    fn test_apply_cli_settings_empty() {
        let mut config = Config::default();
        config.apply_cli_settings(&CliSettings::default());
        assert_eq!(config.export.concurrency, 3);
        assert_eq!(config.export.timeout_secs, None);
    }

    #[test]
    fn test_expand_env_vars_confluence() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::set_var("CE_TEST_WIKI_URL", "https://wiki.test.com");
            std::env::set_var("CE_TEST_WIKI_TOKEN", "tok");
        }

        let toml = r#"
[confluence]
base_url = "${CE_TEST_WIKI_URL}"
token = "${CE_TEST_WIKI_TOKEN}"
username = "${CE_TEST_WIKI_USER:-reader}"
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config.expand_env_vars().unwrap();

        let confluence = config.confluence.unwrap();
        assert_eq!(confluence.base_url, "https://wiki.test.com");
        assert_eq!(confluence.token, "tok");
        assert_eq!(confluence.username.as_deref(), Some("reader"));

        unsafe {
            std::env::remove_var("CE_TEST_WIKI_URL");
            std::env::remove_var("CE_TEST_WIKI_TOKEN");
        }
    }

    /// Assert that validation fails with expected substrings in the error message.
    fn assert_export_error(export: &ExportConfig, expected: &[&str]) {
        let err = export.validate().unwrap_err();
        assert!(
            matches!(err, ConfigError::Validation(_)),
            "Expected ConfigError::Validation, got {err:?}"
        );
        let msg = err.to_string();
        for s in expected {
            assert!(msg.contains(s), "Expected error to contain '{s}', got: {msg}");
        }
    }

    #[test]
    fn test_validate_chapter_level_range() {
        let export = ExportConfig {
            chapter_level: 4,
            ..ExportConfig::default()
        };
        assert_export_error(&export, &["chapter_level"]);
    }

    #[test]
    fn test_validate_concurrency_upper_bound() {
        let export = ExportConfig {
            concurrency: MAX_CONCURRENCY + 1,
            ..ExportConfig::default()
        };
        assert_export_error(&export, &["concurrency"]);
    }

    #[test]
    fn test_validate_max_depth() {
        let export = ExportConfig {
            max_depth: 100,
            ..ExportConfig::default()
        };
        assert_export_error(&export, &["max_depth"]);
    }

    #[test]
    fn test_validate_zero_timeout() {
        let export = ExportConfig {
            timeout_secs: Some(0),
            ..ExportConfig::default()
        };
        assert_export_error(&export, &["timeout_secs"]);
    }

    #[test]
    fn test_validate_macro_depth() {
        let convert = ConvertConfig {
            max_macro_depth: 0,
            ..ConvertConfig::default()
        };
        assert!(convert.validate().is_err());
    }

    fn valid_confluence_config() -> ConfluenceConfig {
        ConfluenceConfig {
            base_url: "https://wiki.example.com".to_owned(),
            token: "token".to_owned(),
            username: None,
            timeout_secs: 30,
        }
    }

    #[test]
    fn test_confluence_config_validate() {
        assert!(valid_confluence_config().validate().is_ok());

        let bad_url = ConfluenceConfig {
            base_url: "wiki.example.com".to_owned(),
            ..valid_confluence_config()
        };
        assert!(bad_url.validate().unwrap_err().to_string().contains("http"));

        let empty_token = ConfluenceConfig {
            token: String::new(),
            ..valid_confluence_config()
        };
        assert!(
            empty_token
                .validate()
                .unwrap_err()
                .to_string()
                .contains("token")
        );
    }

    #[test]
    fn test_require_confluence_missing_section() {
        let config = Config::default();
        let err = config.require_confluence().unwrap_err();
        assert!(err.to_string().contains("[confluence]"));
    }
}
