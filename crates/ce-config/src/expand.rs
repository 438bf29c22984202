//! `${VAR}` expansion for string settings read from `ce.toml`.
//!
//! Only the braced form is expanded. `${VAR:-default}` falls back to the
//! default when the variable is unset; a bare `${VAR}` that is unset is an
//! error naming the offending field.

use crate::ConfigError;

/// Expand environment variable references in a config value.
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    if !value.contains("${") {
        return Ok(value.to_owned());
    }

    shellexpand::env_with_context(value, |name| -> Result<Option<String>, MissingVar> {
        std::env::var(name).map(Some).map_err(|_| MissingVar {
            name: name.to_owned(),
        })
    })
    .map(std::borrow::Cow::into_owned)
    .map_err(|e| ConfigError::EnvVar {
        field: field.to_owned(),
        message: format!("${{{}}} not set", e.cause.name),
    })
}

/// Expand an optional value in place.
pub(crate) fn expand_opt(value: &mut Option<String>, field: &str) -> Result<(), ConfigError> {
    if let Some(raw) = value.as_deref() {
        *value = Some(expand_env(raw, field)?);
    }
    Ok(())
}

/// Variable referenced by a config value but missing from the environment.
struct MissingVar {
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_set_var() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::set_var("CE_EXPAND_TOKEN", "abc123");
        }
        let result = expand_env("${CE_EXPAND_TOKEN}", "confluence.token").unwrap();
        assert_eq!(result, "abc123");
        unsafe {
            std::env::remove_var("CE_EXPAND_TOKEN");
        }
    }

    #[test]
    fn test_expand_default_when_unset() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::remove_var("CE_EXPAND_UNSET");
        }
        let result = expand_env("${CE_EXPAND_UNSET:-./out}", "export.output_dir").unwrap();
        assert_eq!(result, "./out");
    }

    #[test]
    fn test_expand_missing_var_names_field() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::remove_var("CE_EXPAND_MISSING");
        }
        let err = expand_env("${CE_EXPAND_MISSING}", "confluence.base_url").unwrap_err();
        assert!(matches!(err, ConfigError::EnvVar { .. }));
        let msg = err.to_string();
        assert!(msg.contains("CE_EXPAND_MISSING"));
        assert!(msg.contains("confluence.base_url"));
    }

    #[test]
    fn test_expand_embedded_in_url() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::set_var("CE_EXPAND_HOST", "wiki.example.com");
        }
        let result = expand_env("https://${CE_EXPAND_HOST}/confluence", "confluence.base_url")
            .unwrap();
        assert_eq!(result, "https://wiki.example.com/confluence");
        unsafe {
            std::env::remove_var("CE_EXPAND_HOST");
        }
    }

    #[test]
    fn test_bare_dollar_left_alone() {
        let result = expand_env("pa$$word", "confluence.token").unwrap();
        assert_eq!(result, "pa$$word");
    }

    #[test]
    fn test_expand_opt_none_stays_none() {
        let mut value = None;
        expand_opt(&mut value, "confluence.username").unwrap();
        assert!(value.is_none());
    }
}
