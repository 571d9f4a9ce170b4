use std::env;
use std::path::PathBuf;

use crate::validation::DEFAULT_MAX_ERRORS;

use super::DEFAULT_CONFIG_PATH;

/// Runtime settings read from the environment (and `.env`, loaded by the binary).
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// `DATAMEND_CONFIG`
    pub config_path: PathBuf,
    /// `DATAMEND_API_TOKEN`, sent as bearer token on submission
    pub api_token: Option<String>,
    /// `DATAMEND_MAX_ERRORS`
    pub max_errors: usize,
    /// `DATAMEND_DRY_RUN`
    pub dry_run: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            api_token: None,
            max_errors: DEFAULT_MAX_ERRORS,
            dry_run: false,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let max_errors = match get("DATAMEND_MAX_ERRORS") {
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    tracing::warn!(value = %raw, "ignoring invalid DATAMEND_MAX_ERRORS");
                    defaults.max_errors
                }
            },
            None => defaults.max_errors,
        };

        Self {
            config_path: get("DATAMEND_CONFIG").map(PathBuf::from).unwrap_or(defaults.config_path),
            api_token: get("DATAMEND_API_TOKEN"),
            max_errors,
            dry_run: get("DATAMEND_DRY_RUN")
                .is_some_and(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes")),
        }
    }
}
