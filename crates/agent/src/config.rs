//! Agent configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use stagehand_core::scripting::powershell::{DEFAULT_EXECUTABLE, DEFAULT_TIMEOUT};

/// Invalid configuration values. Missing variables fall back to defaults.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} has invalid value {value:?}: expected {expected}")]
    InvalidValue {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Whether error lines are wrapped in a colour escape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorErrors {
    /// Colour when stderr is a terminal.
    #[default]
    Auto,
    Always,
    Never,
}

impl ColorErrors {
    pub fn enabled(self, stderr_is_terminal: bool) -> bool {
        match self {
            Self::Auto => stderr_is_terminal,
            Self::Always => true,
            Self::Never => false,
        }
    }
}

/// Format of the stderr diagnostics layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// PowerShell interpreter to spawn (default: `pwsh`). Must be
    /// PowerShell 7 or later; sensitive values are decrypted with `AesGcm`.
    pub powershell_path: PathBuf,
    /// Wall-clock limit for one script (default: 1 hour).
    pub script_timeout: Duration,
    pub color_errors: ColorErrors,
    pub log_format: LogFormat,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            powershell_path: PathBuf::from(DEFAULT_EXECUTABLE),
            script_timeout: DEFAULT_TIMEOUT,
            color_errors: ColorErrors::Auto,
            log_format: LogFormat::Text,
        }
    }
}

impl AgentConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                         | Default |
    /// |---------------------------------|---------|
    /// | `STAGEHAND_POWERSHELL_PATH`     | `pwsh`  |
    /// | `STAGEHAND_SCRIPT_TIMEOUT_SECS` | `3600`  |
    /// | `STAGEHAND_COLOR_ERRORS`        | `auto`  |
    /// | `STAGEHAND_LOG_FORMAT`          | `text`  |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = non_empty(lookup("STAGEHAND_POWERSHELL_PATH")) {
            config.powershell_path = PathBuf::from(path);
        }

        if let Some(value) = non_empty(lookup("STAGEHAND_SCRIPT_TIMEOUT_SECS")) {
            let secs: u64 = value
                .parse()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| ConfigError::InvalidValue {
                    var: "STAGEHAND_SCRIPT_TIMEOUT_SECS",
                    value: value.clone(),
                    expected: "a positive number of seconds",
                })?;
            config.script_timeout = Duration::from_secs(secs);
        }

        if let Some(value) = non_empty(lookup("STAGEHAND_COLOR_ERRORS")) {
            config.color_errors = match value.to_ascii_lowercase().as_str() {
                "auto" => ColorErrors::Auto,
                "true" | "always" | "1" => ColorErrors::Always,
                "false" | "never" | "0" => ColorErrors::Never,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        var: "STAGEHAND_COLOR_ERRORS",
                        value,
                        expected: "auto, true or false",
                    })
                }
            };
        }

        if let Some(value) = non_empty(lookup("STAGEHAND_LOG_FORMAT")) {
            config.log_format = match value.to_ascii_lowercase().as_str() {
                "text" => LogFormat::Text,
                "json" => LogFormat::Json,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        var: "STAGEHAND_LOG_FORMAT",
                        value,
                        expected: "text or json",
                    })
                }
            };
        }

        Ok(config)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<AgentConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AgentConfig::from_lookup(|var| env.get(var).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = load(&[]).unwrap();
        assert_eq!(config.powershell_path, PathBuf::from("pwsh"));
        assert_eq!(config.script_timeout, Duration::from_secs(3600));
        assert_eq!(config.color_errors, ColorErrors::Auto);
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn values_are_read() {
        let config = load(&[
            ("STAGEHAND_POWERSHELL_PATH", "/opt/microsoft/powershell/7/pwsh"),
            ("STAGEHAND_SCRIPT_TIMEOUT_SECS", "90"),
            ("STAGEHAND_COLOR_ERRORS", "false"),
            ("STAGEHAND_LOG_FORMAT", "JSON"),
        ])
        .unwrap();
        assert_eq!(
            config.powershell_path,
            PathBuf::from("/opt/microsoft/powershell/7/pwsh")
        );
        assert_eq!(config.script_timeout, Duration::from_secs(90));
        assert_eq!(config.color_errors, ColorErrors::Never);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = load(&[("STAGEHAND_POWERSHELL_PATH", "  ")]).unwrap();
        assert_eq!(config.powershell_path, PathBuf::from("pwsh"));
    }

    #[test]
    fn invalid_timeout_is_rejected() {
        assert_matches!(
            load(&[("STAGEHAND_SCRIPT_TIMEOUT_SECS", "soon")]),
            Err(ConfigError::InvalidValue { var: "STAGEHAND_SCRIPT_TIMEOUT_SECS", .. })
        );
        assert_matches!(
            load(&[("STAGEHAND_SCRIPT_TIMEOUT_SECS", "0")]),
            Err(ConfigError::InvalidValue { .. })
        );
    }

    #[test]
    fn invalid_color_setting_is_rejected() {
        let err = load(&[("STAGEHAND_COLOR_ERRORS", "purple")]).unwrap_err();
        assert!(err.to_string().contains("STAGEHAND_COLOR_ERRORS"));
    }

    #[test]
    fn color_resolution() {
        assert!(ColorErrors::Auto.enabled(true));
        assert!(!ColorErrors::Auto.enabled(false));
        assert!(ColorErrors::Always.enabled(false));
        assert!(!ColorErrors::Never.enabled(true));
    }
}
