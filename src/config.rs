//! Configuration types for Ghostwire

use serde::{Deserialize, Serialize};

use crate::recorder::{validate_history_size, DEFAULT_HISTORY_SIZE};
use crate::redact::{Redactor, DEFAULT_PLACEHOLDER};
use crate::{GhostwireError, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Number of exchanges to keep
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    /// Redaction configuration
    #[serde(default)]
    pub redaction: RedactionConfig,
    /// Dump configuration
    #[serde(default)]
    pub dump: DumpConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            history_size: DEFAULT_HISTORY_SIZE,
            redaction: RedactionConfig::default(),
            dump: DumpConfig::default(),
        }
    }
}

fn default_history_size() -> usize {
    DEFAULT_HISTORY_SIZE
}

fn default_placeholder() -> String {
    DEFAULT_PLACEHOLDER.to_string()
}

fn default_true() -> bool {
    true
}

/// Redaction configuration
///
/// Every list is empty by default, which leaves dumps untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactionConfig {
    /// Text substituted for redacted content
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
    /// Literal secrets to redact
    #[serde(default)]
    pub secrets: Vec<String>,
    /// Regex patterns for redaction
    #[serde(default)]
    pub regex_patterns: Vec<String>,
    /// Headers whose values are redacted from requests
    #[serde(default)]
    pub request_headers: Vec<String>,
    /// Headers whose values are redacted from responses
    #[serde(default)]
    pub response_headers: Vec<String>,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            placeholder: default_placeholder(),
            secrets: Vec::new(),
            regex_patterns: Vec::new(),
            request_headers: Vec::new(),
            response_headers: Vec::new(),
        }
    }
}

impl RedactionConfig {
    /// Redactor for request dumps
    ///
    /// # Errors
    ///
    /// Returns error if a regex pattern is invalid
    pub fn request_redactor(&self) -> Result<Redactor> {
        self.build(&self.request_headers)
    }

    /// Redactor for response dumps
    ///
    /// # Errors
    ///
    /// Returns error if a regex pattern is invalid
    pub fn response_redactor(&self) -> Result<Redactor> {
        self.build(&self.response_headers)
    }

    fn build(&self, headers: &[String]) -> Result<Redactor> {
        let mut chain = Vec::new();

        if !headers.is_empty() {
            chain.push(Redactor::headers(headers, &self.placeholder));
        }
        if !self.secrets.is_empty() {
            chain.push(Redactor::literals(&self.secrets, &self.placeholder));
        }
        if !self.regex_patterns.is_empty() {
            chain.push(Redactor::patterns(&self.regex_patterns, &self.placeholder)?);
        }

        Ok(Redactor::chain(chain))
    }
}

/// Dump configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DumpConfig {
    /// Include message bodies in dumps
    #[serde(default = "default_true")]
    pub include_body: bool,
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self { include_body: true }
    }
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns [`GhostwireError::Io`] if the file cannot be read, or a
    /// configuration error if it cannot be parsed or is invalid
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| GhostwireError::ConfigError(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        validate_history_size(self.history_size)?;

        if self.redaction.secrets.iter().any(String::is_empty) {
            return Err(GhostwireError::ConfigError(
                "Redaction secrets cannot be empty".to_string(),
            ));
        }

        for (i, name) in self
            .redaction
            .request_headers
            .iter()
            .chain(&self.redaction.response_headers)
            .enumerate()
        {
            if name.trim().is_empty() || name.contains(':') {
                return Err(GhostwireError::ConfigError(format!(
                    "Header {i}: invalid header name '{name}'"
                )));
            }
        }

        // Compile patterns up front so a bad regex fails at load time
        self.redaction.request_redactor()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_parse() {
        let config_toml = r#"
            history_size = 5

            [redaction]
            secrets = ["hunter2"]
            request_headers = ["Authorization"]

            [dump]
            include_body = false
        "#;

        let config: Config = toml::from_str(config_toml).unwrap();
        assert_eq!(config.history_size, 5);
        assert_eq!(config.redaction.placeholder, DEFAULT_PLACEHOLDER);
        assert_eq!(config.redaction.secrets, ["hunter2"]);
        assert!(!config.dump.include_body);
    }

    #[test]
    fn test_config_defaults() {
        let config: Config = toml::from_str("").unwrap();

        assert_eq!(config.history_size, DEFAULT_HISTORY_SIZE);
        assert!(config.dump.include_body);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        let config_toml = r#"
            history_size = 10

            [redaction]
            placeholder = "<hidden>"
            regex_patterns = ["token=[a-z0-9]+"]
        "#;
        file.write_all(config_toml.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.history_size, 10);

        let redactor = config.redaction.request_redactor().unwrap();
        assert_eq!(redactor.apply(b"?token=abc1"), b"?<hidden>");
    }

    #[test]
    fn test_invalid_config_zero_history() {
        let config: Config = toml::from_str("history_size = 0").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_config_bad_pattern() {
        let config_toml = r#"
            [redaction]
            regex_patterns = ["[unterminated"]
        "#;

        let config: Config = toml::from_str(config_toml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(GhostwireError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_invalid_config_bad_header() {
        let config_toml = r#"
            [redaction]
            response_headers = ["Set-Cookie:"]
        "#;

        let config: Config = toml::from_str(config_toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_file(std::path::Path::new("/nonexistent/ghostwire.toml"));
        assert!(matches!(result, Err(GhostwireError::Io(_))));
    }

    #[test]
    fn test_response_redactor_uses_response_headers() {
        let config_toml = r#"
            [redaction]
            request_headers = ["Authorization"]
            response_headers = ["Set-Cookie"]
        "#;
        let config: Config = toml::from_str(config_toml).unwrap();

        let dump = b"HTTP/1.1 200 OK\r\nSet-Cookie: id=1\r\nAuthorization: x\r\n\r\n";
        let redacted = config.redaction.response_redactor().unwrap().apply(dump);
        assert_eq!(
            redacted,
            b"HTTP/1.1 200 OK\r\nSet-Cookie: [REDACTED]\r\nAuthorization: x\r\n\r\n"
        );
    }
}
