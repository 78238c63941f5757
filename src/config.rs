//! Run configuration, loaded from a TOML file.
//!
//! Values written as `${VAR_NAME}` are replaced from the environment before
//! parsing, so the Tableau password does not have to live in the file.

use anyhow::Context;
use lettre::message::Mailbox;
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::info;
use url::Url;

// Embedded so `--init` works from an installed binary
const DEFAULT_CONFIG_BYTES: &[u8] = include_bytes!("../default_config.toml");

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("env var pattern compiles"));

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub tableau: TableauConfig,
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableauConfig {
    pub server_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Content URL of the site the scan session starts on.
    #[serde(default)]
    pub site: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub accept_invalid_certs: bool,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub from: String,
    pub admin: String,
    pub access_request_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: u32,
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            log_retention_days: default_log_retention_days(),
            report_dir: default_report_dir(),
        }
    }
}

fn default_api_version() -> String {
    "3.19".to_string()
}

fn default_page_size() -> usize {
    100
}

fn default_smtp_port() -> u16 {
    25
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    10
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents =
            fs::read_to_string(path).map_err(|e| ConfigError::Io(e, path.to_path_buf()))?;
        Self::from_str(&contents)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        let config: Config = toml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let server = Url::parse(&self.tableau.server_url).map_err(|e| {
            ConfigError::Validation(format!(
                "tableau.server_url '{}' is not a valid URL: {}",
                self.tableau.server_url, e
            ))
        })?;
        if !matches!(server.scheme(), "http" | "https") {
            return Err(ConfigError::Validation(format!(
                "tableau.server_url must use http or https, got '{}'",
                server.scheme()
            )));
        }
        if self.tableau.username.trim().is_empty() {
            return Err(ConfigError::Validation(
                "tableau.username must not be empty".into(),
            ));
        }
        if self.tableau.page_size == 0 {
            return Err(ConfigError::Validation(
                "tableau.page_size must be greater than 0".into(),
            ));
        }
        for (field, address) in [("smtp.from", &self.smtp.from), ("smtp.admin", &self.smtp.admin)] {
            address.parse::<Mailbox>().map_err(|e| {
                ConfigError::Validation(format!("{} '{}' is not a valid address: {}", field, address, e))
            })?;
        }
        if self.paths.log_retention_days == 0 {
            return Err(ConfigError::Validation(
                "paths.log_retention_days must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Server URL without a trailing slash, the base for links and API calls.
    pub fn server_base(&self) -> &str {
        self.tableau.server_url.trim_end_matches('/')
    }
}

/// Replaces `${VAR}` references with environment values. References after a
/// `#` on the same line are left alone.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());

    for (index, line) in input.lines().enumerate() {
        if index > 0 {
            result.push('\n');
        }
        let comment_pos = line.find('#');
        let mut last_end = 0;

        for cap in ENV_VAR.captures_iter(line) {
            let Some(whole) = cap.get(0) else { continue };
            if comment_pos.is_some_and(|pos| whole.start() >= pos) {
                continue;
            }
            result.push_str(&line[last_end..whole.start()]);
            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            result.push_str(&value);
            last_end = whole.end();
        }
        result.push_str(&line[last_end..]);
    }

    if input.ends_with('\n') {
        result.push('\n');
    }
    Ok(result)
}

pub fn init_default_config(path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        anyhow::bail!(
            "{} already exists. Remove it first if you want to reinitialize.",
            path.display()
        );
    }

    let default_content = std::str::from_utf8(DEFAULT_CONFIG_BYTES)
        .context("Failed to decode embedded default config")?;

    fs::write(path, default_content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(action = "write", component = "config_init", path = ?path, "Wrote default config");
    println!("Created {} with default settings", path.display());

    Ok(())
}
