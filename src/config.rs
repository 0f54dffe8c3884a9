//! Configuration loader (C9): TOML discovery and parsing.
//!
//! Discovery order mirrors the original `pasta` package's own `Config.find`:
//! current working directory, then `$XDG_CONFIG_HOME/<app>/<app>.toml`, then
//! every ancestor directory up to the filesystem root.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PastaError, Result};

pub const APP_NAME: &str = "pasta";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptRule {
    pub command: String,
    #[serde(default)]
    pub description: String,
    pub pattern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_max_size")]
    pub max_size: u64,
    #[serde(default = "default_backups")]
    pub backups: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_size() -> u64 {
    2048
}

fn default_backups() -> u32 {
    3
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
            max_size: default_max_size(),
            backups: default_backups(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub prompt: Vec<PromptRule>,
}

impl Config {
    /// Parse a TOML document, pulling the `[pasta]` table (falling back to
    /// the document root if the wrapper table is absent, matching how the
    /// source project's own loader keys by package name).
    pub fn loads(document: &str) -> Result<Self> {
        let raw: toml::Value =
            toml::from_str(document).map_err(|e| PastaError::InvalidConfig(e.to_string()))?;

        let table = raw.get(APP_NAME).cloned().unwrap_or(raw);
        table
            .try_into()
            .map_err(|e: toml::de::Error| PastaError::InvalidConfig(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let document = std::fs::read_to_string(path)
            .map_err(|e| PastaError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::loads(&document)
    }

    /// Locate a configuration file, preferring (in order): the current
    /// working directory, `$XDG_CONFIG_HOME/pasta/pasta.toml`, then every
    /// ancestor directory up to the filesystem root.
    pub fn find() -> Option<PathBuf> {
        let filename = format!("{APP_NAME}.toml");

        let cwd = std::env::current_dir().ok()?;
        let candidate = cwd.join(&filename);
        if candidate.exists() {
            return Some(candidate);
        }

        let xdg_config_home = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| dirs_home().map(|h| h.join(".config")));
        if let Some(xdg) = xdg_config_home {
            let usrpath = xdg.join(APP_NAME).join(&filename);
            if usrpath.exists() {
                return Some(usrpath);
            }
        }

        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let candidate = parent.join(&filename);
            if candidate.exists() {
                return Some(candidate);
            }
            dir = parent;
        }

        None
    }

    /// Discover and load the effective configuration, or fall back to
    /// defaults if no file is found.
    pub fn discover() -> Result<Self> {
        match Self::find() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Render as TOML, commenting every line when the configuration is
    /// entirely default values (used by the `config` subcommand).
    pub fn render(&self) -> Result<String> {
        let body = toml::to_string_pretty(self)
            .map_err(|e| PastaError::InvalidConfig(e.to_string()))?;
        if *self == Config::default() {
            Ok(body
                .lines()
                .map(|line| format!("# {line}"))
                .collect::<Vec<_>>()
                .join("\n")
                + "\n")
        } else {
            Ok(body)
        }
    }
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_document_is_empty() {
        let config = Config::loads("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.max_size, 2048);
        assert_eq!(config.logging.backups, 3);
    }

    #[test]
    fn reads_wrapped_table() {
        let doc = r#"
            [pasta.logging]
            level = "debug"
            max_size = 10

            [[pasta.prompt]]
            command = "bash"
            pattern = "\\$ $"
        "#;
        let config = Config::loads(doc).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.max_size, 10);
        assert_eq!(config.prompt.len(), 1);
        assert_eq!(config.prompt[0].command, "bash");
    }

    #[test]
    fn reads_unwrapped_table_too() {
        let doc = r#"
            [logging]
            level = "debug"
        "#;
        let config = Config::loads(doc).unwrap();
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = Config::loads("not = [valid").unwrap_err();
        assert!(matches!(err, PastaError::InvalidConfig(_)));
    }

    #[test]
    fn default_render_comments_every_line() {
        let rendered = Config::default().render().unwrap();
        assert!(rendered.lines().all(|l| l.is_empty() || l.starts_with('#')));
    }
}
