use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

pub const DEFAULT_USER_AGENT: &str = "cf2outline/0.1";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct MigrateConfig {
    #[serde(default)]
    pub confluence: ConfluenceSection,
    #[serde(default)]
    pub outline: OutlineSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ConfluenceSection {
    pub base_url: Option<String>,
    pub api_token: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct OutlineSection {
    pub base_url: Option<String>,
    pub api_token: Option<String>,
}

impl MigrateConfig {
    /// Confluence base URL: env CONFLUENCE_BASE_URL > config.
    pub fn confluence_base_url(&self) -> Option<String> {
        env_override("CONFLUENCE_BASE_URL").or_else(|| non_blank(&self.confluence.base_url))
    }

    pub fn confluence_api_token(&self) -> Option<String> {
        env_override("CONFLUENCE_API_TOKEN").or_else(|| non_blank(&self.confluence.api_token))
    }

    /// Outline API URL (usually ending in `/api`): env OUTLINE_BASE_URL > config.
    pub fn outline_base_url(&self) -> Option<String> {
        env_override("OUTLINE_BASE_URL").or_else(|| non_blank(&self.outline.base_url))
    }

    pub fn outline_api_token(&self) -> Option<String> {
        env_override("OUTLINE_API_TOKEN").or_else(|| non_blank(&self.outline.api_token))
    }

    /// Resolve user agent: env CF2OUTLINE_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        env_override("CF2OUTLINE_USER_AGENT")
            .or_else(|| non_blank(&self.confluence.user_agent))
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    pub fn require_confluence_base_url(&self) -> Result<String> {
        match self.confluence_base_url() {
            Some(value) => Ok(value),
            None => bail!("CONFLUENCE_BASE_URL is not set (env or [confluence].base_url)"),
        }
    }

    pub fn require_outline_base_url(&self) -> Result<String> {
        match self.outline_base_url() {
            Some(value) => Ok(value),
            None => bail!("OUTLINE_BASE_URL is not set (env or [outline].base_url)"),
        }
    }

    pub fn require_outline_api_token(&self) -> Result<String> {
        match self.outline_api_token() {
            Some(value) => Ok(value),
            None => bail!("OUTLINE_API_TOKEN is not set (env or [outline].api_token)"),
        }
    }
}

/// Load and parse a MigrateConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<MigrateConfig> {
    if !config_path.exists() {
        return Ok(MigrateConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: MigrateConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

/// Host prefix used when Confluence links were written as absolute URLs.
pub fn confluence_web_host(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

/// Derive the Outline web host from its API URL by stripping `/api`.
pub fn outline_web_host(base_url: &str) -> String {
    let trimmed = base_url.trim().trim_end_matches('/');
    trimmed
        .strip_suffix("/api")
        .unwrap_or(trimmed)
        .trim_end_matches('/')
        .to_string()
}

pub(crate) fn env_value_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

pub(crate) fn env_value_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_override(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}
