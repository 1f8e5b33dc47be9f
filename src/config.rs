//! Workbench configuration
//!
//! Values come from the process environment (after `.env` is loaded by the
//! binary); CLI flags override individual fields.

use crate::error::{Result, WorkbenchError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1000;
pub const DEFAULT_SELECT_LIMIT: usize = 100;
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o";
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";

/// Pacing of the ingestion loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Delay unit; the n-th processed source waits `base * 2^n`
    pub backoff_base: Duration,
    /// Optional ceiling on a single delay; uncapped when `None`
    pub max_backoff: Option<Duration>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            backoff_base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
            max_backoff: None,
        }
    }
}

/// Connection settings for the SQL assistant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_LLM_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkbenchConfig {
    /// Drop engine tables of sources removed from the desired list
    pub auto_cleanup: bool,
    pub loader: LoaderConfig,
    /// Row limit of the query generated when a data source is selected
    pub select_limit: usize,
    pub llm: LlmConfig,
}

impl Default for WorkbenchConfig {
    fn default() -> Self {
        Self {
            auto_cleanup: false,
            loader: LoaderConfig::default(),
            select_limit: DEFAULT_SELECT_LIMIT,
            llm: LlmConfig::default(),
        }
    }
}

impl WorkbenchConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let auto_cleanup = match lookup("WORKBENCH_AUTO_CLEANUP") {
            Some(raw) => parse_bool("WORKBENCH_AUTO_CLEANUP", &raw)?,
            None => defaults.auto_cleanup,
        };
        let backoff_base = match lookup("WORKBENCH_BACKOFF_BASE_MS") {
            Some(raw) => Duration::from_millis(parse_number("WORKBENCH_BACKOFF_BASE_MS", &raw)?),
            None => defaults.loader.backoff_base,
        };
        let max_backoff = lookup("WORKBENCH_MAX_BACKOFF_MS")
            .map(|raw| parse_number("WORKBENCH_MAX_BACKOFF_MS", &raw).map(Duration::from_millis))
            .transpose()?;
        let select_limit = match lookup("WORKBENCH_DEFAULT_LIMIT") {
            Some(raw) => parse_number("WORKBENCH_DEFAULT_LIMIT", &raw)? as usize,
            None => defaults.select_limit,
        };

        let llm = LlmConfig {
            base_url: lookup("BLOCKETHER_LLM_API_BASE_URL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.llm.base_url),
            api_key: lookup("BLOCKETHER_LLM_API_KEY").filter(|v| !v.trim().is_empty()),
            model: lookup("WORKBENCH_LLM_MODEL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.llm.model),
        };

        Ok(Self {
            auto_cleanup,
            loader: LoaderConfig {
                backoff_base,
                max_backoff,
            },
            select_limit,
            llm,
        })
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(WorkbenchError::Config(format!("{}: expected a boolean, got '{}'", key, other))),
    }
}

fn parse_number(key: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| WorkbenchError::Config(format!("{}: {}", key, e)))
}
