// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Streaming service configuration.
//!
//! Supports both programmatic and file-based configuration.

use crate::codec::Category;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Streaming service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// HTTP / WebSocket port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Sample generator period (milliseconds).
    #[serde(default = "default_sample_period_ms")]
    pub sample_period_ms: u64,

    /// First tick stamp emitted by the generator.
    #[serde(default)]
    pub start_tick: u32,

    /// Categories the generator cycles through, one per tick.
    #[serde(default = "default_categories")]
    pub categories: Vec<Category>,

    /// Per-session queue bound (0 = unbounded).
    #[serde(default)]
    pub queue_capacity: usize,

    /// Maximum concurrent WebSocket sessions.
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,

    /// Directory of browser assets served at `/`.
    #[serde(default = "default_web_dir")]
    pub web_dir: PathBuf,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_sample_period_ms() -> u64 {
    100
}

fn default_categories() -> Vec<Category> {
    vec![Category::OrientationPosition, Category::Position]
}

fn default_max_clients() -> usize {
    100
}

fn default_web_dir() -> PathBuf {
    PathBuf::from("web")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            sample_period_ms: default_sample_period_ms(),
            start_tick: 0,
            categories: default_categories(),
            queue_capacity: 0,
            max_clients: default_max_clients(),
            web_dir: default_web_dir(),
            log_level: default_log_level(),
        }
    }
}

impl StreamConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_period_ms == 0 {
            return Err(ConfigError::Invalid(
                "sample_period_ms must be greater than 0".into(),
            ));
        }

        if self.categories.is_empty() {
            return Err(ConfigError::Invalid(
                "At least one sample category is required".into(),
            ));
        }

        if self.max_clients == 0 {
            return Err(ConfigError::Invalid(
                "max_clients must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    pub fn sample_period(&self) -> Duration {
        Duration::from_millis(self.sample_period_ms)
    }

    /// `bind:port` listen address.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
