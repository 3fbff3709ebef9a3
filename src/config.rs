//! Configuration management for Herdbook Server

use serde::Deserialize;
use std::env;
use thiserror::Error;

/// Default page size for pull requests
pub const DEFAULT_PULL_PAGE_SIZE: usize = 1000;

/// Default maximum number of items accepted in one push batch
pub const DEFAULT_MAX_PUSH_ITEMS: usize = 500;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Maximum changes returned by a single pull, also the per-type query cap
    pub pull_page_size: usize,
    /// Push batches above this size are rejected outright
    pub max_push_items: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            database: DatabaseConfig {
                url: "sqlite:./herdbook.db".to_string(),
            },
            sync: SyncConfig::default(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            pull_page_size: DEFAULT_PULL_PAGE_SIZE,
            max_push_items: DEFAULT_MAX_PUSH_ITEMS,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_var("SERVER_PORT", 3000)?,
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite:./herdbook.db".to_string()),
            },
            sync: SyncConfig {
                pull_page_size: parse_positive("SYNC_PULL_PAGE_SIZE", DEFAULT_PULL_PAGE_SIZE)?,
                max_push_items: parse_positive("SYNC_MAX_PUSH_ITEMS", DEFAULT_MAX_PUSH_ITEMS)?,
            },
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        Err(_) => Ok(default),
    }
}

fn parse_positive(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    let value = parse_var(name, default)?;
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            name,
            value: "0".to_string(),
        });
    }
    Ok(value)
}
