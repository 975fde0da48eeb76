//! Configuration loader

use config::{Config, Environment, File};
use std::path::Path;

use super::types::AppConfig;
use crate::common::errors::{Result, RobotError};

/// Load configuration from file and environment variables
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with ROBOT__)
/// 2. Configuration file (TOML format)
/// 3. Default values
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    // Try to load from .env file
    dotenvy::dotenv().ok();

    let mut builder = Config::builder();

    // Add config file if it exists
    if let Some(path) = config_path {
        if Path::new(path).exists() {
            builder = builder.add_source(File::with_name(path).required(false));
        }
    }

    // Add environment variables with ROBOT prefix
    builder = builder.add_source(
        Environment::with_prefix("ROBOT")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder
        .build()
        .map_err(|e| RobotError::Configuration(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| RobotError::Configuration(e.to_string()))
}
