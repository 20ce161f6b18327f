//! Configuration and settings management
//!
//! Loads settings from environment variables and optional config files.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    pub telegram_token: String,

    /// R2 Storage access key ID
    pub r2_access_key_id: Option<String>,
    /// R2 Storage secret access key
    pub r2_secret_access_key: Option<String>,
    /// R2 Storage endpoint URL
    pub r2_endpoint_url: Option<String>,
    /// R2 Storage bucket name
    pub r2_bucket_name: Option<String>,
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(File::with_name("config/default").required(false))
            // Add in the current environment file
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Add in a local configuration file
            // This file shouldn't be checked into git
            .add_source(File::with_name("config/local").required(false))
            // Add in settings from the environment (with a prefix of APP)
            .add_source(Environment::with_prefix("APP").separator("__"))
            // Also add settings from environment variables directly (without prefix)
            // Note: Environment::default() auto-converts UPPER_SNAKE_CASE to snake_case
            // ignore_empty treats empty env vars as unset
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;

        // Fallback: check the R2 environment variables directly if config
        // didn't pick them up through the automatic mapping
        if settings.r2_endpoint_url.is_none() {
            settings.r2_endpoint_url = non_empty_env("R2_ENDPOINT_URL");
        }
        if settings.r2_access_key_id.is_none() {
            settings.r2_access_key_id = non_empty_env("R2_ACCESS_KEY_ID");
        }
        if settings.r2_secret_access_key.is_none() {
            settings.r2_secret_access_key = non_empty_env("R2_SECRET_ACCESS_KEY");
        }
        if settings.r2_bucket_name.is_none() {
            settings.r2_bucket_name = non_empty_env("R2_BUCKET_NAME");
        }

        Ok(settings)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    // Tests run sequentially to avoid environment variable race conditions
    #[test]
    fn test_config_env_loading() -> Result<(), Box<dyn std::error::Error>> {
        // 1. Standard loading
        env::set_var("R2_ENDPOINT_URL", "https://example.com");
        env::set_var("TELEGRAM_TOKEN", "dummy_token");

        let settings = Settings::new()?;
        assert_eq!(
            settings.r2_endpoint_url,
            Some("https://example.com".to_string())
        );
        assert_eq!(settings.telegram_token, "dummy_token");

        // 2. Empty env vars are treated as unset
        env::set_var("R2_ENDPOINT_URL", "");

        let settings = Settings::new()?;
        assert_eq!(settings.r2_endpoint_url, None);

        env::remove_var("R2_ENDPOINT_URL");
        env::remove_var("TELEGRAM_TOKEN");
        Ok(())
    }
}
