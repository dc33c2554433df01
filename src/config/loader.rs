//! Configuration Loader
//!
//! Layers, lowest precedence first: built-in defaults, `config/booking.toml`,
//! `config/booking.<environment>.toml`, then `BOOKING_*` environment variables
//! (`__` separates nested keys, e.g. `BOOKING_MATCHING__FANOUT=5`).

use super::error::ConfigResult;
use super::BookingConfig;
use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const ENV_PREFIX: &str = "BOOKING";
const DEFAULT_CONFIG_DIRECTORY: &str = "config";
const BASE_FILE_NAME: &str = "booking";

/// Loaded, validated configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: BookingConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration with an explicit environment, without touching process state
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory =
            config_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIRECTORY));

        debug!(
            environment = %environment,
            directory = %config_directory.display(),
            "Loading booking configuration"
        );

        let base = config_directory.join(format!("{BASE_FILE_NAME}.toml"));
        let overlay = config_directory.join(format!("{BASE_FILE_NAME}.{environment}.toml"));

        let config = Self::build(&[base.as_path(), overlay.as_path()])?;
        config.validate()?;

        info!(
            environment = %environment,
            backend = ?config.database.backend,
            fanout = config.matching.fanout,
            offer_window_seconds = config.matching.offer_window_seconds,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Load a single TOML file (plus environment overrides)
    pub fn load_from_file(path: &Path) -> ConfigResult<Arc<ConfigManager>> {
        let config = Self::build(&[path])?;
        config.validate()?;

        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            config_directory: path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIRECTORY)),
        }))
    }

    /// Wrap an already-built configuration, e.g. in tests
    pub fn from_config(config: BookingConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            config_directory: PathBuf::from(DEFAULT_CONFIG_DIRECTORY),
        }))
    }

    fn build(files: &[&Path]) -> ConfigResult<BookingConfig> {
        let mut builder = Config::builder();
        for file in files {
            builder = builder.add_source(
                File::from(file.to_path_buf())
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }
        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize::<BookingConfig>()?)
    }

    pub fn config(&self) -> &BookingConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Current environment from `BOOKING_ENV`, then `APP_ENV`
    pub fn detect_environment() -> String {
        env::var("BOOKING_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreBackend;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_files_yield_defaults() {
        let dir = TempDir::new().unwrap();
        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
                .unwrap();
        assert_eq!(manager.config().matching.fanout, 3);
        assert_eq!(manager.environment(), "test");
        assert_eq!(manager.config().database.backend, StoreBackend::Memory);
    }

    #[test]
    fn test_environment_overlay_wins() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("booking.toml"),
            "[matching]\nfanout = 4\noffer_window_seconds = 45\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("booking.test.toml"),
            "[matching]\nfanout = 2\n",
        )
        .unwrap();

        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
                .unwrap();
        assert_eq!(manager.config().matching.fanout, 2);
        assert_eq!(manager.config().matching.offer_window_seconds, 45);
    }

    #[test]
    fn test_invalid_file_values_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[cancellation]\nlate_fee_percent = 150\n").unwrap();
        assert!(ConfigManager::load_from_file(&path).is_err());
    }

    #[test]
    fn test_service_rules_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("booking.toml");
        fs::write(
            &path,
            r#"
[scheduling.services.plumbing]
allow_instant = false
min_lead_minutes = 60
open_hour = 8
close_hour = 18
closed_days = ["Sun"]

[notifications.service_templates.plumbing]
accepted = "Plumber {provider_id} is booked"
"#,
        )
        .unwrap();

        let manager = ConfigManager::load_from_file(&path).unwrap();
        let rule = manager.config().scheduling.rule_for("plumbing");
        assert!(!rule.allow_instant);
        assert_eq!(rule.open_hour, 8);
        assert_eq!(rule.closed_days, vec![chrono::Weekday::Sun]);
        assert_eq!(
            manager.config().notifications.service_templates["plumbing"]["accepted"],
            "Plumber {provider_id} is booked"
        );
    }
}
