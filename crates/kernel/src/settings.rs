use std::path::PathBuf;

use anyhow::{anyhow, Context};
use serde::Deserialize;

const DEFAULT_ENV: &str = "local";
const ENV_VAR_NAME: &str = "TASKDB_ENV";
const CONFIG_DIR_ENV: &str = "TASKDB_CONFIG_DIR";
const ENV_PREFIX: &str = "TASKDB";

/// Deployment environment the bootstrap is running in.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Local,
    Staging,
    Production,
}

/// Top-level configuration structure loaded from layered sources.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
    #[serde(default)]
    pub seed: SeedSettings,
}

impl Settings {
    /// Load configuration by layering `.env`, base file, environment overlay,
    /// and `TASKDB_*` variables.
    pub fn load() -> anyhow::Result<Self> {
        // Allow missing `.env` files without failing.
        let _ = dotenvy::dotenv();

        let environment = std::env::var(ENV_VAR_NAME).unwrap_or_else(|_| DEFAULT_ENV.to_string());
        let config_dir = match std::env::var(CONFIG_DIR_ENV) {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => std::env::current_dir()
                .context("unable to resolve current directory")?
                .join("config"),
        };

        Self::load_from(&config_dir, &environment)
    }

    /// Load configuration from an explicit directory and environment name.
    pub fn load_from(config_dir: &std::path::Path, environment: &str) -> anyhow::Result<Self> {
        let base_path = config_dir.join("base.toml");
        let environment_path = config_dir.join(format!("{}.toml", environment));

        let builder = config::Config::builder()
            .add_source(config::File::from(base_path).required(false))
            .add_source(config::File::from(environment_path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            );

        let cfg = builder
            .build()
            .with_context(|| "failed to build configuration")?;

        let mut settings: Settings = cfg
            .try_deserialize()
            .with_context(|| "failed to deserialize configuration")?;

        settings.environment = parse_environment(environment)?;

        Ok(settings)
    }
}

fn parse_environment(name: &str) -> anyhow::Result<Environment> {
    match name {
        "local" => Ok(Environment::Local),
        "staging" => Ok(Environment::Staging),
        "production" => Ok(Environment::Production),
        other => Err(anyhow!(
            "unsupported environment '{}'; expected local/staging/production",
            other
        )),
    }
}

/// What to do when a collection or index the bootstrap declares already exists.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExistingPolicy {
    /// Abort on the first pre-existing collection.
    #[default]
    Fail,
    /// Leave existing objects untouched and create only what is missing.
    Skip,
}

impl std::fmt::Display for ExistingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExistingPolicy::Fail => f.write_str("fail"),
            ExistingPolicy::Skip => f.write_str("skip"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "DatabaseSettings::default_uri")]
    pub uri: String,
    #[serde(default = "DatabaseSettings::default_name")]
    pub name: String,
    #[serde(default = "DatabaseSettings::default_app_name")]
    pub app_name: String,
    #[serde(default = "DatabaseSettings::default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "DatabaseSettings::default_server_selection_timeout_ms")]
    pub server_selection_timeout_ms: u64,
    #[serde(default)]
    pub on_existing: ExistingPolicy,
}

impl DatabaseSettings {
    fn default_uri() -> String {
        "mongodb://127.0.0.1:27017".to_string()
    }

    fn default_name() -> String {
        "taskmanager".to_string()
    }

    fn default_app_name() -> String {
        "taskdb".to_string()
    }

    fn default_connect_timeout_ms() -> u64 {
        10_000
    }

    fn default_server_selection_timeout_ms() -> u64 {
        10_000
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            uri: Self::default_uri(),
            name: Self::default_name(),
            app_name: Self::default_app_name(),
            connect_timeout_ms: Self::default_connect_timeout_ms(),
            server_selection_timeout_ms: Self::default_server_selection_timeout_ms(),
            on_existing: ExistingPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetrySettings {
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default = "TelemetrySettings::default_filter")]
    pub filter: String,
}

impl TelemetrySettings {
    fn default_filter() -> String {
        "info".to_string()
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            filter: Self::default_filter(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Opt-in admin account seeding. Disabled unless `enabled` is set and a
/// password is supplied.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "SeedSettings::default_admin_username")]
    pub admin_username: String,
    #[serde(default = "SeedSettings::default_admin_email")]
    pub admin_email: String,
    #[serde(default)]
    pub admin_password: Option<String>,
    #[serde(default = "SeedSettings::default_admin_first_name")]
    pub admin_first_name: String,
    #[serde(default = "SeedSettings::default_admin_last_name")]
    pub admin_last_name: String,
}

impl SeedSettings {
    fn default_admin_username() -> String {
        "admin".to_string()
    }

    fn default_admin_email() -> String {
        "admin@taskmanager.com".to_string()
    }

    fn default_admin_first_name() -> String {
        "Admin".to_string()
    }

    fn default_admin_last_name() -> String {
        "User".to_string()
    }
}

impl Default for SeedSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            admin_username: Self::default_admin_username(),
            admin_email: Self::default_admin_email(),
            admin_password: None,
            admin_first_name: Self::default_admin_first_name(),
            admin_last_name: Self::default_admin_last_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_environment_is_local() {
        let settings = Settings::default();
        assert_eq!(settings.environment, Environment::Local);
    }

    #[test]
    fn default_database_targets_taskmanager() {
        let settings = Settings::default();
        assert_eq!(settings.database.uri, "mongodb://127.0.0.1:27017");
        assert_eq!(settings.database.name, "taskmanager");
        assert_eq!(settings.database.on_existing, ExistingPolicy::Fail);
    }

    #[test]
    fn seeding_is_disabled_by_default() {
        let seed = SeedSettings::default();
        assert!(!seed.enabled);
        assert!(seed.admin_password.is_none());
        assert_eq!(seed.admin_email, "admin@taskmanager.com");
    }

    #[test]
    fn unknown_environment_is_rejected() {
        let err = parse_environment("qa").unwrap_err();
        assert!(err.to_string().contains("unsupported environment 'qa'"));
    }

    #[test]
    fn environment_overlay_overrides_base_file() {
        let dir = std::env::temp_dir().join(format!("taskdb-settings-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("base.toml"),
            "[database]\nname = \"base_db\"\non_existing = \"skip\"\n",
        )
        .unwrap();
        std::fs::write(dir.join("staging.toml"), "[database]\nname = \"staging_db\"\n").unwrap();

        let settings = Settings::load_from(&dir, "staging").unwrap();
        std::fs::remove_dir_all(&dir).ok();

        assert_eq!(settings.environment, Environment::Staging);
        assert_eq!(settings.database.name, "staging_db");
        assert_eq!(settings.database.on_existing, ExistingPolicy::Skip);
        assert_eq!(settings.telemetry.filter, "info");
    }
}
