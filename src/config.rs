use std::fs;
use std::path::PathBuf;

use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::error::AlertError;

pub static CONFIG: OnceCell<Config> = OnceCell::new();

const APP_NAME: &str = "versionalert";
const ENV_PREFIX: &str = "VERSIONALERT_";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub versionalert: String,
}

impl LoggingConfig {
    const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
    const DEFAULT_LEVEL: &str = "info";

    fn default() -> Self {
        LoggingConfig {
            versionalert: Self::DEFAULT_LEVEL.to_string(),
        }
    }

    fn ensure_valid(&mut self) {
        let str_original = self.versionalert.clone();
        self.versionalert = self.versionalert.trim().to_ascii_lowercase();
        if !Self::LOG_LEVELS.contains(&self.versionalert.as_str()) {
            eprintln!(
                "Config error: versionalert log level of '{}' is invalid - using default of '{}'",
                str_original,
                Self::DEFAULT_LEVEL
            );
            self.versionalert = Self::DEFAULT_LEVEL.to_owned();
        }
    }

    /// Log specification handed to flexi_logger
    pub fn log_spec(&self) -> String {
        format!("warn, versionalert={}", self.versionalert)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8090,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Log,
    JsonLines,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NotificationsConfig {
    pub topic: String,
    pub env_base_url: String,
    pub actor_secret: String,
    sink: String,
    pub jsonl_path: PathBuf,
    threads: usize,
}

impl NotificationsConfig {
    const SINKS: [&str; 2] = ["log", "jsonl"];
    const SINK_LOG: &str = "log";
    const SINK_JSONL: &str = "jsonl";
    const DEFAULT_THREADS: usize = 2;

    pub const DEFAULT_TOPIC: &str = "user-action.tech-debt";

    fn default(data_dir: &std::path::Path) -> Self {
        NotificationsConfig {
            topic: Self::DEFAULT_TOPIC.to_string(),
            env_base_url: "http://localhost:3001".to_string(),
            actor_secret: String::new(),
            sink: Self::SINK_LOG.to_owned(),
            jsonl_path: data_dir.join("tech-debt-events.jsonl"),
            threads: Self::DEFAULT_THREADS,
        }
    }

    pub fn sink_kind(&self) -> SinkKind {
        match self.sink.as_str() {
            Self::SINK_JSONL => SinkKind::JsonLines,
            _ => SinkKind::Log,
        }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    fn ensure_valid(&mut self) {
        let str_original = self.sink.clone();
        self.sink = self.sink.trim().to_ascii_lowercase();
        if !Self::SINKS.contains(&self.sink.as_str()) {
            eprintln!(
                "Config error: notification sink of '{}' is invalid - using default of '{}'",
                str_original,
                Self::SINK_LOG
            );
            self.sink = Self::SINK_LOG.to_owned();
        }

        if self.threads == 0 {
            eprintln!(
                "Config error: notification threads must be at least 1 - using default of {}",
                Self::DEFAULT_THREADS
            );
            self.threads = Self::DEFAULT_THREADS;
        }

        if self.topic.trim().is_empty() {
            self.topic = Self::DEFAULT_TOPIC.to_owned();
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    pub logging: LoggingConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub notifications: NotificationsConfig,
}

impl Config {
    fn default_for(data_dir: &std::path::Path) -> Self {
        Config {
            logging: LoggingConfig::default(),
            database: DatabaseConfig {
                path: data_dir.join("versionalert.db"),
            },
            server: ServerConfig::default(),
            notifications: NotificationsConfig::default(data_dir),
        }
    }

    /// Loads the configuration from `config.toml` in the app's data directory,
    /// layered over the defaults and under `VERSIONALERT_` environment variables.
    /// Writes the default config to disk if no file exists.
    pub fn load_config() -> Result<Self, AlertError> {
        let project_dirs = ProjectDirs::from("", "", APP_NAME).ok_or_else(|| {
            AlertError::Error("Could not determine the application data directory".into())
        })?;
        let data_dir = project_dirs.data_local_dir().to_path_buf();
        let config_path = data_dir.join("config.toml");

        let default_config = Self::default_for(&data_dir);

        if !config_path.exists() {
            if let Err(e) = fs::create_dir_all(&data_dir) {
                eprintln!(
                    "Failed to create configuration directory {}: {}",
                    data_dir.display(),
                    e
                );
            }
            if let Ok(toml_string) = toml::to_string_pretty(&default_config) {
                if let Err(e) = fs::write(&config_path, toml_string) {
                    eprintln!(
                        "Failed to write default config to {}: {}",
                        config_path.display(),
                        e
                    );
                }
            } else {
                eprintln!("Failed to serialize default config.");
            }
        }

        Ok(Self::from_figment(
            Self::figment(default_config.clone(), &config_path),
            default_config,
        ))
    }

    fn figment(defaults: Config, config_path: &std::path::Path) -> Figment {
        Figment::from(Serialized::defaults(defaults))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    fn from_figment(figment: Figment, default_config: Config) -> Self {
        let mut config: Config = figment.extract().unwrap_or_else(|err| {
            eprintln!(
                "Could not load configuration: {}. Using default configuration.",
                err
            );
            default_config
        });

        config.ensure_valid();
        config
    }

    fn ensure_valid(&mut self) {
        self.logging.ensure_valid();
        self.notifications.ensure_valid();
    }

    /// Loads the configuration once and stores it globally
    pub fn init() -> Result<&'static Config, AlertError> {
        CONFIG.get_or_try_init(Self::load_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn defaults() -> Config {
        Config::default_for(Path::new("/data"))
    }

    #[test]
    fn test_defaults_are_valid() {
        let mut config = defaults();
        let before = config.clone();
        config.ensure_valid();
        assert_eq!(config, before);
        assert_eq!(config.notifications.sink_kind(), SinkKind::Log);
        assert_eq!(config.database.path, Path::new("/data/versionalert.db"));
    }

    #[test]
    fn test_toml_and_env_override_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [server]
                port = 9000

                [notifications]
                sink = "JSONL"
                env_base_url = "https://app.example.com"
                "#,
            )?;
            jail.set_env("VERSIONALERT_LOGGING__VERSIONALERT", "debug");

            let config = Config::from_figment(
                Config::figment(defaults(), Path::new("config.toml")),
                defaults(),
            );

            assert_eq!(config.server.port, 9000);
            assert_eq!(config.server.host, "127.0.0.1");
            assert_eq!(config.notifications.sink_kind(), SinkKind::JsonLines);
            assert_eq!(config.notifications.env_base_url, "https://app.example.com");
            assert_eq!(config.logging.versionalert, "debug");
            Ok(())
        });
    }

    #[test]
    fn test_invalid_values_fall_back() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [logging]
                versionalert = "loud"

                [notifications]
                sink = "carrier-pigeon"
                threads = 0
                topic = "  "
                "#,
            )?;

            let config = Config::from_figment(
                Config::figment(defaults(), Path::new("config.toml")),
                defaults(),
            );

            assert_eq!(config.logging.versionalert, "info");
            assert_eq!(config.notifications.sink_kind(), SinkKind::Log);
            assert_eq!(config.notifications.threads(), 2);
            assert_eq!(config.notifications.topic, NotificationsConfig::DEFAULT_TOPIC);
            Ok(())
        });
    }

    #[test]
    fn test_log_spec() {
        let logging = LoggingConfig {
            versionalert: "debug".into(),
        };
        assert_eq!(logging.log_spec(), "warn, versionalert=debug");
    }
}
