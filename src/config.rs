use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::error::AbsensiError;
use crate::settings::validate_time_of_day;

pub static CONFIG: OnceCell<Config> = OnceCell::new();

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoggingConfig {
    pub absensi: String,
}

impl LoggingConfig {
    const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
    const ABSENSI_LEVEL: &str = "info";

    fn default() -> Self {
        LoggingConfig {
            absensi: Self::ABSENSI_LEVEL.to_string(),
        }
    }

    fn ensure_valid(&mut self) {
        let str_original = self.absensi.clone();
        self.absensi = self.absensi.trim().to_ascii_lowercase();
        if !Self::LOG_LEVELS.contains(&self.absensi.as_str()) {
            eprintln!(
                "Config error: absensi log level of '{}' is invalid - using default of '{}'",
                str_original,
                Self::ABSENSI_LEVEL
            );
            self.absensi = Self::ABSENSI_LEVEL.to_owned();
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Browser origins allowed to call the API
    pub cors_origins: Vec<String>,
    /// Directory of a built frontend to serve as a SPA fallback (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<PathBuf>,
}

impl ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 5000,
            cors_origins: vec![
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string(),
                "http://localhost:5174".to_string(),
                "http://127.0.0.1:5174".to_string(),
            ],
            static_dir: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DatabaseConfig {
    /// Database file; relative paths resolve against the data directory
    pub path: PathBuf,
    pub pool_size: u32,
}

impl DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: PathBuf::from("absensi.db"),
            pool_size: 8,
        }
    }

    fn ensure_valid(&mut self) {
        if self.pool_size == 0 {
            eprintln!("Config error: database pool_size of 0 is invalid - using 1");
            self.pool_size = 1;
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
}

impl AuthConfig {
    const DEFAULT_TTL_HOURS: i64 = 24;

    fn default() -> Self {
        AuthConfig {
            jwt_secret: "change-me-in-config-toml".to_string(),
            token_ttl_hours: Self::DEFAULT_TTL_HOURS,
        }
    }

    fn ensure_valid(&mut self) {
        if self.token_ttl_hours <= 0 {
            eprintln!(
                "Config error: token_ttl_hours of '{}' is invalid - using default of '{}'",
                self.token_ttl_hours,
                Self::DEFAULT_TTL_HOURS
            );
            self.token_ttl_hours = Self::DEFAULT_TTL_HOURS;
        }
    }
}

/// Default school check-in window, used until an admin stores one
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SchoolConfig {
    pub check_in_start: String,
    pub check_in_end: String,
    pub late_tolerance_minutes: i64,
}

impl SchoolConfig {
    const START: &str = "06:00";
    const END: &str = "08:00";

    fn default() -> Self {
        SchoolConfig {
            check_in_start: Self::START.to_string(),
            check_in_end: Self::END.to_string(),
            late_tolerance_minutes: 15,
        }
    }

    fn ensure_valid(&mut self) {
        if let Err(e) = validate_time_of_day(&self.check_in_start) {
            eprintln!("Config error: check_in_start: {} - using default of '{}'", e, Self::START);
            self.check_in_start = Self::START.to_owned();
        }
        if let Err(e) = validate_time_of_day(&self.check_in_end) {
            eprintln!("Config error: check_in_end: {} - using default of '{}'", e, Self::END);
            self.check_in_end = Self::END.to_owned();
        }
        if self.late_tolerance_minutes < 0 {
            self.late_tolerance_minutes = 0;
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
    pub school: SchoolConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            logging: LoggingConfig::default(),
            school: SchoolConfig::default(),
        }
    }
}

impl Config {
    pub fn project_dirs() -> Result<ProjectDirs, AbsensiError> {
        ProjectDirs::from("", "", "absensi").ok_or_else(|| {
            AbsensiError::Error("Could not determine the application data directory".to_string())
        })
    }

    /// Loads the configuration from `config.toml` in the data directory, then
    /// `ABSENSI_` environment variables (nested keys separated by `__`).
    /// Writes the defaults to disk if no file exists.
    pub fn load_config(data_dir: &Path) -> Self {
        let config_path = data_dir.join("config.toml");
        let default_config = Config::default();

        if !config_path.exists() {
            if let Err(e) = fs::create_dir_all(data_dir) {
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

        let figment = Figment::from(Serialized::defaults(default_config.clone()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("ABSENSI_").split("__"));

        let mut config: Config = figment.extract().unwrap_or_else(|err| {
            eprintln!(
                "Could not load config file {}: {}. Using default configuration.",
                config_path.display(),
                err
            );
            default_config
        });

        config.ensure_valid();
        config.resolve_paths(data_dir);

        config
    }

    /// Installs the process-wide config. Later calls keep the first value.
    pub fn init(config: Config) -> &'static Config {
        if CONFIG.set(config).is_err() {
            log::warn!("Configuration was already initialised; keeping the first value");
        }
        CONFIG.get_or_init(Config::default)
    }

    fn resolve_paths(&mut self, data_dir: &Path) {
        if self.database.path.is_relative() {
            self.database.path = data_dir.join(&self.database.path);
        }
    }

    fn ensure_valid(&mut self) {
        self.logging.ensure_valid();
        self.database.ensure_valid();
        self.auth.ensure_valid();
        self.school.ensure_valid();
    }
}
