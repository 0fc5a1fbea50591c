use anyhow::Result;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub library: LibraryConfig,
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Static asset root served for unmatched paths (holds `img/no-cover.png`).
    pub static_dir: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuthConfig {
    /// When false every session is treated as authenticated.
    pub enabled: bool,
    /// Argon2 PHC string checked by the login route.
    pub password_hash: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LibraryConfig {
    /// Optional JSON file with the manga catalog to load at startup.
    pub seed_path: Option<PathBuf>,
    /// Serialize gated handlers behind the library master lock.
    pub master_lock: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    pub root: PathBuf,
    pub placeholder_path: String,
    pub fetch_timeout_seconds: u64,
    pub user_agent: String,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Write a daily rolling log file here in addition to stdout.
    pub directory: Option<PathBuf>,
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::builder()?
            .add_source(File::with_name("config/settings").required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }

    /// Settings with every default applied and no external sources.
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::builder()?.build()?.try_deserialize()
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 4567)?
            .set_default("server.static_dir", "static")?
            .set_default("auth.enabled", false)?
            .set_default("library.master_lock", true)?
            .set_default("cache.root", "data/cover_cache")?
            .set_default("cache.placeholder_path", "/img/no-cover.png")?
            .set_default("cache.fetch_timeout_seconds", 30)?
            .set_default(
                "cache.user_agent",
                concat!("library-api-server/", env!("CARGO_PKG_VERSION")),
            )
    }
}
