use std::path::PathBuf;

use thiserror::Error;

/// Prefix of every environment variable read by [`load`].
pub const ENV_PREFIX: &str = "COURIER_";

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8842";

#[derive(Debug, Clone)]
pub struct Config {
    /// Start in maintenance mode: no store is opened and every gated request gets a 503.
    pub maintenance: bool,
    pub bind_addr: String,
    pub log_level: tracing::Level,
    /// Human readable logs instead of JSON.
    pub console_log: bool,
    pub local_storage: LocalStorageConfig,
    pub gcp_secret_manager: GcpSecretsConfig,
}

#[derive(Debug, Clone, Default)]
pub struct LocalStorageConfig {
    pub enabled: bool,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct GcpSecretsConfig {
    pub enabled: bool,
    /// Path to a service account JSON key.
    pub credentials: Option<PathBuf>,
    pub project: Option<String>,
    /// Per-call timeout in seconds.
    pub timeout: u64,
}

impl Default for GcpSecretsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            credentials: None,
            project: None,
            timeout: 30,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            maintenance: false,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            log_level: tracing::Level::INFO,
            console_log: false,
            local_storage: LocalStorageConfig::default(),
            gcp_secret_manager: GcpSecretsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid configuration: missing bindaddr")]
    MissingBindAddr,

    #[error("invalid configuration: must enable either local storage or secret manager storage")]
    NoStorage,

    #[error("invalid configuration: cannot enable both local storage and secret manager storage")]
    MultipleStorage,

    #[error("invalid configuration: missing path for local storage")]
    MissingLocalPath,

    #[error("invalid configuration: missing credentials for secret manager storage")]
    MissingCredentials,

    #[error("invalid configuration: missing project name for secret manager storage")]
    MissingProject,

    #[error("invalid configuration: could not parse {var}={value}")]
    Parse { var: String, value: String },
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_addr.trim().is_empty() {
            return Err(ConfigError::MissingBindAddr);
        }

        // No store is opened in maintenance mode.
        if !self.maintenance {
            match (self.local_storage.enabled, self.gcp_secret_manager.enabled) {
                (false, false) => return Err(ConfigError::NoStorage),
                (true, true) => return Err(ConfigError::MultipleStorage),
                _ => {}
            }
        }

        if self.local_storage.enabled && self.local_storage.path.is_none() {
            return Err(ConfigError::MissingLocalPath);
        }

        if self.gcp_secret_manager.enabled {
            if self.gcp_secret_manager.credentials.is_none() {
                return Err(ConfigError::MissingCredentials);
            }
            if self.gcp_secret_manager.project.is_none() {
                return Err(ConfigError::MissingProject);
            }
        }

        Ok(())
    }

    /// Default `EnvFilter` directive derived from the configured level.
    pub fn log_filter(&self) -> String {
        let level = self.log_level.to_string().to_lowercase();
        format!("courier={level},tower_http={level}")
    }
}

/// Load and validate configuration from the environment, reading `.env` first if present.
pub fn load() -> Result<Config, ConfigError> {
    dotenvy::dotenv().ok();
    let conf = load_from(|key| std::env::var(key).ok())?;
    conf.validate()?;
    Ok(conf)
}

/// Build configuration from an arbitrary variable lookup without validating it.
pub fn load_from<F>(lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let env = Env { lookup };
    let defaults = Config::default();

    Ok(Config {
        maintenance: env.parse("MAINTENANCE")?.unwrap_or(defaults.maintenance),
        bind_addr: env.string("BIND_ADDR").unwrap_or(defaults.bind_addr),
        log_level: env.parse("LOG_LEVEL")?.unwrap_or(defaults.log_level),
        console_log: env.parse("CONSOLE_LOG")?.unwrap_or(defaults.console_log),
        local_storage: LocalStorageConfig {
            enabled: env.parse("LOCAL_STORAGE_ENABLED")?.unwrap_or(false),
            path: env.string("LOCAL_STORAGE_PATH").map(PathBuf::from),
        },
        gcp_secret_manager: GcpSecretsConfig {
            enabled: env.parse("GCP_SECRET_MANAGER_ENABLED")?.unwrap_or(false),
            credentials: env.string("GCP_SECRET_MANAGER_CREDENTIALS").map(PathBuf::from),
            project: env.string("GCP_SECRET_MANAGER_PROJECT"),
            timeout: env
                .parse("GCP_SECRET_MANAGER_TIMEOUT")?
                .unwrap_or(defaults.gcp_secret_manager.timeout),
        },
    })
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Non-empty value of `COURIER_<name>`.
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(&format!("{}{}", ENV_PREFIX, name))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: std::str::FromStr>(&self, name: &str) -> Result<Option<T>, ConfigError> {
        let Some(value) = self.string(name) else {
            return Ok(None);
        };
        value
            .to_lowercase()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Parse {
                var: format!("{}{}", ENV_PREFIX, name),
                value,
            })
    }
}
