use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Deployment stage, read from `APP_ENV`. Anything unrecognised is treated as development.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppEnvironment {
    #[default]
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Everything the service reads from the process environment (and `.env`, when present).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub storage: StorageConfig,
    pub catalog: CatalogConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = non_blank("APP_ENV")
            .map(|value| AppEnvironment::parse(&value))
            .unwrap_or_default();

        let port = match non_blank("APP_PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::InvalidPort { raw })?,
            None => DEFAULT_PORT,
        };
        let server = ServerConfig {
            host: non_blank("APP_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
        };

        let telemetry = TelemetryConfig {
            log_level: non_blank("APP_LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        };

        let busy_timeout_ms = match non_blank("APP_DATABASE_BUSY_TIMEOUT_MS") {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidBusyTimeout { raw })?,
            None => DEFAULT_BUSY_TIMEOUT_MS,
        };
        let storage = StorageConfig {
            database_path: non_blank("APP_DATABASE_PATH").map(PathBuf::from),
            busy_timeout: Duration::from_millis(busy_timeout_ms),
        };

        let catalog = CatalogConfig {
            seed_csv: non_blank("APP_CATALOG_CSV").map(PathBuf::from),
        };
        catalog.ensure_readable()?;

        Ok(Self {
            environment,
            server,
            telemetry,
            storage,
            catalog,
        })
    }
}

/// Blank values count as unset so an empty line in `.env` falls back to the default.
fn non_blank(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip = if self.host.eq_ignore_ascii_case("localhost") {
            IpAddr::from([127, 0, 0, 1])
        } else {
            self.host
                .parse::<IpAddr>()
                .map_err(|source| ConfigError::InvalidHost {
                    host: self.host.clone(),
                    source,
                })?
        };

        Ok(SocketAddr::new(ip, self.port))
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Where assessment data lives. Without a database path the service keeps everything in
/// memory for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub database_path: Option<PathBuf>,
    /// Wait for a competing writer before the request fails as a retryable conflict.
    pub busy_timeout: Duration,
}

/// Optional catalog CSV imported before the server starts accepting traffic.
#[derive(Debug, Clone, Default)]
pub struct CatalogConfig {
    pub seed_csv: Option<PathBuf>,
}

impl CatalogConfig {
    fn ensure_readable(&self) -> Result<(), ConfigError> {
        match &self.seed_csv {
            Some(path) if !path.is_file() => Err(ConfigError::MissingCatalog { path: path.clone() }),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("APP_PORT `{raw}` is not a valid port number")]
    InvalidPort { raw: String },
    #[error("APP_HOST `{host}` must be `localhost` or an IPv4/IPv6 address")]
    InvalidHost {
        host: String,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("APP_DATABASE_BUSY_TIMEOUT_MS `{raw}` is not a number of milliseconds")]
    InvalidBusyTimeout { raw: String },
    #[error("APP_CATALOG_CSV points at {} which is not a readable file", path.display())]
    MissingCatalog { path: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    const KEYS: [&str; 7] = [
        "APP_ENV",
        "APP_HOST",
        "APP_PORT",
        "APP_LOG_LEVEL",
        "APP_DATABASE_PATH",
        "APP_DATABASE_BUSY_TIMEOUT_MS",
        "APP_CATALOG_CSV",
    ];

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn clear_env() {
        for key in KEYS {
            env::remove_var(key);
        }
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        clear_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, DEFAULT_HOST);
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.telemetry.log_level, DEFAULT_LOG_LEVEL);
        assert!(config.storage.database_path.is_none());
        assert_eq!(config.storage.busy_timeout, Duration::from_secs(5));
        assert!(config.catalog.seed_csv.is_none());
    }

    #[test]
    fn busy_timeout_reads_milliseconds() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        clear_env();
        env::set_var("APP_DATABASE_BUSY_TIMEOUT_MS", "250");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.storage.busy_timeout, Duration::from_millis(250));

        env::set_var("APP_DATABASE_BUSY_TIMEOUT_MS", "soon");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidBusyTimeout { .. })
        ));
        clear_env();
    }

    #[test]
    fn localhost_binds_the_loopback_address() {
        let server = ServerConfig {
            host: "LocalHost".to_string(),
            port: 8080,
        };
        let addr = server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 8080));

        let server = ServerConfig {
            host: "assessments.internal".to_string(),
            port: 8080,
        };
        assert!(matches!(
            server.socket_addr(),
            Err(ConfigError::InvalidHost { host, .. }) if host == "assessments.internal"
        ));
    }

    #[test]
    fn invalid_port_is_reported_with_its_value() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        clear_env();
        env::set_var("APP_PORT", "not-a-port");
        match AppConfig::load() {
            Err(ConfigError::InvalidPort { raw }) => assert_eq!(raw, "not-a-port"),
            other => panic!("expected invalid port, got {other:?}"),
        }
        clear_env();
    }

    #[test]
    fn storage_and_catalog_paths_are_trimmed() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        clear_env();
        env::set_var("APP_ENV", "production");
        env::set_var("APP_DATABASE_PATH", " /var/lib/assessments.db ");
        env::set_var("APP_CATALOG_CSV", "");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.environment, AppEnvironment::Production);
        assert_eq!(
            config.storage.database_path,
            Some(PathBuf::from("/var/lib/assessments.db"))
        );
        assert!(config.catalog.seed_csv.is_none(), "blank values are unset");

        env::set_var("APP_CATALOG_CSV", "./no-such-catalog.csv");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::MissingCatalog { .. })
        ));
        clear_env();
    }
}
