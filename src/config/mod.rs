//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

pub use cli::{
    CliArgs, Command, DatabaseOverride, PurgeArgs, RegisterArgs, ServeArgs, ServeOverrides,
};

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "cachepoint";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_ADMIN_HOST: &str = "127.0.0.1";
const DEFAULT_PUBLIC_PORT: u16 = 3000;
const DEFAULT_ADMIN_PORT: u16 = 3001;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_FRESHNESS_WINDOW_SECS: u64 = 120;
const DEFAULT_BATCH_LIMIT: u32 = 5;
const DEFAULT_PAGE_SIZE: u32 = 20;
const DEFAULT_PURGE_TTL_SECS: u64 = 60;
const DEFAULT_PURGE_CHUNK_SIZE: u32 = 100;
const DEFAULT_LOOKUP_CACHE_SIZE: u32 = 1024;
const DEFAULT_UPLOAD_ENDPOINT: &str = "/upload";
const DEFAULT_INSTALL_ROOT: &str = ".";
const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub delivery: DeliverySettings,
    pub auth: AuthSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub public_addr: SocketAddr,
    pub admin_addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    /// `None` selects the in-memory backend.
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub freshness_window: Duration,
    pub batch_limit: NonZeroU32,
    pub page_size: NonZeroU32,
    pub purge_ttl: Duration,
    pub purge_chunk_size: NonZeroU32,
    pub lookup_cache_size: NonZeroUsize,
    pub roots: Vec<RootSettings>,
}

/// Cache point registered at startup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RootSettings {
    pub root_url: String,
    pub source_path: String,
}

#[derive(Debug, Clone)]
pub struct DeliverySettings {
    pub upload_endpoint: String,
    /// Uploads are disabled when unset.
    pub cdn_base_url: Option<Url>,
    pub install_root: PathBuf,
    pub upload_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// The admin router rejects every call when unset.
    pub admin_token: Option<String>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("CACHEPOINT").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Register(args)) => raw.apply_database_override(&args.database),
        Some(Command::Purge(args)) => raw.apply_database_override(&args.database),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    delivery: RawDeliverySettings,
    auth: RawAuthSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(host) = overrides.server_admin_host.as_ref() {
            self.server.admin_host = Some(host.clone());
        }
        if let Some(port) = overrides.public_port {
            self.server.public_port = Some(port);
        }
        if let Some(port) = overrides.admin_port {
            self.server.admin_port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(seconds) = overrides.freshness_window_seconds {
            self.cache.freshness_window_seconds = Some(seconds);
        }
        if let Some(limit) = overrides.batch_limit {
            self.cache.batch_limit = Some(limit);
        }
        if let Some(endpoint) = overrides.upload_endpoint.as_ref() {
            self.delivery.upload_endpoint = Some(endpoint.clone());
        }
        if let Some(base) = overrides.cdn_base_url.as_ref() {
            self.delivery.cdn_base_url = Some(base.clone());
        }
        if let Some(root) = overrides.install_root.as_ref() {
            self.delivery.install_root = Some(root.clone());
        }

        self.apply_database_override(&overrides.database);
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            cache,
            delivery,
            auth,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            delivery: build_delivery_settings(delivery)?,
            auth: build_auth_settings(auth),
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let admin_host = server
        .admin_host
        .unwrap_or_else(|| DEFAULT_ADMIN_HOST.to_string());

    let public_port = server.public_port.unwrap_or(DEFAULT_PUBLIC_PORT);
    if public_port == 0 {
        return Err(LoadError::invalid(
            "server.public_port",
            "port must be greater than zero",
        ));
    }

    let admin_port = server.admin_port.unwrap_or(DEFAULT_ADMIN_PORT);
    if admin_port == 0 {
        return Err(LoadError::invalid(
            "server.admin_port",
            "port must be greater than zero",
        ));
    }

    let public_addr = parse_socket_addr(&host, public_port)
        .map_err(|reason| LoadError::invalid("server.public_addr", reason))?;
    let admin_addr = parse_socket_addr(&admin_host, admin_port)
        .map_err(|reason| LoadError::invalid("server.admin_addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);

    Ok(ServerSettings {
        public_addr,
        admin_addr,
        graceful_shutdown: non_zero_secs(graceful_secs, "server.graceful_shutdown_seconds")?,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = non_blank(database.url);
    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let freshness_window = non_zero_secs(
        cache
            .freshness_window_seconds
            .unwrap_or(DEFAULT_FRESHNESS_WINDOW_SECS),
        "cache.freshness_window_seconds",
    )?;
    let purge_ttl = non_zero_secs(
        cache.purge_ttl_seconds.unwrap_or(DEFAULT_PURGE_TTL_SECS),
        "cache.purge_ttl_seconds",
    )?;

    let lookup_value = cache
        .lookup_cache_size
        .unwrap_or(DEFAULT_LOOKUP_CACHE_SIZE);
    let lookup_cache_size = NonZeroUsize::new(lookup_value as usize)
        .ok_or_else(|| LoadError::invalid("cache.lookup_cache_size", "must be greater than zero"))?;

    for root in &cache.roots {
        if root.root_url.trim().is_empty() {
            return Err(LoadError::invalid("cache.roots", "root_url must not be empty"));
        }
    }

    Ok(CacheSettings {
        freshness_window,
        batch_limit: non_zero_u32(
            cache.batch_limit.unwrap_or(DEFAULT_BATCH_LIMIT).into(),
            "cache.batch_limit",
        )?,
        page_size: non_zero_u32(
            cache.page_size.unwrap_or(DEFAULT_PAGE_SIZE).into(),
            "cache.page_size",
        )?,
        purge_ttl,
        purge_chunk_size: non_zero_u32(
            cache
                .purge_chunk_size
                .unwrap_or(DEFAULT_PURGE_CHUNK_SIZE)
                .into(),
            "cache.purge_chunk_size",
        )?,
        lookup_cache_size,
        roots: cache.roots,
    })
}

fn build_delivery_settings(delivery: RawDeliverySettings) -> Result<DeliverySettings, LoadError> {
    let upload_endpoint = non_blank(delivery.upload_endpoint)
        .unwrap_or_else(|| DEFAULT_UPLOAD_ENDPOINT.to_string())
        .trim_end_matches('/')
        .to_string();

    let cdn_base_url = match non_blank(delivery.cdn_base_url) {
        Some(raw) => Some(Url::parse(&raw).map_err(|err| {
            LoadError::invalid("delivery.cdn_base_url", format!("failed to parse: {err}"))
        })?),
        None => None,
    };

    let install_root = delivery
        .install_root
        .unwrap_or_else(|| PathBuf::from(DEFAULT_INSTALL_ROOT));
    if install_root.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "delivery.install_root",
            "path must not be empty",
        ));
    }

    Ok(DeliverySettings {
        upload_endpoint,
        cdn_base_url,
        install_root,
        upload_timeout: non_zero_secs(
            delivery
                .upload_timeout_seconds
                .unwrap_or(DEFAULT_UPLOAD_TIMEOUT_SECS),
            "delivery.upload_timeout_seconds",
        )?,
    })
}

fn build_auth_settings(auth: RawAuthSettings) -> AuthSettings {
    AuthSettings {
        admin_token: non_blank(auth.admin_token),
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    admin_host: Option<String>,
    public_port: Option<u16>,
    admin_port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    freshness_window_seconds: Option<u64>,
    batch_limit: Option<u32>,
    page_size: Option<u32>,
    purge_ttl_seconds: Option<u64>,
    purge_chunk_size: Option<u32>,
    lookup_cache_size: Option<u32>,
    roots: Vec<RootSettings>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDeliverySettings {
    upload_endpoint: Option<String>,
    cdn_base_url: Option<String>,
    install_root: Option<PathBuf>,
    upload_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAuthSettings {
    admin_token: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn non_zero_secs(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests;
