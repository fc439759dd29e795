use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the cachepoint binary.
#[derive(Debug, Parser)]
#[command(name = "cachepoint", version, about = "Asset cache-point service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "CACHEPOINT_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the public and admin HTTP listeners.
    Serve(Box<ServeArgs>),
    /// Register a cache point for a local source directory.
    Register(RegisterArgs),
    /// Purge one cache point, or every active one, and wait for completion.
    Purge(PurgeArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Override the public listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the administrative listener host.
    #[arg(long = "server-admin-host", value_name = "HOST")]
    pub server_admin_host: Option<String>,

    /// Override the public listener port.
    #[arg(long = "server-public-port", value_name = "PORT")]
    pub public_port: Option<u16>,

    /// Override the administrative listener port.
    #[arg(long = "server-admin-port", value_name = "PORT")]
    pub admin_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the freshness window after which pending entries are retried.
    #[arg(long = "cache-freshness-window-seconds", value_name = "SECONDS")]
    pub freshness_window_seconds: Option<u64>,

    /// Override how many entries one render request may create.
    #[arg(long = "cache-batch-limit", value_name = "COUNT")]
    pub batch_limit: Option<u32>,

    /// Override the base URL for upload references.
    #[arg(long = "delivery-upload-endpoint", value_name = "URL")]
    pub upload_endpoint: Option<String>,

    /// Override the CDN base URL uploads are sent to.
    #[arg(long = "delivery-cdn-base-url", value_name = "URL")]
    pub cdn_base_url: Option<String>,

    /// Override the directory source paths are resolved against.
    #[arg(long = "delivery-install-root", value_name = "PATH")]
    pub install_root: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct RegisterArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Root URL the cache point mirrors.
    #[arg(value_name = "ROOT_URL")]
    pub root_url: String,

    /// Source directory relative to the install root.
    #[arg(value_name = "SOURCE_PATH")]
    pub source_path: String,
}

#[derive(Debug, Args, Clone)]
pub struct PurgeArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Restrict the purge to one cache point.
    #[arg(long = "cache-point", value_name = "ID")]
    pub cache_point: Option<i64>,
}
