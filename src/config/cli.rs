use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the atelier binary.
#[derive(Debug, Parser)]
#[command(name = "atelier", version, about = "Atelier media gallery server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "ATELIER_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the public and admin HTTP listeners.
    Serve(Box<ServeArgs>),
    /// Content cache maintenance.
    #[command(name = "cache")]
    Cache(CacheArgs),
    /// Rate limiter maintenance.
    #[command(name = "ratelimit")]
    RateLimit(RateLimitArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct CacheArgs {
    #[command(flatten)]
    pub directory: CacheDirectoryOverride,

    #[command(subcommand)]
    pub command: CacheCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum CacheCommand {
    /// Remove every cache entry.
    #[command(name = "purge")]
    Purge,
    /// Remove every cache entry whose key starts with PREFIX.
    #[command(name = "purge-prefix")]
    PurgePrefix {
        #[arg(value_name = "PREFIX")]
        prefix: String,
    },
}

#[derive(Debug, Args, Default, Clone)]
pub struct CacheDirectoryOverride {
    /// Override the cache directory.
    #[arg(long = "cache-directory", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub cache_directory: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct RateLimitArgs {
    /// Override the rate limit state directory.
    #[arg(long = "rate-limit-directory", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub rate_limit_directory: Option<PathBuf>,

    #[command(subcommand)]
    pub command: RateLimitCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum RateLimitCommand {
    /// Forget every recorded attempt for one identifier and action.
    #[command(name = "reset")]
    Reset {
        #[arg(value_name = "IDENTIFIER")]
        identifier: String,
        #[arg(value_name = "ACTION", default_value = "view")]
        action: String,
    },
    /// Delete window files whose attempts have all expired.
    #[command(name = "sweep")]
    Sweep,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
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

    /// Override the content store connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the content store pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Keep view counts in a separate SQLite database at this URL.
    #[arg(long = "counters-url", value_name = "URL")]
    pub counters_url: Option<String>,

    /// Toggle the content cache.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,

    #[command(flatten)]
    pub cache: CacheDirectoryOverride,

    /// Override the rate limit state directory.
    #[arg(long = "rate-limit-directory", value_name = "PATH")]
    pub rate_limit_directory: Option<PathBuf>,

    /// Override the number of attempts allowed per window.
    #[arg(long = "rate-limit-max-attempts", value_name = "COUNT")]
    pub rate_limit_max_attempts: Option<u64>,

    /// Override the rate limit window size.
    #[arg(long = "rate-limit-window-seconds", value_name = "SECONDS")]
    pub rate_limit_window_seconds: Option<u64>,

    /// Override the per-visitor view dedup window.
    #[arg(long = "views-dedup-window-seconds", value_name = "SECONDS")]
    pub views_dedup_window_seconds: Option<u64>,

    /// Override the gallery page size.
    #[arg(long = "gallery-page-size", value_name = "COUNT")]
    pub gallery_page_size: Option<u32>,
}
