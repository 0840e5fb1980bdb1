//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::application::rate_limit::RateLimitPolicy;
use crate::application::visitor::DEFAULT_COOKIE_NAME;

mod cli;

pub use cli::{
    CacheArgs, CacheCommand, CacheDirectoryOverride, CliArgs, Command, RateLimitArgs,
    RateLimitCommand, ServeArgs, ServeOverrides,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "atelier";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_ADMIN_HOST: &str = "127.0.0.1";
const DEFAULT_PUBLIC_PORT: u16 = 3000;
const DEFAULT_ADMIN_PORT: u16 = 3001;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_COUNTERS_MAX_CONNECTIONS: u32 = 4;
const DEFAULT_CACHE_DIR: &str = "data/cache";
const DEFAULT_RATE_LIMIT_DIR: &str = "data/ratelimit";
const DEFAULT_RATE_LIMIT_MAX_ATTEMPTS: u64 = 60;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;
const DEFAULT_VIEWS_DEDUP_WINDOW_SECS: u64 = 3600;
const DEFAULT_GALLERY_PAGE_SIZE: u32 = 24;
const MAX_GALLERY_PAGE_SIZE: u32 = 200;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub counters: CountersSettings,
    pub cache: CacheSettings,
    pub rate_limit: RateLimitSettings,
    pub views: ViewsSettings,
    pub visitor: VisitorSettings,
    pub gallery: GallerySettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub public_addr: SocketAddr,
    pub admin_addr: SocketAddr,
    pub graceful_shutdown: Duration,
    /// Take the client address from `X-Forwarded-For` when set.
    pub trust_forwarded_for: bool,
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
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

/// Where view counts live. Without a URL they share the content store.
#[derive(Debug, Clone)]
pub struct CountersSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub directory: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub directory: PathBuf,
    pub max_attempts: NonZeroU32,
    pub window_seconds: NonZeroU32,
}

impl RateLimitSettings {
    pub fn policy(&self) -> RateLimitPolicy {
        RateLimitPolicy::new(
            self.max_attempts.get(),
            time::Duration::seconds(i64::from(self.window_seconds.get())),
        )
    }
}

#[derive(Debug, Clone)]
pub struct ViewsSettings {
    pub dedup_window: time::Duration,
}

#[derive(Debug, Clone)]
pub struct VisitorSettings {
    pub secret: Option<String>,
    pub cookie_name: String,
}

#[derive(Debug, Clone)]
pub struct GallerySettings {
    pub page_size: NonZeroU32,
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

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("ATELIER").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Cache(args)) => raw.apply_cache_directory_override(&args.directory),
        Some(Command::RateLimit(args)) => {
            if let Some(directory) = args.rate_limit_directory.as_ref() {
                raw.rate_limit.directory = Some(directory.clone());
            }
        }
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    counters: RawCountersSettings,
    cache: RawCacheSettings,
    rate_limit: RawRateLimitSettings,
    views: RawViewsSettings,
    visitor: RawVisitorSettings,
    gallery: RawGallerySettings,
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
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(url) = overrides.counters_url.as_ref() {
            self.counters.url = Some(url.clone());
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        self.apply_cache_directory_override(&overrides.cache);
        if let Some(directory) = overrides.rate_limit_directory.as_ref() {
            self.rate_limit.directory = Some(directory.clone());
        }
        if let Some(max) = overrides.rate_limit_max_attempts {
            self.rate_limit.max_attempts = Some(max);
        }
        if let Some(window) = overrides.rate_limit_window_seconds {
            self.rate_limit.window_seconds = Some(window);
        }
        if let Some(window) = overrides.views_dedup_window_seconds {
            self.views.dedup_window_seconds = Some(window);
        }
        if let Some(size) = overrides.gallery_page_size {
            self.gallery.page_size = Some(size);
        }
    }

    fn apply_cache_directory_override(&mut self, overrides: &CacheDirectoryOverride) {
        if let Some(directory) = overrides.cache_directory.as_ref() {
            self.cache.directory = Some(directory.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            counters,
            cache,
            rate_limit,
            views,
            visitor,
            gallery,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            counters: build_counters_settings(counters)?,
            cache: build_cache_settings(cache)?,
            rate_limit: build_rate_limit_settings(rate_limit)?,
            views: build_views_settings(views)?,
            visitor: build_visitor_settings(visitor)?,
            gallery: build_gallery_settings(gallery)?,
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
    if public_addr == admin_addr {
        return Err(LoadError::invalid(
            "server.admin_port",
            "admin listener must not share the public address",
        ));
    }

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        public_addr,
        admin_addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
        trust_forwarded_for: server.trust_forwarded_for.unwrap_or(false),
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
    let max = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);

    Ok(DatabaseSettings {
        url: non_empty(database.url),
        max_connections: non_zero_u32(max.into(), "database.max_connections")?,
    })
}

fn build_counters_settings(counters: RawCountersSettings) -> Result<CountersSettings, LoadError> {
    let url = non_empty(counters.url);
    if let Some(url) = url.as_deref()
        && !url.starts_with("sqlite:")
    {
        return Err(LoadError::invalid(
            "counters.url",
            "a separate counters store must be a sqlite: URL",
        ));
    }

    let max = counters
        .max_connections
        .unwrap_or(DEFAULT_COUNTERS_MAX_CONNECTIONS);

    Ok(CountersSettings {
        url,
        max_connections: non_zero_u32(max.into(), "counters.max_connections")?,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let directory = cache
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "cache.directory",
            "path must not be empty",
        ));
    }

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        directory,
    })
}

fn build_rate_limit_settings(
    rate_limit: RawRateLimitSettings,
) -> Result<RateLimitSettings, LoadError> {
    let directory = rate_limit
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_RATE_LIMIT_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "rate_limit.directory",
            "path must not be empty",
        ));
    }

    let max_attempts = rate_limit
        .max_attempts
        .unwrap_or(DEFAULT_RATE_LIMIT_MAX_ATTEMPTS);
    let window_seconds = rate_limit
        .window_seconds
        .unwrap_or(DEFAULT_RATE_LIMIT_WINDOW_SECS);

    Ok(RateLimitSettings {
        directory,
        max_attempts: non_zero_u32(max_attempts, "rate_limit.max_attempts")?,
        window_seconds: non_zero_u32(window_seconds, "rate_limit.window_seconds")?,
    })
}

fn build_views_settings(views: RawViewsSettings) -> Result<ViewsSettings, LoadError> {
    let seconds = views
        .dedup_window_seconds
        .unwrap_or(DEFAULT_VIEWS_DEDUP_WINDOW_SECS);
    let seconds = i64::try_from(seconds).map_err(|_| {
        LoadError::invalid(
            "views.dedup_window_seconds",
            "value exceeds supported range for i64",
        )
    })?;

    Ok(ViewsSettings {
        dedup_window: time::Duration::seconds(seconds),
    })
}

fn build_visitor_settings(visitor: RawVisitorSettings) -> Result<VisitorSettings, LoadError> {
    let cookie_name = visitor
        .cookie_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_COOKIE_NAME.to_string());
    let valid = cookie_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(LoadError::invalid(
            "visitor.cookie_name",
            "only ASCII letters, digits, `_` and `-` are allowed",
        ));
    }

    Ok(VisitorSettings {
        secret: non_empty(visitor.secret),
        cookie_name,
    })
}

fn build_gallery_settings(gallery: RawGallerySettings) -> Result<GallerySettings, LoadError> {
    let page_size = gallery.page_size.unwrap_or(DEFAULT_GALLERY_PAGE_SIZE);
    if page_size > MAX_GALLERY_PAGE_SIZE {
        return Err(LoadError::invalid(
            "gallery.page_size",
            format!("must be at most {MAX_GALLERY_PAGE_SIZE}"),
        ));
    }

    Ok(GallerySettings {
        page_size: non_zero_u32(page_size.into(), "gallery.page_size")?,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    admin_host: Option<String>,
    public_port: Option<u16>,
    admin_port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
    trust_forwarded_for: Option<bool>,
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
struct RawCountersSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRateLimitSettings {
    directory: Option<PathBuf>,
    max_attempts: Option<u64>,
    window_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawViewsSettings {
    dedup_window_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawVisitorSettings {
    secret: Option<String>,
    cookie_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawGallerySettings {
    page_size: Option<u32>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
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

#[cfg(test)]
mod tests;
