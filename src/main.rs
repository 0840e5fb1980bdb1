use std::{net::SocketAddr, process, sync::Arc};

use atelier::{
    application::{
        admin::AdminContentService,
        error::AppError,
        gallery::GalleryService,
        rate_limit::RateLimiter,
        repos::{PostsRepo, PostsWriteRepo, ThemesRepo, ViewCountsRepo},
        theme::ThemeService,
        views::ViewCounter,
        visitor::VisitorIdentity,
    },
    cache::{CacheConfig, CacheManager, CacheTrigger},
    config,
    infra::{
        counters::SqliteViewCounts,
        db::PostgresRepositories,
        error::InfraError,
        http::{self, AdminState, HttpState, StoreHealth, StoreChecks, ViewThrottle},
        telemetry,
    },
    util::clock::SystemClock,
};
use tokio::try_join;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Cache(args) => run_cache(settings, args),
        config::Command::RateLimit(args) => run_rate_limit(settings, args),
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let app = build_application_context(repositories, &settings).await?;

    serve_http(&settings, app.http_state, app.admin_state, app.throttle).await
}

fn run_cache(settings: config::Settings, args: config::CacheArgs) -> Result<(), AppError> {
    // Maintenance always reaches the directory, even with the cache switched off.
    let cache_config = CacheConfig {
        enabled: true,
        ..CacheConfig::from(&settings.cache)
    };
    let cache = CacheManager::new(&cache_config).map_err(InfraError::from)?;

    let removed = match args.command {
        config::CacheCommand::Purge => cache.invalidate_all(),
        config::CacheCommand::PurgePrefix { prefix } => cache.invalidate_by_prefix(&prefix),
    };

    info!(
        target = "atelier::cache::cli",
        directory = %cache_config.directory.display(),
        removed,
        "Cache entries removed"
    );
    Ok(())
}

fn run_rate_limit(settings: config::Settings, args: config::RateLimitArgs) -> Result<(), AppError> {
    let limiter = RateLimiter::open(&settings.rate_limit.directory, settings.rate_limit.policy())
        .map_err(InfraError::from)?;

    match args.command {
        config::RateLimitCommand::Reset { identifier, action } => {
            limiter.reset(&identifier, &action);
            info!(
                target = "atelier::rate_limit::cli",
                identifier = %identifier,
                action = %action,
                "Rate limit window reset"
            );
        }
        config::RateLimitCommand::Sweep => {
            let removed = limiter.sweep_expired();
            info!(
                target = "atelier::rate_limit::cli",
                removed, "Expired rate limit windows removed"
            );
        }
    }
    Ok(())
}

struct ApplicationContext {
    http_state: HttpState,
    admin_state: AdminState,
    throttle: ViewThrottle,
}

async fn init_repositories(settings: &config::Settings) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

async fn build_application_context(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<ApplicationContext, AppError> {
    let posts_repo: Arc<dyn PostsRepo> = repositories.clone();
    let posts_write_repo: Arc<dyn PostsWriteRepo> = repositories.clone();
    let themes_repo: Arc<dyn ThemesRepo> = repositories.clone();

    let mut checks: Vec<Arc<dyn StoreHealth>> = vec![repositories.clone()];
    let view_counts_repo: Arc<dyn ViewCountsRepo> = match &settings.counters.url {
        Some(url) => {
            let counters = Arc::new(
                SqliteViewCounts::connect(url, settings.counters.max_connections.get())
                    .await
                    .map_err(|err| AppError::from(InfraError::database(err.to_string())))?,
            );
            checks.push(counters.clone());
            counters
        }
        None => repositories.clone(),
    };
    let checks = StoreChecks::new(checks);

    let cache_config = CacheConfig::from(&settings.cache);
    let cache = CacheManager::new(&cache_config).map_err(InfraError::from)?;
    if !cache.is_enabled() {
        warn!(
            target = "atelier::cache",
            "Content cache disabled; every read goes to the database"
        );
    }
    let trigger = CacheTrigger::new(cache.clone());

    let limiter = RateLimiter::open(&settings.rate_limit.directory, settings.rate_limit.policy())
        .map_err(InfraError::from)?;
    let visitors = VisitorIdentity::new(
        settings.visitor.secret.as_deref(),
        settings.visitor.cookie_name.clone(),
    );

    let views = ViewCounter::new(
        view_counts_repo,
        Arc::new(SystemClock),
        settings.views.dedup_window,
    );
    let gallery = GalleryService::new(
        posts_repo,
        views.clone(),
        cache.clone(),
        settings.gallery.page_size.get(),
    );
    let themes = ThemeService::new(themes_repo.clone(), cache);
    let content = AdminContentService::new(posts_write_repo, themes_repo, trigger);

    Ok(ApplicationContext {
        http_state: HttpState {
            gallery,
            themes,
            views,
            visitors,
            checks: checks.clone(),
            trust_forwarded_headers: settings.server.trust_forwarded_for,
        },
        admin_state: AdminState { content, checks },
        throttle: ViewThrottle {
            limiter,
            trust_forwarded_for: settings.server.trust_forwarded_for,
        },
    })
}

async fn serve_http(
    settings: &config::Settings,
    http_state: HttpState,
    admin_state: AdminState,
    throttle: ViewThrottle,
) -> Result<(), AppError> {
    let public_router = http::build_router(http_state, throttle);
    let admin_router = http::build_admin_router(admin_state);

    let public_listener = tokio::net::TcpListener::bind(settings.server.public_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let admin_listener = tokio::net::TcpListener::bind(settings.server.admin_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "atelier::serve",
        public = %settings.server.public_addr,
        admin = %settings.server.admin_addr,
        "Listeners bound"
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let public_shutdown = wait_for(shutdown_rx.clone());
    let admin_shutdown = wait_for(shutdown_rx);

    let public_server = axum::serve(
        public_listener,
        public_router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(public_shutdown);
    let admin_server = axum::serve(admin_listener, admin_router.into_make_service())
        .with_graceful_shutdown(admin_shutdown);

    let grace = settings.server.graceful_shutdown;
    let servers = async { try_join!(public_server, admin_server) };
    tokio::pin!(servers);

    tokio::select! {
        result = &mut servers => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
            return Ok(());
        }
        () = shutdown_signal() => {
            info!(
                target = "atelier::serve",
                grace_seconds = grace.as_secs(),
                "Shutdown requested; draining connections"
            );
            let _ = shutdown_tx.send(true);
        }
    }

    match tokio::time::timeout(grace, servers).await {
        Ok(result) => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        Err(_) => {
            warn!(
                target = "atelier::serve",
                "Graceful shutdown timed out; dropping open connections"
            );
        }
    }

    Ok(())
}

async fn wait_for(mut rx: tokio::sync::watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
