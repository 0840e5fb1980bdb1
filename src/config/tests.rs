use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.public_port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        public_port: Some(4321),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.public_addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn defaults_cover_core_components() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert!(settings.cache.enabled);
    assert_eq!(settings.cache.directory, PathBuf::from("data/cache"));
    assert_eq!(settings.rate_limit.directory, PathBuf::from("data/ratelimit"));
    assert_eq!(settings.rate_limit.max_attempts.get(), 60);
    assert_eq!(settings.rate_limit.window_seconds.get(), 60);
    assert_eq!(settings.views.dedup_window, time::Duration::hours(1));
    assert_eq!(settings.visitor.cookie_name, DEFAULT_COOKIE_NAME);
    assert!(settings.visitor.secret.is_none());
    assert!(settings.counters.url.is_none());
    assert_eq!(settings.gallery.page_size.get(), 24);
}

#[test]
fn rate_limit_policy_follows_settings() {
    let mut raw = RawSettings::default();
    raw.rate_limit.max_attempts = Some(3);
    raw.rate_limit.window_seconds = Some(60);

    let settings = Settings::from_raw(raw).expect("valid settings");
    let policy = settings.rate_limit.policy();

    assert_eq!(policy.max_attempts, 3);
    assert_eq!(policy.window, time::Duration::minutes(1));
}

#[test]
fn zero_rate_limit_window_is_rejected() {
    let mut raw = RawSettings::default();
    raw.rate_limit.window_seconds = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero window must fail");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "rate_limit.window_seconds",
            ..
        }
    ));
}

#[test]
fn zero_dedup_window_is_allowed() {
    let mut raw = RawSettings::default();
    raw.views.dedup_window_seconds = Some(0);

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.views.dedup_window, time::Duration::ZERO);
}

#[test]
fn blank_secret_means_unsigned() {
    let mut raw = RawSettings::default();
    raw.visitor.secret = Some("   ".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.visitor.secret.is_none());
}

#[test]
fn cookie_name_must_be_token_safe() {
    let mut raw = RawSettings::default();
    raw.visitor.cookie_name = Some("visitor id".to_string());

    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "visitor.cookie_name",
            ..
        })
    ));
}

#[test]
fn counters_url_must_be_sqlite() {
    let mut raw = RawSettings::default();
    raw.counters.url = Some("postgres://elsewhere/counters".to_string());
    assert!(Settings::from_raw(raw).is_err());

    let mut raw = RawSettings::default();
    raw.counters.url = Some("sqlite://data/counters.db".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(
        settings.counters.url.as_deref(),
        Some("sqlite://data/counters.db")
    );
}

#[test]
fn oversized_page_is_rejected() {
    let mut raw = RawSettings::default();
    raw.gallery.page_size = Some(MAX_GALLERY_PAGE_SIZE + 1);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn listeners_must_not_collide() {
    let mut raw = RawSettings::default();
    raw.server.public_port = Some(4000);
    raw.server.admin_port = Some(4000);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["atelier"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "atelier",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--cache-directory",
        "/var/cache/atelier",
        "--rate-limit-max-attempts",
        "3",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(
                serve.overrides.cache.cache_directory.as_deref(),
                Some(std::path::Path::new("/var/cache/atelier"))
            );
            assert_eq!(serve.overrides.rate_limit_max_attempts, Some(3));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_cache_purge() {
    let args = CliArgs::parse_from(["atelier", "cache", "--cache-directory", "/tmp/c", "purge"]);

    match args.command.expect("cache command") {
        Command::Cache(cache) => {
            assert!(matches!(cache.command, CacheCommand::Purge));
            assert_eq!(
                cache.directory.cache_directory.as_deref(),
                Some(std::path::Path::new("/tmp/c"))
            );
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_ratelimit_reset_defaults_action() {
    let args = CliArgs::parse_from(["atelier", "ratelimit", "reset", "203.0.113.9"]);

    match args.command.expect("ratelimit command") {
        Command::RateLimit(rl) => match rl.command {
            RateLimitCommand::Reset { identifier, action } => {
                assert_eq!(identifier, "203.0.113.9");
                assert_eq!(action, "view");
            }
            RateLimitCommand::Sweep => panic!("wrong subcommand parsed"),
        },
        _ => panic!("wrong command parsed"),
    }
}
