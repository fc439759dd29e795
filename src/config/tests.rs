use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.public_port = Some(4000);
    raw.logging.level = Some("info".to_string());
    raw.cache.batch_limit = Some(3);

    let overrides = ServeOverrides {
        public_port: Some(4321),
        log_level: Some("debug".to_string()),
        batch_limit: Some(9),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.public_addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.cache.batch_limit.get(), 9);
}

#[test]
fn cache_defaults_match_documented_values() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.cache.freshness_window, Duration::from_secs(120));
    assert_eq!(settings.cache.batch_limit.get(), 5);
    assert_eq!(settings.cache.page_size.get(), 20);
    assert_eq!(settings.cache.purge_ttl, Duration::from_secs(60));
    assert_eq!(settings.cache.purge_chunk_size.get(), 100);
    assert_eq!(settings.cache.lookup_cache_size.get(), 1024);
    assert!(settings.cache.roots.is_empty());
    assert!(settings.database.url.is_none());
    assert!(settings.auth.admin_token.is_none());
    assert_eq!(settings.delivery.upload_endpoint, "/upload");
}

#[test]
fn zero_freshness_window_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.freshness_window_seconds = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero window must fail");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.freshness_window_seconds",
            ..
        }
    ));
}

#[test]
fn blank_values_are_treated_as_unset() {
    let mut raw = RawSettings::default();
    raw.database.url = Some("   ".to_string());
    raw.auth.admin_token = Some(String::new());
    raw.delivery.upload_endpoint = Some("https://assets.example.com/upload/".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.database.url.is_none());
    assert!(settings.auth.admin_token.is_none());
    assert_eq!(
        settings.delivery.upload_endpoint,
        "https://assets.example.com/upload"
    );
}

#[test]
fn malformed_cdn_base_is_rejected() {
    let mut raw = RawSettings::default();
    raw.delivery.cdn_base_url = Some("not a url".to_string());

    let err = Settings::from_raw(raw).expect_err("invalid url must fail");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "delivery.cdn_base_url",
            ..
        }
    ));
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
    let args = CliArgs::parse_from(["cachepoint"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_register_arguments() {
    let args = CliArgs::parse_from([
        "cachepoint",
        "register",
        "--database-url",
        "postgres://example",
        "/wp-content/themes/demo/",
        "themes/demo",
    ]);

    match args.command.expect("register command") {
        Command::Register(register) => {
            assert_eq!(
                register.database.database_url.as_deref(),
                Some("postgres://example")
            );
            assert_eq!(register.root_url, "/wp-content/themes/demo/");
            assert_eq!(register.source_path, "themes/demo");
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_purge_arguments() {
    let args = CliArgs::parse_from(["cachepoint", "purge", "--cache-point", "7"]);

    match args.command.expect("purge command") {
        Command::Purge(purge) => assert_eq!(purge.cache_point, Some(7)),
        _ => panic!("wrong command parsed"),
    }

    let args = CliArgs::parse_from(["cachepoint", "purge"]);
    match args.command.expect("purge command") {
        Command::Purge(purge) => assert_eq!(purge.cache_point, None),
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "cachepoint",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--database-url",
        "postgres://override",
        "--delivery-install-root",
        "/srv/wordpress",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(
                serve.overrides.database.database_url.as_deref(),
                Some("postgres://override")
            );
            assert_eq!(
                serve.overrides.install_root.as_deref(),
                Some(std::path::Path::new("/srv/wordpress"))
            );
        }
        _ => panic!("wrong command parsed"),
    }
}
