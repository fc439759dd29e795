use std::{future::IntoFuture, process, sync::Arc};

use cachepoint::{
    application::{
        error::AppError,
        services::{CacheServices, ServiceConfig},
        uploads::Uploader,
    },
    config,
    domain::purge::PurgeScope,
    infra::{
        error::InfraError,
        http::{self, ApiState, HttpState},
        storage::Storage,
        telemetry,
        uploader::HttpUploader,
    },
    util::clock::SystemClock,
};
use tokio::{sync::watch, try_join};
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
        config::Command::Register(args) => run_register(settings, args).await,
        config::Command::Purge(args) => run_purge(settings, args).await,
    }
}

async fn build_services(settings: &config::Settings) -> Result<(Storage, CacheServices), AppError> {
    let storage = Storage::connect(&settings.database).await?;

    let uploader: Option<Arc<dyn Uploader>> = match settings.delivery.cdn_base_url.clone() {
        Some(base) => Some(Arc::new(HttpUploader::new(
            base,
            settings.delivery.upload_timeout,
        )?)),
        None => {
            warn!("no CDN base URL configured; upload triggers redirect to local copies");
            None
        }
    };

    let services = CacheServices::new(
        storage.repositories(),
        uploader,
        Arc::new(SystemClock),
        ServiceConfig::from_settings(settings),
    );
    Ok((storage, services))
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let (storage, services) = build_services(&settings).await?;

    for root in &settings.cache.roots {
        let registered = services
            .registry
            .register(&root.root_url, &root.source_path)
            .await?;
        info!(
            id = registered.record().id,
            root_url = %registered.record().root_url,
            created = registered.was_created(),
            "configured cache point ready"
        );
    }

    let http_state = HttpState {
        reconciler: services.reconciler.clone(),
        uploads: Arc::clone(&services.uploads),
        storage,
    };
    let api_state = ApiState {
        admin: services.admin.clone(),
        admin_token: settings.auth.admin_token.as_deref().map(Arc::from),
    };
    if api_state.admin_token.is_none() {
        warn!("no admin token configured; every admin call will be rejected");
    }

    serve_http(&settings, http_state, api_state).await
}

async fn serve_http(
    settings: &config::Settings,
    http_state: HttpState,
    api_state: ApiState,
) -> Result<(), AppError> {
    let public_router = http::build_public_router(http_state);
    let admin_router = http::build_api_router(api_state);

    let public_listener = tokio::net::TcpListener::bind(settings.server.public_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let admin_listener = tokio::net::TcpListener::bind(settings.server.admin_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        public = %settings.server.public_addr,
        admin = %settings.server.admin_addr,
        "listening"
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    let public_server = axum::serve(public_listener, public_router.into_make_service())
        .with_graceful_shutdown(stopped(stop_rx.clone()))
        .into_future();
    let admin_server = axum::serve(admin_listener, admin_router.into_make_service())
        .with_graceful_shutdown(stopped(stop_rx))
        .into_future();

    let servers = async { try_join!(public_server, admin_server) };
    tokio::pin!(servers);

    let result = tokio::select! {
        result = &mut servers => result,
        _ = shutdown_signal() => {
            info!("shutdown requested; draining connections");
            let _ = stop_tx.send(true);
            match tokio::time::timeout(settings.server.graceful_shutdown, &mut servers).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        grace_seconds = settings.server.graceful_shutdown.as_secs(),
                        "grace period elapsed; abandoning open connections"
                    );
                    Ok(((), ()))
                }
            }
        }
    };

    result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
    Ok(())
}

async fn stopped(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

async fn run_register(
    settings: config::Settings,
    args: config::RegisterArgs,
) -> Result<(), AppError> {
    let (_, services) = build_services(&settings).await?;
    let registered = services
        .registry
        .register(&args.root_url, &args.source_path)
        .await?;

    let record = registered.record();
    info!(
        id = record.id,
        root_url = %record.root_url,
        source_path = %record.source_path,
        created = registered.was_created(),
        "cache point registered"
    );
    Ok(())
}

async fn run_purge(settings: config::Settings, args: config::PurgeArgs) -> Result<(), AppError> {
    let (_, services) = build_services(&settings).await?;
    let scope = PurgeScope::from_option(args.cache_point);

    let view = services.purge.purge(scope).await?;
    info!(
        total = view.total,
        pending = view.pending,
        percent = view.percent,
        "purge finished"
    );
    Ok(())
}
