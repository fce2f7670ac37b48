use std::{process, sync::Arc};

use futures::FutureExt;
use marketplace::{
    application::{
        error::AppError,
        filter::FilterRegistry,
        repos::StatementExecutor,
        resources::ResourceService,
        statement::{PagedStatementBuilder, StatementBuilder},
    },
    cache::{CacheConfig, CacheRegistry, CachingService, spawn_sweeper},
    config,
    domain::{
        entities::{ErrorReportRecord, InstallMetricsRecord},
        types::EntityType,
    },
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, AdminState, HealthProbe, HttpState},
        telemetry,
    },
};
use sqlx::PgPool;
use tokio::try_join;
use tracing::{Dispatch, Level, dispatcher, error, info};
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

    let command = cli_args.command.unwrap_or_default();

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let pool = connect(&settings).await?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!("database migrations applied");
    Ok(())
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let pool = connect(&settings).await?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let repositories = Arc::new(PostgresRepositories::new(pool));

    let registry = Arc::new(FilterRegistry::standard());
    registry.verify(&EntityType::ALL)?;

    let builder: Arc<dyn StatementBuilder> = Arc::new(PagedStatementBuilder::new(
        settings.query.default_page_size.get(),
        settings.query.max_page_size.get(),
    ));
    let cache_config = CacheConfig::from(&settings.cache);

    let report_executor: Arc<dyn StatementExecutor<ErrorReportRecord>> = repositories.clone();
    let error_reports = ResourceService::new(
        EntityType::ErrorReport,
        Arc::clone(&registry),
        Arc::clone(&builder),
        report_executor,
        CachingService::new(EntityType::ErrorReport.endpoint(), cache_config.max_age()),
    );

    let metrics_executor: Arc<dyn StatementExecutor<InstallMetricsRecord>> = repositories.clone();
    let install_metrics = ResourceService::new(
        EntityType::InstallMetrics,
        registry,
        builder,
        metrics_executor,
        CachingService::new(EntityType::InstallMetrics.endpoint(), cache_config.max_age()),
    );

    let caches = CacheRegistry::new()
        .with(Arc::new(error_reports.cache().clone()))
        .with(Arc::new(install_metrics.cache().clone()));
    let sweeper = cache_config
        .sweep_interval()
        .map(|period| spawn_sweeper(caches.clone(), period));

    let health: Arc<dyn HealthProbe> = repositories;
    let http_state = HttpState {
        error_reports,
        install_metrics,
        health: Arc::clone(&health),
    };
    let admin_state = AdminState { caches, health };

    let result = serve_http(&settings, http_state, admin_state).await;

    if let Some(handle) = sweeper {
        handle.abort();
        let _ = handle.await;
    }

    result
}

async fn connect(settings: &config::Settings) -> Result<PgPool, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))
}

async fn serve_http(
    settings: &config::Settings,
    http_state: HttpState,
    admin_state: AdminState,
) -> Result<(), AppError> {
    let public_router = http::build_router(http_state);
    let admin_router = http::build_admin_router(admin_state);

    let public_listener = tokio::net::TcpListener::bind(settings.server.public_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let admin_listener = tokio::net::TcpListener::bind(settings.server.admin_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        public = %settings.server.public_addr,
        admin = %settings.server.admin_addr,
        "listeners bound"
    );

    let shutdown = shutdown_signal().boxed().shared();
    let public_server = axum::serve(public_listener, public_router.into_make_service())
        .with_graceful_shutdown(shutdown.clone());
    let admin_server = axum::serve(admin_listener, admin_router.into_make_service())
        .with_graceful_shutdown(shutdown);

    try_join!(public_server, admin_server)
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        return;
    }
    info!("shutdown signal received");
}
