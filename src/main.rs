use std::io::Error;
use std::sync::Arc;

use poem::{EndpointExt, Server, listener::TcpListener, middleware::Tracing};
use sqlx::postgres::PgPoolOptions;
use tokio::main;
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

use messager::{
    application::{
        handlers::{periodic_processor::PeriodicProcessor, status_transitioner::StatusTransitioner},
        services::{
            lifecycle::{MessageLifecycle, MessageLifecycleService},
            observers::{ErrorObservers, TracingErrorObserver},
        },
    },
    config::Config,
    infrastructure::{
        messaging::{http_gateway::HttpDeliveryGateway, jetstream::JetstreamChangeFeed},
        repositories::{
            postgres::{PostgresMessageRepository, migrate},
            redis::RedisDispatchReceiptRepository,
        },
    },
    presentation::http::endpoints::root::{ApiState, routes},
};

#[main]
async fn main() -> Result<(), Error> {
    init_tracing();

    let config = Config::try_parse().map_err(Error::other)?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .map_err(Error::other)?;
    migrate(&pool).await.map_err(Error::other)?;

    let receipts = RedisDispatchReceiptRepository::connect(&config.redis_url)
        .await
        .map_err(Error::other)?;
    let gateway = HttpDeliveryGateway::new(config.client.clone()).map_err(Error::other)?;

    let lifecycle: Arc<dyn MessageLifecycle> = Arc::new(MessageLifecycleService::new(
        PostgresMessageRepository::new(pool.clone()),
        receipts,
        gateway,
        config.eligibility,
    ));
    tracing::info!(
        required_status = %config.eligibility.required_status(),
        "dispatch eligibility configured"
    );

    let observers = ErrorObservers::new().subscribe(Arc::new(TracingErrorObserver));
    let processor = Arc::new(PeriodicProcessor::new(
        lifecycle.clone(),
        config.job_interval,
        observers.clone(),
    ));

    let feed = JetstreamChangeFeed::connect(&config.jetstream)
        .await
        .map_err(Error::other)?;
    let transitioner = Arc::new(StatusTransitioner::new(lifecycle.clone(), feed, observers));
    let transitioner_task = tokio::spawn({
        let transitioner = transitioner.clone();
        async move { transitioner.run().await }
    });

    let server_url = format!("{}://{}:{}", config.scheme, config.host, config.port);
    tracing::info!(%server_url, "starting server");

    let state = Arc::new(ApiState {
        lifecycle,
        processor: processor.clone(),
    });
    let app = routes(state, &server_url).with(Tracing);

    let served = Server::new(TcpListener::bind(format!("0.0.0.0:{}", config.port)))
        .run_with_graceful_shutdown(app, shutdown_signal(), Some(config.shutdown_timeout))
        .await;
    if let Err(err) = &served {
        tracing::error!(error = %err, "server stopped with error");
    }

    if let Err(err) = transitioner.stop().await {
        tracing::error!(error = %format!("{err:#}"), "failed to stop status transitioner");
    }
    if let Err(err) = transitioner_task.await {
        tracing::error!(error = %err, "status transitioner task ended abnormally");
    }
    processor.stop().await;
    pool.close().await;

    tracing::info!("application gracefully stopped");
    served
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
