use crate::{config::Config, server::ServerState};
use quill_common::snowflake::{ProcessId, SnowflakePartOutOfRangeError, WorkerId};
use quill_db::client::{DbClient, DbError};
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod server;

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("Invalid snowflake configuration: {0}")]
    SnowflakePart(#[from] SnowflakePartOutOfRangeError),
    #[error("Error connecting to database: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Error migrating database: {0}")]
    Migration(#[from] DbError),
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "quill_web=debug,quill_db=debug,quill_common=debug,\
                tower_http=debug,axum::rejection=trace,sqlx=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn get_config() -> Result<Config, InitError> {
    if let Err(e) = dotenvy::dotenv() {
        if e.not_found() {
            debug!("No .env file found");
        } else {
            return Err(e.into());
        }
    }

    envy::from_env().map_err(InitError::from)
}

async fn connect(config: &Config) -> Result<DbClient, InitError> {
    let worker_id = WorkerId::try_from(config.worker_id)?;
    let process_id = ProcessId::try_from(config.process_id)?;

    let db_client = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(8).connect(url).await?;
            info!("Connected to postgres");
            DbClient::new(pool, worker_id, process_id)
        }
        None => {
            info!("No DATABASE_URL set, keeping everything in memory");
            DbClient::in_memory(worker_id, process_id)
        }
    };
    db_client.migrate().await?;

    Ok(db_client)
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "Could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let config = get_config()?;

    let db_client = connect(&config).await?;
    let server_address = config.socket_address();
    let state = ServerState::new(db_client, config);

    let app = server::router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(server_address)
        .await
        .map_err(InitError::TcpBind)?;
    info!(%server_address, "Listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(InitError::TcpServe)?;

    Ok(())
}
