use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tripool_api::{app, AppState};
use tripool_coordinator::{retry::RetryPolicy, MockGateway, ThresholdCoordinator};
use tripool_store::{DbClient, PgConfigurationStore, PgParticipantLedger, PgTripDirectory};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tripool_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = tripool_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Tripool API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");

    // Real processor integration lands behind the same trait; the mock
    // gateway authorizes everything, which is what local and CI runs want.
    let gateway = Arc::new(MockGateway::new());

    let retry = RetryPolicy {
        max_attempts: config.gateway.retry_max_attempts,
        base_delay: Duration::from_millis(config.gateway.retry_base_delay_ms),
        max_delay: Duration::from_millis(config.gateway.retry_max_delay_ms),
    };

    let coordinator = Arc::new(
        ThresholdCoordinator::new(
            Arc::new(PgConfigurationStore::new(db.pool.clone())),
            Arc::new(PgParticipantLedger::new(db.pool.clone())),
            gateway,
            Arc::new(PgTripDirectory::new(db.pool.clone())),
        )
        .with_gateway_deadline(Duration::from_secs(config.gateway.timeout_seconds))
        .with_retry_policy(retry),
    );

    let app = app(AppState { coordinator });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
