use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::handlers;
use crate::state::AppState;

/// Assemble the mediator's routes. All routes sit under `/mediator` to match
/// the channel prefix OpenHIM forwards to us.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/", get(handlers::health))
        .route("/openmrs/sync", get(handlers::sync_openmrs))
        .route("/callback", post(handlers::subscription_callback))
        .route("/endpoint", post(handlers::create_endpoint))
        .route("/organization", post(handlers::create_organization))
        .route("/service-request", post(handlers::create_service_request))
        .route("/cht/patient", post(handlers::ingest_patient))
        .route("/cht/record", post(handlers::ingest_record));

    // `nest` does not route the prefix with a trailing slash to the inner
    // `/` route, so wire `/mediator/` to the health handler explicitly.
    Router::new()
        .route("/mediator/", get(handlers::health))
        .nest("/mediator", api)
        .with_state(state)
}

/// Run the HTTP server until SIGINT/SIGTERM.
///
/// The shutdown watch channel serves double duty: it stops accepting new
/// connections and it cancels any in-flight sync batch between items.
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let state = AppState::from_config(&config, shutdown_rx.clone())?;

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(config.server.body_limit_bytes));

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "mediator listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
            tracing::info!("shutdown signal received, draining connections");
        })
        .await?;

    tracing::info!("mediator stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => tracing::error!(error = %err, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
