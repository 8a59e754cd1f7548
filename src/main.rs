use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use salon_rebook::config::AppConfig;
use salon_rebook::db;
use salon_rebook::handlers;
use salon_rebook::services::messaging::delivery::deliver_due;
use salon_rebook::services::messaging::templates::TemplateCatalog;
use salon_rebook::services::messaging::LogSender;
use salon_rebook::services::monitoring::IntegrationMonitor;
use salon_rebook::services::platforms::build_platform;
use salon_rebook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;
    let monitor = Arc::new(IntegrationMonitor::default());
    let platform = build_platform(&config, monitor.clone())?;

    let catalog = match &config.templates_path {
        Some(path) => {
            tracing::info!("loading message templates from {path}");
            TemplateCatalog::from_file(path)?
        }
        None => TemplateCatalog::default(),
    };

    let state = Arc::new(AppState::new(
        config.clone(),
        conn,
        platform,
        Arc::new(LogSender),
        catalog,
        monitor,
    ));

    let delivery_state = Arc::clone(&state);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(
            delivery_state.config.delivery_interval_secs.max(1),
        ));
        loop {
            ticker.tick().await;
            if let Err(e) =
                deliver_due(&delivery_state.db, delivery_state.sender.as_ref(), Utc::now()).await
            {
                tracing::error!(error = %e, "delivery tick failed");
            }
        }
    });

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/webhooks/:platform", post(handlers::webhook::receive))
        .route("/api/messages", get(handlers::messages::list_messages))
        .route(
            "/api/messages/:id",
            axum::routing::put(handlers::messages::edit_message),
        )
        .route(
            "/api/messages/:id/cancel",
            post(handlers::messages::cancel_message),
        )
        .route(
            "/api/customers/:id/suggestions",
            get(handlers::suggestions::get_suggestions),
        )
        .route("/api/templates", get(handlers::templates::get_templates))
        .route(
            "/api/webhooks/:platform/registration",
            post(handlers::webhook::register).delete(handlers::webhook::unregister),
        )
        .route("/api/metrics", get(handlers::metrics::get_metrics))
        .route("/api/metrics/reset", post(handlers::metrics::reset_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
