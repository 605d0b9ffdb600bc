//! Lifeline - a crisis risk assessment and escalation engine.
//!
//! # API Endpoints
//!
//! - `POST /assess` - Run a risk assessment, opening an alert if warranted
//! - `POST /alerts/:id/protocol` - Execute or re-execute an alert's protocol
//! - `POST /alerts/:id/resolve` - Terminally resolve an alert
//! - `POST /interventions/:id/response` - Ingest a person's reply
//! - `POST /interventions/:id/outcome` - Record a delivery confirmation
//! - `GET /dashboard/:user_id` - Per-user crisis dashboard
//! - `GET /statistics` - Platform-wide aggregate counters
//! - `GET /health` - Health check

use std::env;
use std::net::SocketAddr;

use axum::{Router, routing::get, routing::post};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use lifeline::api::{
    AppState, assess, confirm_delivery, execute_protocol, get_dashboard, get_statistics,
    handle_response, health_check, resolve_alert,
};
use lifeline::delivery::{Delivery, GatewayClient, SimulatedDelivery};
use lifeline::engine::CrisisEngine;
use lifeline::storage::Storage;

/// Default port if not specified via environment variable.
const DEFAULT_PORT: u16 = 3000;

/// Default database path if not specified via environment variable.
const DEFAULT_DB_PATH: &str = "sqlite:lifeline.db?mode=rwc";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing with environment filter.
    // Session content never reaches the logs; handlers log ids and levels only.
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("lifeline=info".parse()?))
        .init();

    // Load configuration from environment
    let port: u16 = env::var("LIFELINE_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let db_url = env::var("LIFELINE_DATABASE_URL").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());

    info!(port, db_url = %db_url, "Starting Lifeline server");

    // Initialize storage
    let storage = Storage::new(&db_url).await?;
    info!("Database initialized");

    // Without a configured gateway, outbound messages are simulated and
    // logged instead of dispatched.
    let delivery = match env::var("LIFELINE_GATEWAY_URL") {
        Ok(url) => {
            info!(gateway = %url, "Using HTTP delivery gateway");
            Delivery::Http(GatewayClient::new(&url))
        }
        Err(_) => {
            info!("No delivery gateway configured, using simulated delivery");
            Delivery::Simulated(SimulatedDelivery::new())
        }
    };

    let engine = CrisisEngine::new(storage, delivery);
    let state = AppState { engine };

    // Build router
    let app = Router::new()
        .route("/assess", post(assess))
        .route("/alerts/:id/protocol", post(execute_protocol))
        .route("/alerts/:id/resolve", post(resolve_alert))
        .route("/interventions/:id/response", post(handle_response))
        .route("/interventions/:id/outcome", post(confirm_delivery))
        .route("/dashboard/:user_id", get(get_dashboard))
        .route("/statistics", get(get_statistics))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "Lifeline is listening");

    axum::serve(listener, app).await?;

    Ok(())
}
