mod sweep;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use courier_api::{AppState, AppStateInner, conversations, messages, presence, users};
use courier_gateway::connection;
use courier_gateway::dispatcher::Dispatcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let db_path = std::env::var("COURIER_DB_PATH").unwrap_or_else(|_| "courier.db".into());
    let host = std::env::var("COURIER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("COURIER_PORT")
        .unwrap_or_else(|_| "4000".into())
        .parse()?;
    let presence_window_secs: u64 = std::env::var("COURIER_PRESENCE_TIMEOUT_SECS")
        .unwrap_or_else(|_| "180".into())
        .parse()?;
    let sweep_interval_secs: u64 = std::env::var("COURIER_PRESENCE_SWEEP_SECS")
        .unwrap_or_else(|_| "30".into())
        .parse()?;
    let store_timeout_ms: u64 = std::env::var("COURIER_STORE_TIMEOUT_MS")
        .unwrap_or_else(|_| "2000".into())
        .parse()?;

    // Init database
    let db = Arc::new(courier_db::Database::open(&PathBuf::from(&db_path))?);

    // Shared state
    let dispatcher = Dispatcher::new();
    let state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        dispatcher: dispatcher.clone(),
        presence_window_secs,
        store_timeout: Duration::from_millis(store_timeout_ms),
    });

    // Authoritative offline detection for clients that vanish without the
    // offline beacon
    tokio::spawn(sweep::run_presence_sweep(
        db.clone(),
        presence_window_secs,
        Duration::from_secs(sweep_interval_secs),
    ));

    // Routes
    let app = Router::new()
        .route(
            "/messages",
            post(messages::create_message).get(messages::get_messages),
        )
        .route("/presence/liveness", post(presence::update_liveness))
        .route("/presence/offline", post(presence::set_offline))
        .route("/users/search", get(users::search_users))
        .route("/users/{user_id}/status", get(users::user_status))
        .route("/conversations", get(conversations::get_conversations))
        .route("/gateway", get(ws_upgrade))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Courier server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(
            socket,
            state.dispatcher.clone(),
            state.db.clone(),
            state.store_timeout,
        )
    })
}
