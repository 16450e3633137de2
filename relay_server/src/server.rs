//! HTTP routes over the snapshot.
//!
//! Uses `axum` with permissive CORS so the static page can be hosted elsewhere.

use std::sync::Arc;

use aggregator::Aggregator;
use axum::{
    extract::{rejection::JsonRejection, State},
    response::Json,
    routing::{get, post},
    Router,
};
use log::info;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::chat::{self, ChatRequest};
use crate::config::AppConfig;
use crate::error::{RelayError, Result};
use crate::venues;
use crate::web;

pub const SERVICE_NAME: &str = "exchange-relay";

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let aggregator = Aggregator::new(config.aggregator_config(), venues::kraken_client(&config), venues::fallback_venues(&config));
        AppState { aggregator: Arc::new(aggregator) }
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/status", get(status_handler))
        .route("/symbols", get(symbols_handler))
        .route("/signal", get(signal_handler))
        .route("/scan", get(scan_handler))
        .route("/books", get(books_handler))
        .route("/chat", post(chat_handler))
        .route("/app", get(web::index))
        .route("/app.js", get(web::app_js))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the listener fails.
pub async fn start_server(state: AppState, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr = format!("0.0.0.0:{}", port);
    info!("relay listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// GET / — liveness
async fn root_handler() -> Json<Value> {
    Json(json!({ "ok": true, "service": SERVICE_NAME, "ts": now() }))
}

/// GET /status — how the universe maps onto Kraken pairs
async fn status_handler(State(state): State<AppState>) -> Result<Json<Value>> {
    let status = state.aggregator.universe_status().await?;
    Ok(Json(json!({
        "ok": true,
        "venue": "kraken",
        "universe": state.aggregator.config().universe,
        "preferred_quotes": state.aggregator.config().quotes,
        "resolved_pairs": status.resolved.iter().map(|p| json!({
            "symbol": p.symbol,
            "pair_key": p.pair_key,
            "altname": p.altname,
        })).collect::<Vec<_>>(),
        "skipped": status.skipped,
        "fallback_venues": state.aggregator.venue_names(),
        "ts": now(),
    })))
}

/// GET /symbols — price per symbol with its venue
async fn symbols_handler(State(state): State<AppState>) -> Result<Json<Value>> {
    let snap = state.aggregator.snapshot().await?;
    Ok(Json(json!({ "ok": true, "ts": snap.ts, "data": snap.symbols() })))
}

/// GET /signal — the full snapshot
async fn signal_handler(State(state): State<AppState>) -> Result<Json<Value>> {
    let snap = state.aggregator.snapshot().await?;
    Ok(Json(json!({
        "ok": true,
        "ts": snap.ts,
        "skipped": snap.skipped,
        "venues_failed": snap.venues_failed,
        "data": snap.rows,
    })))
}

/// GET /scan — symbols ranked by momentum
async fn scan_handler(State(state): State<AppState>) -> Result<Json<Value>> {
    let snap = state.aggregator.snapshot().await?;
    Ok(Json(json!({ "ok": true, "ts": snap.ts, "data": snap.scan() })))
}

/// GET /books — whale levels of every symbol with a book
async fn books_handler(State(state): State<AppState>) -> Result<Json<Value>> {
    let snap = state.aggregator.snapshot().await?;
    let data: Vec<Value> = snap
        .rows
        .iter()
        .filter_map(|r| {
            r.whales.as_ref().map(|w| {
                json!({
                    "symbol": r.symbol,
                    "pair_key": r.pair_key,
                    "price_venue": r.price_venue,
                    "whales": w,
                })
            })
        })
        .collect();
    Ok(Json(json!({
        "ok": true,
        "ts": snap.ts,
        "whale_usd_floor": state.aggregator.config().whale_usd_floor,
        "data": data,
    })))
}

/// POST /chat — free-text question answered from the snapshot
async fn chat_handler(
    State(state): State<AppState>,
    body: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<Value>> {
    let Json(req) = body.map_err(|e| RelayError::BadRequest(e.body_text()))?;
    let message = req.message.trim();
    if message.is_empty() {
        return Err(RelayError::BadRequest("message must not be empty".to_string()));
    }
    let snap = state.aggregator.snapshot().await?;
    let reply = chat::answer(&snap, message);
    Ok(Json(json!({ "ok": true, "reply": reply.reply, "symbols": reply.symbols })))
}
