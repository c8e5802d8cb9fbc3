use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::validate_request::ValidateRequestHeaderLayer;
use tracing::info;
use uuid::Uuid;

use crate::cache::TtlCache;
use crate::config::Config;
use crate::events::{ws_handler, EventSender};
use crate::model::{Analysis, Notice, Ticker};
use crate::pipeline::Analyzer;

/// Shared state for the UI server.
#[derive(Clone)]
pub struct AppState {
    pub analyzer: Arc<Analyzer>,
    pub cache: Arc<TtlCache<Ticker, Analysis>>,
    pub event_tx: EventSender,
    pub default_ticker: String,
}

// ─── REST request/response types ───────────────────────

#[derive(Deserialize)]
pub struct AnalyzeQuery {
    ticker: Option<String>,
    #[serde(default)]
    refresh: bool,
    /// Client-chosen id, echoed on progress events for this run.
    request_id: Option<Uuid>,
}

#[derive(Serialize)]
struct RejectedResponse {
    notices: Vec<Notice>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    cached_tickers: usize,
}

// ─── Handlers ──────────────────────────────────────────

async fn api_analyze(
    State(state): State<AppState>,
    Query(params): Query<AnalyzeQuery>,
) -> Response {
    let ticker: Ticker = match params.ticker.unwrap_or_default().parse() {
        Ok(t) => t,
        Err(e) => {
            let body = RejectedResponse {
                notices: vec![Notice::warning(e.to_string())],
            };
            return (StatusCode::BAD_REQUEST, Json(body)).into_response();
        }
    };

    if !params.refresh {
        if let Some(mut cached) = state.cache.get(&ticker) {
            info!("Serving cached analysis for {}", ticker);
            cached.cached = true;
            return Json(cached).into_response();
        }
    }

    let request_id = params.request_id.unwrap_or_else(Uuid::new_v4);
    let analysis = state.analyzer.analyze_with_id(request_id, &ticker).await;
    // Failed runs are not pinned for the whole TTL.
    if analysis.summary.is_some() {
        state.cache.insert(ticker, analysis.clone());
    }
    Json(analysis).into_response()
}

async fn api_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        cached_tickers: state.cache.len(),
    })
}

async fn serve_index(State(state): State<AppState>) -> impl IntoResponse {
    Html(render_index(
        &state.default_ticker,
        state.analyzer.index_ticker(),
    ))
}

fn render_index(default_ticker: &str, index_ticker: &str) -> String {
    include_str!("../static/index.html")
        .replace("{{default_ticker}}", &attr_safe(default_ticker))
        .replace("{{index_ticker}}", &attr_safe(index_ticker))
}

/// Keep only characters that can appear in a ticker symbol.
fn attr_safe(ticker: &str) -> String {
    ticker
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='))
        .collect()
}

// ─── Router & server startup ───────────────────────────

pub fn build_router(state: AppState, password: &str) -> Router {
    let api_routes = Router::new()
        .route("/api/analyze", get(api_analyze))
        .route("/api/health", get(api_health))
        .route("/ws", get(ws_handler).with_state(state.event_tx.clone()));

    let app = Router::new()
        .route("/", get(serve_index))
        .merge(api_routes)
        .with_state(state);

    if password.is_empty() {
        app
    } else {
        app.layer(ValidateRequestHeaderLayer::basic("admin", password))
    }
}

/// Serve the UI until Ctrl+C.
pub async fn start_dashboard(config: &Config, state: AppState) -> Result<()> {
    let app = build_router(state, &config.dashboard_password);
    let addr = config.dashboard_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind dashboard to {}", addr))?;

    info!("Dashboard listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Ctrl+C received, shutting down");
        })
        .await
        .context("Dashboard server error")?;

    Ok(())
}
