//! `getUpdates` relay.
//!
//! Forwards `/api/telegram?botToken=...` to the Bot API with a long-poll
//! timeout capped below the relay's own deadline, and normalizes failures
//! into `{ ok: false, error, details? }` bodies. Every response carries
//! permissive CORS headers so a browser dashboard can call it directly.

use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN,
        },
        HeaderValue, StatusCode,
    },
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::RelayConfig;

/// Long-poll seconds used when the caller gives none.
pub const DEFAULT_TIMEOUT_SECS: i64 = 10;
/// Upper bound on the forwarded long-poll, kept under [`UPSTREAM_DEADLINE`].
pub const MAX_TIMEOUT_SECS: i64 = 25;
/// Hard ceiling on one upstream call.
pub const UPSTREAM_DEADLINE: Duration = Duration::from_secs(28);

#[derive(Clone)]
pub struct RelayState {
    client: reqwest::Client,
    api_base_url: String,
    deadline: Duration,
}

impl RelayState {
    pub fn new(api_base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            deadline: UPSTREAM_DEADLINE,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RelayParams {
    #[serde(rename = "botToken")]
    pub bot_token: Option<String>,
    pub offset: Option<String>,
    pub limit: Option<String>,
    pub timeout: Option<String>,
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("{0}")]
    BadRequest(String),

    #[error("upstream {status}: {message}")]
    Upstream { status: StatusCode, message: String },

    #[error("server error: {0}")]
    Server(String),
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        match self {
            RelayError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "ok": false, "error": message })),
            )
                .into_response(),
            RelayError::Upstream { status, message } => {
                (status, Json(json!({ "ok": false, "error": message }))).into_response()
            }
            RelayError::Server(details) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "ok": false, "error": "Server error", "details": details })),
            )
                .into_response(),
        }
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(e: reqwest::Error) -> Self {
        // Drop the URL: it embeds the bot token.
        let e = e.without_url();
        error!("Telegram API error: {}", e);
        RelayError::Server(e.to_string())
    }
}

/// Long-poll seconds to forward: the requested value, or the default when it
/// is missing, unparsable or not positive, capped at [`MAX_TIMEOUT_SECS`].
pub fn effective_timeout(requested: Option<&str>) -> i64 {
    requested
        .and_then(|t| t.trim().parse::<i64>().ok())
        .filter(|t| *t > 0)
        .unwrap_or(DEFAULT_TIMEOUT_SECS)
        .min(MAX_TIMEOUT_SECS)
}

/// `<base>/bot<token>/getUpdates`, with the token percent-encoded as a single
/// path segment so it cannot reach another method.
fn updates_url(api_base_url: &str, bot_token: &str) -> Result<reqwest::Url, RelayError> {
    let mut url = reqwest::Url::parse(api_base_url)
        .map_err(|e| RelayError::Server(format!("invalid upstream URL: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| RelayError::Server("invalid upstream URL: cannot be a base".to_string()))?
        .pop_if_empty()
        .push(&format!("bot{bot_token}"))
        .push("getUpdates");
    Ok(url)
}

fn parse_int(name: &str, value: Option<&str>) -> Result<Option<i64>, RelayError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => v
            .parse::<i64>()
            .map(Some)
            .map_err(|_| RelayError::BadRequest(format!("{name} must be an integer"))),
    }
}

async fn relay_updates(
    State(state): State<RelayState>,
    Query(params): Query<RelayParams>,
) -> Result<Json<Value>, RelayError> {
    let bot_token = params
        .bot_token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| RelayError::BadRequest("Bot token is required".to_string()))?;

    let offset = parse_int("offset", params.offset.as_deref())?;
    let limit = parse_int("limit", params.limit.as_deref())?;
    let timeout = effective_timeout(params.timeout.as_deref());

    let mut query: Vec<(&str, String)> = Vec::with_capacity(3);
    if let Some(offset) = offset {
        query.push(("offset", offset.to_string()));
    }
    if let Some(limit) = limit {
        query.push(("limit", limit.to_string()));
    }
    query.push(("timeout", timeout.to_string()));

    debug!(
        "Relaying getUpdates (offset={:?}, limit={:?}, timeout={})",
        offset, limit, timeout
    );

    let url = updates_url(&state.api_base_url, bot_token)?;
    let response = state
        .client
        .get(url)
        .query(&query)
        .timeout(state.deadline)
        .send()
        .await?;

    let status = response.status();
    let body: Value = response.json().await?;

    if !status.is_success() {
        let message = body
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("Telegram API error")
            .to_string();
        debug!("Upstream answered {}: {}", status, message);
        return Err(RelayError::Upstream { status, message });
    }

    Ok(Json(body))
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

async fn cors_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

pub fn router(state: RelayState) -> Router {
    Router::new()
        .route(
            "/api/telegram",
            get(relay_updates).post(relay_updates).options(preflight),
        )
        .route("/health", get(health))
        .layer(middleware::map_response(cors_headers))
        .with_state(state)
}

/// Serve the relay until Ctrl-C.
pub async fn serve(config: &RelayConfig) -> Result<()> {
    let app = router(RelayState::new(&config.api_base_url));

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;

    info!("Relay listening on http://{}/api/telegram", config.bind);
    info!("  Upstream: {}", config.api_base_url);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Relay shutting down");
        })
        .await
        .context("Server error")?;

    Ok(())
}
