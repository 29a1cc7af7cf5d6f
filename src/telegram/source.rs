use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use super::types::{ApiResponse, Update};
use crate::error::FetchError;

/// Client-side abort deadline for one poll. Longer than the relay's own
/// 28s ceiling so the relay always answers first.
pub const CLIENT_DEADLINE: Duration = Duration::from_secs(35);

/// Parameters of one `getUpdates` long-poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdatesQuery {
    pub offset: i64,
    pub limit: u32,
    pub timeout: u32,
}

impl UpdatesQuery {
    /// The query the poller issues: 100 updates, 30s long-poll.
    pub fn after(last_update_id: i64) -> Self {
        Self {
            offset: last_update_id + 1,
            limit: 100,
            timeout: 30,
        }
    }
}

/// Anything that can answer a `getUpdates` poll.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    fn name(&self) -> &str;

    async fn get_updates(
        &self,
        bot_token: &str,
        query: &UpdatesQuery,
    ) -> Result<Vec<Update>, FetchError>;
}

#[derive(Debug, Clone)]
enum Endpoint {
    /// `<base>/bot<token>/getUpdates`
    Direct { api_base_url: String },
    /// `<url>?botToken=<token>&...`
    Relay { url: String },
}

/// Polls over HTTP, either straight against the Bot API or through the relay.
pub struct HttpUpdateSource {
    client: reqwest::Client,
    endpoint: Endpoint,
    deadline: Duration,
}

impl HttpUpdateSource {
    pub fn direct(api_base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: Endpoint::Direct {
                api_base_url: api_base_url.trim_end_matches('/').to_string(),
            },
            deadline: CLIENT_DEADLINE,
        }
    }

    pub fn relay(url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: Endpoint::Relay {
                url: url.to_string(),
            },
            deadline: CLIENT_DEADLINE,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }
}

#[async_trait]
impl UpdateSource for HttpUpdateSource {
    fn name(&self) -> &str {
        match self.endpoint {
            Endpoint::Direct { .. } => "telegram",
            Endpoint::Relay { .. } => "relay",
        }
    }

    async fn get_updates(
        &self,
        bot_token: &str,
        query: &UpdatesQuery,
    ) -> Result<Vec<Update>, FetchError> {
        let params = [
            ("offset", query.offset.to_string()),
            ("limit", query.limit.to_string()),
            ("timeout", query.timeout.to_string()),
        ];

        let request = match &self.endpoint {
            Endpoint::Direct { api_base_url } => self
                .client
                .get(format!("{api_base_url}/bot{bot_token}/getUpdates"))
                .query(&params),
            Endpoint::Relay { url } => self
                .client
                .get(url)
                .query(&[("botToken", bot_token)])
                .query(&params),
        };

        debug!(
            "polling {} (offset={}, limit={}, timeout={})",
            self.name(),
            query.offset,
            query.limit,
            query.timeout
        );

        let response = request.timeout(self.deadline).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        interpret_response(status, &body)
    }
}

/// Turn a raw HTTP answer from the Bot API or the relay into updates.
pub fn interpret_response(status: StatusCode, body: &[u8]) -> Result<Vec<Update>, FetchError> {
    if !status.is_success() {
        let parsed: serde_json::Value = serde_json::from_slice(body).unwrap_or_default();
        let field = |name: &str| parsed.get(name).and_then(|v| v.as_str()).map(str::to_string);

        // The relay reports its own failures as 500 "Server error" with details.
        if status == StatusCode::INTERNAL_SERVER_ERROR
            && field("error").as_deref() == Some("Server error")
        {
            return Err(FetchError::Relay(
                field("details").unwrap_or_else(|| "Server error".to_string()),
            ));
        }

        let message = field("description")
            .or_else(|| field("error"))
            .unwrap_or_else(|| format!("HTTP error! status: {}", status.as_u16()));
        return Err(FetchError::Upstream {
            status: Some(status.as_u16()),
            message,
        });
    }

    let parsed: ApiResponse<Vec<Update>> =
        serde_json::from_slice(body).map_err(|e| FetchError::Decode(e.to_string()))?;

    if !parsed.ok {
        return Err(FetchError::Upstream {
            status: None,
            message: parsed
                .description
                .unwrap_or_else(|| "Telegram API error".to_string()),
        });
    }

    Ok(parsed.result.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Query, routing::get, Json, Router};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    async fn spawn_server(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn test_query_after_high_water_mark() {
        let q = UpdatesQuery::after(41);
        assert_eq!(q.offset, 42);
        assert_eq!(q.limit, 100);
        assert_eq!(q.timeout, 30);
        assert_eq!(UpdatesQuery::after(0).offset, 1);
    }

    #[test]
    fn test_interpret_ok_false_is_upstream_error() {
        let body = br#"{"ok": false, "description": "Bad Request: chat not found"}"#;
        match interpret_response(StatusCode::OK, body) {
            Err(FetchError::Upstream { status, message }) => {
                assert_eq!(status, None);
                assert_eq!(message, "Bad Request: chat not found");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_interpret_non_success_uses_description_or_error() {
        let body = br#"{"ok": false, "error_code": 401, "description": "Unauthorized"}"#;
        match interpret_response(StatusCode::UNAUTHORIZED, body) {
            Err(FetchError::Upstream { status, message }) => {
                assert_eq!(status, Some(401));
                assert_eq!(message, "Unauthorized");
            }
            other => panic!("unexpected: {other:?}"),
        }

        let relayed = br#"{"ok": false, "error": "Not Found"}"#;
        match interpret_response(StatusCode::NOT_FOUND, relayed) {
            Err(FetchError::Upstream { message, .. }) => assert_eq!(message, "Not Found"),
            other => panic!("unexpected: {other:?}"),
        }

        match interpret_response(StatusCode::BAD_GATEWAY, b"<html>") {
            Err(FetchError::Upstream { message, .. }) => {
                assert_eq!(message, "HTTP error! status: 502")
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_interpret_relay_server_error() {
        let body = br#"{"ok": false, "error": "Server error", "details": "connection refused"}"#;
        match interpret_response(StatusCode::INTERNAL_SERVER_ERROR, body) {
            Err(FetchError::Relay(details)) => assert_eq!(details, "connection refused"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_interpret_malformed_body() {
        let result = interpret_response(StatusCode::OK, b"not json");
        assert!(matches!(result, Err(FetchError::Decode(_))));
    }

    #[test]
    fn test_interpret_ok_without_result_is_empty() {
        let updates = interpret_response(StatusCode::OK, br#"{"ok": true}"#).unwrap();
        assert!(updates.is_empty());
    }

    #[tokio::test]
    async fn test_direct_source_sends_token_in_path_and_query_params() {
        let seen: Arc<Mutex<Vec<HashMap<String, String>>>> = Arc::default();
        let seen_handler = Arc::clone(&seen);
        let app = Router::new().route(
            "/botTEST/getUpdates",
            get(move |Query(params): Query<HashMap<String, String>>| {
                let seen = Arc::clone(&seen_handler);
                async move {
                    seen.lock().unwrap().push(params);
                    Json(json!({
                        "ok": true,
                        "result": [{"update_id": 9}]
                    }))
                }
            }),
        );
        let base = spawn_server(app).await;

        let source = HttpUpdateSource::direct(&format!("{base}/"));
        let updates = source
            .get_updates("TEST", &UpdatesQuery::after(8))
            .await
            .unwrap();

        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].update_id, 9);
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0]["offset"], "9");
        assert_eq!(seen[0]["limit"], "100");
        assert_eq!(seen[0]["timeout"], "30");
    }

    #[tokio::test]
    async fn test_relay_source_sends_token_as_query_param() {
        let seen: Arc<Mutex<Vec<HashMap<String, String>>>> = Arc::default();
        let seen_handler = Arc::clone(&seen);
        let app = Router::new().route(
            "/api/telegram",
            get(move |Query(params): Query<HashMap<String, String>>| {
                let seen = Arc::clone(&seen_handler);
                async move {
                    seen.lock().unwrap().push(params);
                    Json(json!({"ok": true, "result": []}))
                }
            }),
        );
        let base = spawn_server(app).await;

        let source = HttpUpdateSource::relay(&format!("{base}/api/telegram"));
        assert_eq!(source.name(), "relay");
        let updates = source
            .get_updates("123:abc", &UpdatesQuery::after(0))
            .await
            .unwrap();

        assert!(updates.is_empty());
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0]["botToken"], "123:abc");
        assert_eq!(seen[0]["offset"], "1");
    }

    #[tokio::test]
    async fn test_deadline_maps_to_timeout() {
        let app = Router::new().route(
            "/botTEST/getUpdates",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({"ok": true, "result": []}))
            }),
        );
        let base = spawn_server(app).await;

        let source =
            HttpUpdateSource::direct(&base).with_deadline(Duration::from_millis(100));
        let result = source.get_updates("TEST", &UpdatesQuery::after(0)).await;
        assert!(matches!(result, Err(FetchError::Timeout)));
    }
}
