use thiserror::Error;

/// Failure of a single poll against the relay or the Bot API.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Bot token or chat id missing.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The client-side deadline elapsed. Retried silently on the next tick.
    #[error("request timed out")]
    Timeout,

    /// Non-success HTTP status or an `ok: false` payload.
    #[error("{message}")]
    Upstream { status: Option<u16>, message: String },

    /// The relay's own failure (its 500 "Server error" response).
    #[error("relay error: {0}")]
    Relay(String),

    #[error("network error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Decode(String),
}

impl FetchError {
    /// Whether the failure should leave connection state untouched.
    pub fn is_benign(&self) -> bool {
        matches!(self, FetchError::Timeout)
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        // The request URL carries the bot token.
        let e = e.without_url();
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_decode() {
            FetchError::Decode(e.to_string())
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}
