use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::FetchError;
use crate::telegram::DEFAULT_API_BASE_URL;

pub const MIN_INTERVAL_MS: u64 = 1000;
pub const MAX_INTERVAL_MS: u64 = 10_000;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Accepts `chat_id = -100123` as well as `chat_id = "-100123"`.
    #[serde(default, deserialize_with = "string_or_int")]
    pub chat_id: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: String::new(),
            api_base_url: default_api_base_url(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollerConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Enables `/interval`, `/token` and `/chat` on the console.
    #[serde(default = "default_true")]
    pub interactive_settings: bool,
    /// Poll through the relay at this URL instead of the Bot API directly.
    #[serde(default)]
    pub relay_url: Option<String>,
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            interactive_settings: true,
            relay_url: None,
            export_dir: default_export_dir(),
        }
    }
}

impl PollerConfig {
    /// Polling interval, clamped into the supported range.
    pub fn interval(&self) -> Duration {
        clamp_interval(self.interval_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RelayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            api_base_url: default_api_base_url(),
        }
    }
}

/// Bot token and chat id, both present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub bot_token: String,
    pub chat_id: String,
}

impl Credentials {
    pub fn new(bot_token: &str, chat_id: &str) -> Result<Self, FetchError> {
        let bot_token = bot_token.trim();
        let chat_id = chat_id.trim();
        match (bot_token.is_empty(), chat_id.is_empty()) {
            (false, false) => Ok(Self {
                bot_token: bot_token.to_string(),
                chat_id: chat_id.to_string(),
            }),
            (true, true) => Err(FetchError::Configuration(
                "bot token and chat id are not set".to_string(),
            )),
            (true, false) => Err(FetchError::Configuration(
                "bot token is not set".to_string(),
            )),
            (false, true) => Err(FetchError::Configuration(
                "chat id is not set".to_string(),
            )),
        }
    }
}

pub fn clamp_interval(ms: u64) -> Duration {
    Duration::from_millis(ms.clamp(MIN_INTERVAL_MS, MAX_INTERVAL_MS))
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_interval_ms() -> u64 {
    2000
}

fn default_true() -> bool {
    true
}

fn default_export_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

fn string_or_int<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the built-in defaults.
    /// Credentials may still arrive through the environment or the console.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(
                "No config file at {}, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Environment or command line values win over the file.
    pub fn override_credentials(&mut self, bot_token: Option<String>, chat_id: Option<String>) {
        if let Some(token) = bot_token.filter(|t| !t.trim().is_empty()) {
            self.telegram.bot_token = token;
        }
        if let Some(chat) = chat_id.filter(|c| !c.trim().is_empty()) {
            self.telegram.chat_id = chat;
        }
    }

    pub fn credentials(&self) -> Result<Credentials, FetchError> {
        Credentials::new(&self.telegram.bot_token, &self.telegram.chat_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(toml_str: &str) -> Config {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = parse("");
        assert_eq!(config.poller.interval(), Duration::from_millis(2000));
        assert!(config.poller.interactive_settings);
        assert!(config.poller.relay_url.is_none());
        assert_eq!(config.relay.bind, "127.0.0.1:3000");
        assert_eq!(config.telegram.api_base_url, "https://api.telegram.org");
        assert!(config.credentials().is_err());
    }

    #[test]
    fn test_chat_id_accepts_integer_or_string() {
        let numeric = parse("[telegram]\nbot_token = \"t\"\nchat_id = -100123\n");
        assert_eq!(numeric.telegram.chat_id, "-100123");

        let text = parse("[telegram]\nbot_token = \"t\"\nchat_id = \"@channel\"\n");
        assert_eq!(text.telegram.chat_id, "@channel");
    }

    #[test]
    fn test_interval_is_clamped() {
        let fast = parse("[poller]\ninterval_ms = 10\n");
        assert_eq!(fast.poller.interval(), Duration::from_millis(1000));

        let slow = parse("[poller]\ninterval_ms = 60000\n");
        assert_eq!(slow.poller.interval(), Duration::from_millis(10_000));

        let ok = parse("[poller]\ninterval_ms = 4500\n");
        assert_eq!(ok.poller.interval(), Duration::from_millis(4500));
    }

    #[test]
    fn test_credentials_require_both_values() {
        assert!(matches!(
            Credentials::new("", "1"),
            Err(FetchError::Configuration(m)) if m == "bot token is not set"
        ));
        assert!(matches!(
            Credentials::new("tok", "  "),
            Err(FetchError::Configuration(m)) if m == "chat id is not set"
        ));
        let creds = Credentials::new(" tok ", "42").unwrap();
        assert_eq!(creds.bot_token, "tok");
        assert_eq!(creds.chat_id, "42");
    }

    #[test]
    fn test_overrides_win_over_file_but_ignore_blanks() {
        let mut config = parse("[telegram]\nbot_token = \"file\"\nchat_id = \"1\"\n");
        config.override_credentials(Some("env".to_string()), Some("  ".to_string()));
        assert_eq!(config.telegram.bot_token, "env");
        assert_eq!(config.telegram.chat_id, "1");
    }

    #[test]
    fn test_load_and_load_or_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let missing = Config::load_or_default(&path).unwrap();
        assert!(missing.telegram.bot_token.is_empty());
        assert!(Config::load(&path).is_err());

        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[telegram]\nbot_token = \"123:abc\"\nchat_id = 42\n\n[poller]\nrelay_url = \"http://localhost:3000/api/telegram\"\nexport_dir = \"exports\"\n"
        )
        .unwrap();

        let config = Config::load_or_default(&path).unwrap();
        let creds = config.credentials().unwrap();
        assert_eq!(creds.bot_token, "123:abc");
        assert_eq!(creds.chat_id, "42");
        assert_eq!(
            config.poller.relay_url.as_deref(),
            Some("http://localhost:3000/api/telegram")
        );
        assert_eq!(config.poller.export_dir, PathBuf::from("exports"));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[poller\ninterval_ms = ").unwrap();
        assert!(Config::load_or_default(&path).is_err());
    }
}
