use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tokio::sync::{watch, Mutex, Notify};
use tracing::{debug, info, warn};

use crate::config::{clamp_interval, Credentials, PollerConfig};
use crate::error::FetchError;
use crate::message::DisplayMessage;
use crate::reconcile::Reconciler;
use crate::telegram::{UpdateSource, UpdatesQuery};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Idle,
    Connecting,
    Connected,
    Error(String),
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ConnectionStatus::Error(e) => Some(e),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Idle => write!(f, "idle"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Error(e) => write!(f, "error: {e}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub interval: Duration,
    pub interactive_settings: bool,
}

impl From<&PollerConfig> for PollerSettings {
    fn from(config: &PollerConfig) -> Self {
        Self {
            interval: config.interval(),
            interactive_settings: config.interactive_settings,
        }
    }
}

/// Point-in-time view of the session, published after every change.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub status: ConnectionStatus,
    pub polling: bool,
    pub day: NaiveDate,
    pub messages: Vec<DisplayMessage>,
    pub last_update_id: i64,
    pub interval: Duration,
    pub completed_cycles: u64,
}

/// Per-session state. Only touched under the poller's lock.
struct Session {
    bot_token: String,
    reconciler: Reconciler,
    status: ConnectionStatus,
    polling: bool,
    /// Bumped by every start/stop so a superseded loop knows to exit.
    generation: u64,
    interval: Duration,
    completed_cycles: u64,
}

impl Session {
    fn credentials(&self) -> Result<Credentials, FetchError> {
        Credentials::new(&self.bot_token, self.reconciler.chat_id())
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            status: self.status.clone(),
            polling: self.polling,
            day: self.reconciler.current_day(),
            messages: self.reconciler.messages().to_vec(),
            last_update_id: self.reconciler.last_update_id(),
            interval: self.interval,
            completed_cycles: self.completed_cycles,
        }
    }
}

struct Inner {
    source: Arc<dyn UpdateSource>,
    session: Mutex<Session>,
    wake: Notify,
    interactive_settings: bool,
    snapshots: watch::Sender<Snapshot>,
}

/// Polls one chat and keeps today's messages reconciled in memory.
#[derive(Clone)]
pub struct Poller {
    inner: Arc<Inner>,
}

impl Poller {
    pub fn new(
        source: Arc<dyn UpdateSource>,
        bot_token: &str,
        chat_id: &str,
        settings: PollerSettings,
        today: NaiveDate,
    ) -> Self {
        let session = Session {
            bot_token: bot_token.trim().to_string(),
            reconciler: Reconciler::new(chat_id.trim(), today),
            status: ConnectionStatus::Idle,
            polling: false,
            generation: 0,
            interval: clamp_interval(settings.interval.as_millis() as u64),
            completed_cycles: 0,
        };
        let (snapshots, _) = watch::channel(session.snapshot());

        Self {
            inner: Arc::new(Inner {
                source,
                session: Mutex::new(session),
                wake: Notify::new(),
                interactive_settings: settings.interactive_settings,
                snapshots,
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.inner.snapshots.subscribe()
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.inner.session.lock().await.snapshot()
    }

    pub fn interactive_settings(&self) -> bool {
        self.inner.interactive_settings
    }

    fn publish(&self, session: &Session) {
        self.inner.snapshots.send_replace(session.snapshot());
    }

    /// Begin polling: immediate fetch, then one fetch per interval.
    /// Restarts the loop if it is already running.
    pub async fn start(&self) -> Result<(), FetchError> {
        let generation = {
            let mut session = self.inner.session.lock().await;
            session.credentials()?;
            session.generation += 1;
            session.polling = true;
            session.status = ConnectionStatus::Connecting;
            self.publish(&session);
            session.generation
        };

        // Let a previous loop notice it has been superseded.
        self.inner.wake.notify_waiters();

        info!("Polling started via {}", self.inner.source.name());
        let poller = self.clone();
        tokio::spawn(async move { poller.run(generation).await });
        Ok(())
    }

    /// Stop polling. A fetch already in flight still has its messages merged.
    pub async fn stop(&self) {
        {
            let mut session = self.inner.session.lock().await;
            if !session.polling && session.status == ConnectionStatus::Idle {
                return;
            }
            session.generation += 1;
            session.polling = false;
            session.status = ConnectionStatus::Idle;
            self.publish(&session);
        }
        self.inner.wake.notify_waiters();
        info!("Polling stopped");
    }

    async fn is_current(&self, generation: u64) -> bool {
        let session = self.inner.session.lock().await;
        session.polling && session.generation == generation
    }

    async fn run(self, generation: u64) {
        loop {
            if !self.is_current(generation).await {
                break;
            }

            self.fetch_cycle().await;

            let interval = self.inner.session.lock().await.interval;
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = self.inner.wake.notified() => {}
            }
        }
        debug!("Polling loop {} exited", generation);
    }

    /// One poll: fetch after the high-water mark, then fold the result in.
    /// Messages are always merged; the status only moves if no start/stop
    /// happened while the request was out.
    pub async fn fetch_cycle(&self) {
        let (credentials, query, generation) = {
            let session = self.inner.session.lock().await;
            if !session.polling {
                return;
            }
            match session.credentials() {
                Ok(c) => (
                    c,
                    UpdatesQuery::after(session.reconciler.last_update_id()),
                    session.generation,
                ),
                Err(e) => {
                    debug!("Skipping fetch: {}", e);
                    return;
                }
            }
        };

        let result = self
            .inner
            .source
            .get_updates(&credentials.bot_token, &query)
            .await;

        let mut session = self.inner.session.lock().await;
        session.completed_cycles += 1;
        let current = session.polling && session.generation == generation;
        match result {
            Ok(updates) => {
                if session.reconciler.chat_id() == credentials.chat_id {
                    let outcome = session.reconciler.apply(&updates);
                    if outcome.admitted > 0 {
                        info!(
                            "{} new message(s), {} displayed",
                            outcome.admitted,
                            session.reconciler.messages().len()
                        );
                    }
                } else {
                    debug!("Chat changed while fetching, dropping {} update(s)", updates.len());
                }
                if current {
                    session.status = ConnectionStatus::Connected;
                }
            }
            Err(e) if e.is_benign() => {
                info!("Request timeout, retrying...");
            }
            Err(e) => {
                warn!("Poll via {} failed: {}", self.inner.source.name(), e);
                if current {
                    session.status = ConnectionStatus::Error(e.to_string());
                }
            }
        }
        self.publish(&session);
    }

    /// Empty the list and reset the high-water mark. Connection state is kept.
    pub async fn clear(&self) {
        let mut session = self.inner.session.lock().await;
        session.reconciler.clear();
        self.publish(&session);
        info!("Messages cleared");
    }

    /// Start a fresh day if `today` moved on. Returns whether it did.
    pub async fn check_rollover(&self, today: NaiveDate) -> bool {
        let mut session = self.inner.session.lock().await;
        let rolled = session.reconciler.roll_over(today);
        if rolled {
            self.publish(&session);
        }
        rolled
    }

    /// Write the displayed day to `<dir>/telegram-messages-<day>.json`.
    pub async fn export_day(&self, dir: &Path) -> Result<PathBuf> {
        let export = self.inner.session.lock().await.reconciler.export_day();

        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create export directory: {}", dir.display()))?;

        let path = dir.join(export.file_name());
        let json = serde_json::to_string_pretty(&export).context("Failed to serialize export")?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write export: {}", path.display()))?;

        info!("Exported {} message(s) to {}", export.count, path.display());
        Ok(path)
    }

    fn require_interactive(&self) -> Result<(), FetchError> {
        if self.inner.interactive_settings {
            Ok(())
        } else {
            Err(FetchError::Configuration(
                "interactive settings are disabled".to_string(),
            ))
        }
    }

    /// Change the polling interval; applies from the next wait.
    pub async fn set_interval(&self, ms: u64) -> Result<Duration, FetchError> {
        self.require_interactive()?;
        let mut session = self.inner.session.lock().await;
        session.interval = clamp_interval(ms);
        self.publish(&session);
        info!("Polling interval set to {}ms", session.interval.as_millis());
        Ok(session.interval)
    }

    pub async fn set_bot_token(&self, bot_token: &str) -> Result<(), FetchError> {
        self.require_interactive()?;
        let mut session = self.inner.session.lock().await;
        session.bot_token = bot_token.trim().to_string();
        self.publish(&session);
        Ok(())
    }

    /// Switching chats clears the list, since it belongs to the old chat.
    pub async fn set_chat_id(&self, chat_id: &str) -> Result<(), FetchError> {
        self.require_interactive()?;
        let mut session = self.inner.session.lock().await;
        session.reconciler.set_chat_id(chat_id.trim());
        self.publish(&session);
        Ok(())
    }
}
