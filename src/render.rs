use std::collections::HashSet;

use chrono::{Local, NaiveDate, TimeZone};
use tokio::sync::watch;

use crate::message::DisplayMessage;
use crate::poller::{ConnectionStatus, Snapshot};

/// 12-hour local time, e.g. `09:05 PM`.
pub fn format_time(timestamp_ms: i64) -> String {
    Local
        .timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|dt| dt.format("%I:%M %p").to_string())
        .unwrap_or_else(|| "--:--".to_string())
}

pub fn format_line(msg: &DisplayMessage) -> String {
    let who = match &msg.username {
        Some(username) => format!("{} (@{})", msg.author, username),
        None => msg.author.clone(),
    };
    format!("[{}] {}: {}", format_time(msg.timestamp_ms), who, msg.text)
}

fn format_status(status: &ConnectionStatus) -> String {
    match status {
        ConnectionStatus::Idle => "○ Disconnected".to_string(),
        ConnectionStatus::Connecting => "… Connecting".to_string(),
        ConnectionStatus::Connected => "● Live".to_string(),
        ConnectionStatus::Error(e) => format!("✗ Error: {e}"),
    }
}

const EMPTY_DAY: &str = "No messages yet today";

fn day_header(day: NaiveDate) -> String {
    format!("── Today's messages: {} ──", day.format("%A, %B %-d, %Y"))
}

/// Turns successive snapshots into terminal lines, printing each message once.
#[derive(Debug, Default)]
pub struct Renderer {
    day: Option<NaiveDate>,
    status: Option<ConnectionStatus>,
    shown: HashSet<i64>,
    /// Whether the empty-day line has been printed for the current empty run.
    empty_noted: bool,
}

impl Renderer {
    pub fn render(&mut self, snapshot: &Snapshot) -> Vec<String> {
        let mut lines = Vec::new();

        if self.day != Some(snapshot.day) {
            self.day = Some(snapshot.day);
            self.shown.clear();
            self.empty_noted = false;
            lines.push(day_header(snapshot.day));
        }

        if self.status.as_ref() != Some(&snapshot.status) {
            self.status = Some(snapshot.status.clone());
            lines.push(format_status(&snapshot.status));
        }

        let current: HashSet<i64> = snapshot.messages.iter().map(|m| m.id).collect();
        if !self.shown.is_subset(&current) {
            self.shown.clear();
            lines.push("(messages cleared)".to_string());
        }

        for msg in &snapshot.messages {
            if self.shown.insert(msg.id) {
                lines.push(format_line(msg));
            }
        }

        if snapshot.messages.is_empty() {
            if !self.empty_noted {
                self.empty_noted = true;
                lines.push(EMPTY_DAY.to_string());
            }
        } else {
            self.empty_noted = false;
        }

        lines
    }
}

/// Print every snapshot change until the poller goes away.
pub async fn run(mut snapshots: watch::Receiver<Snapshot>) {
    let mut renderer = Renderer::default();
    loop {
        let lines = {
            let snapshot = snapshots.borrow_and_update();
            renderer.render(&snapshot)
        };
        for line in lines {
            println!("{line}");
        }
        if snapshots.changed().await.is_err() {
            break;
        }
    }
}
