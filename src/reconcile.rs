//! Update reconciliation: merges polled updates into the day's message list.
//!
//! The list holds only messages from one chat and one local calendar day,
//! at most one entry per `message_id`, ordered by timestamp. The high-water
//! mark advances past every update seen, admitted or not, so the Bot API
//! stops redelivering filtered updates.

use std::collections::HashSet;

use chrono::{DateTime, Local, NaiveDate};
use serde::Serialize;
use tracing::{debug, info};

use crate::message::DisplayMessage;
use crate::telegram::Update;

/// Result of folding one batch of updates into the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeOutcome {
    pub received: usize,
    pub admitted: usize,
    pub max_seen: Option<i64>,
}

/// JSON document written by a day export.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayExport {
    pub date: NaiveDate,
    pub exported_at: DateTime<Local>,
    pub count: usize,
    pub messages: Vec<DisplayMessage>,
}

impl DayExport {
    pub fn file_name(&self) -> String {
        format!("telegram-messages-{}.json", self.date.format("%Y-%m-%d"))
    }
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    chat_id: String,
    current_day: NaiveDate,
    messages: Vec<DisplayMessage>,
    last_update_id: i64,
}

impl Reconciler {
    pub fn new(chat_id: impl Into<String>, current_day: NaiveDate) -> Self {
        Self {
            chat_id: chat_id.into(),
            current_day,
            messages: Vec::new(),
            last_update_id: 0,
        }
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// Switch to another chat. The accumulated list belongs to the old chat,
    /// so it is cleared along with the high-water mark.
    pub fn set_chat_id(&mut self, chat_id: impl Into<String>) {
        let chat_id = chat_id.into();
        if chat_id != self.chat_id {
            self.chat_id = chat_id;
            self.clear();
        }
    }

    pub fn current_day(&self) -> NaiveDate {
        self.current_day
    }

    pub fn messages(&self) -> &[DisplayMessage] {
        &self.messages
    }

    pub fn last_update_id(&self) -> i64 {
        self.last_update_id
    }

    fn admits(&self, update: &Update) -> Option<DisplayMessage> {
        let msg = update.message.as_ref()?;
        if msg.chat.id.to_string() != self.chat_id {
            return None;
        }
        let display = DisplayMessage::from_message(msg)?;
        (display.calendar_day == self.current_day).then_some(display)
    }

    pub fn apply(&mut self, updates: &[Update]) -> MergeOutcome {
        let mut outcome = MergeOutcome {
            received: updates.len(),
            ..Default::default()
        };
        if updates.is_empty() {
            return outcome;
        }

        outcome.max_seen = updates.iter().map(|u| u.update_id).max();
        if let Some(max_seen) = outcome.max_seen {
            self.last_update_id = self.last_update_id.max(max_seen);
        }

        let mut known: HashSet<i64> = self.messages.iter().map(|m| m.id).collect();
        for update in updates {
            if let Some(display) = self.admits(update) {
                if known.insert(display.id) {
                    self.messages.push(display);
                    outcome.admitted += 1;
                }
            }
        }

        if outcome.admitted > 0 {
            self.messages.sort_by_key(|m| m.timestamp_ms);
        }

        debug!(
            "merged {} of {} update(s), last_update_id={}",
            outcome.admitted, outcome.received, self.last_update_id
        );
        outcome
    }

    /// Empty the list and restart the long-poll window.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.last_update_id = 0;
    }

    /// Returns true when `today` differs from the tracked day, in which case
    /// the session starts over on the new day.
    pub fn roll_over(&mut self, today: NaiveDate) -> bool {
        if today == self.current_day {
            return false;
        }
        info!(
            "day rollover {} -> {}: discarding {} message(s)",
            self.current_day,
            today,
            self.messages.len()
        );
        self.current_day = today;
        self.clear();
        true
    }

    pub fn export_day(&self) -> DayExport {
        DayExport {
            date: self.current_day,
            exported_at: Local::now(),
            count: self.messages.len(),
            messages: self.messages.clone(),
        }
    }
}
