use chrono::{Local, NaiveDate, TimeZone};
use serde::Serialize;

use crate::telegram::Message;

/// Local calendar day of a Unix-seconds timestamp.
pub fn calendar_day(timestamp_secs: i64) -> Option<NaiveDate> {
    Local
        .timestamp_opt(timestamp_secs, 0)
        .single()
        .map(|dt| dt.date_naive())
}

/// Today's local calendar day.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Photo,
    Video,
    Document,
    Audio,
    Voice,
    Sticker,
    Location,
}

impl MessageKind {
    fn of(msg: &Message) -> Self {
        if msg.photo.is_some() {
            MessageKind::Photo
        } else if msg.video.is_some() {
            MessageKind::Video
        } else if msg.document.is_some() {
            MessageKind::Document
        } else if msg.audio.is_some() {
            MessageKind::Audio
        } else if msg.voice.is_some() {
            MessageKind::Voice
        } else if msg.sticker.is_some() {
            MessageKind::Sticker
        } else if msg.location.is_some() {
            MessageKind::Location
        } else {
            MessageKind::Text
        }
    }
}

/// A chat message as the dashboard shows it. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayMessage {
    /// Telegram `message_id`; unique within the displayed day only.
    pub id: i64,
    pub text: String,
    pub author: String,
    /// Without the leading `@`.
    pub username: Option<String>,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
    #[serde(rename = "date")]
    pub calendar_day: NaiveDate,
    #[serde(rename = "type")]
    pub kind: MessageKind,
}

impl DisplayMessage {
    /// Returns `None` only when `date` is outside chrono's representable range.
    pub fn from_message(msg: &Message) -> Option<Self> {
        let calendar_day = calendar_day(msg.date)?;
        let kind = MessageKind::of(msg);

        let text = match msg.text.as_deref() {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => placeholder(msg, kind),
        };

        let (author, username) = match &msg.from {
            Some(user) => {
                let author = match user.last_name.as_deref() {
                    Some(last) if !last.is_empty() => format!("{} {}", user.first_name, last),
                    _ => user.first_name.clone(),
                };
                let username = user
                    .username
                    .as_deref()
                    .map(|u| u.trim_start_matches('@'))
                    .filter(|u| !u.is_empty())
                    .map(str::to_string);
                (author, username)
            }
            None => (String::new(), None),
        };

        Some(Self {
            id: msg.message_id,
            text,
            author,
            username,
            timestamp_ms: msg.date * 1000,
            calendar_day,
            kind,
        })
    }
}

fn placeholder(msg: &Message, kind: MessageKind) -> String {
    match kind {
        MessageKind::Photo => "[Photo]".to_string(),
        MessageKind::Video => "[Video]".to_string(),
        MessageKind::Document => {
            let name = msg
                .document
                .as_ref()
                .and_then(|d| d.file_name.as_deref())
                .filter(|n| !n.is_empty())
                .unwrap_or("File");
            format!("[Document: {name}]")
        }
        MessageKind::Audio => "[Audio]".to_string(),
        MessageKind::Voice => "[Voice]".to_string(),
        MessageKind::Sticker => "[Sticker]".to_string(),
        MessageKind::Location => "[Location]".to_string(),
        MessageKind::Text => "[Media/File]".to_string(),
    }
}
