//! Bot API payloads as returned by `getUpdates`.
//!
//! Only the fields the dashboard reads are modelled; everything else in the
//! upstream JSON is ignored by serde.

use serde::{Deserialize, Serialize};

/// Envelope around every Bot API response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<User>,
    /// Unix seconds.
    pub date: i64,
    pub chat: Chat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<Vec<PhotoSize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<FileRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<FileRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sticker: Option<FileRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<FileRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[allow(dead_code)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[allow(dead_code)]
pub struct Chat {
    pub id: i64,
    /// "private", "group", "supergroup" or "channel".
    #[serde(default, rename = "type")]
    pub chat_type: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[allow(dead_code)]
pub struct PhotoSize {
    pub file_id: String,
    #[serde(default)]
    pub width: i64,
    #[serde(default)]
    pub height: i64,
}

/// Video, audio, voice and sticker payloads: only presence matters here.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[allow(dead_code)]
pub struct FileRef {
    pub file_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[allow(dead_code)]
pub struct Document {
    pub file_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[allow(dead_code)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_get_updates_payload_and_ignores_unknown_fields() {
        let raw = r#"{
            "ok": true,
            "result": [
                {
                    "update_id": 41,
                    "message": {
                        "message_id": 7,
                        "from": {"id": 1, "is_bot": false, "first_name": "Ada", "username": "ada"},
                        "chat": {"id": -100123, "type": "supergroup", "title": "ops"},
                        "date": 1760000000,
                        "text": "hello"
                    }
                },
                {"update_id": 42, "edited_message": {"message_id": 7}}
            ]
        }"#;

        let parsed: ApiResponse<Vec<Update>> = serde_json::from_str(raw).unwrap();
        assert!(parsed.ok);
        let updates = parsed.result.unwrap();
        assert_eq!(updates.len(), 2);

        let msg = updates[0].message.as_ref().unwrap();
        assert_eq!(msg.chat.id, -100123);
        assert_eq!(msg.chat.chat_type, "supergroup");
        assert_eq!(msg.from.as_ref().unwrap().username.as_deref(), Some("ada"));
        assert!(updates[1].message.is_none());
    }

    #[test]
    fn test_parses_error_envelope() {
        let raw = r#"{"ok": false, "error_code": 401, "description": "Unauthorized"}"#;
        let parsed: ApiResponse<Vec<Update>> = serde_json::from_str(raw).unwrap();
        assert!(!parsed.ok);
        assert!(parsed.result.is_none());
        assert_eq!(parsed.description.as_deref(), Some("Unauthorized"));
    }
}
