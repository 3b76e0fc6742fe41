//! Session and short-term message types for Pulse.
//!
//! A `Session` identifies one conversation thread for a user. Its messages
//! live in the Short-Term Store in insertion order and expire together with
//! the session after a sliding inactivity window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::llm::{Message, MessageRole, ToolCall};

/// A conversation thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    /// Refreshed on every append.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// One stored turn in a session's short-term log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub session_id: String,
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Stamp a model message for storage in `session_id`.
    pub fn from_message(session_id: &str, message: &Message) -> Self {
        Self {
            session_id: session_id.to_string(),
            role: message.role,
            content: message.content.clone(),
            tool_calls: message.tool_calls.clone(),
            tool_call_id: message.tool_call_id.clone(),
            created_at: Utc::now(),
        }
    }

    pub fn into_message(self) -> Message {
        Message {
            role: self.role,
            content: self.content,
            tool_calls: self.tool_calls,
            tool_call_id: self.tool_call_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_chat_message_preserves_tool_payload() {
        let call = ToolCall {
            id: "call_7".to_string(),
            name: "get_sleep_data".to_string(),
            arguments: serde_json::json!({"start_date": "2026-01-01"}),
        };
        let original = Message::assistant_with_calls("", vec![call.clone()]);
        let stored = ChatMessage::from_message("s-1", &original);
        assert_eq!(stored.session_id, "s-1");

        let back = stored.into_message();
        assert_eq!(back, original);
        assert_eq!(back.tool_calls[0], call);
    }

    #[test]
    fn test_session_expiry() {
        let now = Utc::now();
        let session = Session {
            id: "s".into(),
            user_id: "u".into(),
            created_at: now - Duration::days(2),
            expires_at: now - Duration::seconds(1),
        };
        assert!(session.is_expired(now));
        assert!(!session.is_expired(now - Duration::days(1)));
    }
}
