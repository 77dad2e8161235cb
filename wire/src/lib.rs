//! Shared wire schema for the chatbot backend.
//!
//! This crate owns the JSON representation of every HTTP payload the client
//! exchanges with the backend, plus the frame codec for the human-support
//! WebSocket channel. Optional and late-added fields default on decode so an
//! older or newer backend never breaks the client.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error returned by [`decode_frame`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The text could not be decoded as a JSON support frame.
    #[error("failed to decode support frame: {0}")]
    Decode(#[from] serde_json::Error),
    /// The frame is valid JSON but carries no string `type` discriminator.
    #[error("support frame is missing its `type` field")]
    MissingType,
}

// =============================================================================
// CHATBOTS
// =============================================================================

/// A chatbot as returned by `GET /chatbots/{id}` and `GET /chatbots/`.
///
/// The client never mutates a chatbot; it only caches the selected one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chatbot {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub system_prompt: String,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Body for `POST /chatbots/`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatbotCreate {
    pub name: String,
    pub description: Option<String>,
    pub system_prompt: String,
}

/// One row of `GET /chatbots/stats/all`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatbotStats {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub document_count: u64,
    #[serde(default)]
    pub chunk_count: u64,
    #[serde(default)]
    pub session_count: u64,
}

/// A canned question offered before the visitor starts chatting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SuggestedQuestion {
    pub id: i64,
    #[serde(default)]
    pub chatbot_id: i64,
    pub question_text: String,
    #[serde(default)]
    pub display_order: i64,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

// =============================================================================
// SESSIONS + HISTORY
// =============================================================================

/// Body for `POST /chat/sessions`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub chatbot_id: i64,
}

/// Response of `POST /chat/sessions`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreatedSession {
    pub session_id: String,
    #[serde(default)]
    pub chatbot_id: Option<i64>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Response of `GET /chat/sessions/{id}/info`, used to validate restoration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    #[serde(default)]
    pub session_id: String,
    pub chatbot_id: i64,
    pub chatbot_active: bool,
    #[serde(default)]
    pub has_messages: bool,
    #[serde(default)]
    pub message_count: u64,
}

/// Response of `GET /chat/sessions/{id}/history?limit=N`.
///
/// `history` is the canonical, oldest-first log of question/answer pairs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryPage {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub total_messages: u64,
    #[serde(default)]
    pub returned_messages: Option<u64>,
}

impl HistoryPage {
    /// Number of pairs returned, falling back to the array length when the
    /// backend omits `returned_messages`.
    #[must_use]
    pub fn returned(&self) -> u64 {
        self.returned_messages
            .unwrap_or_else(|| u64::try_from(self.history.len()).unwrap_or(u64::MAX))
    }
}

/// One stored exchange: the visitor's message and the bot's response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub id: Option<i64>,
    pub message: String,
    pub response: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub context_used: bool,
    #[serde(default)]
    pub feedback: Option<HistoryFeedback>,
}

/// Feedback previously recorded for a history entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryFeedback {
    #[serde(rename = "type")]
    pub kind: FeedbackKind,
}

// =============================================================================
// CHAT + FEEDBACK
// =============================================================================

/// Body for `POST /chat/`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub chatbot_id: i64,
    pub session_id: Option<String>,
}

/// Response of `POST /chat/`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub message_id: Option<i64>,
    #[serde(default)]
    pub context_used: bool,
    #[serde(default)]
    pub sources: Vec<String>,
}

/// The two mutually exclusive feedback choices on a bot message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    ThumbsUp,
    ThumbsDown,
}

impl FeedbackKind {
    /// Wire spelling, e.g. `"thumbs_up"`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ThumbsUp => "thumbs_up",
            Self::ThumbsDown => "thumbs_down",
        }
    }
}

/// Body for `POST /chat/feedback`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRequest {
    pub message_id: i64,
    pub feedback_type: FeedbackKind,
}

// =============================================================================
// HUMAN SUPPORT
// =============================================================================

/// Lifecycle of a human-support request.
///
/// Variants are declared in progression order so `Ord` expresses the
/// one-way `pending -> active -> resolved -> closed` progression.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupportStatus {
    Pending,
    Active,
    Resolved,
    Closed,
}

impl SupportStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }
}

/// Body for `POST /human-support/request`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SupportRequestCreate {
    pub chatbot_id: i64,
    pub session_id: String,
    pub initial_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
}

/// Response of `POST /human-support/request`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SupportRequestAck {
    pub request_id: String,
    pub status: SupportStatus,
    #[serde(default)]
    pub message: String,
}

/// Who authored a support message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    User,
    Admin,
    #[serde(other)]
    System,
}

/// Body for `POST /human-support/requests/{id}/messages`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SupportMessageCreate {
    pub message: String,
    pub sender_type: SenderType,
}

/// A message stored on a support request; also the `new_message` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SupportMessage {
    #[serde(default)]
    pub message_id: Option<i64>,
    pub sender_type: SenderType,
    pub message: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
}

/// A JSON frame on the support channel, discriminated by `type`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SupportFrame {
    Ping,
    Pong,
    NewMessage {
        data: SupportMessage,
    },
    AdminJoined {
        #[serde(default)]
        message: String,
        #[serde(default)]
        request_id: Option<String>,
    },
    RequestResolved {
        #[serde(default)]
        message: String,
        #[serde(default)]
        request_id: Option<String>,
    },
    RequestClosed {
        #[serde(default)]
        message: String,
        #[serde(default)]
        request_id: Option<String>,
    },
    UserTyping {
        #[serde(default)]
        sender: Option<String>,
    },
    /// Any frame type this client does not understand.
    #[serde(other)]
    Unknown,
}

impl SupportFrame {
    /// The support status this frame moves the request to, if any.
    #[must_use]
    pub fn status_transition(&self) -> Option<SupportStatus> {
        match self {
            Self::AdminJoined { .. } => Some(SupportStatus::Active),
            Self::RequestResolved { .. } => Some(SupportStatus::Resolved),
            Self::RequestClosed { .. } => Some(SupportStatus::Closed),
            _ => None,
        }
    }
}

/// Encode a support frame as JSON text.
#[must_use]
pub fn encode_frame(frame: &SupportFrame) -> String {
    // Serializing these plain enums cannot fail; fall back to an empty object.
    serde_json::to_string(frame).unwrap_or_else(|_| "{}".to_owned())
}

/// Decode a JSON text frame.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] for malformed JSON or payloads, and
/// [`CodecError::MissingType`] when the `type` discriminator is absent.
pub fn decode_frame(text: &str) -> Result<SupportFrame, CodecError> {
    let value: Value = serde_json::from_str(text)?;
    if !value.get("type").is_some_and(Value::is_string) {
        return Err(CodecError::MissingType);
    }
    Ok(serde_json::from_value(value)?)
}

/// Extract a human-readable message from an error response body.
///
/// The backend reports errors as `{"detail": "..."}`; validation errors carry
/// a list of objects with `msg` fields instead.
#[must_use]
pub fn error_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        Value::String(text) => Some(text.clone()),
        Value::Array(items) => {
            let joined = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("; ");
            (!joined.is_empty()).then_some(joined)
        }
        _ => None,
    }
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
