//! Chatbot backend HTTP API.
//!
//! DESIGN
//! ======
//! `Backend` is the seam between client logic and the network: bootstrap,
//! the selector and the runtime only ever see this trait, so tests swap in
//! an in-memory backend. `HttpBackend` maps each method onto one endpoint
//! under the configured API base.
//!
//! ERROR HANDLING
//! ==============
//! Transport failures become `Unreachable`, a 404 becomes `NotFound` for the
//! resource being fetched, any other non-2xx becomes `Status` carrying the
//! backend's `detail` text, and a body that does not match the expected
//! schema becomes `Parse`.

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;

use std::time::Duration;

use reqwest::Url;
use serde::Serialize;
use serde::de::DeserializeOwned;
use wire::{
    ChatReply, ChatRequest, Chatbot, ChatbotCreate, ChatbotStats, CreateSessionRequest, CreatedSession,
    FeedbackRequest, HistoryPage, SessionInfo, SuggestedQuestion, SupportMessageCreate, SupportRequestAck,
    SupportRequestCreate,
};

use crate::config::ChatClientConfig;
use crate::error::ClientError;

const TUNNEL_WARNING_HEADER: &str = "ngrok-skip-browser-warning";

/// Every backend endpoint the client consumes.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    /// `GET /health`
    async fn health(&self) -> Result<(), ClientError>;

    /// `GET /chatbots/{id}`
    async fn get_chatbot(&self, chatbot_id: i64) -> Result<Chatbot, ClientError>;

    /// `GET /chatbots/`
    async fn list_chatbots(&self) -> Result<Vec<Chatbot>, ClientError>;

    /// `POST /chatbots/`
    async fn create_chatbot(&self, draft: &ChatbotCreate) -> Result<Chatbot, ClientError>;

    /// `GET /chatbots/stats/all`
    async fn chatbot_stats(&self) -> Result<Vec<ChatbotStats>, ClientError>;

    /// `GET /chatbots/{id}/suggested-questions`
    async fn suggested_questions(&self, chatbot_id: i64) -> Result<Vec<SuggestedQuestion>, ClientError>;

    /// `POST /chat/sessions`
    async fn create_session(&self, chatbot_id: i64) -> Result<CreatedSession, ClientError>;

    /// `GET /chat/sessions/{id}/info`
    async fn session_info(&self, session_id: &str) -> Result<SessionInfo, ClientError>;

    /// `GET /chat/sessions/{id}/history?limit=N`
    async fn session_history(&self, session_id: &str, limit: u32) -> Result<HistoryPage, ClientError>;

    /// `POST /chat/`
    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatReply, ClientError>;

    /// `POST /chat/feedback`
    async fn submit_feedback(&self, request: &FeedbackRequest) -> Result<(), ClientError>;

    /// `POST /human-support/request`
    async fn request_support(&self, request: &SupportRequestCreate) -> Result<SupportRequestAck, ClientError>;

    /// `POST /human-support/requests/{id}/messages`
    async fn post_support_message(
        &self,
        request_id: &str,
        message: &SupportMessageCreate,
    ) -> Result<(), ClientError>;

    /// WebSocket URL of the support channel for `request_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] when the API base has no
    /// WebSocket equivalent.
    fn support_channel_url(&self, request_id: &str) -> Result<String, ClientError>;
}

// =============================================================================
// HTTP IMPLEMENTATION
// =============================================================================

/// `reqwest`-backed [`Backend`].
pub struct HttpBackend {
    http: reqwest::Client,
    api_base: String,
}

impl HttpBackend {
    /// Build a backend for `api_base` (e.g. `http://host/api`).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::HttpClientBuild`] if the HTTP client fails to build.
    pub fn new(api_base: &str, request_timeout: Duration, connect_timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| ClientError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, api_base: api_base.trim_end_matches('/').to_owned() })
    }

    /// # Errors
    ///
    /// Returns [`ClientError::HttpClientBuild`] if the HTTP client fails to build.
    pub fn from_config(config: &ChatClientConfig) -> Result<Self, ClientError> {
        Self::new(&config.api_base, config.request_timeout, config.connect_timeout)
    }

    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, resource: &str) -> Result<T, ClientError> {
        let request = self.http.get(endpoint_url(&self.api_base, path));
        let text = self.execute(request, resource).await?;
        decode_body(&text)
    }

    async fn post_json<B, T>(&self, path: &str, body: &B, resource: &str) -> Result<T, ClientError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let request = self.http.post(endpoint_url(&self.api_base, path)).json(body);
        let text = self.execute(request, resource).await?;
        decode_body(&text)
    }

    async fn post_discard<B: Serialize + Sync>(&self, path: &str, body: &B, resource: &str) -> Result<(), ClientError> {
        let request = self.http.post(endpoint_url(&self.api_base, path)).json(body);
        self.execute(request, resource).await.map(|_| ())
    }

    async fn execute(&self, request: reqwest::RequestBuilder, resource: &str) -> Result<String, ClientError> {
        let response = request
            .header(TUNNEL_WARNING_HEADER, "true")
            .send()
            .await
            .map_err(|e| ClientError::Unreachable(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ClientError::Unreachable(e.to_string()))?;
        if !(200..300).contains(&status) {
            tracing::debug!(status, resource, "backend returned error status");
            return Err(map_status(status, &text, resource));
        }
        Ok(text)
    }
}

#[async_trait::async_trait]
impl Backend for HttpBackend {
    async fn health(&self) -> Result<(), ClientError> {
        let request = self.http.get(endpoint_url(&self.api_base, "/health"));
        self.execute(request, "Server").await.map(|_| ())
    }

    async fn get_chatbot(&self, chatbot_id: i64) -> Result<Chatbot, ClientError> {
        self.get_json(&format!("/chatbots/{chatbot_id}"), "Chatbot").await
    }

    async fn list_chatbots(&self) -> Result<Vec<Chatbot>, ClientError> {
        self.get_json("/chatbots/", "Chatbots").await
    }

    async fn create_chatbot(&self, draft: &ChatbotCreate) -> Result<Chatbot, ClientError> {
        self.post_json("/chatbots/", draft, "Chatbot").await
    }

    async fn chatbot_stats(&self) -> Result<Vec<ChatbotStats>, ClientError> {
        self.get_json("/chatbots/stats/all", "Chatbot stats").await
    }

    async fn suggested_questions(&self, chatbot_id: i64) -> Result<Vec<SuggestedQuestion>, ClientError> {
        self.get_json(&format!("/chatbots/{chatbot_id}/suggested-questions"), "Suggested questions")
            .await
    }

    async fn create_session(&self, chatbot_id: i64) -> Result<CreatedSession, ClientError> {
        self.post_json("/chat/sessions", &CreateSessionRequest { chatbot_id }, "Chatbot")
            .await
    }

    async fn session_info(&self, session_id: &str) -> Result<SessionInfo, ClientError> {
        let path = format!("/chat/sessions/{}/info", path_segment(session_id));
        self.get_json(&path, "Session").await
    }

    async fn session_history(&self, session_id: &str, limit: u32) -> Result<HistoryPage, ClientError> {
        let path = format!("/chat/sessions/{}/history?limit={limit}", path_segment(session_id));
        self.get_json(&path, "Session").await
    }

    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatReply, ClientError> {
        self.post_json("/chat/", request, "Chatbot").await
    }

    async fn submit_feedback(&self, request: &FeedbackRequest) -> Result<(), ClientError> {
        self.post_discard("/chat/feedback", request, "Message").await
    }

    async fn request_support(&self, request: &SupportRequestCreate) -> Result<SupportRequestAck, ClientError> {
        self.post_json("/human-support/request", request, "Session").await
    }

    async fn post_support_message(
        &self,
        request_id: &str,
        message: &SupportMessageCreate,
    ) -> Result<(), ClientError> {
        let path = format!("/human-support/requests/{}/messages", path_segment(request_id));
        self.post_discard(&path, message, "Support request").await
    }

    fn support_channel_url(&self, request_id: &str) -> Result<String, ClientError> {
        support_ws_url(&self.api_base, request_id)
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Join `api_base` and an absolute endpoint `path`.
#[must_use]
pub fn endpoint_url(api_base: &str, path: &str) -> String {
    format!("{}{}", api_base.trim_end_matches('/'), path)
}

/// `ws(s)://` URL of the support channel under `api_base`.
///
/// # Errors
///
/// Returns [`ClientError::InvalidUrl`] unless `api_base` is `http` or `https`.
pub fn support_ws_url(api_base: &str, request_id: &str) -> Result<String, ClientError> {
    let base = api_base.trim_end_matches('/');
    let path = format!("/human-support/ws/{}", path_segment(request_id));
    if let Some(rest) = base.strip_prefix("http://") {
        return Ok(format!("ws://{rest}{path}"));
    }
    if let Some(rest) = base.strip_prefix("https://") {
        return Ok(format!("wss://{rest}{path}"));
    }
    Err(ClientError::InvalidUrl(base.to_owned()))
}

/// Map a non-success response onto a [`ClientError`].
#[must_use]
pub fn map_status(status: u16, body: &str, resource: &str) -> ClientError {
    if status == 404 {
        return ClientError::NotFound { resource: resource.to_owned() };
    }
    let detail = wire::error_detail(body).unwrap_or_default();
    ClientError::Status { status, detail }
}

/// Decode a JSON response body.
///
/// # Errors
///
/// Returns [`ClientError::Parse`] when `text` does not match `T`.
pub fn decode_body<T: DeserializeOwned>(text: &str) -> Result<T, ClientError> {
    serde_json::from_str(text).map_err(|e| ClientError::Parse(e.to_string()))
}

/// Percent-encode one path segment (session and request ids are opaque).
fn path_segment(raw: &str) -> String {
    let Ok(mut url) = Url::parse("http://segment.invalid/") else {
        return raw.to_owned();
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push(raw);
    }
    url.path().trim_start_matches('/').to_owned()
}
