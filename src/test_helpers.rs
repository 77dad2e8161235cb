//! In-memory backend for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use wire::{
    ChatReply, ChatRequest, Chatbot, ChatbotCreate, ChatbotStats, CreatedSession, FeedbackRequest, HistoryEntry,
    HistoryPage, SessionInfo, SuggestedQuestion, SupportMessageCreate, SupportRequestAck, SupportRequestCreate,
    SupportStatus,
};

use crate::error::ClientError;
use crate::net::api::Backend;

/// A chatbot record with sensible defaults.
#[must_use]
pub fn chatbot(id: i64, name: &str) -> Chatbot {
    Chatbot {
        id,
        name: name.to_owned(),
        description: Some(format!("{name} answers questions.")),
        system_prompt: "Answer from the documents.".to_owned(),
        is_active: true,
        settings: None,
        created_at: None,
        updated_at: None,
    }
}

/// A history row with a message id.
#[must_use]
pub fn history_entry(id: i64, message: &str, response: &str) -> HistoryEntry {
    HistoryEntry {
        id: Some(id),
        message: message.to_owned(),
        response: response.to_owned(),
        created_at: None,
        context_used: false,
        feedback: None,
    }
}

/// Scriptable [`Backend`] that records every call.
#[derive(Default)]
pub struct MockBackend {
    pub chatbots: Mutex<HashMap<i64, Chatbot>>,
    pub stats: Mutex<Vec<ChatbotStats>>,
    pub questions: Mutex<Vec<SuggestedQuestion>>,
    pub sessions: Mutex<HashMap<String, SessionInfo>>,
    pub histories: Mutex<HashMap<String, Vec<HistoryEntry>>>,
    pub chat_replies: Mutex<VecDeque<Result<ChatReply, ClientError>>>,
    pub chat_requests: Mutex<Vec<ChatRequest>>,
    pub feedback: Mutex<Vec<FeedbackRequest>>,
    pub support_requests: Mutex<Vec<SupportRequestCreate>>,
    pub support_messages: Mutex<Vec<(String, SupportMessageCreate)>>,
    failures: Mutex<HashMap<&'static str, ClientError>>,
    calls: Mutex<Vec<&'static str>>,
    next_session: Mutex<u32>,
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_chatbot(self, chatbot: Chatbot) -> Self {
        self.chatbots.lock().unwrap().insert(chatbot.id, chatbot);
        self
    }

    #[must_use]
    pub fn with_session(self, session_id: &str, chatbot_id: i64, history: Vec<HistoryEntry>) -> Self {
        let info = SessionInfo {
            session_id: session_id.to_owned(),
            chatbot_id,
            chatbot_active: true,
            has_messages: !history.is_empty(),
            message_count: history.len() as u64,
        };
        self.sessions.lock().unwrap().insert(session_id.to_owned(), info);
        self.histories.lock().unwrap().insert(session_id.to_owned(), history);
        self
    }

    /// Make every call to `method` fail with `error`.
    pub fn fail(&self, method: &'static str, error: ClientError) {
        self.failures.lock().unwrap().insert(method, error);
    }

    pub fn recover(&self, method: &'static str) {
        self.failures.lock().unwrap().remove(method);
    }

    pub fn push_reply(&self, reply: Result<ChatReply, ClientError>) {
        self.chat_replies.lock().unwrap().push_back(reply);
    }

    /// Names of the methods called so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    #[must_use]
    pub fn count(&self, method: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|m| **m == method).count()
    }

    fn enter(&self, method: &'static str) -> Result<(), ClientError> {
        self.calls.lock().unwrap().push(method);
        match self.failures.lock().unwrap().get(method) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl Backend for MockBackend {
    async fn health(&self) -> Result<(), ClientError> {
        self.enter("health")
    }

    async fn get_chatbot(&self, chatbot_id: i64) -> Result<Chatbot, ClientError> {
        self.enter("get_chatbot")?;
        self.chatbots
            .lock()
            .unwrap()
            .get(&chatbot_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound { resource: "Chatbot".to_owned() })
    }

    async fn list_chatbots(&self) -> Result<Vec<Chatbot>, ClientError> {
        self.enter("list_chatbots")?;
        let mut all: Vec<Chatbot> = self.chatbots.lock().unwrap().values().cloned().collect();
        all.sort_by_key(|c| c.id);
        Ok(all)
    }

    async fn create_chatbot(&self, draft: &ChatbotCreate) -> Result<Chatbot, ClientError> {
        self.enter("create_chatbot")?;
        let mut chatbots = self.chatbots.lock().unwrap();
        let id = chatbots.keys().max().copied().unwrap_or(0) + 1;
        let created = Chatbot {
            id,
            name: draft.name.clone(),
            description: draft.description.clone(),
            system_prompt: draft.system_prompt.clone(),
            is_active: true,
            settings: None,
            created_at: None,
            updated_at: None,
        };
        chatbots.insert(id, created.clone());
        Ok(created)
    }

    async fn chatbot_stats(&self) -> Result<Vec<ChatbotStats>, ClientError> {
        self.enter("chatbot_stats")?;
        Ok(self.stats.lock().unwrap().clone())
    }

    async fn suggested_questions(&self, _chatbot_id: i64) -> Result<Vec<SuggestedQuestion>, ClientError> {
        self.enter("suggested_questions")?;
        Ok(self.questions.lock().unwrap().clone())
    }

    async fn create_session(&self, chatbot_id: i64) -> Result<CreatedSession, ClientError> {
        self.enter("create_session")?;
        let mut next = self.next_session.lock().unwrap();
        *next += 1;
        let session_id = format!("session-{next}");
        self.sessions.lock().unwrap().insert(
            session_id.clone(),
            SessionInfo {
                session_id: session_id.clone(),
                chatbot_id,
                chatbot_active: true,
                has_messages: false,
                message_count: 0,
            },
        );
        Ok(CreatedSession { session_id, chatbot_id: Some(chatbot_id), created_at: None })
    }

    async fn session_info(&self, session_id: &str) -> Result<SessionInfo, ClientError> {
        self.enter("session_info")?;
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound { resource: "Session".to_owned() })
    }

    async fn session_history(&self, session_id: &str, limit: u32) -> Result<HistoryPage, ClientError> {
        self.enter("session_history")?;
        let all = self.histories.lock().unwrap().get(session_id).cloned().unwrap_or_default();
        let total = all.len() as u64;
        let history: Vec<HistoryEntry> = all.into_iter().take(limit as usize).collect();
        Ok(HistoryPage {
            session_id: session_id.to_owned(),
            returned_messages: Some(history.len() as u64),
            history,
            total_messages: total,
        })
    }

    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatReply, ClientError> {
        self.enter("send_chat")?;
        self.chat_requests.lock().unwrap().push(request.clone());
        let scripted = self.chat_replies.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(ChatReply {
                response: format!("echo: {}", request.message),
                session_id: request.session_id.clone().unwrap_or_default(),
                message_id: None,
                context_used: false,
                sources: Vec::new(),
            })
        })
    }

    async fn submit_feedback(&self, request: &FeedbackRequest) -> Result<(), ClientError> {
        self.enter("submit_feedback")?;
        self.feedback.lock().unwrap().push(request.clone());
        Ok(())
    }

    async fn request_support(&self, request: &SupportRequestCreate) -> Result<SupportRequestAck, ClientError> {
        self.enter("request_support")?;
        let mut requests = self.support_requests.lock().unwrap();
        requests.push(request.clone());
        Ok(SupportRequestAck {
            request_id: format!("req-{}", requests.len()),
            status: SupportStatus::Pending,
            message: "Support request created. An agent will join shortly.".to_owned(),
        })
    }

    async fn post_support_message(
        &self,
        request_id: &str,
        message: &SupportMessageCreate,
    ) -> Result<(), ClientError> {
        self.enter("post_support_message")?;
        self.support_messages
            .lock()
            .unwrap()
            .push((request_id.to_owned(), message.clone()));
        Ok(())
    }

    fn support_channel_url(&self, request_id: &str) -> Result<String, ClientError> {
        Ok(format!("ws://127.0.0.1:9/human-support/ws/{request_id}"))
    }
}
