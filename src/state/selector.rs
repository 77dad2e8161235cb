//! Chatbot selector: list, create and pick the chatbot to chat with.

#[cfg(test)]
#[path = "selector_test.rs"]
mod selector_test;

use wire::{Chatbot, ChatbotCreate, ChatbotStats};

use crate::error::ClientError;
use crate::net::api::Backend;
use crate::util::share_url::fresh_session_url;
use crate::util::storage::{ClientStorage, save_selected_chatbot};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("Chatbot name is required")]
    NameRequired,
    #[error("System prompt is required")]
    SystemPromptRequired,
    #[error("Chatbot not found")]
    NotFound,
    #[error("This chatbot is inactive. Please contact an administrator.")]
    Inactive,
    #[error("Failed to load chatbots. Please refresh the page.")]
    Load(String),
    #[error("{0}")]
    Create(String),
    #[error("Could not remember the selected chatbot: {0}")]
    Storage(String),
    #[error("Invalid chat page URL: {0}")]
    InvalidUrl(String),
}

/// One selector card: a chatbot plus its usage counts.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatbotCard {
    pub chatbot: Chatbot,
    pub document_count: u64,
    pub session_count: u64,
}

/// Transient banner shown after an action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    Success(String),
    Error(String),
}

#[derive(Clone, Debug, Default)]
pub struct SelectorState {
    cards: Vec<ChatbotCard>,
    notice: Option<Notice>,
}

impl SelectorState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn cards(&self) -> &[ChatbotCard] {
        &self.cards
    }

    #[must_use]
    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    /// Fetch the chatbot list, then overlay stats when they are available.
    ///
    /// # Errors
    ///
    /// Returns [`SelectorError::Load`] when the list itself cannot be fetched.
    pub async fn load<B: Backend + ?Sized>(&mut self, backend: &B) -> Result<(), SelectorError> {
        let chatbots = match backend.list_chatbots().await {
            Ok(chatbots) => chatbots,
            Err(e) => {
                tracing::warn!(error = %e, "chatbot list failed");
                let err = SelectorError::Load(e.to_string());
                self.notice = Some(Notice::Error(err.to_string()));
                return Err(err);
            }
        };
        let stats = backend.chatbot_stats().await.unwrap_or_else(|e| {
            tracing::debug!(error = %e, "chatbot stats unavailable");
            Vec::new()
        });
        self.cards = merge_stats(chatbots, &stats);
        tracing::info!(count = self.cards.len(), "loaded chatbots");
        Ok(())
    }

    /// Validate and create a chatbot, then reload the list.
    ///
    /// # Errors
    ///
    /// Returns a validation error, or [`SelectorError::Create`] carrying the
    /// backend's explanation.
    pub async fn create<B: Backend + ?Sized>(
        &mut self,
        backend: &B,
        name: &str,
        description: &str,
        system_prompt: &str,
    ) -> Result<Chatbot, SelectorError> {
        let result = self.try_create(backend, name, description, system_prompt).await;
        self.notice = Some(match &result {
            Ok(created) => Notice::Success(format!("Chatbot \"{}\" created successfully!", created.name)),
            Err(e) => Notice::Error(e.to_string()),
        });
        result
    }

    async fn try_create<B: Backend + ?Sized>(
        &mut self,
        backend: &B,
        name: &str,
        description: &str,
        system_prompt: &str,
    ) -> Result<Chatbot, SelectorError> {
        let draft = validate_create(name, description, system_prompt)?;
        let created = backend.create_chatbot(&draft).await.map_err(|e| {
            tracing::warn!(error = %e, "chatbot create failed");
            SelectorError::Create(match e {
                ClientError::Status { detail, .. } if !detail.is_empty() => detail,
                _ => "Failed to create chatbot".to_owned(),
            })
        })?;
        tracing::info!(chatbot_id = created.id, name = %created.name, "chatbot created");
        if let Err(e) = self.load(backend).await {
            tracing::warn!(error = %e, "reload after create failed");
        }
        Ok(created)
    }

    /// Pick chatbot `chatbot_id` from the loaded list.
    ///
    /// The record is cached in `storage` and the chat page URL for it is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns [`SelectorError::NotFound`] or [`SelectorError::Inactive`]
    /// for unusable ids, or a storage/URL error.
    pub fn select(
        &mut self,
        chatbot_id: i64,
        storage: &dyn ClientStorage,
        page_url: &str,
    ) -> Result<String, SelectorError> {
        let result = self.try_select(chatbot_id, storage, page_url);
        if let Err(e) = &result {
            self.notice = Some(Notice::Error(e.to_string()));
        }
        result
    }

    fn try_select(&self, chatbot_id: i64, storage: &dyn ClientStorage, page_url: &str) -> Result<String, SelectorError> {
        let card = self
            .cards
            .iter()
            .find(|c| c.chatbot.id == chatbot_id)
            .ok_or(SelectorError::NotFound)?;
        if !card.chatbot.is_active {
            return Err(SelectorError::Inactive);
        }
        save_selected_chatbot(storage, &card.chatbot).map_err(|e| SelectorError::Storage(e.to_string()))?;
        let url = fresh_session_url(page_url, chatbot_id).map_err(|e| SelectorError::InvalidUrl(e.to_string()))?;
        tracing::info!(chatbot_id, "chatbot selected");
        Ok(url)
    }
}

/// Trim and check a create-chatbot form.
///
/// # Errors
///
/// Returns [`SelectorError::NameRequired`] or
/// [`SelectorError::SystemPromptRequired`] for blank required fields.
pub fn validate_create(name: &str, description: &str, system_prompt: &str) -> Result<ChatbotCreate, SelectorError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(SelectorError::NameRequired);
    }
    let system_prompt = system_prompt.trim();
    if system_prompt.is_empty() {
        return Err(SelectorError::SystemPromptRequired);
    }
    let description = description.trim();
    Ok(ChatbotCreate {
        name: name.to_owned(),
        description: (!description.is_empty()).then(|| description.to_owned()),
        system_prompt: system_prompt.to_owned(),
    })
}

fn merge_stats(chatbots: Vec<Chatbot>, stats: &[ChatbotStats]) -> Vec<ChatbotCard> {
    chatbots
        .into_iter()
        .map(|chatbot| {
            let found = stats.iter().find(|s| s.id == chatbot.id);
            ChatbotCard {
                document_count: found.map_or(0, |s| s.document_count),
                session_count: found.map_or(0, |s| s.session_count),
                chatbot,
            }
        })
        .collect()
}
