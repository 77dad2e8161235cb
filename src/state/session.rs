//! Session lifecycle: from launch parameters to a ready chat session.
//!
//! SYSTEM CONTEXT
//! ==============
//! Every client instance boots the same way: check backend health, resolve
//! which chatbot to talk to, then either restore the session named in the
//! launch URL or create a new one. [`bootstrap`] runs those steps against a
//! [`Backend`] and returns the resulting phase plus whatever the transcript
//! needs (history, suggestions, share URL). The controller applies the
//! result; nothing here touches the transcript directly.
//!
//! DESIGN
//! ======
//! `Uninitialized -> Loading -> Ready | Failed`, with `Redirecting` as a
//! terminal side exit when a full-page client has no usable chatbot. The
//! transition helpers on [`SessionLifecycle`] are pure so the controller's
//! state handling is testable without a backend.
//!
//! ERROR HANDLING
//! ==============
//! Bootstrap never returns an error. Each failure is folded into a phase:
//! an unreachable backend is `Failed(Connectivity)` and retried on the next
//! user action; a missing, inactive or mismatched chatbot or session is
//! `Failed(NotFound)` (or `Redirecting`) and needs an explicit restart.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use wire::{Chatbot, HistoryPage, SessionInfo, SuggestedQuestion};

use crate::config::{ChatClientConfig, RestorePolicy};
use crate::error::{ClientError, ErrorClass};
use crate::net::api::Backend;
use crate::util::share_url::{LaunchParams, share_url};
use crate::util::storage::{ClientStorage, load_selected_chatbot, save_selected_chatbot};

pub const SERVER_UNAVAILABLE: &str = "Server unavailable - check if backend is running";
pub const SESSION_CREATE_FAILED: &str = "Error creating chat session";
pub const HISTORY_LOAD_FAILED: &str = "Could not load chat history";
const DEFAULT_DESCRIPTION: &str = "I can help answer questions based on uploaded documents.";

// =============================================================================
// PHASES
// =============================================================================

/// A chat session that accepts messages.
#[derive(Clone, Debug, PartialEq)]
pub struct ReadySession {
    pub chatbot: Chatbot,
    pub session_id: String,
    /// Whether the session came from the launch URL rather than being created.
    pub restored: bool,
}

/// Why a session could not be made ready.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionFailure {
    pub class: ErrorClass,
    pub message: String,
    /// The chatbot, when it was resolved before the failure.
    pub chatbot: Option<Chatbot>,
}

#[derive(Clone, Debug, PartialEq, Default)]
pub enum SessionPhase {
    #[default]
    Uninitialized,
    Loading,
    Ready(ReadySession),
    Failed(SessionFailure),
    /// Navigating away to the selector page.
    Redirecting { target: String },
}

/// Owner of the current phase, with the allowed transitions.
#[derive(Clone, Debug, Default)]
pub struct SessionLifecycle {
    phase: SessionPhase,
}

impl SessionLifecycle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    #[must_use]
    pub fn ready(&self) -> Option<&ReadySession> {
        match &self.phase {
            SessionPhase::Ready(ready) => Some(ready),
            _ => None,
        }
    }

    #[must_use]
    pub fn failure(&self) -> Option<&SessionFailure> {
        match &self.phase {
            SessionPhase::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    /// The chatbot in use or last resolved, if any.
    #[must_use]
    pub fn chatbot(&self) -> Option<&Chatbot> {
        match &self.phase {
            SessionPhase::Ready(ready) => Some(&ready.chatbot),
            SessionPhase::Failed(failure) => failure.chatbot.as_ref(),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.phase == SessionPhase::Loading
    }

    /// Enter `Loading`. Refused while already loading or redirecting.
    pub fn begin_loading(&mut self) -> bool {
        if matches!(self.phase, SessionPhase::Loading | SessionPhase::Redirecting { .. }) {
            return false;
        }
        self.phase = SessionPhase::Loading;
        true
    }

    pub fn mark_ready(&mut self, ready: ReadySession) {
        tracing::info!(chatbot_id = ready.chatbot.id, session_id = %ready.session_id, restored = ready.restored, "session ready");
        self.phase = SessionPhase::Ready(ready);
    }

    pub fn fail(&mut self, failure: SessionFailure) {
        tracing::warn!(class = ?failure.class, message = %failure.message, "session failed");
        self.phase = SessionPhase::Failed(failure);
    }

    pub fn redirect(&mut self, target: impl Into<String>) {
        let target = target.into();
        tracing::info!(target = %target, "redirecting to chatbot selector");
        self.phase = SessionPhase::Redirecting { target };
    }

    /// Leave the current session behind, keeping the chatbot for a new one.
    ///
    /// Returns the chatbot id the next bootstrap should use.
    pub fn reset_for_new_session(&mut self) -> Option<i64> {
        if matches!(self.phase, SessionPhase::Redirecting { .. }) {
            return None;
        }
        let chatbot_id = self.chatbot().map(|c| c.id);
        self.phase = SessionPhase::Uninitialized;
        chatbot_id
    }
}

// =============================================================================
// CHATBOT RESOLUTION
// =============================================================================

/// Where the chatbot for this load comes from.
#[derive(Clone, Debug, PartialEq)]
pub enum ChatbotSource {
    /// Fetch this id from the backend.
    Fetch(i64),
    /// Use the cached selection as-is.
    Cached(Chatbot),
    /// No usable chatbot; the reason is user-facing.
    Unusable(String),
}

/// Resolved inputs for one bootstrap run.
#[derive(Clone, Debug, PartialEq)]
pub struct LaunchPlan {
    pub chatbot: ChatbotSource,
    /// Session to restore; `None` creates a new one.
    pub session_id: Option<String>,
}

/// Decide which chatbot and session a load uses.
///
/// The URL `chatbot` parameter wins when the instance is unbound or bound
/// to the same id; the URL `session` is honoured only together with it.
/// Otherwise the bound id is used, then the cached selection.
#[must_use]
pub fn resolve_launch(config: &ChatClientConfig, launch: &LaunchParams, storage: &dyn ClientStorage) -> LaunchPlan {
    if let Some(raw) = launch.chatbot.as_deref() {
        match (launch.chatbot_id(), config.chatbot_id) {
            (Some(url_id), None) => {
                return LaunchPlan { chatbot: ChatbotSource::Fetch(url_id), session_id: launch.session.clone() };
            }
            (Some(url_id), Some(bound)) if url_id == bound => {
                return LaunchPlan { chatbot: ChatbotSource::Fetch(url_id), session_id: launch.session.clone() };
            }
            (None, None) => {
                tracing::warn!(chatbot = raw, "launch chatbot id is not a number");
                return LaunchPlan { chatbot: ChatbotSource::Unusable("Chatbot not found".to_owned()), session_id: None };
            }
            _ => tracing::debug!(chatbot = raw, "launch chatbot differs from bound chatbot; ignoring"),
        }
    }

    if let Some(bound) = config.chatbot_id {
        return LaunchPlan { chatbot: ChatbotSource::Fetch(bound), session_id: None };
    }

    // A session parameter without a chatbot parameter belongs to the cached chatbot.
    let session_id = launch.session.clone();
    match load_selected_chatbot(storage) {
        Some(chatbot) => LaunchPlan { chatbot: ChatbotSource::Cached(chatbot), session_id },
        None => LaunchPlan { chatbot: ChatbotSource::Unusable("No chatbot ID provided".to_owned()), session_id: None },
    }
}

// =============================================================================
// RESTORATION
// =============================================================================

/// Why a session from the launch URL was not restored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestoreRejection {
    NotFound,
    DifferentChatbot,
    ChatbotInactive,
    Unavailable,
}

impl RestoreRejection {
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::NotFound => "Session not found or has expired",
            Self::DifferentChatbot => "This session belongs to a different chatbot",
            Self::ChatbotInactive => "This chatbot is no longer active",
            Self::Unavailable => "Unable to restore session",
        }
    }

    fn from_lookup_error(error: &ClientError) -> Self {
        match error {
            ClientError::NotFound { .. } | ClientError::Status { .. } => Self::NotFound,
            _ => Self::Unavailable,
        }
    }
}

/// Accept `info` only for `chatbot` and only while the chatbot is active.
///
/// # Errors
///
/// Returns the [`RestoreRejection`] describing the mismatch.
pub fn validate_restoration(info: &SessionInfo, chatbot: &Chatbot) -> Result<(), RestoreRejection> {
    if info.chatbot_id != chatbot.id {
        return Err(RestoreRejection::DifferentChatbot);
    }
    if !info.chatbot_active {
        return Err(RestoreRejection::ChatbotInactive);
    }
    Ok(())
}

// =============================================================================
// BOOTSTRAP
// =============================================================================

/// Everything one bootstrap run produced.
#[derive(Clone, Debug, PartialEq)]
pub struct Bootstrap {
    /// `Ready`, `Failed` or `Redirecting`.
    pub phase: SessionPhase,
    /// Status line text.
    pub status: String,
    /// History to hydrate the transcript with.
    pub history: Option<HistoryPage>,
    pub suggestions: Vec<SuggestedQuestion>,
    /// Updated shareable URL when a new session was created.
    pub share_url: Option<String>,
}

impl Bootstrap {
    fn failed(class: ErrorClass, message: &str, chatbot: Option<Chatbot>) -> Self {
        Self {
            phase: SessionPhase::Failed(SessionFailure { class, message: message.to_owned(), chatbot }),
            status: message.to_owned(),
            history: None,
            suggestions: Vec::new(),
            share_url: None,
        }
    }

    fn unusable(config: &ChatClientConfig, reason: &str) -> Self {
        if config.redirects_to_selector() {
            return Self {
                phase: SessionPhase::Redirecting { target: config.selector_url.clone() },
                status: "No chatbot selected. Redirecting...".to_owned(),
                history: None,
                suggestions: Vec::new(),
                share_url: None,
            };
        }
        let mut out = Self::failed(ErrorClass::NotFound, reason, None);
        out.status = format!("Error: {reason}");
        out
    }
}

/// Run the full bootstrap sequence for one load.
pub async fn bootstrap<B>(
    backend: &B,
    storage: &dyn ClientStorage,
    config: &ChatClientConfig,
    launch: &LaunchParams,
) -> Bootstrap
where
    B: Backend + ?Sized,
{
    if let Err(e) = backend.health().await {
        tracing::warn!(error = %e, "backend health check failed");
        return Bootstrap::failed(ErrorClass::Connectivity, SERVER_UNAVAILABLE, None);
    }

    let plan = resolve_launch(config, launch, storage);
    let chatbot = match plan.chatbot {
        ChatbotSource::Unusable(reason) => return Bootstrap::unusable(config, &reason),
        ChatbotSource::Cached(chatbot) => chatbot,
        ChatbotSource::Fetch(chatbot_id) => match backend.get_chatbot(chatbot_id).await {
            Ok(chatbot) => {
                if let Err(e) = save_selected_chatbot(storage, &chatbot) {
                    tracing::warn!(chatbot_id, error = %e, "could not cache selected chatbot");
                }
                chatbot
            }
            Err(e) if e.class() == ErrorClass::Connectivity => {
                tracing::warn!(chatbot_id, error = %e, "chatbot lookup failed");
                return Bootstrap::failed(ErrorClass::Connectivity, SERVER_UNAVAILABLE, None);
            }
            Err(e) => {
                tracing::warn!(chatbot_id, error = %e, "chatbot unavailable");
                return Bootstrap::unusable(config, "Chatbot not found");
            }
        },
    };
    if !chatbot.is_active {
        tracing::info!(chatbot_id = chatbot.id, "chatbot is inactive");
        return Bootstrap::unusable(config, "Chatbot is not active");
    }

    let mut out = match plan.session_id {
        Some(session_id) => match restore(backend, config, &chatbot, &session_id).await {
            Ok(restored) => restored,
            Err(rejection) if config.restore_policy == RestorePolicy::StartFresh => {
                tracing::info!(session_id = %session_id, reason = rejection.message(), "restoration rejected; starting fresh");
                create(backend, config, chatbot.clone()).await
            }
            Err(rejection) => {
                tracing::info!(session_id = %session_id, reason = rejection.message(), "restoration rejected");
                Bootstrap::failed(ErrorClass::NotFound, rejection.message(), Some(chatbot.clone()))
            }
        },
        None => create(backend, config, chatbot.clone()).await,
    };

    if config.capabilities.suggested_questions && matches!(out.phase, SessionPhase::Ready(_)) {
        match backend.suggested_questions(chatbot.id).await {
            Ok(questions) => out.suggestions = questions,
            Err(e) => tracing::debug!(chatbot_id = chatbot.id, error = %e, "suggested questions unavailable"),
        }
    }
    out
}

async fn restore<B>(
    backend: &B,
    config: &ChatClientConfig,
    chatbot: &Chatbot,
    session_id: &str,
) -> Result<Bootstrap, RestoreRejection>
where
    B: Backend + ?Sized,
{
    let info = backend.session_info(session_id).await.map_err(|e| {
        tracing::warn!(session_id, error = %e, "session info lookup failed");
        RestoreRejection::from_lookup_error(&e)
    })?;
    validate_restoration(&info, chatbot)?;

    let mut status = "Session restored - Ready to chat".to_owned();
    let mut history = None;
    if info.has_messages {
        match backend.session_history(session_id, config.history_limit).await {
            Ok(page) => {
                tracing::info!(session_id, returned = page.returned(), "loaded session history");
                status = format!("Loaded {} messages from history", page.returned());
                history = Some(page);
            }
            Err(e) => {
                tracing::warn!(session_id, error = %e, "history load failed");
                status = HISTORY_LOAD_FAILED.to_owned();
            }
        }
    }

    Ok(Bootstrap {
        phase: SessionPhase::Ready(ReadySession {
            chatbot: chatbot.clone(),
            session_id: session_id.to_owned(),
            restored: true,
        }),
        status,
        history,
        suggestions: Vec::new(),
        share_url: None,
    })
}

async fn create<B>(backend: &B, config: &ChatClientConfig, chatbot: Chatbot) -> Bootstrap
where
    B: Backend + ?Sized,
{
    match backend.create_session(chatbot.id).await {
        Ok(created) => {
            let share = share_url(&config.page_url, chatbot.id, &created.session_id)
                .map_err(|e| tracing::warn!(error = %e, "could not build share URL"))
                .ok();
            Bootstrap {
                phase: SessionPhase::Ready(ReadySession {
                    chatbot,
                    session_id: created.session_id,
                    restored: false,
                }),
                status: "Ready to chat".to_owned(),
                history: None,
                suggestions: Vec::new(),
                share_url: share,
            }
        }
        Err(e) => {
            tracing::warn!(chatbot_id = chatbot.id, error = %e, "session create failed");
            Bootstrap::failed(ErrorClass::Connectivity, SESSION_CREATE_FAILED, Some(chatbot))
        }
    }
}

// =============================================================================
// PRESENTATION
// =============================================================================

/// Header title: the configured override, else the chatbot name.
#[must_use]
pub fn title_for(config: &ChatClientConfig, chatbot: Option<&Chatbot>) -> String {
    config
        .title
        .clone()
        .or_else(|| chatbot.map(|c| c.name.clone()))
        .unwrap_or_else(|| crate::config::DEFAULT_TITLE.to_owned())
}

/// Welcome text (Markdown): the configured override, else a greeting
/// derived from the chatbot.
#[must_use]
pub fn welcome_for(config: &ChatClientConfig, chatbot: &Chatbot) -> String {
    if let Some(custom) = &config.welcome_message {
        return custom.clone();
    }
    let description = chatbot
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or(DEFAULT_DESCRIPTION);
    format!("Hello! I'm **{}**. {description} How can I assist you today?", chatbot.name)
}
