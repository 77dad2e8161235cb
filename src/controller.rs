//! Chat controller: one session's state machine.
//!
//! SYSTEM CONTEXT
//! ==============
//! The controller is the only writer of client state. Hosts and background
//! tasks talk to it through [`ClientEvent`]s; it answers with [`Command`]s
//! describing the I/O to perform next. The runtime executes commands and
//! feeds their results back as events, one at a time.
//!
//! DESIGN
//! ======
//! `dispatch` is synchronous and performs no I/O, so every transition is
//! testable with plain values. Handlers validate, mutate the session,
//! transcript and support state, and return commands. Nothing else decides
//! who gets called.
//!
//! Chat requests are serialized: one `SendChat` is outstanding at a time and
//! later messages wait in a queue, so the backend sees messages in the same
//! order the transcript shows them.
//!
//! ERROR HANDLING
//! ==============
//! Errors arrive as event payloads and are folded into state: a status
//! line, an error entry in the transcript, a rolled-back feedback choice or
//! a failed session phase.

#[cfg(test)]
#[path = "controller_test.rs"]
mod controller_test;

use std::collections::VecDeque;
use std::time::Duration;

use wire::{
    ChatReply, ChatRequest, FeedbackKind, SenderType, SupportFrame, SupportMessageCreate, SupportRequestAck,
    SupportRequestCreate,
};

use crate::config::ChatClientConfig;
use crate::error::{ClientError, ErrorClass};
use crate::net::support_channel::{ChannelEnd, ChannelEvent};
use crate::state::session::{Bootstrap, SessionLifecycle, SessionPhase, title_for, welcome_for};
use crate::state::support::{ChannelState, SupportSession};
use crate::state::transcript::{EntryId, EntryKind, FeedbackChange, RequestId, Role, Sender, Transcript, TypingKey};
use crate::util::share_url::{LaunchParams, share_url};

pub const READY: &str = "Ready to chat";
pub const THINKING: &str = "Thinking...";
pub const NO_SESSION: &str = "No session available. Please refresh the page.";
pub const REPLY_FAILED: &str = "Sorry, I encountered an error. Please try again.";
pub const ERROR_OCCURRED: &str = "Error occurred";
pub const SUPPORT_LOST: &str =
    "Lost connection to human support. Messages now go to the assistant; ask for support again to reach a person.";

// =============================================================================
// EVENTS AND COMMANDS
// =============================================================================

/// Everything that can change client state.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientEvent {
    /// A bootstrap run finished.
    Booted(Box<Bootstrap>),
    /// The user submitted the input box.
    UserSent(String),
    /// The user clicked visible suggestion `index`.
    SuggestionChosen(usize),
    BotReplied {
        request: RequestId,
        result: Result<ChatReply, ClientError>,
    },
    FeedbackSelected {
        message_id: i64,
        kind: FeedbackKind,
    },
    FeedbackSettled {
        change: FeedbackChange,
        result: Result<(), ClientError>,
    },
    SupportRequested {
        message: String,
        user_name: Option<String>,
        user_email: Option<String>,
    },
    SupportOpened(Result<SupportRequestAck, ClientError>),
    SupportMessagePosted {
        request_id: String,
        result: Result<(), ClientError>,
    },
    SupportEvent {
        request_id: String,
        event: ChannelEvent,
    },
    SupportChannelClosed {
        request_id: String,
        end: ChannelEnd,
    },
    /// Explicit "start new chat" after a terminal failure, or at any time.
    StartNewSession,
    /// A host-side failure to report on the status line.
    Error(ClientError),
}

/// I/O the runtime should perform on the controller's behalf.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Bootstrap { launch: LaunchParams },
    SendChat { request: RequestId, body: ChatRequest },
    PostSupportMessage { request_id: String, message: SupportMessageCreate },
    SubmitFeedback { change: FeedbackChange },
    OpenSupportRequest(SupportRequestCreate),
    /// Connect the support channel after `delay` (zero for the first try).
    ConnectSupportChannel { request_id: String, delay: Duration },
    CloseSupportChannel,
    /// Replace the page URL in place, without navigating.
    UpdateShareUrl(String),
    /// Navigate away, to the chatbot selector.
    Redirect(String),
}

#[derive(Clone, Debug)]
struct PendingChat {
    request: RequestId,
    entry: EntryId,
    message: String,
}

// =============================================================================
// CONTROLLER
// =============================================================================

pub struct ChatController {
    config: ChatClientConfig,
    launch: LaunchParams,
    lifecycle: SessionLifecycle,
    transcript: Transcript,
    support: Option<SupportSession>,
    support_opening: bool,
    status: String,
    next_request: RequestId,
    in_flight: Option<PendingChat>,
    queued: VecDeque<PendingChat>,
    /// Text typed while a session is loading or the backend was
    /// unreachable, sent in order once ready.
    deferred: Vec<String>,
}

impl ChatController {
    #[must_use]
    pub fn new(config: ChatClientConfig, launch: LaunchParams) -> Self {
        Self {
            config,
            launch,
            lifecycle: SessionLifecycle::new(),
            transcript: Transcript::new(),
            support: None,
            support_opening: false,
            status: "Connecting...".to_owned(),
            next_request: 0,
            in_flight: None,
            queued: VecDeque::new(),
            deferred: Vec::new(),
        }
    }

    /// Begin the first bootstrap.
    pub fn start(&mut self) -> Vec<Command> {
        self.begin_bootstrap("Connecting...")
    }

    /// Apply one event and return the commands it produced.
    pub fn dispatch(&mut self, event: ClientEvent) -> Vec<Command> {
        match event {
            ClientEvent::Booted(boot) => self.on_booted(*boot),
            ClientEvent::UserSent(text) => self.on_user_sent(&text),
            ClientEvent::SuggestionChosen(index) => match self.transcript.take_suggestion(index) {
                Some(text) => self.on_user_sent(&text),
                None => Vec::new(),
            },
            ClientEvent::BotReplied { request, result } => self.on_bot_replied(request, result),
            ClientEvent::FeedbackSelected { message_id, kind } => self.on_feedback_selected(message_id, kind),
            ClientEvent::FeedbackSettled { change, result } => {
                self.on_feedback_settled(change, result);
                Vec::new()
            }
            ClientEvent::SupportRequested { message, user_name, user_email } => {
                self.on_support_requested(&message, user_name, user_email)
            }
            ClientEvent::SupportOpened(result) => self.on_support_opened(result),
            ClientEvent::SupportMessagePosted { request_id, result } => {
                self.on_support_message_posted(&request_id, result);
                Vec::new()
            }
            ClientEvent::SupportEvent { request_id, event } => self.on_support_event(&request_id, event),
            ClientEvent::SupportChannelClosed { request_id, end } => self.on_support_closed(&request_id, &end),
            ClientEvent::StartNewSession => self.on_start_new_session(),
            ClientEvent::Error(e) => {
                tracing::warn!(error = %e, code = e.error_code(), "client error");
                self.status = e.user_message();
                Vec::new()
            }
        }
    }

    // =========================================================================
    // VIEW
    // =========================================================================

    #[must_use]
    pub fn config(&self) -> &ChatClientConfig {
        &self.config
    }

    #[must_use]
    pub fn status(&self) -> &str {
        &self.status
    }

    #[must_use]
    pub fn phase(&self) -> &SessionPhase {
        self.lifecycle.phase()
    }

    /// Input accepts text only while a session is ready.
    #[must_use]
    pub fn input_enabled(&self) -> bool {
        self.lifecycle.ready().is_some()
    }

    /// Whether chat requests are outstanding or queued.
    #[must_use]
    pub fn send_busy(&self) -> bool {
        self.in_flight.is_some() || !self.queued.is_empty()
    }

    #[must_use]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    #[must_use]
    pub fn support(&self) -> Option<&SupportSession> {
        self.support.as_ref()
    }

    /// Shareable link to the current session, when one is ready.
    #[must_use]
    pub fn share_url(&self) -> Option<String> {
        if !self.config.capabilities.share_links {
            return None;
        }
        let ready = self.lifecycle.ready()?;
        share_url(&self.config.page_url, ready.chatbot.id, &ready.session_id).ok()
    }

    #[must_use]
    pub fn title(&self) -> String {
        title_for(&self.config, self.lifecycle.chatbot())
    }

    // =========================================================================
    // SESSION
    // =========================================================================

    fn begin_bootstrap(&mut self, status: &str) -> Vec<Command> {
        if !self.lifecycle.begin_loading() {
            return Vec::new();
        }
        status.clone_into(&mut self.status);
        vec![Command::Bootstrap { launch: self.launch.clone() }]
    }

    fn on_booted(&mut self, boot: Bootstrap) -> Vec<Command> {
        if !self.lifecycle.is_loading() {
            tracing::debug!("ignoring stale bootstrap result");
            return Vec::new();
        }
        self.status = boot.status;
        let mut commands = Vec::new();
        match boot.phase {
            SessionPhase::Ready(ready) => {
                self.transcript.set_welcome(&welcome_for(&self.config, &ready.chatbot));
                if let Some(page) = &boot.history {
                    self.transcript.hydrate(&page.history, self.config.capabilities.feedback);
                }
                if self.config.capabilities.suggested_questions {
                    self.transcript.set_suggestions(boot.suggestions);
                }
                self.launch = LaunchParams::default()
                    .with_chatbot(ready.chatbot.id)
                    .with_session(ready.session_id.clone());
                self.lifecycle.mark_ready(ready);
                if self.config.capabilities.share_links {
                    commands.extend(boot.share_url.map(Command::UpdateShareUrl));
                }
                for text in std::mem::take(&mut self.deferred) {
                    commands.extend(self.on_user_sent(&text));
                }
            }
            SessionPhase::Failed(failure) => {
                if let Some(chatbot) = &failure.chatbot {
                    self.transcript.set_welcome(&welcome_for(&self.config, chatbot));
                    if failure.class == ErrorClass::NotFound {
                        self.transcript.append_status_entry(
                            EntryKind::Error,
                            &format!("{}. Please start a new chat session.", failure.message),
                        );
                    }
                }
                if failure.class != ErrorClass::Connectivity {
                    self.deferred.clear();
                }
                self.lifecycle.fail(failure);
            }
            SessionPhase::Redirecting { target } => {
                self.deferred.clear();
                self.lifecycle.redirect(target.clone());
                commands.push(Command::Redirect(target));
            }
            SessionPhase::Uninitialized | SessionPhase::Loading => {
                tracing::warn!("bootstrap returned a non-terminal phase");
            }
        }
        commands
    }

    fn on_start_new_session(&mut self) -> Vec<Command> {
        if matches!(self.lifecycle.phase(), SessionPhase::Redirecting { .. } | SessionPhase::Loading) {
            return Vec::new();
        }
        let chatbot_id = self.lifecycle.reset_for_new_session().or_else(|| self.launch.chatbot_id());
        let mut commands = self.drop_support();
        self.transcript.reset();
        self.in_flight = None;
        self.queued.clear();
        self.deferred.clear();
        self.launch = match chatbot_id {
            Some(id) => LaunchParams::default().with_chatbot(id),
            None => LaunchParams::default(),
        };
        tracing::info!(chatbot_id = ?chatbot_id, "starting new chat session");
        commands.extend(self.begin_bootstrap("Starting new chat session..."));
        commands
    }

    // =========================================================================
    // CHAT
    // =========================================================================

    fn on_user_sent(&mut self, text: &str) -> Vec<Command> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }
        let ready = match self.lifecycle.phase() {
            SessionPhase::Ready(ready) => ready.clone(),
            SessionPhase::Failed(failure) if failure.class == ErrorClass::Connectivity => {
                self.deferred.push(text.to_owned());
                return self.begin_bootstrap("Reconnecting to server...");
            }
            SessionPhase::Loading => {
                tracing::debug!(deferred = self.deferred.len() + 1, "message held until the session is ready");
                self.deferred.push(text.to_owned());
                return Vec::new();
            }
            SessionPhase::Redirecting { .. } => return Vec::new(),
            _ => {
                NO_SESSION.clone_into(&mut self.status);
                return Vec::new();
            }
        };

        let entry = self.transcript.append_message(Role::User, text, None);

        if let Some(support) = self.support.as_ref().filter(|s| s.routes_messages()) {
            tracing::debug!(request_id = %support.request_id, "routing message to support agent");
            return vec![Command::PostSupportMessage {
                request_id: support.request_id.clone(),
                message: SupportMessageCreate { message: text.to_owned(), sender_type: SenderType::User },
            }];
        }

        self.next_request += 1;
        let pending = PendingChat { request: self.next_request, entry, message: text.to_owned() };
        self.transcript.show_typing(TypingKey::Request(pending.request));
        THINKING.clone_into(&mut self.status);
        if self.in_flight.is_some() {
            tracing::debug!(request = pending.request, queued = self.queued.len() + 1, "chat request queued");
            self.queued.push_back(pending);
            return Vec::new();
        }
        vec![self.send_pending(pending, ready.chatbot.id, &ready.session_id)]
    }

    fn send_pending(&mut self, pending: PendingChat, chatbot_id: i64, session_id: &str) -> Command {
        let command = Command::SendChat {
            request: pending.request,
            body: ChatRequest {
                message: pending.message.clone(),
                chatbot_id,
                session_id: Some(session_id.to_owned()),
            },
        };
        self.in_flight = Some(pending);
        command
    }

    fn on_bot_replied(&mut self, request: RequestId, result: Result<ChatReply, ClientError>) -> Vec<Command> {
        let Some(pending) = self.in_flight.take_if(|p| p.request == request) else {
            tracing::debug!(request, "ignoring reply for unknown request");
            return Vec::new();
        };
        self.transcript.hide_typing(TypingKey::Request(request));

        match result {
            Ok(reply) => {
                let entry =
                    self.transcript
                        .insert_reply_after(pending.entry, EntryKind::Normal, &reply.response, reply.message_id);
                if let Some(message_id) = reply.message_id.filter(|_| self.config.capabilities.feedback) {
                    self.transcript.attach_feedback(message_id);
                }
                if reply.context_used && !reply.sources.is_empty() {
                    self.transcript.set_entry_sources(entry, &reply.sources);
                    self.transcript.show_sources(&reply.sources);
                } else {
                    self.transcript.hide_sources();
                }
                READY.clone_into(&mut self.status);
            }
            Err(e) => {
                tracing::warn!(
                    request,
                    error = %e,
                    code = e.error_code(),
                    retryable = e.retryable(),
                    "chat request failed"
                );
                self.transcript
                    .insert_reply_after(pending.entry, EntryKind::Error, REPLY_FAILED, None);
                ERROR_OCCURRED.clone_into(&mut self.status);
            }
        }

        let Some(next) = self.queued.pop_front() else {
            return Vec::new();
        };
        let Some(ready) = self.lifecycle.ready().cloned() else {
            return Vec::new();
        };
        THINKING.clone_into(&mut self.status);
        vec![self.send_pending(next, ready.chatbot.id, &ready.session_id)]
    }

    // =========================================================================
    // FEEDBACK
    // =========================================================================

    fn on_feedback_selected(&mut self, message_id: i64, kind: FeedbackKind) -> Vec<Command> {
        if !self.config.capabilities.feedback {
            return Vec::new();
        }
        match self.transcript.select_feedback(message_id, kind) {
            Some(change) => vec![Command::SubmitFeedback { change }],
            None => Vec::new(),
        }
    }

    fn on_feedback_settled(&mut self, change: FeedbackChange, result: Result<(), ClientError>) {
        match result {
            Ok(()) => {
                tracing::debug!(message_id = change.message_id, kind = change.selected.as_str(), "feedback recorded");
            }
            Err(e) => {
                tracing::warn!(message_id = change.message_id, error = %e, "feedback submit failed");
                self.transcript.rollback_feedback(change);
            }
        }
    }

    // =========================================================================
    // HUMAN SUPPORT
    // =========================================================================

    fn on_support_requested(
        &mut self,
        message: &str,
        user_name: Option<String>,
        user_email: Option<String>,
    ) -> Vec<Command> {
        if !self.config.capabilities.human_support {
            "Human support is not available".clone_into(&mut self.status);
            return Vec::new();
        }
        let Some(ready) = self.lifecycle.ready().cloned() else {
            NO_SESSION.clone_into(&mut self.status);
            return Vec::new();
        };
        let message = message.trim();
        if message.is_empty() {
            "Please describe what you need help with".clone_into(&mut self.status);
            return Vec::new();
        }
        if self.support_opening || self.support.as_ref().is_some_and(SupportSession::is_open) {
            "A support request is already open".clone_into(&mut self.status);
            return Vec::new();
        }

        let mut commands = Vec::new();
        if let Some(previous) = self.support.take() {
            tracing::debug!(request_id = %previous.request_id, status = previous.status().as_str(), "replacing support request");
            if previous.channel() != ChannelState::Closed {
                commands.push(Command::CloseSupportChannel);
            }
        }
        self.support_opening = true;
        self.transcript.append_message(Role::User, message, None);
        "Requesting human support...".clone_into(&mut self.status);
        commands.push(Command::OpenSupportRequest(SupportRequestCreate {
            chatbot_id: ready.chatbot.id,
            session_id: ready.session_id,
            initial_message: message.to_owned(),
            user_name: non_blank(user_name),
            user_email: non_blank(user_email),
        }));
        commands
    }

    fn on_support_opened(&mut self, result: Result<SupportRequestAck, ClientError>) -> Vec<Command> {
        self.support_opening = false;
        match result {
            Ok(ack) => {
                tracing::info!(request_id = %ack.request_id, status = ack.status.as_str(), "support request opened");
                if !ack.message.is_empty() {
                    self.transcript.append_status_entry(EntryKind::Notice, &ack.message);
                }
                "Waiting for a support agent...".clone_into(&mut self.status);
                let request_id = ack.request_id.clone();
                self.support = Some(SupportSession::new(ack.request_id, ack.status));
                vec![Command::ConnectSupportChannel { request_id, delay: Duration::ZERO }]
            }
            Err(e) => {
                tracing::warn!(error = %e, "support request failed");
                self.transcript
                    .append_status_entry(EntryKind::Error, "Could not reach human support. Please try again.");
                ERROR_OCCURRED.clone_into(&mut self.status);
                Vec::new()
            }
        }
    }

    fn on_support_message_posted(&mut self, request_id: &str, result: Result<(), ClientError>) {
        if let Err(e) = result {
            tracing::warn!(request_id, error = %e, "support message failed");
            self.transcript
                .append_status_entry(EntryKind::Error, "Your message could not be delivered to the support agent.");
            ERROR_OCCURRED.clone_into(&mut self.status);
        }
    }

    fn current_support(&mut self, request_id: &str) -> Option<&mut SupportSession> {
        self.support.as_mut().filter(|s| s.request_id == request_id)
    }

    fn on_support_event(&mut self, request_id: &str, event: ChannelEvent) -> Vec<Command> {
        let Some(support) = self.current_support(request_id) else {
            tracing::debug!(request_id, "ignoring event for stale support request");
            return Vec::new();
        };
        let frame = match event {
            ChannelEvent::Opened => {
                support.channel_opened();
                return Vec::new();
            }
            ChannelEvent::Frame(frame) => frame,
        };
        if let Some(next) = frame.status_transition() {
            if !support.advance(next) {
                tracing::debug!(request_id, status = next.as_str(), "ignoring stale status frame");
                return Vec::new();
            }
        }

        match frame {
            SupportFrame::NewMessage { data } => match data.sender_type {
                SenderType::User => {}
                SenderType::Admin => {
                    self.transcript.hide_typing(TypingKey::Agent);
                    self.transcript.append_support_message(Sender::Agent, &data.message);
                }
                SenderType::System => {
                    self.transcript.append_support_message(Sender::System, &data.message);
                }
            },
            SupportFrame::UserTyping { sender } => {
                if sender.as_deref() == Some("admin") {
                    self.transcript.show_typing(TypingKey::Agent);
                }
            }
            SupportFrame::AdminJoined { message, .. } => {
                self.notice(&message, "A support agent has joined the conversation");
                "Connected to a support agent".clone_into(&mut self.status);
            }
            SupportFrame::RequestResolved { message, .. } => {
                self.transcript.hide_typing(TypingKey::Agent);
                self.notice(&message, "This support request has been resolved");
                READY.clone_into(&mut self.status);
            }
            SupportFrame::RequestClosed { message, .. } => {
                self.transcript.hide_typing(TypingKey::Agent);
                self.notice(&message, "This support request has been closed");
                READY.clone_into(&mut self.status);
                if let Some(support) = self.support.as_mut() {
                    support.channel_closed();
                }
                return vec![Command::CloseSupportChannel];
            }
            SupportFrame::Ping | SupportFrame::Pong | SupportFrame::Unknown => {}
        }
        Vec::new()
    }

    fn on_support_closed(&mut self, request_id: &str, end: &ChannelEnd) -> Vec<Command> {
        let max_attempts = self.config.reconnect.max_attempts;
        let policy = self.config.reconnect;
        let Some(support) = self.current_support(request_id) else {
            return Vec::new();
        };
        if !support.wants_channel() {
            support.channel_closed();
            return Vec::new();
        }
        tracing::warn!(request_id, reason = end.reason(), connected = end.was_connected(), "support channel dropped");
        match support.schedule_reconnect(max_attempts) {
            Some(attempt) => {
                let request_id = request_id.to_owned();
                self.transcript.hide_typing(TypingKey::Agent);
                "Support connection lost. Reconnecting...".clone_into(&mut self.status);
                vec![Command::ConnectSupportChannel { request_id, delay: policy.backoff_for(attempt) }]
            }
            None => {
                self.transcript.hide_typing(TypingKey::Agent);
                tracing::warn!(request_id, "support reconnects exhausted; request detached");
                self.transcript.append_status_entry(EntryKind::Error, SUPPORT_LOST);
                "Support connection lost".clone_into(&mut self.status);
                Vec::new()
            }
        }
    }

    fn notice(&mut self, message: &str, fallback: &str) {
        let text = if message.trim().is_empty() { fallback } else { message };
        self.transcript.append_status_entry(EntryKind::Notice, text);
    }

    fn drop_support(&mut self) -> Vec<Command> {
        self.support_opening = false;
        match self.support.take() {
            Some(_) => vec![Command::CloseSupportChannel],
            None => Vec::new(),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_owned()).filter(|v| !v.is_empty())
}
