//! Chat transcript model.
//!
//! SYSTEM CONTEXT
//! ==============
//! The transcript is the view model behind the message list: ordered
//! entries, the typing indicator, the sources panel and the suggested
//! questions. It is mutated only by the controller, from both the
//! request/response path and the support-channel path, so every mutation
//! here is synchronous and infallible.
//!
//! DESIGN
//! ======
//! - Entries get a local `EntryId` so replies can be placed relative to the
//!   user message that caused them, whatever order responses arrive in.
//! - The typing indicator is a set of keys instead of a flag. Each in-flight
//!   request and the live agent hold their own key; the indicator is visible
//!   while any key is held.
//! - Every mutation bumps `revision` and recomputes `scroll_target`, the last
//!   visible item, so a host scrolls after each change without diffing.

#[cfg(test)]
#[path = "transcript_test.rs"]
mod transcript_test;

use std::collections::BTreeSet;

use wire::{FeedbackKind, HistoryEntry, SuggestedQuestion};

use crate::markdown::{render_markdown_html, render_plain_html};

/// Local, monotonically assigned entry identifier.
pub type EntryId = u64;

/// Client-side identifier of one chat request.
pub type RequestId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    User,
    Bot,
}

/// Who an entry is attributed to on screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sender {
    You,
    Assistant,
    Agent,
    System,
}

impl Sender {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::You => "You",
            Self::Assistant => "Assistant",
            Self::Agent => "Support Agent",
            Self::System => "System",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    Normal,
    /// A failed send or a terminal bootstrap failure.
    Error,
    /// Informational text such as a support acknowledgement.
    Notice,
}

/// One row of the message list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEntry {
    pub id: EntryId,
    pub role: Role,
    pub sender: Sender,
    pub kind: EntryKind,
    pub text: String,
    /// Display HTML: rendered Markdown for assistant text, escaped text otherwise.
    pub html: String,
    /// Backend message id; present on assistant replies that accept feedback.
    pub message_id: Option<i64>,
    pub feedback: Option<FeedbackKind>,
    pub feedback_enabled: bool,
    /// Sources the reply was grounded on, de-duplicated.
    pub sources: Vec<String>,
    /// The user entry this reply answers.
    pub reply_to: Option<EntryId>,
    pub is_welcome: bool,
}

/// Holder of a typing-indicator slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TypingKey {
    Request(RequestId),
    Agent,
}

/// The last visible item, which a host keeps scrolled into view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScrollTarget {
    Entry(EntryId),
    Suggestions,
    Typing,
}

/// Result of an optimistic feedback selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeedbackChange {
    pub message_id: i64,
    pub previous: Option<FeedbackKind>,
    pub selected: FeedbackKind,
}

#[derive(Clone, Debug, Default)]
pub struct Transcript {
    entries: Vec<MessageEntry>,
    next_id: EntryId,
    typing: BTreeSet<TypingKey>,
    sources: Vec<String>,
    suggestions: Vec<SuggestedQuestion>,
    revision: u64,
    scroll_target: Option<ScrollTarget>,
}

impl Transcript {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // READ
    // =========================================================================

    #[must_use]
    pub fn entries(&self) -> &[MessageEntry] {
        &self.entries
    }

    #[must_use]
    pub fn entry(&self, id: EntryId) -> Option<&MessageEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    #[must_use]
    pub fn scroll_target(&self) -> Option<ScrollTarget> {
        self.scroll_target
    }

    #[must_use]
    pub fn typing_visible(&self) -> bool {
        !self.typing.is_empty()
    }

    #[must_use]
    pub fn is_typing(&self, key: TypingKey) -> bool {
        self.typing.contains(&key)
    }

    /// Sources panel contents; empty means the panel is hidden.
    #[must_use]
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    #[must_use]
    pub fn has_user_messages(&self) -> bool {
        self.entries.iter().any(|e| e.role == Role::User)
    }

    /// Suggested questions, visible only until the first user message.
    #[must_use]
    pub fn visible_suggestions(&self) -> &[SuggestedQuestion] {
        if self.has_user_messages() { &[] } else { &self.suggestions }
    }

    // =========================================================================
    // MESSAGES
    // =========================================================================

    /// Set or replace the leading welcome message.
    pub fn set_welcome(&mut self, markdown: &str) {
        let mut entry = self.new_entry(Role::Bot, Sender::Assistant, EntryKind::Normal, markdown);
        entry.is_welcome = true;
        match self.entries.iter().position(|e| e.is_welcome) {
            Some(index) => {
                entry.id = self.entries[index].id;
                self.entries[index] = entry;
            }
            None => self.entries.insert(0, entry),
        }
        self.touch();
    }

    /// Append a message at the end; assistant text is rendered as Markdown.
    pub fn append_message(&mut self, role: Role, text: &str, message_id: Option<i64>) -> EntryId {
        let sender = match role {
            Role::User => Sender::You,
            Role::Bot => Sender::Assistant,
        };
        let mut entry = self.new_entry(role, sender, EntryKind::Normal, text);
        entry.message_id = message_id;
        self.push(entry)
    }

    /// Append an assistant-side entry of `kind` (error or notice).
    pub fn append_status_entry(&mut self, kind: EntryKind, text: &str) -> EntryId {
        let entry = self.new_entry(Role::Bot, Sender::Assistant, kind, text);
        self.push(entry)
    }

    /// Append a message relayed from the support channel.
    pub fn append_support_message(&mut self, sender: Sender, text: &str) -> EntryId {
        let entry = self.new_entry(Role::Bot, sender, EntryKind::Normal, text);
        self.push(entry)
    }

    /// Place an assistant reply directly after the user entry it answers.
    ///
    /// Replies already placed after the same entry stay ahead of this one.
    /// An unknown anchor appends at the end.
    pub fn insert_reply_after(
        &mut self,
        user_entry: EntryId,
        kind: EntryKind,
        text: &str,
        message_id: Option<i64>,
    ) -> EntryId {
        let mut entry = self.new_entry(Role::Bot, Sender::Assistant, kind, text);
        entry.message_id = message_id;
        entry.reply_to = Some(user_entry);
        let id = entry.id;

        match self.entries.iter().position(|e| e.id == user_entry) {
            Some(anchor) => {
                let mut at = anchor + 1;
                while self.entries.get(at).is_some_and(|e| e.reply_to == Some(user_entry)) {
                    at += 1;
                }
                self.entries.insert(at, entry);
                self.touch();
            }
            None => {
                self.push(entry);
            }
        }
        id
    }

    /// Attach de-duplicated sources to one entry.
    pub fn set_entry_sources(&mut self, id: EntryId, sources: &[String]) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
            entry.sources = dedupe(sources);
            self.touch();
        }
    }

    /// Replace all entries except the welcome message with `history`.
    ///
    /// Stored feedback is applied; feedback controls are enabled on replies
    /// with a message id when `feedback_enabled` is set.
    pub fn hydrate(&mut self, history: &[HistoryEntry], feedback_enabled: bool) {
        self.entries.retain(|e| e.is_welcome);
        self.typing.clear();
        self.sources.clear();
        for item in history {
            let user = self.new_entry(Role::User, Sender::You, EntryKind::Normal, &item.message);
            let user_id = user.id;
            self.entries.push(user);

            let mut reply = self.new_entry(Role::Bot, Sender::Assistant, EntryKind::Normal, &item.response);
            reply.message_id = item.id;
            reply.reply_to = Some(user_id);
            reply.feedback_enabled = feedback_enabled && item.id.is_some();
            reply.feedback = item.feedback.as_ref().map(|f| f.kind);
            self.entries.push(reply);
        }
        self.touch();
    }

    /// Drop everything but the welcome message, for a fresh session.
    pub fn reset(&mut self) {
        self.entries.retain(|e| e.is_welcome);
        self.typing.clear();
        self.sources.clear();
        self.suggestions.clear();
        self.touch();
    }

    // =========================================================================
    // TYPING
    // =========================================================================

    /// Hold the typing indicator for `key`. Holding a key twice is a no-op.
    pub fn show_typing(&mut self, key: TypingKey) {
        if self.typing.insert(key) {
            self.touch();
        }
    }

    /// Release `key`. Releasing a key that is not held is a no-op.
    pub fn hide_typing(&mut self, key: TypingKey) {
        if self.typing.remove(&key) {
            self.touch();
        }
    }

    // =========================================================================
    // FEEDBACK
    // =========================================================================

    /// Enable the two feedback controls on the reply carrying `message_id`.
    pub fn attach_feedback(&mut self, message_id: i64) -> bool {
        let Some(entry) = self.reply_mut(message_id) else {
            return false;
        };
        entry.feedback_enabled = true;
        self.touch();
        true
    }

    /// Optimistically select `kind` on `message_id`.
    ///
    /// Returns `None` when no reply with enabled feedback carries that id.
    pub fn select_feedback(&mut self, message_id: i64, kind: FeedbackKind) -> Option<FeedbackChange> {
        let entry = self.reply_mut(message_id).filter(|e| e.feedback_enabled)?;
        let previous = entry.feedback.replace(kind);
        self.touch();
        Some(FeedbackChange { message_id, previous, selected: kind })
    }

    /// Undo a failed selection, unless a newer selection replaced it.
    pub fn rollback_feedback(&mut self, change: FeedbackChange) {
        let Some(entry) = self.reply_mut(change.message_id) else {
            return;
        };
        if entry.feedback == Some(change.selected) {
            entry.feedback = change.previous;
            self.touch();
        }
    }

    // =========================================================================
    // SOURCES AND SUGGESTIONS
    // =========================================================================

    /// Show the sources panel with `sources`, de-duplicated in order.
    /// An empty list hides the panel.
    pub fn show_sources(&mut self, sources: &[String]) {
        self.sources = dedupe(sources);
        self.touch();
    }

    pub fn hide_sources(&mut self) {
        if !self.sources.is_empty() {
            self.sources.clear();
            self.touch();
        }
    }

    /// Replace the suggested questions; inactive ones are dropped and the
    /// rest ordered by `display_order`.
    pub fn set_suggestions(&mut self, questions: Vec<SuggestedQuestion>) {
        let mut active: Vec<SuggestedQuestion> = questions.into_iter().filter(|q| q.is_active).collect();
        active.sort_by_key(|q| q.display_order);
        self.suggestions = active;
        self.touch();
    }

    /// Take the text of visible suggestion `index`, removing all suggestions.
    pub fn take_suggestion(&mut self, index: usize) -> Option<String> {
        let text = self.visible_suggestions().get(index)?.question_text.clone();
        self.suggestions.clear();
        self.touch();
        Some(text)
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn new_entry(&mut self, role: Role, sender: Sender, kind: EntryKind, text: &str) -> MessageEntry {
        self.next_id += 1;
        let html = match (role, sender) {
            (Role::Bot, Sender::Assistant) => render_markdown_html(text),
            _ => render_plain_html(text),
        };
        MessageEntry {
            id: self.next_id,
            role,
            sender,
            kind,
            text: text.to_owned(),
            html,
            message_id: None,
            feedback: None,
            feedback_enabled: false,
            sources: Vec::new(),
            reply_to: None,
            is_welcome: false,
        }
    }

    fn push(&mut self, entry: MessageEntry) -> EntryId {
        let id = entry.id;
        self.entries.push(entry);
        self.touch();
        id
    }

    fn reply_mut(&mut self, message_id: i64) -> Option<&mut MessageEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.role == Role::Bot && e.message_id == Some(message_id))
    }

    fn touch(&mut self) {
        self.revision += 1;
        self.scroll_target = if self.typing_visible() {
            Some(ScrollTarget::Typing)
        } else if !self.visible_suggestions().is_empty() {
            Some(ScrollTarget::Suggestions)
        } else {
            self.entries.last().map(|e| ScrollTarget::Entry(e.id))
        };
    }
}

/// Drop repeated items, keeping first occurrences in order.
#[must_use]
pub fn dedupe(items: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items.iter().filter(|s| seen.insert(s.as_str())).cloned().collect()
}
