//! Human-support request state.
//!
//! DESIGN
//! ======
//! A support request moves one way through `pending -> active -> resolved ->
//! closed`. Frames can arrive late or twice (a reconnect replays nothing,
//! but the admin console can resolve and close in quick succession), so
//! `advance` only ever moves forward and reports whether it did.
//!
//! While the request is pending or active, user messages go to the support
//! endpoint. The backend refuses messages on resolved or closed requests, so
//! those route back to the bot.

#[cfg(test)]
#[path = "support_test.rs"]
mod support_test;

use wire::SupportStatus;

/// Connection state of the support channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    /// Waiting to reconnect; `attempt` is 1-based.
    Reconnecting { attempt: u32 },
    /// Closed, either deliberately or after reconnects were exhausted.
    Closed,
}

/// One open (or recently finished) support request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SupportSession {
    pub request_id: String,
    status: SupportStatus,
    channel: ChannelState,
    reconnect_attempts: u32,
    /// Reconnects ran out; the request can no longer reach this client.
    detached: bool,
}

impl SupportSession {
    #[must_use]
    pub fn new(request_id: impl Into<String>, status: SupportStatus) -> Self {
        Self {
            request_id: request_id.into(),
            status,
            channel: ChannelState::Connecting,
            reconnect_attempts: 0,
            detached: false,
        }
    }

    #[must_use]
    pub fn status(&self) -> SupportStatus {
        self.status
    }

    #[must_use]
    pub fn channel(&self) -> ChannelState {
        self.channel
    }

    /// Move to `next` if it is later in the progression.
    ///
    /// Returns `false` for stale or repeated transitions, which callers ignore.
    pub fn advance(&mut self, next: SupportStatus) -> bool {
        if next > self.status {
            self.status = next;
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    /// Whether user messages should go to the live agent.
    #[must_use]
    pub fn routes_messages(&self) -> bool {
        !self.detached && matches!(self.status, SupportStatus::Pending | SupportStatus::Active)
    }

    /// Whether the request still blocks opening another one.
    ///
    /// Resolved and detached requests do not: the visitor is back with the
    /// bot and may ask for a person again.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.routes_messages()
    }

    /// Whether a dropped channel is worth reconnecting.
    #[must_use]
    pub fn wants_channel(&self) -> bool {
        self.routes_messages()
    }

    pub fn channel_opened(&mut self) {
        self.channel = ChannelState::Open;
        self.reconnect_attempts = 0;
    }

    /// Record an unexpected close; returns the next attempt number, or
    /// `None` once `max_attempts` are used up, which detaches the request.
    pub fn schedule_reconnect(&mut self, max_attempts: u32) -> Option<u32> {
        if !self.wants_channel() {
            self.channel = ChannelState::Closed;
            return None;
        }
        if self.reconnect_attempts >= max_attempts {
            self.channel = ChannelState::Closed;
            self.detached = true;
            return None;
        }
        self.reconnect_attempts += 1;
        self.channel = ChannelState::Reconnecting { attempt: self.reconnect_attempts };
        Some(self.reconnect_attempts)
    }

    pub fn channel_closed(&mut self) {
        self.channel = ChannelState::Closed;
    }
}
