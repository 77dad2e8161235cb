//! Support-channel transport: one WebSocket per support request.
//!
//! SYSTEM CONTEXT
//! ==============
//! After `POST /human-support/request` succeeds the runtime spawns
//! [`run_support_channel`] for the returned request id. Decoded frames are
//! handed to a callback in arrival order; the function returns once the
//! connection ends, describing how it ended so the caller can decide whether
//! to reconnect.
//!
//! DESIGN
//! ======
//! The socket is split into a reader and a writer. A keep-alive interval
//! writes `{"type":"ping"}` while the reader forwards text frames. Outbound
//! chat messages do not use the socket; they go through the HTTP messages
//! endpoint, so the writer only ever sends pings.

#[cfg(test)]
#[path = "support_channel_test.rs"]
mod support_channel_test;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use wire::SupportFrame;

/// Something observed on an open support channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The handshake completed.
    Opened,
    /// A decoded server frame.
    Frame(SupportFrame),
}

/// How a support channel connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEnd {
    /// The handshake never completed.
    ConnectFailed(String),
    /// The server sent a close frame or ended the stream.
    ServerClosed(String),
    /// Reading or writing failed after the channel was open.
    Failed(String),
}

impl ChannelEnd {
    #[must_use]
    pub fn reason(&self) -> &str {
        match self {
            Self::ConnectFailed(reason) | Self::ServerClosed(reason) | Self::Failed(reason) => reason,
        }
    }

    /// Whether the channel was open before it ended.
    #[must_use]
    pub fn was_connected(&self) -> bool {
        !matches!(self, Self::ConnectFailed(_))
    }
}

/// Connect to `url` and pump frames into `on_event` until the channel ends.
///
/// Frames that fail to decode are logged and skipped; they never end the
/// channel.
pub async fn run_support_channel<F>(url: &str, keepalive: Duration, mut on_event: F) -> ChannelEnd
where
    F: FnMut(ChannelEvent) + Send,
{
    let stream = match connect_async(url).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            tracing::warn!(url, error = %e, "support channel connect failed");
            return ChannelEnd::ConnectFailed(e.to_string());
        }
    };
    tracing::info!(url, "support channel connected");
    on_event(ChannelEvent::Opened);

    let (mut writer, mut reader) = stream.split();
    let mut ticker = tokio::time::interval(keepalive.max(Duration::from_millis(10)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately; pings start one interval in.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let ping = wire::encode_frame(&SupportFrame::Ping);
                if let Err(e) = writer.send(Message::Text(ping.into())).await {
                    tracing::warn!(error = %e, "support channel keep-alive failed");
                    return ChannelEnd::Failed(e.to_string());
                }
            }
            incoming = reader.next() => {
                let Some(message) = incoming else {
                    return ChannelEnd::ServerClosed("stream ended".to_owned());
                };
                match message {
                    Ok(Message::Text(text)) => match wire::decode_frame(text.as_str()) {
                        Ok(frame) => on_event(ChannelEvent::Frame(frame)),
                        Err(e) => tracing::warn!(error = %e, "skipping undecodable support frame"),
                    },
                    Ok(Message::Close(close)) => {
                        let reason = close.map_or_else(
                            || "closed".to_owned(),
                            |c| format!("{} {}", u16::from(c.code), c.reason),
                        );
                        tracing::info!(reason = %reason, "support channel closed by server");
                        return ChannelEnd::ServerClosed(reason.trim().to_owned());
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "support channel read failed");
                        return ChannelEnd::Failed(e.to_string());
                    }
                }
            }
        }
    }
}
