//! Client core for a document-grounded chatbot backend.
//!
//! SYSTEM CONTEXT
//! ==============
//! The backend serves chatbots, chat sessions, history, feedback and a
//! human-support handoff. This crate is everything a client needs on top of
//! it: the chatbot selector, a chat session for the full page or an embedded
//! widget, and the live support channel. Hosts (the `chatdesk` CLI, tests)
//! drive it through [`runtime::ChatRuntime`] and render
//! [`controller::ChatController`]'s view.
//!
//! LAYOUT
//! ======
//! - `config`: one parameter object for every client variant
//! - `error`: backend error taxonomy
//! - `markdown`: bot-message rendering
//! - `net`: HTTP backend and support WebSocket
//! - `state`: session, transcript, support and selector models
//! - `controller` / `runtime`: event dispatch and command execution
//! - `util`: persisted selection and shareable URLs

pub mod config;
pub mod controller;
pub mod error;
pub mod markdown;
pub mod net;
pub mod runtime;
pub mod state;
pub mod util;

#[cfg(test)]
pub mod test_helpers;
